use std::fmt::Write as _;

use crate::errors::InputError;
use crate::schemas::document::RevisionStatus;
use crate::schemas::ids::{ApparentAnswerNumber, ApparentQuestionNumber, DocumentId, Page};
use crate::services::review::{Action, PageDisplay, ReviewAnswers, DISCARD_MARKER};
use crate::store::DataStore;

/// Console-independent capability needed to review detected answers.
pub(crate) trait AnswersPrompt {
    fn read_line(&mut self, prompt: &str) -> anyhow::Result<String>;
    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool>;
    /// One-way message to the operator (summaries, input errors).
    fn notify(&mut self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditOp {
    Add,
    Remove,
}

/// Walks the operator through one doubtful page: show the current
/// detections, accept them or apply `+n`/`-n` edits one apparent question
/// at a time. All numbers the operator sees and types are apparent; the
/// translation to canonical numbering happens here and nowhere deeper.
pub(crate) struct AnswersReviewer<'a> {
    prompt: &'a mut dyn AnswersPrompt,
    display: &'a mut dyn PageDisplay,
}

impl<'a> AnswersReviewer<'a> {
    pub(crate) fn new(
        prompt: &'a mut dyn AnswersPrompt,
        display: &'a mut dyn PageDisplay,
    ) -> Self {
        Self { prompt, display }
    }

    fn edit_answers(
        &mut self,
        store: &mut DataStore,
        doc_id: DocumentId,
        page: Page,
    ) -> anyhow::Result<()> {
        loop {
            self.show_summary(store, doc_id, page);
            if let Some(pic) = store.page(doc_id, page) {
                if let Err(err) = self.display.show_page(pic) {
                    tracing::warn!(error = %err, "page display unavailable");
                }
            }
            if self.prompt.confirm("Are the answers correct now? (Y/n)")? {
                return Ok(());
            }

            loop {
                let raw = self.prompt.read_line("Question number (0 to finish):")?;
                let input = raw.trim().to_string();
                if input.is_empty() || input == "0" {
                    break;
                }
                self.edit_one_question(store, doc_id, page, &input)?;
            }
        }
    }

    /// Collects and applies the edits for one apparent question. Bad
    /// input is reported and swallowed; only I/O failures propagate.
    fn edit_one_question(
        &mut self,
        store: &mut DataStore,
        doc_id: DocumentId,
        page: Page,
        raw_question: &str,
    ) -> anyhow::Result<()> {
        let ordering = store.ordering(doc_id)?.clone();

        let question = match parse_question(raw_question) {
            Ok(question) => question,
            Err(err) => {
                self.prompt.notify(&err.to_string());
                return Ok(());
            }
        };
        let (real_question, _) = match ordering.apparent_to_real(doc_id, question, None) {
            Ok(translated) => translated,
            Err(err) => {
                self.prompt.notify(&err.to_string());
                return Ok(());
            }
        };
        let on_page = store
            .page(doc_id, page)
            .is_some_and(|pic| pic.answered.contains_key(&real_question));
        if !on_page {
            self.prompt
                .notify(&format!("question {question} is not printed on page {page}"));
            return Ok(());
        }

        let line = self
            .prompt
            .read_line(&format!("Edits for question {question} (e.g. \"+2 -1\"):"))?;
        for token in line.split_whitespace() {
            let (op, apparent_answer) = match parse_edit(token) {
                Ok(edit) => edit,
                Err(err) => {
                    self.prompt.notify(&err.to_string());
                    continue;
                }
            };
            let real_answer =
                match ordering.apparent_to_real(doc_id, question, Some(apparent_answer)) {
                    Ok((_, Some(answer))) => answer,
                    Ok((_, None)) => continue,
                    Err(err) => {
                        self.prompt.notify(&err.to_string());
                        continue;
                    }
                };

            let Some(pic) = store.page_mut(doc_id, page) else {
                return Ok(());
            };
            let answers = pic.answered.entry(real_question).or_default();
            match op {
                EditOp::Add => {
                    if !answers.insert(real_answer) {
                        self.prompt
                            .notify(&format!("answer {apparent_answer} was already checked"));
                    }
                    pic.revision_status
                        .insert((real_question, real_answer), RevisionStatus::MarkedAsChecked);
                }
                EditOp::Remove => {
                    if !answers.remove(&real_answer) {
                        self.prompt
                            .notify(&format!("answer {apparent_answer} was not checked"));
                    }
                    pic.revision_status
                        .insert((real_question, real_answer), RevisionStatus::MarkedAsUnchecked);
                }
            }
        }
        Ok(())
    }

    /// Current detections of the page, printed in apparent numbering so
    /// the operator can compare against the paper.
    fn show_summary(&mut self, store: &DataStore, doc_id: DocumentId, page: Page) {
        let Ok(ordering) = store.ordering(doc_id) else { return };
        let Some(pic) = store.page(doc_id, page) else { return };

        let mut lines: Vec<(ApparentQuestionNumber, String)> = Vec::new();
        for (question, answers) in &pic.answered {
            let Ok((apparent_question, _)) =
                ordering.real_to_apparent(doc_id, *question, None)
            else {
                continue;
            };
            let mut shown: Vec<u32> = answers
                .iter()
                .filter_map(|answer| {
                    ordering
                        .real_to_apparent(doc_id, *question, Some(*answer))
                        .ok()
                        .and_then(|(_, apparent)| apparent)
                        .map(|apparent| apparent.0)
                })
                .collect();
            shown.sort_unstable();
            let shown: Vec<String> = shown.iter().map(|n| n.to_string()).collect();
            let text = if shown.is_empty() { String::from("-") } else { shown.join(", ") };
            lines.push((apparent_question, text));
        }
        lines.sort_unstable_by_key(|(question, _)| *question);

        let mut summary = format!("Document #{doc_id}, page {page}:\n");
        for (question, text) in lines {
            let _ = writeln!(summary, "  Q{question}: {text}");
        }
        self.prompt.notify(summary.trim_end());
    }
}

impl ReviewAnswers for AnswersReviewer<'_> {
    fn review_answer(
        &mut self,
        store: &mut DataStore,
        doc_id: DocumentId,
        page: Page,
    ) -> anyhow::Result<Action> {
        let Some(doc) = store.document(doc_id) else {
            return Ok(Action::Next);
        };
        if doc.name.as_str() == DISCARD_MARKER {
            return Ok(Action::Next);
        }
        let Some(pic_path) = doc.pages.get(&page).map(|pic| pic.pic_path.clone()) else {
            return Ok(Action::Next);
        };

        let command = self.prompt.read_line(&format!(
            "Document #{doc_id} page {page}: [enter] review answers, [>] accept, [<] back"
        ))?;
        let outcome = match command.trim() {
            "<" => Ok(Action::Back),
            ">" => Ok(Action::Next),
            _ => self.edit_answers(store, doc_id, page).map(|()| Action::Next),
        };
        self.display.close();

        let action = outcome?;
        if action == Action::Next {
            store.store_verified_pic(&pic_path)?;
            store.write_scandata_file(doc_id)?;
        }
        Ok(action)
    }
}

fn parse_question(raw: &str) -> Result<ApparentQuestionNumber, InputError> {
    raw.parse::<u32>()
        .map(ApparentQuestionNumber)
        .map_err(|_| InputError::NotANumber { input: raw.to_string() })
}

fn parse_edit(token: &str) -> Result<(EditOp, ApparentAnswerNumber), InputError> {
    let malformed = || InputError::MalformedEdit { input: token.to_string() };
    let (op, rest) = if let Some(rest) = token.strip_prefix('+') {
        (EditOp::Add, rest)
    } else if let Some(rest) = token.strip_prefix('-') {
        (EditOp::Remove, rest)
    } else {
        return Err(malformed());
    };
    let number: u32 = rest.parse().map_err(|_| malformed())?;
    if number == 0 {
        return Err(malformed());
    }
    Ok((op, ApparentAnswerNumber(number)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::ids::{OriginalAnswerNumber, OriginalQuestionNumber, StudentId};
    use crate::test_support::{self, NullDisplay, ScriptedAnswers};

    const DOC: DocumentId = DocumentId(1);

    #[test]
    fn parse_edit_accepts_signed_numbers_only() {
        assert_eq!(parse_edit("+2"), Ok((EditOp::Add, ApparentAnswerNumber(2))));
        assert_eq!(parse_edit("-1"), Ok((EditOp::Remove, ApparentAnswerNumber(1))));
        assert!(matches!(parse_edit("2"), Err(InputError::MalformedEdit { .. })));
        assert!(matches!(parse_edit("+x"), Err(InputError::MalformedEdit { .. })));
        assert!(matches!(parse_edit("+0"), Err(InputError::MalformedEdit { .. })));
        assert!(matches!(parse_edit("+"), Err(InputError::MalformedEdit { .. })));
    }

    fn shuffled_store() -> test_support::StoreFixture {
        // Printed question 1 is canonical 2; its printed answers 1, 2 are
        // canonical 2, 1.
        let config = test_support::exam_config(vec![(
            1,
            test_support::ordering(&[2, 1], &[(2, &[2, 1]), (1, &[1, 2])]),
        )]);
        let mut fixture = test_support::store_with(config);
        let mut pic = test_support::full_pic(1, 1, &[1, 2]);
        pic.answered.insert(
            OriginalQuestionNumber(2),
            [OriginalAnswerNumber(2)].into_iter().collect(),
        );
        fixture.store.register_page(pic).expect("register");
        fixture
            .store
            .set_identity_unjournaled(DOC, "Named".into(), StudentId::default());
        fixture
    }

    #[test]
    fn edits_are_translated_to_canonical_numbering() {
        let mut fixture = shuffled_store();
        let store = &mut fixture.store;

        // Review printed question 1: uncheck printed answer 1, check
        // printed answer 2 (canonical answers 2 and 1 of question 2).
        let mut prompt = ScriptedAnswers::new(
            vec!["", "1", "-1 +2", "0"],
            vec![false, true],
        );
        let mut display = NullDisplay;
        let action = AnswersReviewer::new(&mut prompt, &mut display)
            .review_answer(store, DOC, Page(1))
            .expect("review");

        assert_eq!(action, Action::Next);
        let pic = store.page(DOC, Page(1)).expect("page");
        assert_eq!(
            pic.answered[&OriginalQuestionNumber(2)],
            [OriginalAnswerNumber(1)].into_iter().collect()
        );
        assert_eq!(
            pic.revision_status[&(OriginalQuestionNumber(2), OriginalAnswerNumber(2))],
            RevisionStatus::MarkedAsUnchecked
        );
        assert_eq!(
            pic.revision_status[&(OriginalQuestionNumber(2), OriginalAnswerNumber(1))],
            RevisionStatus::MarkedAsChecked
        );
        assert!(store.is_verified(&pic.pic_path));
    }

    #[test]
    fn edits_survive_a_store_reload() {
        let mut fixture = shuffled_store();
        {
            let store = &mut fixture.store;
            let mut prompt =
                ScriptedAnswers::new(vec!["", "1", "+2", "0"], vec![false, true]);
            let mut display = NullDisplay;
            AnswersReviewer::new(&mut prompt, &mut display)
                .review_answer(store, DOC, Page(1))
                .expect("review");
        }

        let mut reloaded = crate::store::DataStore::open(
            fixture.store.config().clone(),
            fixture.dir.path().to_path_buf(),
        )
        .expect("reopen");
        reloaded.reload().expect("reload");
        let pic = reloaded.page(DOC, Page(1)).expect("page");
        assert!(pic.answered[&OriginalQuestionNumber(2)].contains(&OriginalAnswerNumber(1)));
    }

    #[test]
    fn out_of_range_question_reprompts_instead_of_failing() {
        let mut fixture = shuffled_store();
        let store = &mut fixture.store;

        let mut prompt = ScriptedAnswers::new(
            vec!["", "9", "x", "0"],
            vec![false, true],
        );
        let mut display = NullDisplay;
        let action = AnswersReviewer::new(&mut prompt, &mut display)
            .review_answer(store, DOC, Page(1))
            .expect("review");

        assert_eq!(action, Action::Next);
        assert!(prompt.notes.iter().any(|note| note.contains("no question is numbered 9")));
        assert!(prompt.notes.iter().any(|note| note.contains("\"x\"")));
    }

    #[test]
    fn back_does_not_mark_the_page_verified() {
        let mut fixture = shuffled_store();
        let store = &mut fixture.store;
        let pic_path = store.page(DOC, Page(1)).expect("page").pic_path.clone();

        let mut prompt = ScriptedAnswers::new(vec!["<"], vec![]);
        let mut display = NullDisplay;
        let action = AnswersReviewer::new(&mut prompt, &mut display)
            .review_answer(store, DOC, Page(1))
            .expect("review");

        assert_eq!(action, Action::Back);
        assert!(!store.is_verified(&pic_path));
    }

    #[test]
    fn accepting_without_edits_marks_the_page_verified() {
        let mut fixture = shuffled_store();
        let store = &mut fixture.store;
        let pic_path = store.page(DOC, Page(1)).expect("page").pic_path.clone();

        let mut prompt = ScriptedAnswers::new(vec![">"], vec![]);
        let mut display = NullDisplay;
        let action = AnswersReviewer::new(&mut prompt, &mut display)
            .review_answer(store, DOC, Page(1))
            .expect("review");

        assert_eq!(action, Action::Next);
        assert!(store.is_verified(&pic_path));
    }

    #[test]
    fn summary_uses_apparent_numbering() {
        let mut fixture = shuffled_store();
        let store = &mut fixture.store;

        let mut prompt = ScriptedAnswers::new(vec![""], vec![true]);
        let mut display = NullDisplay;
        AnswersReviewer::new(&mut prompt, &mut display)
            .review_answer(store, DOC, Page(1))
            .expect("review");

        // Canonical question 2 answer 2 prints as question 1 answer 1.
        let summary = prompt.notes.first().expect("summary");
        assert!(summary.contains("Q1: 1"), "summary was: {summary}");
    }
}
