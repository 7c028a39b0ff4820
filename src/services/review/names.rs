use std::collections::BTreeMap;

use crate::schemas::ids::{DocumentId, StudentId, StudentName};
use crate::schemas::ordering::ExamConfig;
use crate::services::review::{Action, PageDisplay, ReviewNames, DISCARD_MARKER};
use crate::store::DataStore;
use crate::tools::text::levenshtein_distance;

/// Name suggestions tolerate this many typos before falling back to
/// prefix and substring matching.
const MAX_NAME_DISTANCE: usize = 3;

/// Console-independent capability needed to collect an identity.
pub(crate) trait IdentityPrompt {
    /// One free-form line: a navigation token, a student id or a name.
    fn ask_identity(
        &mut self,
        doc_id: DocumentId,
        current: &StudentName,
    ) -> anyhow::Result<String>;

    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool>;
}

/// Resolves unnamed documents and duplicate identities, one document at a
/// time. The first page of the document (the one carrying the name field)
/// is displayed while prompting.
pub(crate) struct NamesReviewer<'a> {
    prompt: &'a mut dyn IdentityPrompt,
    display: &'a mut dyn PageDisplay,
}

impl<'a> NamesReviewer<'a> {
    pub(crate) fn new(
        prompt: &'a mut dyn IdentityPrompt,
        display: &'a mut dyn PageDisplay,
    ) -> Self {
        Self { prompt, display }
    }

    fn enter_identity(
        &mut self,
        store: &mut DataStore,
        doc_id: DocumentId,
        current: &StudentName,
    ) -> anyhow::Result<Action> {
        loop {
            let raw = self.prompt.ask_identity(doc_id, current)?;
            let input = raw.trim();
            match input {
                "" => continue,
                "<" => return Ok(Action::Back),
                ">" => return Ok(Action::Next),
                DISCARD_MARKER => {
                    // Revocable until finalization, so no journal entry.
                    store.set_identity_unjournaled(
                        doc_id,
                        StudentName::from(DISCARD_MARKER),
                        StudentId::from("-1"),
                    );
                    return Ok(Action::Next);
                }
                _ => {
                    let (name, student_id) = resolve_identity(store.config(), input);
                    // Every resolution is echoed back, roster hits included;
                    // an exact id may still be someone else's id mistyped.
                    let accepted = self
                        .prompt
                        .confirm(&format!("Name: \"{name}\"\nIs this correct? (Y/n)"))?;
                    if accepted {
                        store.set_identity(doc_id, name, student_id)?;
                        return Ok(Action::Next);
                    }
                }
            }
        }
    }
}

impl ReviewNames for NamesReviewer<'_> {
    fn review_name(
        &mut self,
        store: &mut DataStore,
        doc_id: DocumentId,
    ) -> anyhow::Result<Action> {
        let Some(doc) = store.document(doc_id) else {
            return Ok(Action::Next);
        };
        let current = doc.name.clone();
        if let Some(pic) = doc.pages.values().next() {
            if let Err(err) = self.display.show_page(pic) {
                tracing::warn!(error = %err, "page display unavailable");
            }
        }

        let outcome = self.enter_identity(store, doc_id, &current);
        self.display.close();
        outcome
    }
}

/// Maps operator input to a known identity when a roster is available.
/// Resolution only; confirmation is the caller's business.
fn resolve_identity(config: &ExamConfig, input: &str) -> (StudentName, StudentId) {
    if !config.students_ids.is_empty() {
        let as_id = StudentId::from(input);
        if let Some(name) = config.students_ids.get(&as_id) {
            return (name.clone(), as_id);
        }
        if let Some((id, name)) = exact_roster_name(&config.students_ids, input) {
            return (name, id);
        }
        // Digits mean the operator typed an id, possibly with a typo.
        if input.chars().any(|c| c.is_ascii_digit()) {
            if let Some((id, name)) = closest_id(&config.students_ids, input) {
                return (name, id);
            }
        }
        let names: Vec<StudentName> = config.students_ids.values().cloned().collect();
        if let Some(name) = suggest_name(&names, input) {
            let id = config
                .students_ids
                .iter()
                .find(|(_, candidate)| **candidate == name)
                .map(|(id, _)| id.clone())
                .unwrap_or_default();
            return (name, id);
        }
        return (StudentName::from(input), StudentId::default());
    }

    if !config.students_list.is_empty() {
        if let Some(exact) = config
            .students_list
            .iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(input))
        {
            return (exact.clone(), StudentId::default());
        }
        if let Some(name) = suggest_name(&config.students_list, input) {
            return (name, StudentId::default());
        }
    }

    (StudentName::from(input), StudentId::default())
}

fn exact_roster_name(
    roster: &BTreeMap<StudentId, StudentName>,
    input: &str,
) -> Option<(StudentId, StudentName)> {
    roster
        .iter()
        .find(|(_, name)| name.as_str().eq_ignore_ascii_case(input))
        .map(|(id, name)| (id.clone(), name.clone()))
}

fn closest_id(
    roster: &BTreeMap<StudentId, StudentName>,
    input: &str,
) -> Option<(StudentId, StudentName)> {
    roster
        .iter()
        .min_by_key(|(id, _)| levenshtein_distance(id.as_str(), input))
        .map(|(id, name)| (id.clone(), name.clone()))
}

/// Suggests a known name for a partial or misspelled input. Strategies in
/// order: edit distance, token prefix, token substring either direction.
pub(crate) fn suggest_name(names: &[StudentName], input: &str) -> Option<StudentName> {
    let needle = input.to_lowercase();

    let closest = names
        .iter()
        .map(|name| (levenshtein_distance(&name.as_str().to_lowercase(), &needle), name))
        .min_by_key(|(distance, _)| *distance);
    if let Some((distance, name)) = closest {
        if distance <= MAX_NAME_DISTANCE {
            return Some(name.clone());
        }
    }

    for name in names {
        if name_tokens(name).iter().any(|token| token.starts_with(&needle)) {
            return Some(name.clone());
        }
    }

    for name in names {
        if name_tokens(name)
            .iter()
            .any(|token| token.contains(&needle) || needle.contains(token.as_str()))
        {
            return Some(name.clone());
        }
    }

    None
}

fn name_tokens(name: &StudentName) -> Vec<String> {
    name.as_str().split_whitespace().map(|token| token.to_lowercase()).collect()
}
