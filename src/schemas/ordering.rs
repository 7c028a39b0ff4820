use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::errors::{InputError, ReconcileError};
use crate::schemas::ids::{
    ApparentAnswerNumber, ApparentQuestionNumber, CheckboxRef, DocumentId, OriginalAnswerNumber,
    OriginalQuestionNumber, Page, StudentId, StudentName,
};

/// Pixel position of a checkbox on the printed page, in page coordinates.
pub(crate) type BoxPosition = (f64, f64);

/// Per-document shuffle record produced at generation time.
///
/// `questions` lists canonical question numbers in print order, so the
/// question printed as number `i` (1-based) is `questions[i - 1]`.
/// `answers[q]` lists `(canonical answer, correctness)` pairs in print
/// order for question `q`; correctness is `None` when the answer was
/// neutralized after printing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Ordering {
    pub(crate) questions: Vec<OriginalQuestionNumber>,
    pub(crate) answers: BTreeMap<OriginalQuestionNumber, Vec<(OriginalAnswerNumber, Option<bool>)>>,
}

impl Ordering {
    /// Translates numbering as printed on document `doc_id` back to the
    /// canonical numbering. This and `real_to_apparent` are the only two
    /// places allowed to cross the apparent/canonical boundary.
    pub(crate) fn apparent_to_real(
        &self,
        doc_id: DocumentId,
        question: ApparentQuestionNumber,
        answer: Option<ApparentAnswerNumber>,
    ) -> Result<(OriginalQuestionNumber, Option<OriginalAnswerNumber>), InputError> {
        let index = (question.0 as usize)
            .checked_sub(1)
            .ok_or(InputError::QuestionOutOfRange { doc_id, position: question })?;
        let real_question = *self
            .questions
            .get(index)
            .ok_or(InputError::QuestionOutOfRange { doc_id, position: question })?;

        let Some(apparent_answer) = answer else {
            return Ok((real_question, None));
        };

        let answers = self
            .answers
            .get(&real_question)
            .ok_or(InputError::UnknownQuestion { doc_id, question: real_question })?;
        let answer_index = (apparent_answer.0 as usize).checked_sub(1).ok_or(
            InputError::AnswerOutOfRange { doc_id, question, position: apparent_answer },
        )?;
        let (real_answer, _) = *answers.get(answer_index).ok_or(InputError::AnswerOutOfRange {
            doc_id,
            question,
            position: apparent_answer,
        })?;

        Ok((real_question, Some(real_answer)))
    }

    /// Inverse of `apparent_to_real`: recovers the numbering printed on
    /// document `doc_id` from the canonical one.
    pub(crate) fn real_to_apparent(
        &self,
        doc_id: DocumentId,
        question: OriginalQuestionNumber,
        answer: Option<OriginalAnswerNumber>,
    ) -> Result<(ApparentQuestionNumber, Option<ApparentAnswerNumber>), InputError> {
        let position = self
            .questions
            .iter()
            .position(|q| *q == question)
            .ok_or(InputError::UnknownQuestion { doc_id, question })?;
        let apparent_question = ApparentQuestionNumber(position as u32 + 1);

        let Some(real_answer) = answer else {
            return Ok((apparent_question, None));
        };

        let answers = self
            .answers
            .get(&question)
            .ok_or(InputError::UnknownQuestion { doc_id, question })?;
        let answer_position = answers
            .iter()
            .position(|(a, _)| *a == real_answer)
            .ok_or(InputError::UnknownAnswer { doc_id, question, answer: real_answer })?;

        Ok((apparent_question, Some(ApparentAnswerNumber(answer_position as u32 + 1))))
    }

    pub(crate) fn question_set(&self) -> BTreeSet<OriginalQuestionNumber> {
        self.questions.iter().copied().collect()
    }
}

/// Generation-time configuration: one ordering per printed document,
/// checkbox layout per page, and the student roster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct ExamConfig {
    pub(crate) ordering: BTreeMap<DocumentId, Ordering>,
    #[serde(default)]
    pub(crate) boxes: BTreeMap<DocumentId, BTreeMap<Page, BTreeMap<String, BoxPosition>>>,
    #[serde(default)]
    pub(crate) students_ids: BTreeMap<StudentId, StudentName>,
    #[serde(default)]
    pub(crate) students_list: Vec<StudentName>,
    #[serde(default)]
    pub(crate) id_table_pos: Option<BoxPosition>,
}

impl ExamConfig {
    pub(crate) fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing configuration file {}", path.display()))?;
        Ok(config)
    }

    /// Ordering table of one document. A stored document without an entry
    /// means the configuration and the scanned data diverged, which no
    /// amount of interactive review can repair.
    pub(crate) fn ordering(&self, doc_id: DocumentId) -> Result<&Ordering, ReconcileError> {
        self.ordering.get(&doc_id).ok_or_else(|| ReconcileError::MissingConfigurationData {
            doc_id,
            max_doc_id: self.max_doc_id().unwrap_or(doc_id),
        })
    }

    pub(crate) fn max_doc_id(&self) -> Option<DocumentId> {
        self.ordering.keys().max().copied()
    }

    /// Pages of a document that carry at least one checkbox. Pages listed
    /// in the layout with no checkbox (title or instruction pages) are
    /// never expected during completeness checks.
    pub(crate) fn expected_pages(&self, doc_id: DocumentId) -> BTreeSet<Page> {
        self.boxes
            .get(&doc_id)
            .map(|pages| {
                pages
                    .iter()
                    .filter(|(_, boxes)| !boxes.is_empty())
                    .map(|(page, _)| *page)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Parses a layout checkbox tag of the form `Q<question>-<answer>` (both
/// numbers canonical). Returns `None` for malformed tags.
pub(crate) fn parse_checkbox_tag(tag: &str) -> Option<CheckboxRef> {
    let body = tag.strip_prefix('Q').unwrap_or(tag);
    let (question, answer) = body.split_once('-')?;
    let question: u32 = question.parse().ok()?;
    let answer: u32 = answer.parse().ok()?;
    Some((OriginalQuestionNumber(question), OriginalAnswerNumber(answer)))
}
