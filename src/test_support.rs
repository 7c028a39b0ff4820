//! Shared fixtures and scripted prompt doubles for unit tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tempfile::TempDir;

use crate::schemas::document::{DetectionStatus, PicData};
use crate::schemas::ids::{
    CheckboxRef, DocumentId, OriginalAnswerNumber, OriginalQuestionNumber, Page, StudentName,
};
use crate::schemas::ordering::{ExamConfig, Ordering};
use crate::services::integrity::{IntegrityPrompt, KeptVersion};
use crate::services::review::answers::AnswersPrompt;
use crate::services::review::names::IdentityPrompt;
use crate::services::review::PageDisplay;
use crate::store::DataStore;

/// Ordering table from print-order lists: `questions` gives the canonical
/// question printed at each position, `answers` the canonical answers per
/// canonical question, also in print order.
pub(crate) fn ordering(questions: &[u32], answers: &[(u32, &[u32])]) -> Ordering {
    let mut table = Ordering {
        questions: questions.iter().map(|q| OriginalQuestionNumber(*q)).collect(),
        answers: BTreeMap::new(),
    };
    for (question, list) in answers {
        let entries = list
            .iter()
            .enumerate()
            .map(|(i, a)| (OriginalAnswerNumber(*a), Some(i == 0)))
            .collect();
        table.answers.insert(OriginalQuestionNumber(*question), entries);
    }
    table
}

pub(crate) fn exam_config(orderings: Vec<(u32, Ordering)>) -> ExamConfig {
    let mut config = ExamConfig::default();
    for (doc, table) in orderings {
        config.ordering.insert(DocumentId(doc), table);
    }
    config
}

pub(crate) fn checkbox(q: u32, a: u32) -> CheckboxRef {
    (OriginalQuestionNumber(q), OriginalAnswerNumber(a))
}

/// Minimal analyzed page: empty detections, nothing answered.
pub(crate) fn pic(doc: u32, page: u32) -> PicData {
    PicData {
        doc_id: DocumentId(doc),
        page: Page(page),
        pic_path: format!("pic/{doc}-{page}.webp"),
        student_name: StudentName::default(),
        student_id: Default::default(),
        detection_status: BTreeMap::new(),
        revision_status: BTreeMap::new(),
        positions: BTreeMap::new(),
        cell_size: 20,
        answered: BTreeMap::new(),
    }
}

/// Page carrying the given canonical questions: each gets an empty answer
/// set and confident detections for two checkboxes.
pub(crate) fn full_pic(doc: u32, page: u32, questions: &[u32]) -> PicData {
    let mut data = pic(doc, page);
    for question in questions {
        data.answered.insert(OriginalQuestionNumber(*question), BTreeSet::new());
        for answer in 1..=2 {
            data.detection_status.insert(checkbox(*question, answer), DetectionStatus::Unchecked);
        }
    }
    data
}

pub(crate) struct StoreFixture {
    pub(crate) dir: TempDir,
    pub(crate) store: DataStore,
}

pub(crate) fn store_with(config: ExamConfig) -> StoreFixture {
    let dir = TempDir::new().expect("temporary scan directory");
    let store = DataStore::open(config, dir.path().to_path_buf()).expect("open store");
    StoreFixture { dir, store }
}

/// Replays a fixed list of identity inputs and confirmation answers.
pub(crate) struct ScriptedIdentity {
    inputs: VecDeque<String>,
    confirms: VecDeque<bool>,
}

impl ScriptedIdentity {
    pub(crate) fn new(inputs: Vec<&str>, confirms: Vec<bool>) -> Self {
        Self {
            inputs: inputs.into_iter().map(str::to_string).collect(),
            confirms: confirms.into_iter().collect(),
        }
    }
}

impl IdentityPrompt for ScriptedIdentity {
    fn ask_identity(
        &mut self,
        _doc_id: DocumentId,
        _current: &StudentName,
    ) -> anyhow::Result<String> {
        Ok(self.inputs.pop_front().expect("identity script exhausted"))
    }

    fn confirm(&mut self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(self.confirms.pop_front().expect("confirmation script exhausted"))
    }
}

/// Replays answer review inputs and records every notification.
pub(crate) struct ScriptedAnswers {
    inputs: VecDeque<String>,
    confirms: VecDeque<bool>,
    pub(crate) notes: Vec<String>,
}

impl ScriptedAnswers {
    pub(crate) fn new(inputs: Vec<&str>, confirms: Vec<bool>) -> Self {
        Self {
            inputs: inputs.into_iter().map(str::to_string).collect(),
            confirms: confirms.into_iter().collect(),
            notes: Vec::new(),
        }
    }
}

impl AnswersPrompt for ScriptedAnswers {
    fn read_line(&mut self, _prompt: &str) -> anyhow::Result<String> {
        Ok(self.inputs.pop_front().expect("answers script exhausted"))
    }

    fn confirm(&mut self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(self.confirms.pop_front().expect("confirmation script exhausted"))
    }

    fn notify(&mut self, message: &str) {
        self.notes.push(message.to_string());
    }
}

/// Scripted integrity decisions: which versions to keep, and one fixed
/// answer to the missing-questions override.
pub(crate) struct ScriptedIntegrity {
    kept: VecDeque<KeptVersion>,
    missing: Option<bool>,
}

impl ScriptedIntegrity {
    pub(crate) fn keeping(kept: Vec<KeptVersion>) -> Self {
        Self { kept: kept.into_iter().collect(), missing: None }
    }

    pub(crate) fn refusing_missing() -> Self {
        Self { kept: VecDeque::new(), missing: Some(false) }
    }

    pub(crate) fn allowing_missing() -> Self {
        Self { kept: VecDeque::new(), missing: Some(true) }
    }
}

impl IntegrityPrompt for ScriptedIntegrity {
    fn select_version(
        &mut self,
        _stored: &PicData,
        _candidate: &PicData,
    ) -> anyhow::Result<KeptVersion> {
        Ok(self.kept.pop_front().expect("version selection script exhausted"))
    }

    fn allow_missing_questions(
        &mut self,
        _missing: &BTreeMap<DocumentId, Vec<OriginalQuestionNumber>>,
    ) -> anyhow::Result<bool> {
        Ok(self.missing.expect("unexpected missing-questions prompt"))
    }
}

/// Page display that does nothing; review logic must not depend on it.
pub(crate) struct NullDisplay;

impl PageDisplay for NullDisplay {
    fn show_page(&mut self, _pic: &PicData) -> anyhow::Result<()> {
        Ok(())
    }

    fn close(&mut self) {}
}
