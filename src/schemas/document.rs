use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::schemas::ids::{
    CheckboxRef, DocumentId, OriginalAnswerNumber, OriginalQuestionNumber, Page, StudentId,
    StudentName,
};

/// Outcome of the automatic checkbox detection for one checkbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum DetectionStatus {
    Checked,
    ProbablyChecked,
    ProbablyUnchecked,
    Unchecked,
}

impl DetectionStatus {
    pub(crate) fn seems_checked(self) -> bool {
        matches!(self, Self::Checked | Self::ProbablyChecked)
    }

    /// Detection was not confident enough to stand on its own.
    pub(crate) fn is_doubtful(self) -> bool {
        matches!(self, Self::ProbablyChecked | Self::ProbablyUnchecked)
    }
}

/// Human override recorded during review. Wherever present, it replaces
/// the detection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RevisionStatus {
    MarkedAsChecked,
    MarkedAsUnchecked,
}

impl RevisionStatus {
    pub(crate) fn seems_checked(self) -> bool {
        matches!(self, Self::MarkedAsChecked)
    }
}

/// Analysis result of a single scanned page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PicData {
    pub(crate) doc_id: DocumentId,
    pub(crate) page: Page,
    /// Path of the stored page image, relative to the scan directory.
    pub(crate) pic_path: String,
    #[serde(default)]
    pub(crate) student_name: StudentName,
    #[serde(default)]
    pub(crate) student_id: StudentId,
    #[serde(with = "checkbox_entries")]
    pub(crate) detection_status: BTreeMap<CheckboxRef, DetectionStatus>,
    #[serde(with = "checkbox_entries", default)]
    pub(crate) revision_status: BTreeMap<CheckboxRef, RevisionStatus>,
    /// Pixel position of each checkbox on the page image.
    #[serde(with = "checkbox_entries", default)]
    pub(crate) positions: BTreeMap<CheckboxRef, (u32, u32)>,
    pub(crate) cell_size: u32,
    /// Checked canonical answers, keyed by canonical question.
    #[serde(default)]
    pub(crate) answered: BTreeMap<OriginalQuestionNumber, BTreeSet<OriginalAnswerNumber>>,
}

impl PicData {
    /// Status of one checkbox after applying any human override.
    pub(crate) fn effective_checked(&self, checkbox: CheckboxRef) -> bool {
        match self.revision_status.get(&checkbox) {
            Some(revision) => revision.seems_checked(),
            None => self
                .detection_status
                .get(&checkbox)
                .map(|status| status.seems_checked())
                .unwrap_or(false),
        }
    }

    /// A page needs human review while any checkbox detection is doubtful
    /// and has not been overridden.
    pub(crate) fn needs_review(&self) -> bool {
        self.detection_status.iter().any(|(checkbox, status)| {
            status.is_doubtful() && !self.revision_status.contains_key(checkbox)
        })
    }

    pub(crate) fn questions(&self) -> impl Iterator<Item = OriginalQuestionNumber> + '_ {
        self.answered.keys().copied()
    }

    /// Rebuilds `answered` from the effective status of every known
    /// checkbox. Every question on the page keeps an entry, so questions
    /// with nothing checked still count as seen.
    pub(crate) fn derive_answered(&mut self) {
        let checkboxes: BTreeSet<CheckboxRef> = self
            .detection_status
            .keys()
            .chain(self.revision_status.keys())
            .copied()
            .collect();

        let mut answered: BTreeMap<OriginalQuestionNumber, BTreeSet<OriginalAnswerNumber>> =
            BTreeMap::new();
        for (question, answer) in checkboxes {
            let entry = answered.entry(question).or_default();
            if self.effective_checked((question, answer)) {
                entry.insert(answer);
            }
        }
        self.answered = answered;
    }
}

/// All scanned pages of one confirmed document, plus the identity the
/// document resolved to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct DocumentData {
    pub(crate) pages: BTreeMap<Page, PicData>,
    #[serde(default)]
    pub(crate) name: StudentName,
    #[serde(default)]
    pub(crate) student_id: StudentId,
}

impl DocumentData {
    /// Checked answers merged over all pages. When two pages both carry a
    /// question, the lowest page wins; later pages never override it.
    pub(crate) fn answered(
        &self,
    ) -> BTreeMap<OriginalQuestionNumber, BTreeSet<OriginalAnswerNumber>> {
        let mut merged = BTreeMap::new();
        for pic in self.pages.values() {
            for (question, answers) in &pic.answered {
                merged.entry(*question).or_insert_with(|| answers.clone());
            }
        }
        merged
    }

    pub(crate) fn questions(&self) -> BTreeSet<OriginalQuestionNumber> {
        self.pages.values().flat_map(|pic| pic.questions()).collect()
    }
}

/// A freshly scanned version of a (document, page) slot that is already
/// occupied. Held apart until integrity resolution keeps one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CandidatePage {
    pub(crate) conflicts_with: DocumentId,
    pub(crate) page: Page,
    pub(crate) pic: PicData,
}

/// JSON maps only take string keys, so checkbox-keyed maps are persisted
/// as sequences of `((question, answer), value)` entries.
pub(crate) mod checkbox_entries {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::schemas::ids::CheckboxRef;

    pub(crate) fn serialize<S, V>(
        map: &BTreeMap<CheckboxRef, V>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        let entries: Vec<(&CheckboxRef, &V)> = map.iter().collect();
        entries.serialize(serializer)
    }

    pub(crate) fn deserialize<'de, D, V>(
        deserializer: D,
    ) -> Result<BTreeMap<CheckboxRef, V>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        let entries: Vec<(CheckboxRef, V)> = Vec::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}
