use std::collections::BTreeMap;

use crate::errors::ReconcileError;
use crate::schemas::document::PicData;
use crate::schemas::ids::{CandidateId, DocumentId, OriginalQuestionNumber, Page};
use crate::store::DataStore;

/// Which version of a twice-scanned page to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeptVersion {
    Stored,
    Candidate,
}

/// Interactive decisions the integrity phase may need from the operator.
pub(crate) trait IntegrityPrompt {
    /// Two versions of the same page disagree. This may be a rescan with
    /// different quality, or two students got the same printed document.
    fn select_version(
        &mut self,
        stored: &PicData,
        candidate: &PicData,
    ) -> anyhow::Result<KeptVersion>;

    /// One global decision: continue although some questions were never
    /// seen, or abort the session.
    fn allow_missing_questions(
        &mut self,
        missing: &BTreeMap<DocumentId, Vec<OriginalQuestionNumber>>,
    ) -> anyhow::Result<bool>;
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct IntegrityCheckResult {
    /// Candidates whose content differs from the stored version. Never
    /// dropped automatically; each needs an explicit human choice.
    pub(crate) conflicts: Vec<CandidateId>,
    /// Slots whose duplicate was byte-for-byte equivalent and was removed.
    pub(crate) resolved_conflicts: Vec<(DocumentId, Page)>,
    pub(crate) missing_pages: BTreeMap<DocumentId, Vec<Page>>,
    pub(crate) missing_questions: BTreeMap<DocumentId, Vec<OriginalQuestionNumber>>,
}

impl IntegrityCheckResult {
    pub(crate) fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
            && self.missing_pages.is_empty()
            && self.missing_questions.is_empty()
    }
}

pub(crate) struct IntegrityChecker<'a> {
    store: &'a mut DataStore,
}

enum DuplicateOutcome {
    AutoResolve,
    Conflict,
    Orphaned,
}

impl<'a> IntegrityChecker<'a> {
    pub(crate) fn new(store: &'a mut DataStore) -> Self {
        Self { store }
    }

    pub(crate) fn run(&mut self) -> anyhow::Result<IntegrityCheckResult> {
        let mut result = IntegrityCheckResult::default();
        self.resolve_duplicates(&mut result)?;
        self.check_completeness(&mut result)?;

        if result.is_clean() {
            tracing::info!("data integrity verified");
        } else {
            tracing::warn!(
                conflicts = result.conflicts.len(),
                missing_pages = result.missing_pages.len(),
                missing_questions = result.missing_questions.len(),
                "integrity issues detected"
            );
        }
        Ok(result)
    }

    /// Duplicates equivalent to the stored version (same detection map,
    /// same detected name) are dropped without asking; the rest stay
    /// parked until the fixer collects a decision for each.
    fn resolve_duplicates(&mut self, result: &mut IntegrityCheckResult) -> anyhow::Result<()> {
        let ids: Vec<CandidateId> = self.store.candidates().keys().copied().collect();
        for id in ids {
            let (outcome, doc_id, page) = {
                let candidate = &self.store.candidates()[&id];
                let outcome = match self.store.page(candidate.conflicts_with, candidate.page) {
                    Some(stored)
                        if stored.detection_status == candidate.pic.detection_status
                            && stored.student_name == candidate.pic.student_name =>
                    {
                        DuplicateOutcome::AutoResolve
                    }
                    Some(_) => DuplicateOutcome::Conflict,
                    None => DuplicateOutcome::Orphaned,
                };
                (outcome, candidate.conflicts_with, candidate.page)
            };

            match outcome {
                DuplicateOutcome::AutoResolve => {
                    tracing::info!(doc = %doc_id, page = %page, "duplicate scan is identical; keeping the first version");
                    self.store.remove_candidate(id)?;
                    result.resolved_conflicts.push((doc_id, page));
                }
                DuplicateOutcome::Conflict => {
                    result.conflicts.push(id);
                }
                DuplicateOutcome::Orphaned => {
                    // The conflicting slot disappeared (page discarded in
                    // an earlier session); the candidate fills it.
                    tracing::info!(doc = %doc_id, page = %page, "conflicting slot is free again; keeping the candidate");
                    self.store.promote_candidate(id)?;
                    result.resolved_conflicts.push((doc_id, page));
                }
            }
        }
        Ok(())
    }

    fn check_completeness(&mut self, result: &mut IntegrityCheckResult) -> anyhow::Result<()> {
        for (doc_id, doc) in self.store.documents() {
            let ordering = self.store.ordering(*doc_id)?;

            let seen = doc.questions();
            let missing: Vec<OriginalQuestionNumber> =
                ordering.question_set().difference(&seen).copied().collect();
            if !missing.is_empty() {
                result.missing_questions.insert(*doc_id, missing);
            }

            let missing_pages: Vec<Page> = self
                .store
                .config()
                .expected_pages(*doc_id)
                .into_iter()
                .filter(|page| !doc.pages.contains_key(page))
                .collect();
            if !missing_pages.is_empty() {
                result.missing_pages.insert(*doc_id, missing_pages);
            }
        }
        Ok(())
    }
}

pub(crate) struct IntegrityFixer<'a> {
    store: &'a mut DataStore,
    prompt: &'a mut dyn IntegrityPrompt,
}

impl<'a> IntegrityFixer<'a> {
    pub(crate) fn new(store: &'a mut DataStore, prompt: &'a mut dyn IntegrityPrompt) -> Self {
        Self { store, prompt }
    }

    pub(crate) fn run(mut self, result: IntegrityCheckResult) -> anyhow::Result<()> {
        // Pages that never showed up are only a warning when all their
        // questions appeared elsewhere; they were probably left blank.
        for (doc_id, pages) in &result.missing_pages {
            if !result.missing_questions.contains_key(doc_id) {
                let pages: Vec<String> = pages.iter().map(|p| p.to_string()).collect();
                tracing::warn!(doc = %doc_id, pages = %pages.join(", "), "pages never seen; probably empty");
            }
        }

        if !result.missing_questions.is_empty() {
            if !self.prompt.allow_missing_questions(&result.missing_questions)? {
                return Err(ReconcileError::MissingQuestions(result.missing_questions).into());
            }
            tracing::warn!("continuing despite missing questions (operator override)");
        }

        for id in result.conflicts {
            self.resolve_conflict(id)?;
        }

        debug_assert!(self.store.candidates().is_empty());
        Ok(())
    }

    fn resolve_conflict(&mut self, id: CandidateId) -> anyhow::Result<()> {
        let decision = {
            let Some(candidate) = self.store.candidates().get(&id) else {
                return Ok(());
            };
            let Some(stored) = self.store.page(candidate.conflicts_with, candidate.page) else {
                return self.store.promote_candidate(id);
            };
            tracing::warn!(
                doc = %candidate.conflicts_with,
                page = %candidate.page,
                first = %stored.pic_path,
                second = %candidate.pic.pic_path,
                "page seen twice with different content"
            );
            self.prompt.select_version(stored, &candidate.pic)?
        };

        match decision {
            KeptVersion::Stored => self.store.remove_candidate(id),
            KeptVersion::Candidate => self.store.promote_candidate(id),
        }
    }
}
