use crate::schemas::ids::{DocumentId, Page, StudentName};
use crate::services::review::DISCARD_MARKER;
use crate::store::DataStore;

/// Everything left for the interactive review after the automatic passes:
/// documents without an identity, identities claimed twice, and pages with
/// doubtful checkbox detections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DataCheckResult {
    /// Ascending document order.
    pub(crate) unnamed_docs: Vec<DocumentId>,
    /// Groups in first-seen order over ascending document ids; each group
    /// keeps its documents in ascending order too.
    pub(crate) duplicate_names: Vec<(StudentName, Vec<DocumentId>)>,
    pub(crate) ambiguous_answers: Vec<(DocumentId, Page)>,
}

impl DataCheckResult {
    pub(crate) fn is_empty(&self) -> bool {
        self.unnamed_docs.is_empty()
            && self.duplicate_names.is_empty()
            && self.ambiguous_answers.is_empty()
    }
}

pub(crate) struct DataChecker<'a> {
    store: &'a mut DataStore,
}

impl<'a> DataChecker<'a> {
    pub(crate) fn new(store: &'a mut DataStore) -> Self {
        Self { store }
    }

    pub(crate) fn run(&mut self) -> DataCheckResult {
        self.prefill_manual_infos();
        self.fill_names_from_roster();

        let mut result = DataCheckResult::default();

        let mut groups: Vec<(StudentName, Vec<DocumentId>)> = Vec::new();
        for (doc_id, doc) in self.store.documents() {
            if doc.name.as_str() == DISCARD_MARKER {
                continue;
            }
            if doc.name.is_empty() {
                result.unnamed_docs.push(*doc_id);
                continue;
            }
            match groups.iter_mut().find(|(name, _)| *name == doc.name) {
                Some((_, ids)) => ids.push(*doc_id),
                None => groups.push((doc.name.clone(), vec![*doc_id])),
            }
        }
        result.duplicate_names =
            groups.into_iter().filter(|(_, ids)| ids.len() > 1).collect();

        for (doc_id, doc) in self.store.documents() {
            for (page, pic) in &doc.pages {
                if pic.needs_review() && !self.store.is_verified(&pic.pic_path) {
                    result.ambiguous_answers.push((*doc_id, *page));
                }
            }
        }

        if result.is_empty() {
            tracing::info!("data consistency verified");
        } else {
            tracing::warn!(
                unnamed = result.unnamed_docs.len(),
                duplicate_names = result.duplicate_names.len(),
                ambiguous_pages = result.ambiguous_answers.len(),
                "consistency issues need review"
            );
        }
        result
    }

    /// Identities entered in earlier sessions are replayed before checking,
    /// so a rerun never re-asks what the operator already answered.
    fn prefill_manual_infos(&mut self) {
        let infos: Vec<_> = self
            .store
            .manual_infos()
            .iter()
            .map(|(doc_id, (name, student_id))| (*doc_id, name.clone(), student_id.clone()))
            .collect();
        for (doc_id, name, student_id) in infos {
            if self.store.document(doc_id).is_none() {
                tracing::warn!(doc = %doc_id, "manual identity recorded for an unknown document");
                continue;
            }
            self.store.set_identity_unjournaled(doc_id, name, student_id);
        }
    }

    /// A page may carry a recognized student id without a readable name;
    /// the roster fills the name in.
    fn fill_names_from_roster(&mut self) {
        let fillable: Vec<(DocumentId, StudentName)> = self
            .store
            .documents()
            .iter()
            .filter(|(_, doc)| doc.name.is_empty() && !doc.student_id.is_empty())
            .filter_map(|(doc_id, doc)| {
                self.store
                    .config()
                    .students_ids
                    .get(&doc.student_id)
                    .map(|name| (*doc_id, name.clone()))
            })
            .collect();
        for (doc_id, name) in fillable {
            tracing::info!(doc = %doc_id, student = %name, "name resolved from the roster id");
            let student_id =
                self.store.document(doc_id).map(|doc| doc.student_id.clone()).unwrap_or_default();
            self.store.set_identity_unjournaled(doc_id, name, student_id);
        }
    }
}
