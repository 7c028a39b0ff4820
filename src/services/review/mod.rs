use std::collections::BTreeSet;

use crate::schemas::document::PicData;
use crate::schemas::ids::{DocumentId, Page};
use crate::services::consistency::DataCheckResult;
use crate::store::DataStore;

pub(crate) mod answers;
pub(crate) mod console;
pub(crate) mod names;

/// A document renamed to this marker is queued for discarding; the rename
/// stays revocable (via Back) until the whole review loop finishes.
pub(crate) const DISCARD_MARKER: &str = "/";

/// Where the cursor moves after one review item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    Next,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReviewItem {
    Name(DocumentId),
    Answers(DocumentId, Page),
}

pub(crate) trait ReviewNames {
    fn review_name(&mut self, store: &mut DataStore, doc_id: DocumentId)
        -> anyhow::Result<Action>;
}

pub(crate) trait ReviewAnswers {
    fn review_answer(
        &mut self,
        store: &mut DataStore,
        doc_id: DocumentId,
        page: Page,
    ) -> anyhow::Result<Action>;
}

/// Advisory display of a page image while the operator answers a prompt.
/// Failures here never affect review correctness.
pub(crate) trait PageDisplay {
    fn show_page(&mut self, pic: &PicData) -> anyhow::Result<()>;
    fn close(&mut self);
}

/// Drives the single flat work list over all items needing a human: name
/// reviews first (unnamed, then duplicate groups in discovery order),
/// then answer reviews. The cursor only moves forward and backward, so
/// the operator can always navigate back to revise a decision.
pub(crate) struct ReviewEngine<'a> {
    store: &'a mut DataStore,
    names: &'a mut dyn ReviewNames,
    answers: &'a mut dyn ReviewAnswers,
}

impl<'a> ReviewEngine<'a> {
    pub(crate) fn new(
        store: &'a mut DataStore,
        names: &'a mut dyn ReviewNames,
        answers: &'a mut dyn ReviewAnswers,
    ) -> Self {
        Self { store, names, answers }
    }

    pub(crate) fn run(&mut self, check: DataCheckResult) -> anyhow::Result<()> {
        let mut items = build_work_list(&check);
        let mut position = 0usize;

        // The bound is re-evaluated every iteration: resolving a name may
        // append a fresh item for a newly colliding document.
        while position < items.len() {
            let action = match items[position] {
                ReviewItem::Name(doc_id) => {
                    let action = self.names.review_name(self.store, doc_id)?;
                    if action == Action::Next {
                        self.queue_new_collisions(&mut items, position, doc_id);
                    }
                    action
                }
                ReviewItem::Answers(doc_id, page) => {
                    self.answers.review_answer(self.store, doc_id, page)?
                }
            };
            match action {
                Action::Next => position += 1,
                Action::Back => position = position.saturating_sub(1),
            }
        }

        self.finalize_discards(&items)
    }

    /// If the identity just committed now collides with another stored
    /// document, that document gets appended for review. Items already
    /// ahead of the cursor are not queued twice.
    fn queue_new_collisions(
        &self,
        items: &mut Vec<ReviewItem>,
        position: usize,
        doc_id: DocumentId,
    ) {
        let Some(name) = self.store.document(doc_id).map(|doc| doc.name.clone()) else {
            return;
        };
        if name.is_empty() || name.as_str() == DISCARD_MARKER {
            return;
        }

        let colliding: Vec<DocumentId> = self
            .store
            .documents()
            .iter()
            .filter(|(other, doc)| **other != doc_id && doc.name == name)
            .map(|(other, _)| *other)
            .collect();
        for other in colliding {
            let pending = items[position + 1..].contains(&ReviewItem::Name(other));
            if !pending {
                tracing::info!(doc = %other, name = %name, "identity now collides; queuing for review");
                items.push(ReviewItem::Name(other));
            }
        }
    }

    /// Discards only commit once the loop is over: pages go to the
    /// skipped set so later scans ignore them, files are removed and the
    /// document leaves the store. Other documents stay untouched.
    fn finalize_discards(&mut self, items: &[ReviewItem]) -> anyhow::Result<()> {
        let reviewed: BTreeSet<DocumentId> = items
            .iter()
            .map(|item| match item {
                ReviewItem::Name(doc_id) => *doc_id,
                ReviewItem::Answers(doc_id, _) => *doc_id,
            })
            .collect();

        for doc_id in reviewed {
            let discard = self
                .store
                .document(doc_id)
                .is_some_and(|doc| doc.name.as_str() == DISCARD_MARKER);
            if !discard {
                continue;
            }
            if let Some(doc) = self.store.remove_document(doc_id)? {
                for pic in doc.pages.values() {
                    self.store.store_skipped_pic(&pic.pic_path)?;
                }
                tracing::info!(doc = %doc_id, pages = doc.pages.len(), "document discarded");
            }
        }
        Ok(())
    }
}

fn build_work_list(check: &DataCheckResult) -> Vec<ReviewItem> {
    let mut items = Vec::new();
    let mut queued = BTreeSet::new();

    for doc_id in &check.unnamed_docs {
        if queued.insert(*doc_id) {
            items.push(ReviewItem::Name(*doc_id));
        }
    }
    for (_, group) in &check.duplicate_names {
        for doc_id in group {
            if queued.insert(*doc_id) {
                items.push(ReviewItem::Name(*doc_id));
            }
        }
    }
    for (doc_id, page) in &check.ambiguous_answers {
        items.push(ReviewItem::Answers(*doc_id, *page));
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::ids::{StudentId, StudentName};
    use crate::test_support;

    fn doc(n: u32) -> DocumentId {
        DocumentId(n)
    }

    /// Scripted reviewers that record the cursor trace and replay a fixed
    /// list of actions; name actions may also commit an identity first.
    #[derive(Default)]
    struct ScriptedReviewer {
        actions: Vec<(Option<StudentName>, Action)>,
        next: usize,
        visited: Vec<ReviewItem>,
    }

    impl ScriptedReviewer {
        fn new(actions: Vec<(Option<StudentName>, Action)>) -> Self {
            Self { actions, next: 0, visited: Vec::new() }
        }

        fn step(&mut self) -> (Option<StudentName>, Action) {
            let step = self.actions.get(self.next).cloned().expect("script exhausted");
            self.next += 1;
            step
        }
    }

    impl ReviewNames for ScriptedReviewer {
        fn review_name(
            &mut self,
            store: &mut DataStore,
            doc_id: DocumentId,
        ) -> anyhow::Result<Action> {
            self.visited.push(ReviewItem::Name(doc_id));
            let (name, action) = self.step();
            if let Some(name) = name {
                store.set_identity(doc_id, name, StudentId::default())?;
            }
            Ok(action)
        }
    }

    impl ReviewAnswers for ScriptedReviewer {
        fn review_answer(
            &mut self,
            store: &mut DataStore,
            doc_id: DocumentId,
            page: Page,
        ) -> anyhow::Result<Action> {
            self.visited.push(ReviewItem::Answers(doc_id, page));
            let (name, action) = self.step();
            if let Some(name) = name {
                store.set_identity(doc_id, name, StudentId::default())?;
            }
            Ok(action)
        }
    }

    fn config_for(docs: &[u32]) -> crate::schemas::ordering::ExamConfig {
        test_support::exam_config(
            docs.iter()
                .map(|n| (*n, test_support::ordering(&[1], &[(1, &[1, 2])])))
                .collect(),
        )
    }

    #[test]
    fn back_and_next_walk_the_cursor_as_expected() {
        let mut fixture = test_support::store_with(config_for(&[1, 2, 3]));
        let store = &mut fixture.store;
        for n in [1, 2, 3] {
            store.register_page(test_support::pic(n, 1)).expect("register");
        }

        let check = DataCheckResult {
            unnamed_docs: vec![doc(1), doc(2), doc(3)],
            ..Default::default()
        };

        // NEXT NEXT BACK NEXT NEXT visits positions 0 1 2 1 2 and exits.
        let mut names = ScriptedReviewer::new(vec![
            (Some("A".into()), Action::Next),
            (Some("B".into()), Action::Next),
            (None, Action::Back),
            (Some("B2".into()), Action::Next),
            (Some("C".into()), Action::Next),
        ]);
        let mut answers = ScriptedReviewer::default();
        ReviewEngine::new(store, &mut names, &mut answers)
            .run(check)
            .expect("run");

        assert_eq!(
            names.visited,
            vec![
                ReviewItem::Name(doc(1)),
                ReviewItem::Name(doc(2)),
                ReviewItem::Name(doc(3)),
                ReviewItem::Name(doc(2)),
                ReviewItem::Name(doc(3)),
            ]
        );
    }

    #[test]
    fn back_at_the_first_item_stays_at_zero() {
        let mut fixture = test_support::store_with(config_for(&[1]));
        let store = &mut fixture.store;
        store.register_page(test_support::pic(1, 1)).expect("register");

        let check =
            DataCheckResult { unnamed_docs: vec![doc(1)], ..Default::default() };
        let mut names = ScriptedReviewer::new(vec![
            (None, Action::Back),
            (Some("A".into()), Action::Next),
        ]);
        let mut answers = ScriptedReviewer::default();
        ReviewEngine::new(store, &mut names, &mut answers).run(check).expect("run");

        assert_eq!(
            names.visited,
            vec![ReviewItem::Name(doc(1)), ReviewItem::Name(doc(1))]
        );
    }

    #[test]
    fn a_new_collision_appends_an_item_mid_loop() {
        let mut fixture = test_support::store_with(config_for(&[1, 2]));
        let store = &mut fixture.store;
        store.register_page(test_support::pic(1, 1)).expect("register");
        store.register_page(test_support::pic(2, 1)).expect("register");
        store.set_identity_unjournaled(doc(2), "Doe".into(), StudentId::default());

        // Doc 1 is unnamed; naming it "Doe" collides with doc 2, which
        // must then be visited even though it was not queued initially.
        let check =
            DataCheckResult { unnamed_docs: vec![doc(1)], ..Default::default() };
        let mut names = ScriptedReviewer::new(vec![
            (Some("Doe".into()), Action::Next),
            (Some("Jane Doe".into()), Action::Next),
        ]);
        let mut answers = ScriptedReviewer::default();
        ReviewEngine::new(store, &mut names, &mut answers).run(check).expect("run");

        assert_eq!(
            names.visited,
            vec![ReviewItem::Name(doc(1)), ReviewItem::Name(doc(2))]
        );
    }

    #[test]
    fn name_items_precede_answer_items() {
        let check = DataCheckResult {
            unnamed_docs: vec![doc(2)],
            duplicate_names: vec![("Doe".into(), vec![doc(1), doc(3)])],
            ambiguous_answers: vec![(doc(1), Page(1))],
        };
        let items = build_work_list(&check);
        assert_eq!(
            items,
            vec![
                ReviewItem::Name(doc(2)),
                ReviewItem::Name(doc(1)),
                ReviewItem::Name(doc(3)),
                ReviewItem::Answers(doc(1), Page(1)),
            ]
        );
    }

    #[test]
    fn discards_commit_only_at_finalization() {
        let mut fixture = test_support::store_with(config_for(&[1, 2]));
        let store = &mut fixture.store;
        let pic_path = test_support::pic(1, 1).pic_path.clone();
        store.register_page(test_support::pic(1, 1)).expect("register");
        store.register_page(test_support::pic(2, 1)).expect("register");
        let scandata = store.paths().scandata("1");

        let check = DataCheckResult {
            unnamed_docs: vec![doc(1), doc(2)],
            ..Default::default()
        };
        let mut names = ScriptedReviewer::new(vec![
            (Some(DISCARD_MARKER.into()), Action::Next),
            (Some("Kept".into()), Action::Next),
        ]);
        let mut answers = ScriptedReviewer::default();
        ReviewEngine::new(store, &mut names, &mut answers).run(check).expect("run");

        assert!(store.document(doc(1)).is_none());
        assert!(store.is_skipped(&pic_path));
        assert!(!scandata.exists());
        // The other document is untouched.
        assert_eq!(
            store.document(doc(2)).expect("doc 2").name,
            StudentName::from("Kept")
        );
    }
}
