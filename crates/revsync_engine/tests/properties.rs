//! Property tests for change tracking and flushing.

use proptest::prelude::*;
use revsync_engine::{BulkSynchronizer, LifecycleState, MockStore, SyncError, UnitOfWork};
use revsync_protocol::{Document, EntityId, OperationKind, Revision};

/// How an entity is prepared before a flush.
#[derive(Debug, Clone, Copy)]
enum Prep {
    New,
    Clean,
    Dirty,
    Removed,
}

fn prep_strategy() -> impl Strategy<Value = Prep> {
    prop_oneof![
        Just(Prep::New),
        Just(Prep::Clean),
        Just(Prep::Dirty),
        Just(Prep::Removed),
    ]
}

fn doc(n: usize) -> Document {
    Document::from_entity(&serde_json::json!({ "n": n })).unwrap()
}

fn prepare(preps: &[Prep]) -> (UnitOfWork, Vec<EntityId>) {
    let mut uow = UnitOfWork::new();
    let mut ids = Vec::new();
    for (i, prep) in preps.iter().enumerate() {
        let id = EntityId::new();
        match prep {
            Prep::New => {
                uow.register(id, doc(i), None).unwrap();
            }
            Prep::Clean => {
                uow.register(id, doc(i), Some(Revision::new("1"))).unwrap();
            }
            Prep::Dirty => {
                uow.register(id, doc(i), Some(Revision::new("1"))).unwrap();
                uow.update(id, doc(i + 1000)).unwrap();
            }
            Prep::Removed => {
                uow.register(id, doc(i), Some(Revision::new("1"))).unwrap();
                uow.mark_removed(id).unwrap();
            }
        }
        ids.push(id);
    }
    (uow, ids)
}

fn snapshot(uow: &UnitOfWork, ids: &[EntityId]) -> Vec<(LifecycleState, Option<Revision>)> {
    ids.iter()
        .map(|id| (uow.state(*id), uow.revision(*id).cloned()))
        .collect()
}

proptest! {
    #[test]
    fn change_set_follows_registration_order(preps in prop::collection::vec(prep_strategy(), 0..24)) {
        let (uow, ids) = prepare(&preps);
        let change_set = uow.compute_change_set();

        let expected: Vec<(EntityId, OperationKind)> = ids
            .iter()
            .zip(&preps)
            .filter_map(|(id, prep)| match prep {
                Prep::New => Some((*id, OperationKind::Create)),
                Prep::Dirty => Some((*id, OperationKind::Update)),
                Prep::Removed => Some((*id, OperationKind::Delete)),
                Prep::Clean => None,
            })
            .collect();
        let actual: Vec<(EntityId, OperationKind)> =
            change_set.iter().map(|e| (e.entity_id, e.kind)).collect();
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(change_set.len(), uow.pending_count());
    }

    #[test]
    fn failed_flush_changes_nothing(preps in prop::collection::vec(prep_strategy(), 1..16)) {
        let (mut uow, ids) = prepare(&preps);
        let before = snapshot(&uow, &ids);

        let store = MockStore::new();
        store.push_failure(SyncError::transport_retryable("connection reset"));
        let result = BulkSynchronizer::new(false, None).flush(&mut uow, &store);

        if uow.pending_count() > 0 {
            prop_assert!(result.is_err());
            prop_assert_eq!(store.bulk_request_count(), 1);
        } else {
            prop_assert!(result.is_ok());
            prop_assert_eq!(store.bulk_request_count(), 0);
        }
        prop_assert_eq!(snapshot(&uow, &ids), before);
    }

    #[test]
    fn accepted_flush_settles_everything(preps in prop::collection::vec(prep_strategy(), 1..16)) {
        let (mut uow, ids) = prepare(&preps);
        let store = MockStore::new();
        let outcome = BulkSynchronizer::new(false, None).flush(&mut uow, &store).unwrap();

        prop_assert!(outcome.report.is_clean());
        prop_assert_eq!(uow.pending_count(), 0);
        prop_assert!(store.bulk_request_count() <= 1);

        for (id, prep) in ids.iter().zip(&preps) {
            match prep {
                Prep::Removed => prop_assert_eq!(uow.state(*id), LifecycleState::Detached),
                _ => {
                    prop_assert_eq!(uow.state(*id), LifecycleState::Managed);
                    prop_assert!(uow.revision(*id).is_some());
                }
            }
        }
    }

    #[test]
    fn oversized_flush_is_never_split(count in 1usize..40, limit in 1usize..20) {
        let preps = vec![Prep::New; count];
        let (mut uow, ids) = prepare(&preps);
        let store = MockStore::new();
        let result = BulkSynchronizer::new(false, Some(limit)).flush(&mut uow, &store);

        if count > limit {
            let is_batch_error = matches!(result, Err(SyncError::BatchTooLarge { .. }));
            prop_assert!(is_batch_error);
            prop_assert_eq!(store.bulk_request_count(), 0);
            prop_assert!(ids.iter().all(|id| uow.state(*id) == LifecycleState::New));
        } else {
            prop_assert!(result.is_ok());
            prop_assert_eq!(store.bulk_request_count(), 1);
            prop_assert_eq!(store.bulk_requests()[0].len(), count);
        }
    }
}
