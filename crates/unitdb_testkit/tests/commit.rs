//! Commit ordering, atomicity and conflicts.

use proptest::prelude::*;
use std::sync::Arc;
use unitdb_core::{
    CoreError, EntityId, EntityRef, EntityStatus, IdentityStrategy, RepositoryConfig, UnitOfWork,
};
use unitdb_store::{
    ConflictPolicy, MemoryStore, NativeQuery, Precondition, RecordKey, StoreAdapter, StoreError,
    StoredRecord,
};
use unitdb_testkit::prelude::*;

async fn dump(store: &dyn StoreAdapter) -> Vec<StoredRecord> {
    let mut cursor = store.cursor(&NativeQuery::all("Person")).await.unwrap();
    let mut records = Vec::new();
    while let Some(record) = cursor.next().await.unwrap() {
        records.push(record);
    }
    records
}

async fn all_people(uow: &UnitOfWork) -> Vec<EntityRef> {
    uow.query::<Person>()
        .unwrap()
        .execute()
        .await
        .unwrap()
        .collect()
        .await
        .unwrap()
}

#[tokio::test]
async fn writes_are_staged_delete_update_insert() {
    init_tracing();
    let store = RecordingStore::new(MemoryStore::new());
    let repository = repository(store.clone()).await;

    let uow = repository.new_unit_of_work();
    for (id, name) in [("a", "Ana"), ("b", "Bo")] {
        uow.create_entity::<Person>(id, |p| p.set(Person::NAME, name))
            .unwrap();
    }
    uow.commit().await.unwrap();
    store.clear();

    let uow = repository.new_unit_of_work();
    let ana = uow.entity::<Person>(&EntityId::from("a")).await.unwrap();
    let bo = uow.entity::<Person>(&EntityId::from("b")).await.unwrap();
    // Created first, so insertion order cannot explain the result.
    uow.create_entity::<Person>("c", |p| p.set(Person::NAME, "Chen"))
        .unwrap();
    ana.set(Person::AGE, 30).unwrap();
    uow.remove(&bo).unwrap();
    let (ana_version, bo_version) = (ana.version().unwrap(), bo.version().unwrap());
    store.clear();

    uow.commit().await.unwrap();

    assert_eq!(
        store.ops(),
        vec![
            StoreOp::Begin,
            StoreOp::Delete(RecordKey::new("Person", "b"), Precondition::Version(bo_version)),
            StoreOp::Put(RecordKey::new("Person", "a"), Precondition::Version(ana_version)),
            StoreOp::Put(RecordKey::new("Person", "c"), Precondition::Absent),
            StoreOp::Commit,
        ]
    );
}

#[tokio::test]
async fn removed_identity_can_be_created_again() {
    let store = RecordingStore::new(MemoryStore::new());
    let repository = repository(store.clone()).await;
    let uow = repository.new_unit_of_work();
    uow.create_entity::<Person>("p-1", |p| p.set(Person::NAME, "Ulli"))
        .unwrap();
    uow.commit().await.unwrap();

    let uow = repository.new_unit_of_work();
    let old = uow.entity::<Person>(&EntityId::from("p-1")).await.unwrap();
    let version = old.version().unwrap();
    uow.remove(&old).unwrap();
    let new = uow
        .create_entity::<Person>("p-1", |p| p.set(Person::NAME, "Philipp"))
        .unwrap();
    assert_eq!(new.status(), EntityStatus::New);
    assert!(Arc::ptr_eq(
        &uow.find::<Person>(&EntityId::from("p-1")).await.unwrap().unwrap(),
        &new
    ));
    // Only a removed identity is free again.
    assert!(uow
        .create_entity::<Person>("p-1", |p| p.set(Person::NAME, "Chen"))
        .is_err());
    store.clear();

    uow.commit().await.unwrap();
    let key = RecordKey::new("Person", "p-1");
    assert_eq!(
        store.ops(),
        vec![
            StoreOp::Begin,
            StoreOp::Delete(key.clone(), Precondition::Version(version)),
            StoreOp::Put(key, Precondition::Absent),
            StoreOp::Commit,
        ]
    );
    assert_eq!(old.status(), EntityStatus::Submitted);
    assert_eq!(new.status(), EntityStatus::Submitted);

    let check = repository.new_unit_of_work();
    let stored = check.entity::<Person>(&EntityId::from("p-1")).await.unwrap();
    assert_eq!(stored.get(Person::NAME).unwrap().as_deref(), Some("Philipp"));
}

#[tokio::test]
async fn removing_the_replacement_restores_the_removal() {
    let store = Arc::new(MemoryStore::new());
    let repository = repository_with(store.clone(), RepositoryConfig::default(), None).await;
    let uow = repository.new_unit_of_work();
    uow.create_entity::<Person>("p-1", |p| p.set(Person::NAME, "Ulli"))
        .unwrap();
    uow.commit().await.unwrap();

    let uow = repository.new_unit_of_work();
    let old = uow.entity::<Person>(&EntityId::from("p-1")).await.unwrap();
    uow.remove(&old).unwrap();
    let new = uow
        .create_entity::<Person>("p-1", |p| p.set(Person::NAME, "Philipp"))
        .unwrap();
    uow.remove(&new).unwrap();

    assert!(uow.find::<Person>(&EntityId::from("p-1")).await.unwrap().is_none());
    uow.commit().await.unwrap();
    assert_eq!(store.record_count(), 0);
}

#[tokio::test]
async fn empty_commit_touches_no_store() {
    let store = RecordingStore::new(MemoryStore::new());
    let repository = repository(store.clone()).await;
    let uow = repository.new_unit_of_work();
    uow.commit().await.unwrap();
    assert!(store.ops().is_empty());
    assert!(!uow.is_open());
}

#[tokio::test]
async fn optimistic_conflict_fails_the_second_commit() {
    let repository = repository(MemoryStore::with_policy(ConflictPolicy::Optimistic)).await;
    let uow = repository.new_unit_of_work();
    let id = new_person(&uow, "Ulli", 40).unwrap().id().clone();
    uow.commit().await.unwrap();

    let first = repository.new_unit_of_work();
    let second = repository.new_unit_of_work();
    first
        .entity::<Person>(&id)
        .await
        .unwrap()
        .set(Person::AGE, 41)
        .unwrap();
    let theirs = second.entity::<Person>(&id).await.unwrap();
    theirs.set(Person::AGE, 42).unwrap();

    first.commit().await.unwrap();
    let err = second.commit().await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Commit {
            source: StoreError::Conflict { .. },
            ..
        }
    ));

    // The loser is untouched and may roll back.
    assert!(second.is_open());
    assert_eq!(theirs.status(), EntityStatus::Modified);
    second.rollback().unwrap();

    let check = repository.new_unit_of_work();
    let stored = check.entity::<Person>(&id).await.unwrap();
    assert_eq!(stored.get(Person::AGE).unwrap(), Some(41));
}

#[tokio::test]
async fn last_write_wins_by_default() {
    let repository = memory_repository().await;
    let uow = repository.new_unit_of_work();
    let id = new_person(&uow, "Ulli", 40).unwrap().id().clone();
    uow.commit().await.unwrap();

    let first = repository.new_unit_of_work();
    let second = repository.new_unit_of_work();
    first.entity::<Person>(&id).await.unwrap().set(Person::AGE, 41).unwrap();
    second.entity::<Person>(&id).await.unwrap().set(Person::AGE, 42).unwrap();
    first.commit().await.unwrap();
    second.commit().await.unwrap();

    let check = repository.new_unit_of_work();
    assert_eq!(
        check.entity::<Person>(&id).await.unwrap().get(Person::AGE).unwrap(),
        Some(42)
    );
}

#[tokio::test]
async fn insert_of_an_existing_identity_conflicts() {
    let repository = repository(MemoryStore::with_policy(ConflictPolicy::Optimistic)).await;
    let uow = repository.new_unit_of_work();
    uow.create_entity::<Person>("p-1", |p| p.set(Person::NAME, "Ulli"))
        .unwrap();
    uow.commit().await.unwrap();

    let uow = repository.new_unit_of_work();
    uow.create_entity::<Person>("p-1", |p| p.set(Person::NAME, "Philipp"))
        .unwrap();
    let err = uow.commit().await.unwrap_err();
    assert!(matches!(err, CoreError::Commit { .. }));
}

#[tokio::test]
async fn sequential_identities_are_minted() {
    let repository = repository_with(
        Arc::new(MemoryStore::new()),
        RepositoryConfig::new().identity(IdentityStrategy::Sequential {
            prefix: "person-".into(),
        }),
        None,
    )
    .await;
    let uow = repository.new_unit_of_work();
    let a = new_person(&uow, "Ana", 1).unwrap();
    let b = new_person(&uow, "Bo", 2).unwrap();
    assert_eq!(a.id().as_str(), "person-1");
    assert_eq!(b.id().as_str(), "person-2");
}

#[tokio::test]
async fn sequential_identities_continue_after_reopen() {
    let log = TestLog::new();
    let sequential = || {
        RepositoryConfig::new().identity(IdentityStrategy::Sequential {
            prefix: "p-".into(),
        })
    };
    {
        let repository = repository_with(Arc::new(log.open().unwrap()), sequential(), None).await;
        let uow = repository.new_unit_of_work();
        assert_eq!(new_person(&uow, "Ulli", 40).unwrap().id().as_str(), "p-1");
        uow.commit().await.unwrap();
    }

    let repository = repository_with(Arc::new(log.open().unwrap()), sequential(), None).await;
    let uow = repository.new_unit_of_work();
    assert_eq!(new_person(&uow, "Philipp", 12).unwrap().id().as_str(), "p-2");
    uow.commit().await.unwrap();

    let check = repository.new_unit_of_work();
    let ulli = check.entity::<Person>(&EntityId::from("p-1")).await.unwrap();
    assert_eq!(ulli.get(Person::NAME).unwrap().as_deref(), Some("Ulli"));
    assert_eq!(all_people(&check).await.len(), 2);
}

#[tokio::test]
async fn insert_never_overwrites_under_last_write_wins() {
    let store = Arc::new(MemoryStore::new());
    let repository = repository_with(store.clone(), RepositoryConfig::default(), None).await;
    let uow = repository.new_unit_of_work();
    uow.create_entity::<Person>("p-1", |p| p.set(Person::NAME, "Ulli"))
        .unwrap();
    uow.commit().await.unwrap();

    let uow = repository.new_unit_of_work();
    uow.create_entity::<Person>("p-1", |p| p.set(Person::NAME, "Philipp"))
        .unwrap();
    let err = uow.commit().await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Commit {
            source: StoreError::Conflict {
                expected: Precondition::Absent,
                current: Some(_),
                ..
            },
            ..
        }
    ));
    assert!(uow.is_open());

    let check = repository.new_unit_of_work();
    let stored = check.entity::<Person>(&EntityId::from("p-1")).await.unwrap();
    assert_eq!(stored.get(Person::NAME).unwrap().as_deref(), Some("Ulli"));
    assert_eq!(store.record_count(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn commit_is_all_or_nothing(
        seeds in people_strategy(5),
        edits in prop::collection::vec(edit_strategy(), 5),
        inserts in prop::collection::vec(person_strategy(), 1..3),
        fail in any::<prop::sample::Index>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let inner: Arc<dyn StoreAdapter> =
                Arc::new(MemoryStore::with_policy(ConflictPolicy::Optimistic));
            let store = FailingStore::shared(Arc::clone(&inner));
            let repository = repository_with(
                Arc::new(store.clone()),
                RepositoryConfig::default(),
                None,
            )
            .await;

            let uow = repository.new_unit_of_work();
            for row in &seeds {
                new_person(&uow, &row.name, row.age).unwrap();
            }
            uow.commit().await.unwrap();

            let uow = repository.new_unit_of_work();
            let loaded = all_people(&uow).await;
            for (entity, edit) in loaded.iter().zip(&edits) {
                match edit {
                    Edit::Keep => {}
                    Edit::SetAge(age) => entity.set(Person::AGE, *age).unwrap(),
                    Edit::Remove => uow.remove(entity).unwrap(),
                }
            }
            for row in &inserts {
                let person = new_person(&uow, &row.name, row.age).unwrap();
                if let Some(nickname) = &row.nickname {
                    person.set(Person::NICKNAME, nickname.as_str()).unwrap();
                }
            }

            let changed = loaded
                .iter()
                .filter(|e| matches!(e.status(), EntityStatus::Modified | EntityStatus::Removed))
                .count();
            // begin, one call per write, commit
            let calls = 1 + changed + inserts.len() + 1;
            let before = dump(inner.as_ref()).await;
            let statuses: Vec<_> = loaded.iter().map(|e| e.status()).collect();

            store.fail_at(fail.index(calls));
            let err = uow.commit().await.unwrap_err();
            prop_assert!(matches!(err, CoreError::Commit { .. }), "unexpected error: {}", err);

            prop_assert_eq!(dump(inner.as_ref()).await, before);
            prop_assert!(uow.is_open());
            let after: Vec<_> = loaded.iter().map(|e| e.status()).collect();
            prop_assert_eq!(after, statuses);

            store.heal();
            uow.commit().await.unwrap();
            prop_assert_eq!(store.calls(), calls);

            let removed = edits
                .iter()
                .take(loaded.len())
                .filter(|e| matches!(e, Edit::Remove))
                .count();
            let expected = seeds.len() - removed + inserts.len();
            prop_assert_eq!(dump(inner.as_ref()).await.len(), expected);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
