//! Entity lifecycle, identity map and concern chains through a repository.

use std::sync::Arc;
use unitdb_codec::Value;
use unitdb_core::{CoreError, EntityId, EntityStatus, ErrorKind, RepositoryConfig};
use unitdb_store::{MemoryStore, RecordKey, StoreAdapter};
use unitdb_testkit::prelude::*;

#[tokio::test]
async fn created_entity_is_identity_mapped() {
    init_tracing();
    let repository = memory_repository().await;
    let uow = repository.new_unit_of_work();

    let ulli = new_person(&uow, "Ulli", 40).unwrap();
    assert_eq!(ulli.status(), EntityStatus::New);

    let found = uow.entity::<Person>(ulli.id()).await.unwrap();
    assert!(Arc::ptr_eq(&ulli, &found));
    assert_eq!(uow.resident_count(), 1);
}

#[tokio::test]
async fn loaded_entity_is_identity_mapped() {
    let repository = memory_repository().await;
    let uow = repository.new_unit_of_work();
    let id = new_person(&uow, "Ulli", 40).unwrap().id().clone();
    uow.commit().await.unwrap();

    let uow = repository.new_unit_of_work();
    let first = uow.entity::<Person>(&id).await.unwrap();
    let second = uow.entity::<Person>(&id).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.status(), EntityStatus::Loaded);
}

#[tokio::test]
async fn round_trip_through_a_fresh_unit_of_work() {
    let repository = memory_repository().await;
    let uow = repository.new_unit_of_work();
    let ulli = new_person(&uow, "Ulli", 40).unwrap();
    ulli.set(Person::NICKNAME, "U").unwrap();
    ulli.collection(Person::TAGS)
        .unwrap()
        .add_all(["admin".to_string(), "ops".to_string()])
        .unwrap();
    uow.commit().await.unwrap();
    assert_eq!(ulli.status(), EntityStatus::Submitted);

    let uow = repository.new_unit_of_work();
    let loaded = uow.entity::<Person>(ulli.id()).await.unwrap();
    assert_eq!(loaded.get(Person::NAME).unwrap().as_deref(), Some("Ulli"));
    assert_eq!(loaded.get(Person::NICKNAME).unwrap().as_deref(), Some("U"));
    assert_eq!(loaded.get(Person::AGE).unwrap(), Some(40));
    assert_eq!(
        loaded.collection(Person::TAGS).unwrap().get().unwrap(),
        vec!["admin".to_string(), "ops".to_string()]
    );
}

#[tokio::test]
async fn defaults_are_written_on_insert() {
    let repository = memory_repository().await;
    let uow = repository.new_unit_of_work();
    let bo = uow
        .new_entity::<Person>(|p| p.set(Person::NAME, "Bo"))
        .unwrap();
    assert_eq!(bo.get(Person::AGE).unwrap(), Some(0));
    assert!(!bo.record().unwrap().contains("age"));
    uow.commit().await.unwrap();

    let stored = repository
        .store()
        .get(&RecordKey::new("Person", bo.id().as_str()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.record.get("age"), Some(&Value::Integer(0)));
}

#[tokio::test]
async fn modified_reverts_to_loaded() {
    let repository = memory_repository().await;
    let uow = repository.new_unit_of_work();
    let id = new_person(&uow, "Ulli", 40).unwrap().id().clone();
    uow.commit().await.unwrap();

    let uow = repository.new_unit_of_work();
    let ulli = uow.entity::<Person>(&id).await.unwrap();
    ulli.set(Person::AGE, 41).unwrap();
    assert_eq!(ulli.status(), EntityStatus::Modified);
    ulli.set(Person::AGE, 40).unwrap();
    assert_eq!(ulli.status(), EntityStatus::Loaded);

    // Nothing to write.
    uow.commit().await.unwrap();
}

#[tokio::test]
async fn mandatory_is_checked_on_read_not_on_create() {
    let repository = memory_repository().await;
    let uow = repository.new_unit_of_work();
    let nameless = uow.new_entity::<Person>(|_| Ok(())).unwrap();

    let err = nameless.get(Person::NAME).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let err = nameless.property(Person::NAME).unwrap().unset().unwrap_err();
    assert!(matches!(err, CoreError::ConstraintViolation { .. }));

    let err = uow.commit().await.unwrap_err();
    assert!(matches!(err, CoreError::Configuration { ref property, .. } if property == "name"));
    assert!(uow.is_open());
}

#[tokio::test]
async fn validation_can_be_disabled() {
    let repository = repository_with(
        Arc::new(MemoryStore::new()),
        RepositoryConfig::new().validate_on_commit(false),
        None,
    )
    .await;
    let uow = repository.new_unit_of_work();
    uow.new_entity::<Person>(|_| Ok(())).unwrap();
    uow.commit().await.unwrap();
}

#[tokio::test]
async fn submitted_and_removed_entities_are_immutable() {
    let repository = memory_repository().await;
    let uow = repository.new_unit_of_work();
    let ulli = new_person(&uow, "Ulli", 40).unwrap();
    uow.commit().await.unwrap();

    let err = ulli.set(Person::AGE, 41).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    // Still readable after a commit.
    assert_eq!(ulli.get(Person::AGE).unwrap(), Some(40));

    let uow = repository.new_unit_of_work();
    let loaded = uow.entity::<Person>(ulli.id()).await.unwrap();
    uow.remove(&loaded).unwrap();
    assert_eq!(loaded.status(), EntityStatus::Removed);
    let err = loaded.set(Person::AGE, 41).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert!(uow.find::<Person>(ulli.id()).await.unwrap().is_none());

    uow.commit().await.unwrap();
    let uow = repository.new_unit_of_work();
    assert!(uow.find::<Person>(ulli.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn rollback_makes_entities_unreadable() {
    let repository = memory_repository().await;
    let uow = repository.new_unit_of_work();
    let ulli = new_person(&uow, "Ulli", 40).unwrap();
    uow.rollback().unwrap();

    assert!(!uow.is_open());
    assert!(!ulli.is_readable());
    assert_eq!(ulli.get(Person::NAME).unwrap_err().kind(), ErrorKind::IllegalState);
    assert_eq!(uow.commit().await.unwrap_err().kind(), ErrorKind::IllegalState);
    assert_eq!(repository.store().name(), "memory");

    let uow = repository.new_unit_of_work();
    assert!(uow.find::<Person>(ulli.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn identity_collision_and_not_found() {
    let repository = memory_repository().await;
    let uow = repository.new_unit_of_work();
    uow.create_entity::<Person>("p-1", |p| p.set(Person::NAME, "Ulli"))
        .unwrap();

    let err = uow
        .create_entity::<Person>("p-1", |p| p.set(Person::NAME, "Philipp"))
        .unwrap_err();
    assert!(matches!(err, CoreError::IdentityCollision { .. }));
    assert_eq!(err.kind(), ErrorKind::ModelRuntime);

    let err = uow.entity::<Person>(&EntityId::from("p-2")).await.unwrap_err();
    assert!(matches!(err, CoreError::EntityNotFound { .. }));
}

#[tokio::test]
async fn failed_initializer_leaves_no_entity() {
    let repository = memory_repository().await;
    let uow = repository.new_unit_of_work();
    let err = uow
        .new_entity::<Person>(|p| {
            p.set(Person::NAME, "Ulli")?;
            p.set(Person::AGE, -1)
        })
        .unwrap_err();
    assert!(matches!(err, CoreError::ConstraintViolation { ref constraint, .. } if constraint == "non_negative"));
    assert_eq!(uow.resident_count(), 0);
}

#[tokio::test]
async fn removing_a_foreign_entity_fails() {
    let repository = memory_repository().await;
    let first = repository.new_unit_of_work();
    let second = repository.new_unit_of_work();
    let ulli = new_person(&first, "Ulli", 40).unwrap();

    let err = second.remove(&ulli).unwrap_err();
    assert!(matches!(err, CoreError::ForeignEntity { owner, .. } if owner == first.id()));
}

#[tokio::test]
async fn removing_a_new_entity_forgets_it() {
    let repository = memory_repository().await;
    let uow = repository.new_unit_of_work();
    let ulli = new_person(&uow, "Ulli", 40).unwrap();
    uow.remove(&ulli).unwrap();

    assert_eq!(uow.resident_count(), 0);
    assert!(uow.find::<Person>(ulli.id()).await.unwrap().is_none());
    uow.commit().await.unwrap();
}

#[tokio::test]
async fn notifications_follow_successful_mutations_only() {
    let publisher = Arc::new(RecordingPublisher::new());
    let repository = repository_with(
        Arc::new(MemoryStore::new()),
        RepositoryConfig::default(),
        Some(publisher.clone()),
    )
    .await;
    let uow = repository.new_unit_of_work();
    let ulli = new_person(&uow, "Ulli", 40).unwrap();
    publisher.take();

    ulli.set(Person::AGE, 41).unwrap();
    // Vetoed by the constraint: no event.
    assert!(ulli.set(Person::AGE, -5).is_err());
    // Unchanged value: no event.
    ulli.set(Person::AGE, 41).unwrap();
    // Vetoed element: no event.
    assert!(ulli
        .collection(Person::TAGS)
        .unwrap()
        .add(String::new())
        .is_err());
    ulli.collection(Person::TAGS)
        .unwrap()
        .add("ops".to_string())
        .unwrap();

    let events = publisher.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].property, "age");
    assert_eq!(events[0].entity_id, *ulli.id());
    assert_eq!(events[0].old, Some(Value::Integer(40)));
    assert_eq!(events[0].new, Some(Value::Integer(41)));
    assert_eq!(events[1].property, "tags");
    assert_eq!(events[1].old, None);
}

#[tokio::test]
async fn associations_are_resolved_through_the_unit_of_work() {
    let repository = memory_repository().await;
    let uow = repository.new_unit_of_work();
    let acme = uow
        .new_entity::<Company>(|c| c.set(Company::NAME, "Acme"))
        .unwrap();
    let globex = uow
        .new_entity::<Company>(|c| c.set(Company::NAME, "Globex"))
        .unwrap();
    let ulli = new_person(&uow, "Ulli", 40).unwrap();
    let employee = uow
        .new_entity::<Employee>(|e| {
            e.set(Employee::NAME, "Ulli")?;
            e.association(Employee::EMPLOYER)?.set(&acme)?;
            e.many_association(Employee::CLIENTS)?.add(&globex)?;
            Ok(())
        })
        .unwrap();

    let err = employee
        .association(Employee::EMPLOYER)
        .unwrap()
        .set(&ulli)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelRuntime);
    uow.commit().await.unwrap();

    let uow = repository.new_unit_of_work();
    let employee = uow.entity::<Employee>(employee.id()).await.unwrap();
    let employer_id = employee
        .association(Employee::EMPLOYER)
        .unwrap()
        .get()
        .unwrap()
        .unwrap();
    let employer = uow.entity::<Company>(&employer_id).await.unwrap();
    assert_eq!(employer.get(Company::NAME).unwrap().as_deref(), Some("Acme"));

    let clients = employee.many_association(Employee::CLIENTS).unwrap();
    assert_eq!(clients.ids().unwrap(), vec![globex.id().clone()]);
    assert!(clients.contains(globex.id()).unwrap());
}
