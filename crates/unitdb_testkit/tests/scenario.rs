//! A thousand people through each store, end to end.

use std::sync::Arc;
use unitdb_core::{EntityRepository, Expression};
use unitdb_store::{MemoryStore, StoreAdapter};
use unitdb_testkit::prelude::*;

const PEOPLE: i64 = 1000;

async fn populate(repository: &EntityRepository) {
    let uow = repository.new_unit_of_work();
    for i in 0..PEOPLE {
        new_person(&uow, &format!("p{i}"), i).unwrap();
    }
    uow.commit().await.unwrap();
}

async fn check(repository: &EntityRepository) {
    let uow = repository.new_unit_of_work();
    let query = uow.query::<Person>().unwrap();

    let mut results = query.execute().await.unwrap();
    assert_eq!(results.size().await.unwrap(), PEOPLE as usize);

    let people = query.execute().await.unwrap().collect().await.unwrap();
    assert_eq!(people.len(), PEOPLE as usize);
    for person in &people {
        let age = person.get(Person::AGE).unwrap().unwrap();
        assert!((0..PEOPLE).contains(&age));
        let name = person.get(Person::NAME).unwrap().unwrap();
        assert_eq!(name, format!("p{age}"));
    }

    let mut adults = uow.query::<Person>().unwrap();
    adults.filter(Expression::ge(Person::AGE, 18));
    assert_eq!(adults.count().await.unwrap(), PEOPLE as usize - 18);
}

#[tokio::test]
async fn memory_store_scenario() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let repository = repository_with(store.clone(), Default::default(), None).await;
    populate(&repository).await;
    assert_eq!(store.record_count(), PEOPLE as usize);
    check(&repository).await;
}

#[tokio::test]
async fn log_store_scenario_survives_reopen() {
    init_tracing();
    let log = TestLog::new();
    {
        let repository = repository(log.open().unwrap()).await;
        populate(&repository).await;
        check(&repository).await;
        assert_eq!(repository.store().name(), "log");
    }

    let store = log.open().unwrap();
    assert_eq!(store.record_count(), PEOPLE as usize);
    let repository = repository(store).await;
    check(&repository).await;

    // Changes after recovery land in the same file.
    let uow = repository.new_unit_of_work();
    let mut query = uow.query::<Person>().unwrap();
    query.filter(Expression::lt(Person::AGE, 10));
    for person in query.execute().await.unwrap().collect().await.unwrap() {
        uow.remove(&person).unwrap();
    }
    uow.commit().await.unwrap();
    drop(repository);

    let store = log.open().unwrap();
    assert_eq!(store.record_count(), PEOPLE as usize - 10);
}
