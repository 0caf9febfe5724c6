//! Closing a unit of work while it is suspended in a store call.

use std::sync::Arc;
use unitdb_core::{CoreError, ErrorKind};
use unitdb_store::MemoryStore;
use unitdb_testkit::prelude::*;

#[tokio::test]
async fn close_during_iteration_cancels_the_cursor() {
    init_tracing();
    let inner = Arc::new(MemoryStore::new());
    let store = SuspendingStore::shared(inner.clone());
    let repository = repository(store.clone()).await;

    let uow = repository.new_unit_of_work();
    for name in ["Ana", "Bo", "Chen", "Philipp", "Ulli"] {
        new_person(&uow, name, 30).unwrap();
    }
    uow.commit().await.unwrap();

    let uow = repository.new_unit_of_work();
    let handle = uow.close_handle();
    store.stall_at(StallPoint::CursorNext(2));

    let query = uow.query::<Person>().unwrap();
    let mut results = query.execute().await.unwrap();
    let first = results.next().await.unwrap().unwrap();
    results.next().await.unwrap().unwrap();

    let (third, ()) = futures::join!(results.next(), async {
        store.stalled().await;
        handle.close();
    });
    assert!(matches!(third, Err(CoreError::Cancelled)));
    assert!(handle.is_closed());
    assert!(!uow.is_open());
    assert_eq!(
        first.get(Person::NAME).unwrap_err().kind(),
        ErrorKind::IllegalState
    );
    assert_eq!(inner.record_count(), 5);
}

#[tokio::test]
async fn close_during_staging_cancels_the_commit() {
    let inner = Arc::new(MemoryStore::new());
    let store = SuspendingStore::shared(inner.clone());
    let repository = repository(store.clone()).await;

    let uow = repository.new_unit_of_work();
    new_person(&uow, "Ulli", 40).unwrap();
    uow.commit().await.unwrap();
    assert_eq!(inner.record_count(), 1);

    let uow = repository.new_unit_of_work();
    let handle = uow.close_handle();
    let philipp = new_person(&uow, "Philipp", 12).unwrap();
    store.stall_at(StallPoint::Put);

    let (committed, ()) = futures::join!(uow.commit(), async {
        store.stalled().await;
        handle.close();
    });
    assert!(matches!(committed, Err(CoreError::Cancelled)));
    assert!(!uow.is_open());
    assert!(!philipp.is_readable());
    assert_eq!(inner.record_count(), 1);
}

#[tokio::test]
async fn closed_unit_of_work_refuses_new_calls() {
    let repository = memory_repository().await;
    let uow = repository.new_unit_of_work();
    uow.close();
    uow.close();

    assert_eq!(
        uow.query::<Person>().unwrap_err().kind(),
        ErrorKind::IllegalState
    );
    assert!(new_person(&uow, "Ulli", 40).is_err());
    assert_eq!(uow.rollback().unwrap_err().kind(), ErrorKind::IllegalState);
}
