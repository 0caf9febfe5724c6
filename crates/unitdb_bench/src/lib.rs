//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use rand::Rng;
use unitdb_codec::{Record, Value};
use unitdb_core::EntityRepository;
use unitdb_testkit::fixtures::new_person;

/// A current-thread runtime for driving the async API from `b.iter`.
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("Failed to build runtime")
}

/// Generate `count` random people as `(name, age)` pairs.
pub fn random_people(count: usize) -> Vec<(String, i64)> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| (format!("p{i}-{}", rng.gen::<u32>()), rng.gen_range(0..120)))
        .collect()
}

/// Generate a record with `fields` random integer and text fields.
pub fn random_record(fields: usize) -> Record {
    let mut rng = rand::thread_rng();
    (0..fields)
        .map(|i| {
            let value = if i % 2 == 0 {
                Value::Integer(rng.gen())
            } else {
                Value::from(format!("value-{}", rng.gen::<u32>()))
            };
            (format!("field_{i}"), value)
        })
        .collect()
}

/// Commits `people` to `repository` in one unit of work.
pub async fn populate(repository: &EntityRepository, people: &[(String, i64)]) {
    let uow = repository.new_unit_of_work();
    for (name, age) in people {
        new_person(&uow, name, *age).expect("Failed to create person");
    }
    uow.commit().await.expect("Failed to commit");
}
