//! # UnitDB Testkit
//!
//! Test utilities for UnitDB.
//!
//! This crate provides:
//! - Fixture entity types and repository helpers
//! - Store wrappers that record, fail or suspend store calls
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use unitdb_testkit::prelude::*;
//!
//! # let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # runtime.block_on(async {
//! let repository = memory_repository().await;
//! let uow = repository.new_unit_of_work();
//! new_person(&uow, "Ulli", 40)?;
//! uow.commit().await?;
//! # Ok::<(), unitdb_core::CoreError>(())
//! # }).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stores;

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber filtered by `RUST_LOG` (default `warn`).
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use crate::stores::*;
}
