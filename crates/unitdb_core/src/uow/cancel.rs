//! Closing a unit of work from another task.

use super::UowCore;
use crate::types::UnitOfWorkId;
use std::fmt;
use std::sync::Arc;

/// Closes a [`UnitOfWork`](crate::UnitOfWork) from anywhere.
///
/// Closing aborts the store call the unit of work is suspended in, if any;
/// a commit interrupted before its storage commit step rolls back and fails
/// with [`CoreError::Cancelled`](crate::CoreError::Cancelled).
#[derive(Clone)]
pub struct CloseHandle {
    core: Arc<UowCore>,
}

impl CloseHandle {
    pub(super) fn new(core: Arc<UowCore>) -> Self {
        Self { core }
    }

    /// Closes the unit of work. Idempotent.
    pub fn close(&self) {
        self.core.discard();
    }

    /// Returns `true` once the unit of work was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Identifier of the unit of work this handle closes.
    #[must_use]
    pub fn unit_of_work(&self) -> UnitOfWorkId {
        self.core.id
    }
}

impl fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseHandle")
            .field("unit_of_work", &self.core.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
