//! Core type definitions for UnitDB.

use std::fmt;

/// Unique identifier for a unit of work.
///
/// Identifiers increase monotonically within the process and are never
/// reused, so two units of work never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitOfWorkId(pub u64);

impl UnitOfWorkId {
    /// Creates a new unit of work ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UnitOfWorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uow:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(UnitOfWorkId::new(42).to_string(), "uow:42");
        assert_eq!(UnitOfWorkId::new(42).as_u64(), 42);
    }

    #[test]
    fn ordering() {
        assert!(UnitOfWorkId::new(1) < UnitOfWorkId::new(2));
    }
}
