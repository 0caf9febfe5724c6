//! Entity lifecycle status.

use std::fmt;

/// Lifecycle status of an entity within its unit of work.
///
/// ```text
/// New ─────────────────────────────┐
/// Loaded ⇄ Modified ──> Removed ──>├──> Submitted (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityStatus {
    /// Created in this unit of work; inserted on commit.
    New,
    /// Loaded from the store and unchanged.
    Loaded,
    /// Loaded and differing from the load-time snapshot; updated on commit.
    Modified,
    /// Removal requested; deleted on commit.
    Removed,
    /// The unit of work committed or closed; the entity is detached.
    Submitted,
}

impl EntityStatus {
    /// Returns `true` if properties may still be mutated.
    #[must_use]
    pub const fn is_mutable(self) -> bool {
        matches!(self, Self::New | Self::Loaded | Self::Modified)
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "NEW",
            Self::Loaded => "LOADED",
            Self::Modified => "MODIFIED",
            Self::Removed => "REMOVED",
            Self::Submitted => "SUBMITTED",
        };
        f.write_str(name)
    }
}
