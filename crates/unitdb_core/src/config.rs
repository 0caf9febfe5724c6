//! Repository configuration.

/// How identities are minted for entities created without one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdentityStrategy {
    /// Random UUID v4 text.
    #[default]
    Uuid,
    /// `prefix` followed by a counter, monotonic per repository instance.
    Sequential {
        /// Text placed before the counter.
        prefix: String,
    },
}

/// Configuration for an [`EntityRepository`](crate::EntityRepository).
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Identity generation for `new_entity`.
    pub identity: IdentityStrategy,

    /// Whether commit rejects inserted or updated entities whose mandatory
    /// properties are unset without a default.
    pub validate_on_commit: bool,

    /// Page size applied to queries that never set `max_results`.
    pub default_max_results: Option<usize>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            identity: IdentityStrategy::Uuid,
            validate_on_commit: true,
            default_max_results: None,
        }
    }
}

impl RepositoryConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the identity strategy.
    #[must_use]
    pub fn identity(mut self, strategy: IdentityStrategy) -> Self {
        self.identity = strategy;
        self
    }

    /// Sets whether commit validates mandatory properties.
    #[must_use]
    pub const fn validate_on_commit(mut self, value: bool) -> Self {
        self.validate_on_commit = value;
        self
    }

    /// Sets the default page size of queries.
    #[must_use]
    pub const fn default_max_results(mut self, value: Option<usize>) -> Self {
        self.default_max_results = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = RepositoryConfig::default();
        assert_eq!(config.identity, IdentityStrategy::Uuid);
        assert!(config.validate_on_commit);
        assert_eq!(config.default_max_results, None);
    }

    #[test]
    fn builder_pattern() {
        let config = RepositoryConfig::new()
            .identity(IdentityStrategy::Sequential {
                prefix: "p-".into(),
            })
            .validate_on_commit(false)
            .default_max_results(Some(50));

        assert!(!config.validate_on_commit);
        assert_eq!(config.default_max_results, Some(50));
        assert_eq!(
            config.identity,
            IdentityStrategy::Sequential {
                prefix: "p-".into()
            }
        );
    }
}
