//! Splits a filter between the store and the core.

use crate::error::{CoreError, CoreResult};
use unitdb_store::{NativeQuery, Predicate, StoreAdapter};

/// How one execution of a query is carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Plan {
    /// What the store is asked for.
    pub(crate) native: NativeQuery,
    /// Conjuncts the store does not support, evaluated in memory.
    pub(crate) residual: Option<Predicate>,
    /// Whether the whole filter can be evaluated in memory, which resident
    /// entities need.
    pub(crate) overlay: bool,
    /// Window still to be applied by the core.
    pub(crate) offset: usize,
    pub(crate) limit: Option<usize>,
}

impl Plan {
    /// Plans a query over `entity_type`.
    ///
    /// The window is handed to the store only if the store pages natively
    /// and the core will not drop or add any candidate.
    pub(crate) fn new(
        store: &dyn StoreAdapter,
        entity_type: &str,
        filter: &Predicate,
        offset: usize,
        limit: Option<usize>,
        has_residents: bool,
    ) -> CoreResult<Self> {
        let mut native = Vec::new();
        let mut residual = Vec::new();
        for conjunct in filter.conjuncts() {
            if store.supports(conjunct) {
                native.push(conjunct.clone());
            } else if conjunct.is_evaluable() {
                residual.push(conjunct.clone());
            } else {
                return Err(CoreError::UnsupportedPredicate {
                    predicate: conjunct.to_string(),
                });
            }
        }

        let residual = (!residual.is_empty()).then(|| Predicate::all(residual));
        let query = NativeQuery::all(entity_type).with_filter(Predicate::all(native));
        let push_window =
            residual.is_none() && !has_residents && store.capabilities().native_paging;

        tracing::trace!(
            entity_type,
            native = %query.filter,
            residual = residual.is_some(),
            push_window,
            "planned query"
        );

        Ok(if push_window {
            Self {
                native: query.with_window(offset, limit),
                residual,
                overlay: filter.is_evaluable(),
                offset: 0,
                limit: None,
            }
        } else {
            Self {
                native: query,
                residual,
                overlay: filter.is_evaluable(),
                offset,
                limit,
            }
        })
    }

    /// Whether the store applies the window, which fixes the page when the
    /// query is executed.
    pub(crate) fn store_pages(&self) -> bool {
        self.native.offset > 0 || self.native.limit.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unitdb_store::{CompareOp, LogStore, MemoryLog, MemoryStore};

    fn name_is(name: &str) -> Predicate {
        Predicate::compare("name", CompareOp::Eq, name)
    }

    fn age_over(age: i64) -> Predicate {
        Predicate::compare("age", CompareOp::Gt, age)
    }

    #[test]
    fn memory_store_takes_everything() {
        let store = MemoryStore::new();
        let filter = Predicate::and(name_is("Ulli"), age_over(30));
        let plan = Plan::new(&store, "Person", &filter, 5, Some(10), false).unwrap();

        assert_eq!(plan.native.filter, filter);
        assert_eq!(plan.residual, None);
        assert_eq!((plan.native.offset, plan.native.limit), (5, Some(10)));
        assert_eq!((plan.offset, plan.limit), (0, None));
        assert!(plan.store_pages());
    }

    #[test]
    fn residents_keep_the_window_in_core() {
        let store = MemoryStore::new();
        let plan = Plan::new(&store, "Person", &Predicate::True, 5, Some(10), true).unwrap();
        assert_eq!((plan.native.offset, plan.native.limit), (0, None));
        assert_eq!((plan.offset, plan.limit), (5, Some(10)));
        assert!(!plan.store_pages());
    }

    #[test]
    fn log_store_gets_only_equality() {
        let store = LogStore::open(MemoryLog::new(), Default::default()).unwrap();
        let filter = Predicate::and(name_is("Ulli"), age_over(30));
        let plan = Plan::new(&store, "Person", &filter, 0, Some(1), false).unwrap();

        assert_eq!(plan.native.filter, name_is("Ulli"));
        assert_eq!(plan.residual, Some(age_over(30)));
        assert_eq!(plan.native.limit, None);
        assert_eq!(plan.limit, Some(1));
    }

    #[test]
    fn store_only_operator_without_support_fails() {
        let store = MemoryStore::new();
        let filter = Predicate::Custom {
            op: "near".into(),
            field: "location".into(),
            value: "x".into(),
        };
        let err = Plan::new(&store, "Place", &filter, 0, None, false).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedPredicate { .. }));
    }

    #[test]
    fn starts_with_falls_back_to_memory() {
        let store = LogStore::open(MemoryLog::new(), Default::default()).unwrap();
        let filter = Predicate::Custom {
            op: unitdb_store::STARTS_WITH.into(),
            field: "name".into(),
            value: "Ul".into(),
        };
        let plan = Plan::new(&store, "Person", &filter, 0, None, false).unwrap();
        assert_eq!(plan.native.filter, Predicate::True);
        assert_eq!(plan.residual, Some(filter));
        assert!(plan.overlay);
    }
}
