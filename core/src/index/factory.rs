use std::fmt::Debug;

use serde_json::{json, Value as JsonValue};

use crate::{query::QueryPart, util::deep_merge};

use super::{GenericAttributeIndexerFactory, MetaIndexerFactory};

/// Determines the order in which mapping fragments are merged. Fragments of
/// specialized factories are merged last so they win on conflicting keys.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndexerCategory {
    Generic,
    Specialized,
}

/// How the filter fragment of a factory is combined with those of the others
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MatchPriority {
    /// Use this factory's fragment and ignore all others
    Only,

    /// The fragment is one of several alternatives
    Should,

    /// The fragment must match
    Must,
}

/// Contributes a mapping fragment to the index and compiles the query parts
/// it understands into backend filters
pub trait IndexerFactory: Send + Sync + Debug {
    fn category(&self) -> IndexerCategory {
        IndexerCategory::Specialized
    }

    /// The mapping fragment for the fields this factory fills
    fn mapping(&self) -> JsonValue;

    /// Decide if and how this factory handles the given value or comparison
    fn query_priority(&self, part: &QueryPart) -> Option<MatchPriority>;

    /// Compile the given value or comparison into a backend filter. Only
    /// called if [`query_priority`](IndexerFactory::query_priority) returned
    /// a priority.
    fn compile_query(&self, part: &QueryPart) -> JsonValue;
}

/// The indexer factories known to the store. Built once at start-up and
/// shared by reference afterwards.
#[derive(Debug)]
pub struct IndexerRegistry {
    factories: Vec<Box<dyn IndexerFactory>>,
}

impl IndexerRegistry {
    pub fn new(factories: Vec<Box<dyn IndexerFactory>>) -> Self {
        Self { factories }
    }

    pub fn factories(&self) -> &[Box<dyn IndexerFactory>] {
        &self.factories
    }

    /// The merged mapping of all factories. Fragments of generic factories
    /// are merged first.
    pub fn mapping(&self) -> JsonValue {
        let mut result = json!({});
        for category in [IndexerCategory::Generic, IndexerCategory::Specialized] {
            for f in self.factories.iter().filter(|f| f.category() == category) {
                deep_merge(&mut result, &f.mapping());
            }
        }
        result
    }
}

impl Default for IndexerRegistry {
    /// A registry with the compiled-in factories
    fn default() -> Self {
        Self::new(vec![
            Box::new(MetaIndexerFactory),
            Box::new(GenericAttributeIndexerFactory),
        ])
    }
}
