use std::sync::Arc;

use serde_json::{json, Map, Value as JsonValue};

use crate::index::{IndexerRegistry, MatchPriority};

use super::{Logical, Query, QueryError, QueryPart};

/// Compiles search expressions and path scopes into backend filters with the
/// help of the registered indexer factories
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    registry: Arc<IndexerRegistry>,
}

impl QueryCompiler {
    pub fn new(registry: Arc<IndexerRegistry>) -> Self {
        Self { registry }
    }

    /// Compile a search expression restricted to the given path. A missing
    /// search matches all chunks in the path.
    pub fn compile(&self, search: Option<&str>, path: Option<&str>) -> Result<JsonValue, QueryError> {
        let query = Query::parse(search)?;
        let query = if query.is_empty() {
            None
        } else {
            Some(self.compile_query(&query))
        };

        Ok(match (query, path_filter(path)) {
            (None, None) => json!({ "match_all": {} }),
            (Some(q), None) => q,
            (None, Some(p)) => p,
            (Some(q), Some(p)) => bool_query(vec![q, p], vec![], vec![]),
        })
    }

    /// Like [`compile`](Self::compile) but only matches chunks whose index
    /// document has a value for the given field (e.g. `props.owner`)
    pub fn compile_with_key_exists(
        &self,
        search: Option<&str>,
        path: Option<&str>,
        key: &str,
    ) -> Result<JsonValue, QueryError> {
        let filter = self.compile(search, path)?;
        Ok(bool_query(
            vec![filter, json!({ "exists": { "field": key } })],
            vec![],
            vec![],
        ))
    }

    /// Compile a parsed query. Its parts are combined with OR.
    pub fn compile_query(&self, query: &Query) -> JsonValue {
        match query.parts.as_slice() {
            [] => json!({ "match_all": {} }),
            [part] => self.compile_part(part),
            parts => bool_query(
                vec![],
                parts.iter().map(|p| self.compile_part(p)).collect(),
                vec![],
            ),
        }
    }

    fn compile_part(&self, part: &QueryPart) -> JsonValue {
        match part {
            QueryPart::Logical(l) => self.compile_logical(l),
            _ => self.compile_with_factories(part),
        }
    }

    fn compile_logical(&self, logical: &Logical) -> JsonValue {
        let compile_all = |parts: &[QueryPart]| -> Vec<JsonValue> {
            parts.iter().map(|p| self.compile_part(p)).collect()
        };
        match logical {
            Logical::And(parts) => bool_query(compile_all(parts), vec![], vec![]),
            Logical::Or(parts) => bool_query(vec![], compile_all(parts), vec![]),
            Logical::Not(parts) => bool_query(vec![], vec![], compile_all(parts)),
        }
    }

    /// Ask every factory for its priority. A factory that claims a part
    /// exclusively wins, otherwise all fragments are combined.
    fn compile_with_factories(&self, part: &QueryPart) -> JsonValue {
        let mut must = Vec::new();
        let mut should = Vec::new();
        for f in self.registry.factories() {
            match f.query_priority(part) {
                Some(MatchPriority::Only) => return f.compile_query(part),
                Some(MatchPriority::Should) => should.push(f.compile_query(part)),
                Some(MatchPriority::Must) => must.push(f.compile_query(part)),
                None => {}
            }
        }

        match (must.len(), should.len()) {
            // no factory understands this part
            (0, 0) => json!({ "bool": { "must_not": { "match_all": {} } } }),
            (0, 1) | (1, 0) => must.pop().or_else(|| should.pop()).unwrap_or(JsonValue::Null),
            _ => bool_query(must, should, vec![]),
        }
    }
}

/// A filter restricting matches to chunks stored in the given path or one
/// of its subdirectories. `None`, an empty path and `/` do not restrict.
pub fn path_filter(path: Option<&str>) -> Option<JsonValue> {
    let path = path?.trim_end_matches('/');
    if path.is_empty() {
        return None;
    }
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    Some(bool_query(
        vec![],
        vec![
            json!({ "term": { "path": path } }),
            json!({ "prefix": { "path": format!("{path}/") } }),
        ],
        vec![],
    ))
}

fn bool_query(must: Vec<JsonValue>, should: Vec<JsonValue>, must_not: Vec<JsonValue>) -> JsonValue {
    let mut b = Map::new();
    if !must.is_empty() {
        b.insert("must".to_string(), JsonValue::Array(must));
    }
    if !should.is_empty() {
        b.insert("should".to_string(), JsonValue::Array(should));
        b.insert("minimum_should_match".to_string(), json!(1));
    }
    if !must_not.is_empty() {
        b.insert("must_not".to_string(), JsonValue::Array(must_not));
    }
    json!({ "bool": b })
}
