//! Server-side prepared statements and the per-connection cache.
use std::{
    collections::HashMap,
    num::NonZeroUsize,
    sync::Arc,
};

use bytes::Bytes;
use lru::LruCache;

use crate::{
    paramstyle::{Materializer, ParamStyle},
    protocol::Oid,
    row::FieldDescription,
    types::Param,
};

/// Rewritten queries kept per paramstyle. Rewriting is pure string work,
/// an LRU bound keeps a long-lived connection from accumulating every
/// query text it ever saw.
const REWRITE_CACHE_CAP: NonZeroUsize = NonZeroUsize::new(512).unwrap();

/// A parsed statement held open on the server.
///
/// The Bind message prefix (portal, statement name, parameter format
/// codes, parameter count) and suffix (result format codes) are
/// precomputed at Describe time, per execution only the argument bytes
/// are spliced in between.
pub struct PreparedStatement {
    /// Wire name, `redro_statement_<pid>_<n>`.
    pub(crate) name: String,
    pub(crate) statement_num: u32,
    /// Result column metadata with decoders bound from the codec table
    /// active at Describe time.
    pub(crate) row_desc: Vec<FieldDescription>,
    /// Parameter OID, format and encoder per placeholder.
    pub(crate) params: Vec<Param>,
    pub(crate) bind_1: Bytes,
    pub(crate) bind_2: Bytes,
}

impl PreparedStatement {
    /// Result column metadata.
    pub fn row_description(&self) -> &[FieldDescription] {
        &self.row_desc
    }
}

impl std::fmt::Debug for PreparedStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("name", &self.name)
            .field("columns", &self.row_desc.len())
            .field("params", &self.params.len())
            .finish()
    }
}

/// Cache key: query text and parameter type signature.
pub(crate) type StatementKey = (String, Vec<Oid>);

/// Per-paramstyle cache shard.
pub(crate) struct CacheShard {
    pub(crate) rewrites: LruCache<String, (String, Materializer)>,
    pub(crate) statements: HashMap<StatementKey, Arc<PreparedStatement>>,
}

impl CacheShard {
    fn new() -> Self {
        Self {
            rewrites: LruCache::new(REWRITE_CACHE_CAP),
            statements: HashMap::new(),
        }
    }
}

/// Two-level prepared statement cache, `paramstyle → (rewrites, ps)`.
///
/// Eviction is all-or-nothing per shard when the bound is exceeded, and
/// global when a schema mutation completes.
#[derive(Default)]
pub(crate) struct StatementCache {
    shards: HashMap<ParamStyle, CacheShard>,
    statement_counter: u32,
}

impl StatementCache {
    pub(crate) fn shard(&mut self, style: ParamStyle) -> &mut CacheShard {
        self.shards.entry(style).or_insert_with(CacheShard::new)
    }

    /// Allocate the next statement number, one greater than any number
    /// handed out on this connection.
    pub(crate) fn next_statement_num(&mut self) -> u32 {
        let num = self
            .shards
            .values()
            .flat_map(|shard| shard.statements.values())
            .map(|ps| ps.statement_num)
            .chain([self.statement_counter])
            .max()
            .unwrap_or(0);
        self.statement_counter = num + 1;
        self.statement_counter
    }

    /// Remove every prepared statement across all shards, returning them
    /// so the caller can close the server-side objects.
    pub(crate) fn drain_statements(&mut self) -> Vec<Arc<PreparedStatement>> {
        self.shards
            .values_mut()
            .flat_map(|shard| shard.statements.drain())
            .map(|(_, ps)| ps)
            .collect()
    }
}

impl Default for CacheShard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn dummy_ps(num: u32) -> Arc<PreparedStatement> {
        Arc::new(PreparedStatement {
            name: format!("redro_statement_0_{num}"),
            statement_num: num,
            row_desc: Vec::new(),
            params: Vec::new(),
            bind_1: Bytes::new(),
            bind_2: Bytes::new(),
        })
    }

    #[test]
    fn statement_numbers_grow_across_shards() {
        let mut cache = StatementCache::default();
        assert_eq!(cache.next_statement_num(), 1);

        cache
            .shard(ParamStyle::Qmark)
            .statements
            .insert(("a".into(), vec![]), dummy_ps(7));
        assert_eq!(cache.next_statement_num(), 8);

        // numbers never regress, even after the holder is dropped
        cache.shard(ParamStyle::Qmark).statements.clear();
        assert_eq!(cache.next_statement_num(), 9);
    }

    #[test]
    fn drain_collects_all_shards() {
        let mut cache = StatementCache::default();
        cache
            .shard(ParamStyle::Qmark)
            .statements
            .insert(("a".into(), vec![]), dummy_ps(1));
        cache
            .shard(ParamStyle::Named)
            .statements
            .insert(("b".into(), vec![23]), dummy_ps(2));

        assert_eq!(cache.drain_statements().len(), 2);
        assert!(cache.shard(ParamStyle::Qmark).statements.is_empty());
    }
}
