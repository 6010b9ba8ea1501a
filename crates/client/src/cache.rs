//! Client-side query cache.
//!
//! Entries never expire on their own. They become stale only when a mutation
//! (or the caller) invalidates them, and they are dropped when the signed-in
//! identity changes. A stale entry is refetched on its next read, or right
//! away if something is observing it.

use kata_protocol::{ProcedureKind, RpcCall};
use serde_json::Value;
use std::collections::HashMap;

use crate::key::{KeyPrefix, QueryKey};
use crate::transport::{ClientError, Result, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub refetch_on_mount: bool,
    pub refetch_on_focus: bool,
    /// Identity-scoped entries are evicted when the signed-in identity changes.
    pub identity_scoped: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            refetch_on_mount: true,
            refetch_on_focus: true,
            identity_scoped: true,
        }
    }
}

impl QueryOptions {
    /// Serve cached data on mount/focus; refetch only after invalidation.
    pub fn no_auto_refetch() -> Self {
        Self {
            refetch_on_mount: false,
            refetch_on_focus: false,
            ..Self::default()
        }
    }

    /// Data that is the same for every identity (public listings).
    pub fn shared(mut self) -> Self {
        self.identity_scoped = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    call: RpcCall,
    key: QueryKey,
    options: QueryOptions,
}

impl Query {
    pub fn new(path: &str, input: Value) -> Self {
        let call = RpcCall::query(path, input);
        Self {
            key: QueryKey::for_call(&call),
            call,
            options: QueryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Fresh,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    Shared,
    Identity(Option<String>),
}

struct Entry {
    call: RpcCall,
    options: QueryOptions,
    scope: Scope,
    data: Value,
    state: EntryState,
    observers: usize,
}

pub struct QueryCache<T: Transport> {
    transport: T,
    identity: Option<String>,
    entries: HashMap<QueryKey, Entry>,
}

impl<T: Transport> QueryCache<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            identity: None,
            entries: HashMap::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn peek(&self, key: &QueryKey) -> Option<&Value> {
        self.entries
            .get(key)
            .filter(|e| self.visible(e))
            .map(|e| &e.data)
    }

    pub fn state(&self, key: &QueryKey) -> Option<EntryState> {
        self.entries.get(key).map(|e| e.state)
    }

    pub fn observers(&self, key: &QueryKey) -> usize {
        self.entries.get(key).map_or(0, |e| e.observers)
    }

    /// Fresh entries are served from memory; stale or missing ones are fetched.
    pub async fn get_or_fetch(&mut self, query: &Query) -> Result<Value> {
        if let Some(entry) = self.entries.get(&query.key) {
            if entry.state == EntryState::Fresh && self.visible(entry) {
                return Ok(entry.data.clone());
            }
        }
        self.fetch(query).await
    }

    /// Warms the cache without registering an observer.
    pub async fn prefetch(&mut self, query: &Query) -> Result<()> {
        self.get_or_fetch(query).await.map(|_| ())
    }

    /// Starts observing `query`. With `refetch_on_mount` a cached entry is refreshed.
    pub async fn mount(&mut self, query: &Query) -> Result<Value> {
        let refetch = match self.entries.get(&query.key) {
            Some(entry) => entry.state == EntryState::Stale || query.options.refetch_on_mount,
            None => true,
        };
        let data = if refetch {
            self.fetch(query).await?
        } else {
            self.get_or_fetch(query).await?
        };
        if let Some(entry) = self.entries.get_mut(&query.key) {
            entry.observers += 1;
        }
        Ok(data)
    }

    pub fn unmount(&mut self, key: &QueryKey) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.observers = entry.observers.saturating_sub(1);
        }
    }

    /// Window regained focus: refresh observed entries that allow it.
    pub async fn focus(&mut self) -> usize {
        let keys: Vec<QueryKey> = self
            .entries
            .iter()
            .filter(|(_, e)| e.observers > 0 && e.options.refetch_on_focus)
            .map(|(k, _)| k.clone())
            .collect();
        self.refetch_keys(keys).await
    }

    /// Marks matching entries stale and refetches the observed ones. Returns the match count.
    pub async fn invalidate(&mut self, prefix: &KeyPrefix) -> usize {
        let mut matched = 0;
        let mut observed = Vec::new();
        for (key, entry) in self.entries.iter_mut() {
            if !prefix.matches(key) {
                continue;
            }
            matched += 1;
            entry.state = EntryState::Stale;
            if entry.observers > 0 {
                observed.push(key.clone());
            }
        }
        self.refetch_keys(observed).await;
        matched
    }

    /// Runs a mutation; only a successful one invalidates the declared keys.
    pub async fn mutate(&mut self, call: RpcCall, invalidates: &[KeyPrefix]) -> Result<Value> {
        if call.kind != ProcedureKind::Mutation {
            return Err(ClientError::NotAMutation {
                path: call.path,
                kind: call.kind,
            });
        }
        let data = self.transport.call(call).await?;
        for prefix in invalidates {
            self.invalidate(prefix).await;
        }
        Ok(data)
    }

    /// Switching identity drops every identity-scoped entry. Returns the eviction count.
    pub fn set_identity(&mut self, identity: Option<String>) -> usize {
        if identity == self.identity {
            return 0;
        }
        log::debug!(
            "query cache identity {:?} -> {:?}",
            self.identity,
            identity
        );
        self.identity = identity;
        let before = self.entries.len();
        self.entries.retain(|_, e| e.scope == Scope::Shared);
        before - self.entries.len()
    }

    fn visible(&self, entry: &Entry) -> bool {
        match &entry.scope {
            Scope::Shared => true,
            Scope::Identity(owner) => *owner == self.identity,
        }
    }

    async fn fetch(&mut self, query: &Query) -> Result<Value> {
        let data = self.transport.call(query.call.clone()).await?;
        let scope = if query.options.identity_scoped {
            Scope::Identity(self.identity.clone())
        } else {
            Scope::Shared
        };
        let observers = self.entries.get(&query.key).map_or(0, |e| e.observers);
        self.entries.insert(
            query.key.clone(),
            Entry {
                call: query.call.clone(),
                options: query.options,
                scope,
                data: data.clone(),
                state: EntryState::Fresh,
                observers,
            },
        );
        Ok(data)
    }

    async fn refetch_keys(&mut self, keys: Vec<QueryKey>) -> usize {
        let mut refetched = 0;
        for key in keys {
            let Some(entry) = self.entries.get(&key) else {
                continue;
            };
            let query = Query {
                call: entry.call.clone(),
                key: key.clone(),
                options: entry.options,
            };
            match self.fetch(&query).await {
                Ok(_) => refetched += 1,
                // Entry stays stale and is retried on next read.
                Err(err) => log::warn!("refetch of {key} failed: {err}"),
            }
        }
        refetched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ClientError, TransportError};
    use async_trait::async_trait;
    use kata_protocol::{ErrorCode, ErrorEnvelope, RpcResponse};
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Serves `counter` for queries (bumped by every mutation) and records calls.
    #[derive(Default)]
    struct FakeServer {
        version: AtomicU64,
        calls: Mutex<Vec<String>>,
        fail_mutations: bool,
    }

    impl FakeServer {
        fn calls(&self, path: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|p| *p == path).count()
        }
    }

    #[async_trait]
    impl Transport for FakeServer {
        async fn send(&self, call: RpcCall) -> std::result::Result<RpcResponse, TransportError> {
            self.calls.lock().unwrap().push(call.path.clone());
            match call.kind {
                ProcedureKind::Query => Ok(RpcResponse::success(json!({
                    "path": call.path,
                    "input": call.input,
                    "version": self.version.load(Ordering::SeqCst),
                }))),
                ProcedureKind::Mutation if self.fail_mutations => Ok(RpcResponse::failure(
                    ErrorEnvelope::new(ErrorCode::BadRequest, "duplicate slug"),
                )),
                ProcedureKind::Mutation => {
                    self.version.fetch_add(1, Ordering::SeqCst);
                    Ok(RpcResponse::success(Value::Null))
                }
            }
        }
    }

    fn list() -> Query {
        Query::new("exercise.list", json!({ "tag": "sql" }))
    }

    #[tokio::test]
    async fn fresh_entries_are_served_without_refetch() {
        let mut cache = QueryCache::new(FakeServer::default());
        let first = cache.get_or_fetch(&list()).await.unwrap();
        let second = cache.get_or_fetch(&list()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.transport().calls("exercise.list"), 1);
    }

    #[tokio::test]
    async fn invalidated_keys_refetch_on_next_read() {
        let mut cache = QueryCache::new(FakeServer::default());
        let other = Query::new("user.me", Value::Null);
        cache.get_or_fetch(&list()).await.unwrap();
        cache.get_or_fetch(&other).await.unwrap();

        cache
            .mutate(
                RpcCall::mutation("exercise.create", json!({ "slug": "joins" })),
                &[KeyPrefix::path("exercise")],
            )
            .await
            .unwrap();
        assert_eq!(cache.state(list().key()), Some(EntryState::Stale));
        assert_eq!(cache.state(other.key()), Some(EntryState::Fresh));
        // Not observed, so nothing was refetched yet.
        assert_eq!(cache.transport().calls("exercise.list"), 1);

        let after = cache.get_or_fetch(&list()).await.unwrap();
        assert_eq!(after["version"], 1);
        assert_eq!(cache.transport().calls("exercise.list"), 2);
        assert_eq!(cache.transport().calls("user.me"), 1);
    }

    #[tokio::test]
    async fn observed_entries_refetch_immediately() {
        let mut cache = QueryCache::new(FakeServer::default());
        cache.mount(&list()).await.unwrap();
        assert_eq!(cache.observers(list().key()), 1);

        cache
            .mutate(RpcCall::mutation("exercise.create", json!({})), &[KeyPrefix::path("exercise.list")])
            .await
            .unwrap();
        assert_eq!(cache.transport().calls("exercise.list"), 2);
        assert_eq!(cache.state(list().key()), Some(EntryState::Fresh));
        assert_eq!(cache.peek(list().key()).unwrap()["version"], 1);
        assert_eq!(cache.observers(list().key()), 1);
    }

    #[tokio::test]
    async fn failed_mutation_invalidates_nothing() {
        let mut cache = QueryCache::new(FakeServer {
            fail_mutations: true,
            ..FakeServer::default()
        });
        cache.get_or_fetch(&list()).await.unwrap();
        let err = cache
            .mutate(RpcCall::mutation("exercise.create", json!({})), &[KeyPrefix::path("exercise")])
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Rpc(ref e) if e.code == ErrorCode::BadRequest));
        assert_eq!(cache.state(list().key()), Some(EntryState::Fresh));
    }

    #[tokio::test]
    async fn queries_are_refused_by_mutate() {
        let mut cache = QueryCache::new(FakeServer::default());
        cache.get_or_fetch(&list()).await.unwrap();
        let err = cache
            .mutate(RpcCall::query("exercise.list", Value::Null), &[KeyPrefix::path("exercise")])
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotAMutation { kind: ProcedureKind::Query, .. }));
        assert_eq!(cache.transport().calls("exercise.list"), 1);
        assert_eq!(cache.state(list().key()), Some(EntryState::Fresh));
    }

    #[tokio::test]
    async fn prefetch_stores_without_observing() {
        let mut cache = QueryCache::new(FakeServer::default());
        cache.prefetch(&list()).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.observers(list().key()), 0);
        assert_eq!(cache.state(list().key()), Some(EntryState::Fresh));

        // A later read is served from the prefetched entry.
        cache.get_or_fetch(&list()).await.unwrap();
        assert_eq!(cache.transport().calls("exercise.list"), 1);

        // Unobserved, so invalidation does not refetch it.
        cache
            .mutate(RpcCall::mutation("exercise.create", json!({})), &[KeyPrefix::path("exercise")])
            .await
            .unwrap();
        assert_eq!(cache.transport().calls("exercise.list"), 1);
        assert_eq!(cache.state(list().key()), Some(EntryState::Stale));
    }

    #[tokio::test]
    async fn identity_switch_evicts_scoped_entries_only() {
        let mut cache = QueryCache::new(FakeServer::default());
        cache.set_identity(Some("admin".to_string()));
        let me = Query::new("user.me", Value::Null);
        let public = Query::new("exercise.list", Value::Null).with_options(QueryOptions::default().shared());
        cache.get_or_fetch(&me).await.unwrap();
        cache.get_or_fetch(&public).await.unwrap();

        assert_eq!(cache.set_identity(Some("admin".to_string())), 0);
        assert_eq!(cache.set_identity(Some("impersonated".to_string())), 1);
        assert!(cache.peek(me.key()).is_none());
        assert!(cache.peek(public.key()).is_some());
        assert_eq!(cache.identity(), Some("impersonated"));

        cache.get_or_fetch(&me).await.unwrap();
        assert_eq!(cache.transport().calls("user.me"), 2);
    }

    #[tokio::test]
    async fn no_auto_refetch_hint_is_honoured_on_mount_and_focus() {
        let mut cache = QueryCache::new(FakeServer::default());
        let pinned = list().with_options(QueryOptions::no_auto_refetch());
        let live = Query::new("user.me", Value::Null);

        cache.mount(&pinned).await.unwrap();
        cache.mount(&pinned).await.unwrap();
        cache.mount(&live).await.unwrap();
        cache.mount(&live).await.unwrap();
        assert_eq!(cache.transport().calls("exercise.list"), 1);
        assert_eq!(cache.transport().calls("user.me"), 2);

        assert_eq!(cache.focus().await, 1);
        assert_eq!(cache.transport().calls("exercise.list"), 1);
        assert_eq!(cache.transport().calls("user.me"), 3);

        // Invalidation still wins over the hint.
        cache.invalidate(&KeyPrefix::path("exercise")).await;
        assert_eq!(cache.transport().calls("exercise.list"), 2);

        cache.unmount(pinned.key());
        cache.unmount(pinned.key());
        cache.unmount(pinned.key());
        assert_eq!(cache.observers(pinned.key()), 0);
        cache.invalidate(&KeyPrefix::path("exercise")).await;
        assert_eq!(cache.transport().calls("exercise.list"), 2);
        assert_eq!(cache.state(pinned.key()), Some(EntryState::Stale));
    }
}
