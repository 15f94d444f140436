//! API Key Cache
//!
//! Maps API keys to active clients. The mapping is loaded from the identity
//! store as one immutable snapshot and published by swapping an `Arc`, so a
//! lookup never sees a half-built map. A snapshot is stale once its TTL has
//! elapsed or once `invalidate()` has bumped the generation counter; the next
//! lookup then reloads it. Racing reloads are harmless: the last one wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use parking_lot::RwLock;
use portico_db::IdentityStore;
use tokio::time::Instant;
use tracing::debug;

use crate::error::AuthResult;
use crate::types::ClientContext;

/// Header carrying the client key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Query parameters accepted when the header is absent
const API_KEY_PARAMS: [&str; 2] = ["api_key", "apiKey"];

struct ClientSnapshot {
    clients: HashMap<String, ClientContext>,
    loaded_at: Instant,
    generation: u64,
}

/// Short-TTL cache of active API clients
pub struct ApiKeyCache {
    store: Arc<dyn IdentityStore>,
    ttl: Duration,
    snapshot: RwLock<Option<Arc<ClientSnapshot>>>,
    generation: AtomicU64,
}

impl ApiKeyCache {
    pub fn new(store: Arc<dyn IdentityStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            snapshot: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Resolve a key to its client, reloading the snapshot when stale
    pub async fn lookup(&self, api_key: &str) -> AuthResult<Option<ClientContext>> {
        let snapshot = match self.fresh_snapshot() {
            Some(snapshot) => snapshot,
            None => self.reload().await?,
        };

        Ok(snapshot.clients.get(api_key).cloned())
    }

    /// Force the next lookup to reload from the store
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        debug!("API client cache invalidated");
    }

    fn fresh_snapshot(&self) -> Option<Arc<ClientSnapshot>> {
        let snapshot = self.snapshot.read().clone()?;
        let current = snapshot.generation == self.generation.load(Ordering::Acquire)
            && snapshot.loaded_at.elapsed() < self.ttl;
        current.then_some(snapshot)
    }

    async fn reload(&self) -> AuthResult<Arc<ClientSnapshot>> {
        // Read before loading: an invalidation that lands mid-load leaves
        // this snapshot already stale.
        let generation = self.generation.load(Ordering::Acquire);
        let rows = self.store.load_active_clients().await?;

        let clients = rows
            .into_iter()
            .filter(|row| row.is_active)
            .map(|row| {
                (
                    row.api_key,
                    ClientContext {
                        id: row.id,
                        name: row.name,
                    },
                )
            })
            .collect::<HashMap<_, _>>();

        debug!(clients = clients.len(), "API client cache reloaded");

        let snapshot = Arc::new(ClientSnapshot {
            clients,
            loaded_at: Instant::now(),
            generation,
        });
        *self.snapshot.write() = Some(snapshot.clone());
        Ok(snapshot)
    }
}

/// API key from the `x-api-key` header, else from the `api_key` / `apiKey`
/// query parameters
pub fn extract_api_key(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    let from_header = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from);

    from_header.or_else(|| {
        let query = query?;
        API_KEY_PARAMS
            .iter()
            .find_map(|param| extract_query_param(query, param))
    })
}

/// Extract a non-empty, percent-decoded parameter from a query string
fn extract_query_param(query: &str, param: &str) -> Option<String> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).ok()?;
    pairs
        .into_iter()
        .find(|(name, _)| name == param)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}
