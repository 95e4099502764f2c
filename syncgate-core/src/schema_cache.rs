//! Process-wide application schema cache.
//!
//! Schemas are loaded lazily on first use and kept until the cache as a
//! whole is dropped. There is no per-entry eviction: before each lookup the
//! total serialized size is compared against a fixed limit and, when it is
//! exceeded, every entry is discarded and reloaded on demand.
//!
//! Each application id owns a `OnceCell`, so concurrent first lookups of
//! the same application trigger a single load. The map lock is held only
//! for the size check and cell lookup, never across the load itself.

use crate::error::{GatewayError, GatewayResult};
use crate::ports::SchemaSource;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use syncgate_model::ApplicationSchema;
use syncgate_types::ApplicationId;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

struct CachedSchema {
    schema: Arc<ApplicationSchema>,
    size: usize,
}

type Slot = Arc<OnceCell<CachedSchema>>;

pub struct SchemaCache {
    source: Arc<dyn SchemaSource>,
    limit_bytes: usize,
    entries: Mutex<HashMap<ApplicationId, Slot>>,
    evictions: AtomicU64,
}

impl SchemaCache {
    /// Creates an empty cache backed by `source`.
    pub fn new(source: Arc<dyn SchemaSource>, limit_bytes: usize) -> Self {
        Self {
            source,
            limit_bytes,
            entries: Mutex::new(HashMap::new()),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns the schema for `application_id`, loading it if absent.
    ///
    /// Runs the size check first, so a lookup may drop every cached schema.
    /// A load failure is returned as [`GatewayError::Schema`] and removes
    /// the empty slot, so unknown ids leave nothing behind.
    pub async fn get(&self, application_id: &ApplicationId) -> GatewayResult<Arc<ApplicationSchema>> {
        let slot = {
            let mut entries = self.entries.lock().await;
            let size = total_size(&entries);
            if size > self.limit_bytes {
                warn!(
                    size,
                    limit = self.limit_bytes,
                    entries = entries.len(),
                    "schema cache over limit, dropping all entries"
                );
                entries.clear();
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
            entries.entry(application_id.clone()).or_default().clone()
        };

        let loaded = slot
            .get_or_try_init(|| async {
                debug!(%application_id, "loading application schema");
                let schema = self.source.load_schema(application_id).await.map_err(|e| {
                    GatewayError::Schema {
                        application_id: application_id.clone(),
                        reason: e.to_string(),
                    }
                })?;
                let size = schema.serialized_size();
                debug!(%application_id, size, models = schema.len(), "schema loaded");
                Ok::<_, GatewayError>(CachedSchema {
                    schema: Arc::new(schema),
                    size,
                })
            })
            .await;

        match loaded {
            Ok(cached) => Ok(cached.schema.clone()),
            Err(err) => {
                self.discard_empty(application_id, &slot).await;
                Err(err)
            }
        }
    }

    async fn discard_empty(&self, application_id: &ApplicationId, slot: &Slot) {
        let mut entries = self.entries.lock().await;
        let unused = entries
            .get(application_id)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized());
        if unused {
            entries.remove(application_id);
        }
    }

    /// Total serialized size of every loaded schema.
    pub async fn size_bytes(&self) -> usize {
        total_size(&*self.entries.lock().await)
    }

    /// Number of loaded schemas.
    pub async fn len(&self) -> usize {
        self.entries
            .lock()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// Number of tracked slots, loaded or not.
    pub async fn slot_count(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether `application_id` is loaded.
    pub async fn contains(&self, application_id: &ApplicationId) -> bool {
        self.entries
            .lock()
            .await
            .get(application_id)
            .is_some_and(|slot| slot.initialized())
    }

    /// Drops every entry; the next lookups reload from the source.
    pub async fn invalidate_all(&self) {
        self.entries.lock().await.clear();
    }

    /// Number of size-triggered full evictions since creation.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn limit_bytes(&self) -> usize {
        self.limit_bytes
    }
}

fn total_size(entries: &HashMap<ApplicationId, Slot>) -> usize {
    entries
        .values()
        .filter_map(|slot| slot.get())
        .map(|cached| cached.size)
        .sum()
}
