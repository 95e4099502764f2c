//! Gateway configuration.

/// Schema cache threshold: roughly 64 MiB of serialized schema.
pub const DEFAULT_SCHEMA_CACHE_LIMIT_BYTES: usize = 1 << 26;

/// Objects delivered in a parent-filtered snapshot.
pub const DEFAULT_PARENT_SNAPSHOT_LIMIT: usize = 10;

pub const DEFAULT_MUTATION_TOPIC: &str = "aggregation";
pub const DEFAULT_TRACK_TOPIC: &str = "track";

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Total serialized schema size above which the whole cache is dropped.
    pub schema_cache_limit_bytes: usize,
    /// Cap on objects fetched for a parent-filtered snapshot. The reported
    /// count is not capped.
    pub parent_snapshot_limit: usize,
    /// Optional cap on a full-collection snapshot. `None` keeps it unbounded.
    pub collection_snapshot_limit: Option<usize>,
    /// Bus topic driving downstream materialization.
    pub mutation_topic: String,
    /// Bus topic driving analytics and subscription bookkeeping.
    pub track_topic: String,
    pub failure_policy: FailurePolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            schema_cache_limit_bytes: DEFAULT_SCHEMA_CACHE_LIMIT_BYTES,
            parent_snapshot_limit: DEFAULT_PARENT_SNAPSHOT_LIMIT,
            collection_snapshot_limit: None,
            mutation_topic: DEFAULT_MUTATION_TOPIC.to_string(),
            track_topic: DEFAULT_TRACK_TOPIC.to_string(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Which secondary steps abort a workflow when they fail.
///
/// Mutation-topic publishes are always fatal and are not configurable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Tracking-topic publish failures abort the workflow.
    pub strict_tracking: bool,
    /// A failed object-count update aborts subscribe.
    pub strict_object_count: bool,
}

impl FailurePolicy {
    /// Every step is fatal.
    pub fn strict() -> Self {
        Self {
            strict_tracking: true,
            strict_object_count: true,
        }
    }
}
