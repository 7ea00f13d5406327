//! Stream definitions and per-stream extraction strategies.
//!
//! A [`StreamDefinition`] is static configuration: it names an entity type,
//! its keys, its position in the parent/child graph, and the strategies used
//! to build request parameters and turn raw pages into rows. Strategies are
//! tagged variants selected per stream, not an inheritance chain.

use crate::window::WindowSpec;

/// Maps a field of a parent row into a field of the child context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextField {
    /// Key under which the value appears in the child context.
    pub context_key: &'static str,
    /// Field of the parent row the value is read from.
    pub record_field: &'static str,
    /// Whether a missing parent field is a configuration error.
    ///
    /// Optional fields (e.g. `media_product_type` on carousel children)
    /// produce a null context value instead.
    pub required: bool,
}

/// How request parameters are built for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStrategy {
    /// Project the declared field list via a `fields` parameter.
    Fields { fields: &'static [&'static str] },
    /// `Fields`, plus a `since` floor derived from the bookmark minus the
    /// configured lookback, so late-arriving engagement data is re-read.
    FieldsWithLookback { fields: &'static [&'static str] },
    /// Metric set chosen from the parent context's media variant
    /// (`media_type` / `media_product_type`). Unknown variants are a
    /// configuration error raised before any request.
    MediaMetrics,
    /// Fixed metric set over a `[since, until)` window computed by the
    /// time-window planner.
    WindowedMetrics {
        metrics: &'static [&'static str],
        period: &'static str,
        window: WindowSpec,
    },
    /// Fixed metric set with a lifetime period and no window pagination.
    LifetimeMetrics {
        metrics: &'static [&'static str],
        period: &'static str,
    },
}

/// How a raw response page is turned into rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformStrategy {
    /// Extract the record list at `path` (`None` = the body itself is one
    /// record) and canonicalize the named datetime fields.
    Records {
        path: Option<&'static str>,
        datetime_fields: &'static [&'static str],
    },
    /// Insight normalization: one row per metric value, fanning out keyed
    /// value maps into one row per breakdown key.
    InsightFanout,
}

/// Static definition of one entity stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamDefinition {
    /// Stream name, unique within the catalog.
    pub name: &'static str,
    /// Path template relative to the API base, e.g. `/{user_id}/media`.
    /// Placeholders are resolved from the extraction context.
    pub path: &'static str,
    /// Primary key fields present on every emitted row.
    pub primary_keys: &'static [&'static str],
    /// Cursor field for incremental extraction (`None` = full refresh).
    pub replication_key: Option<&'static str>,
    /// Parent stream name. When set, every request requires a context
    /// produced by a parent record.
    pub parent: Option<&'static str>,
    /// Context fields bookmarks are keyed by. `None` partitions by the
    /// full context; a narrower list lets deeply nested streams share one
    /// bookmark across many same-ancestor contexts.
    pub state_partition_keys: Option<&'static [&'static str]>,
    /// Request parameter strategy.
    pub params: ParamStrategy,
    /// Response-to-rows strategy.
    pub transform: TransformStrategy,
    /// Mapping of own-row fields into contexts for child streams.
    pub child_context: &'static [ContextField],
}

impl StreamDefinition {
    /// Whether this stream resumes from a bookmark.
    #[must_use]
    pub fn is_incremental(&self) -> bool {
        self.replication_key.is_some()
    }

    /// Whether this stream uses time-window pagination.
    #[must_use]
    pub fn is_windowed(&self) -> bool {
        matches!(self.params, ParamStrategy::WindowedMetrics { .. })
    }
}
