//! Stream-graph execution.
//!
//! Walks the catalog depth-first from each configured account: parent
//! pages are normalized and emitted, each parent row contributes a child
//! context, and child streams run once per context. Bookmarks advance in
//! two phases (staged while a unit is in flight, committed when it
//! completes) so an interrupted run replays from the last committed
//! cursor instead of losing or corrupting it. A fatal error inside one
//! context abandons that context's subtree and moves on; the run itself
//! keeps going.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use graphtap_state::StateStore;
use graphtap_types::context::{Context, ContextError, PartitionKey};
use graphtap_types::cursor::{parse_replication_value, Bookmark};
use graphtap_types::error::ExtractError;
use graphtap_types::row::Row;
use graphtap_types::stream::{ContextField, ParamStrategy, StreamDefinition};

use crate::auth::exchange_tokens;
use crate::catalog;
use crate::config::TapConfig;
use crate::normalize::normalize_page;
use crate::paginator::{PageRequest, Paginator};
use crate::sink::RecordSink;
use crate::transport::Transport;
use crate::window::plan_next_window;

/// Cooperative stop flag, checked between pages and between contexts.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. In-flight requests finish; nothing new starts.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Per-stream tallies for one run.
#[derive(Debug, Default, Clone)]
pub struct StreamSummary {
    pub rows: u64,
    pub pages: u64,
    pub contexts: u64,
    pub soft_skips: u64,
    pub failed_contexts: u64,
}

/// Outcome of one run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub streams: BTreeMap<String, StreamSummary>,
    pub errors: Vec<ExtractError>,
    pub cancelled: bool,
}

impl RunReport {
    /// True when every context of every stream completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.errors.is_empty()
    }

    pub fn total_rows(&self) -> u64 {
        self.streams.values().map(|s| s.rows).sum()
    }

    fn summary_mut(&mut self, stream: &str) -> &mut StreamSummary {
        self.streams.entry(stream.to_string()).or_default()
    }
}

/// Build a child stream's context from a parent row.
///
/// The child inherits every parent context field, then overlays the
/// declared mappings. Optional fields absent from the row map to null.
///
/// # Errors
///
/// Returns [`ContextError::MissingField`] when a required field is absent
/// from the parent row.
pub fn build_child_context(
    parent: &Context,
    fields: &[ContextField],
    row: &Row,
) -> Result<Context, ContextError> {
    let mut pairs: Vec<(String, Value)> =
        parent.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    for field in fields {
        let value = match row.get(field.record_field) {
            Some(v) => v.clone(),
            None if field.required => {
                return Err(ContextError::MissingField(field.record_field.to_string()))
            }
            None => Value::Null,
        };
        pairs.retain(|(k, _)| k != field.context_key);
        pairs.push((field.context_key.to_string(), value));
    }
    Ok(Context::from_fields(pairs))
}

/// Single-threaded stream-graph executor.
pub struct Executor<'a> {
    config: &'a TapConfig,
    transport: &'a dyn Transport,
    cancel: CancellationToken,
    selected: Option<Vec<String>>,
    now: DateTime<Utc>,
}

impl<'a> Executor<'a> {
    #[must_use]
    pub fn new(
        config: &'a TapConfig,
        transport: &'a dyn Transport,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            transport,
            cancel,
            selected: None,
            now: Utc::now(),
        }
    }

    /// Restrict the run to the named streams (ancestors still run to
    /// produce contexts, but only selected streams emit rows).
    #[must_use]
    pub fn with_streams(mut self, streams: Vec<String>) -> Self {
        self.selected = Some(streams);
        self
    }

    /// Pin the run's notion of "now". Windows and lookbacks derive from it.
    #[must_use]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    fn emits(&self, name: &str) -> bool {
        match &self.selected {
            None => true,
            Some(streams) => streams.iter().any(|s| s == name),
        }
    }

    /// A stream must run if it emits, or if any descendant does.
    fn is_needed(&self, def: &StreamDefinition) -> bool {
        self.emits(def.name) || catalog::children_of(def.name).any(|c| self.is_needed(c))
    }

    /// Run the full graph for every configured account.
    ///
    /// # Errors
    ///
    /// Fails on configuration problems (including token exchange) and on
    /// sink write failures. Per-context extraction failures are recorded
    /// in the report instead.
    pub fn run(
        &self,
        store: &mut dyn StateStore,
        sink: &mut dyn RecordSink,
    ) -> Result<RunReport> {
        if let Some(selected) = &self.selected {
            for name in selected {
                if catalog::stream(name).is_none() {
                    anyhow::bail!("unknown stream '{name}'");
                }
            }
        }

        let tokens = exchange_tokens(self.transport, self.config)?;

        let mut report = RunReport::default();
        for &user_id in &self.config.user_ids {
            let token = &tokens[&user_id];
            let ctx = Context::root(user_id);
            for root in catalog::roots() {
                if !self.is_needed(root) {
                    continue;
                }
                self.sync_stream(root, &ctx, token, store, sink, &mut report)?;
                if report.cancelled {
                    break;
                }
            }
            if report.cancelled {
                break;
            }
        }

        sink.write_state(&store.snapshot())?;
        Ok(report)
    }

    /// Run one stream for one context, then its children per child
    /// context. Errors scoped to this context are recorded, not returned.
    fn sync_stream(
        &self,
        def: &'static StreamDefinition,
        ctx: &Context,
        token: &str,
        store: &mut dyn StateStore,
        sink: &mut dyn RecordSink,
        report: &mut RunReport,
    ) -> Result<()> {
        if self.cancel.is_cancelled() {
            report.cancelled = true;
            return Ok(());
        }
        report.summary_mut(def.name).contexts += 1;

        let partition = match ctx.partition_key(def.state_partition_keys) {
            Ok(p) => p,
            Err(e) => {
                self.record_failure(
                    report,
                    def.name,
                    ExtractError::state(def.name, e.to_string())
                        .with_context(describe(ctx)),
                );
                return Ok(());
            }
        };

        let outcome = if def.is_windowed() {
            self.sync_windowed(def, ctx, &partition, token, store, sink, report)
        } else {
            self.sync_paged(def, ctx, &partition, token, store, sink, report)
        };
        match outcome {
            Ok(()) => Ok(()),
            Err(SyncError::Extract(err)) => {
                self.record_failure(report, def.name, err);
                Ok(())
            }
            Err(SyncError::Abort(err)) => Err(err),
        }
    }

    /// Ordinary record stream: one page sequence, children after each page.
    fn sync_paged(
        &self,
        def: &'static StreamDefinition,
        ctx: &Context,
        partition: &PartitionKey,
        token: &str,
        store: &mut dyn StateStore,
        sink: &mut dyn RecordSink,
        report: &mut RunReport,
    ) -> Result<(), SyncError> {
        let request = PageRequest {
            url: self.endpoint(def, ctx)?,
            params: self.base_params(def, ctx, partition, token, store)?,
        };
        let mut paginator = Paginator::new(
            self.transport,
            def.name,
            describe(ctx),
            request,
            self.config.max_retries,
        );

        while let Some(page) = paginator.next() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                return Ok(());
            }
            let page = page.map_err(SyncError::Extract)?;
            report.summary_mut(def.name).pages += 1;

            let rows = normalize_page(def, &page);
            let mut child_contexts: Vec<Context> = Vec::new();
            let spawn_children = catalog::children_of(def.name).any(|c| self.is_needed(c));

            for row in &rows {
                if self.emits(def.name) {
                    sink.write_row(def.name, row).map_err(SyncError::Abort)?;
                    report.summary_mut(def.name).rows += 1;
                }
                // Unselected ancestors only contribute contexts; advancing
                // their cursor would skip their rows on a later full run.
                if self.emits(def.name) {
                    if let Some(key) = def.replication_key {
                        self.stage_row_cursor(def, partition, row, key, store);
                    }
                }
                if spawn_children && !def.child_context.is_empty() {
                    match build_child_context(ctx, def.child_context, row) {
                        Ok(child) => child_contexts.push(child),
                        Err(e) => {
                            tracing::warn!(
                                stream = def.name,
                                "Skipping child context for a row: {e}"
                            );
                        }
                    }
                }
            }

            if def.is_incremental() && self.emits(def.name) {
                store.commit(def.name, partition);
                sink.write_state(&store.snapshot()).map_err(SyncError::Abort)?;
            }

            for child in &child_contexts {
                for child_def in catalog::children_of(def.name) {
                    if !self.is_needed(child_def) {
                        continue;
                    }
                    self.sync_stream(child_def, child, token, store, sink, report)
                        .map_err(SyncError::Abort)?;
                    if report.cancelled {
                        return Ok(());
                    }
                }
            }
        }
        if paginator.soft_skipped() {
            report.summary_mut(def.name).soft_skips += 1;
        }
        Ok(())
    }

    /// Windowed metric stream: repeat plan/fetch/commit until caught up.
    fn sync_windowed(
        &self,
        def: &'static StreamDefinition,
        ctx: &Context,
        partition: &PartitionKey,
        token: &str,
        store: &mut dyn StateStore,
        sink: &mut dyn RecordSink,
        report: &mut RunReport,
    ) -> Result<(), SyncError> {
        let ParamStrategy::WindowedMetrics {
            metrics,
            period,
            window: spec,
        } = def.params
        else {
            unreachable!("sync_windowed called for a non-windowed stream");
        };

        loop {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                return Ok(());
            }
            let bookmark = self.effective_bookmark(def, partition, store);
            if bookmark.is_none() {
                // Fires once per partition: the first commit creates the cursor.
                tracing::warn!(
                    stream = def.name,
                    partition = %partition,
                    max_history_days = spec.max_history_days,
                    "No stored cursor; replaying the full allowed history"
                );
            }
            let Some(window) = plan_next_window(bookmark.as_ref(), &spec, self.now) else {
                break;
            };
            tracing::debug!(
                stream = def.name,
                partition = %partition,
                since = %window.since,
                until = %window.until,
                "Fetching metrics window"
            );

            let mut params = vec![
                ("access_token".to_string(), token.to_string()),
                ("metric".to_string(), metrics.join(",")),
                ("period".to_string(), period.to_string()),
                ("since".to_string(), window.since.timestamp().to_string()),
                ("until".to_string(), window.until.timestamp().to_string()),
            ];
            if let Some(key) = def.replication_key {
                params.push(("sort".to_string(), "asc".to_string()));
                params.push(("order_by".to_string(), key.to_string()));
            }
            let request = PageRequest {
                url: self.endpoint(def, ctx)?,
                params,
            };

            let mut paginator = Paginator::new(
                self.transport,
                def.name,
                describe(ctx),
                request,
                self.config.max_retries,
            );
            while let Some(page) = paginator.next() {
                let page = page.map_err(SyncError::Extract)?;
                report.summary_mut(def.name).pages += 1;
                for row in normalize_page(def, &page) {
                    if self.emits(def.name) {
                        sink.write_row(def.name, &row).map_err(SyncError::Abort)?;
                        report.summary_mut(def.name).rows += 1;
                    }
                }
            }
            if paginator.soft_skipped() {
                report.summary_mut(def.name).soft_skips += 1;
            }

            // The whole window landed; move the cursor to its end so the
            // next plan starts after it even when the window was empty.
            store.advance(def.name, partition, window.until);
            store.commit(def.name, partition);
            sink.write_state(&store.snapshot()).map_err(SyncError::Abort)?;
        }
        Ok(())
    }

    fn endpoint(&self, def: &StreamDefinition, ctx: &Context) -> Result<String, SyncError> {
        let path = ctx.resolve_path(def.path).map_err(|e| {
            SyncError::Extract(
                ExtractError::config(def.name, e.to_string()).with_context(describe(ctx)),
            )
        })?;
        Ok(format!("{}{}", self.config.api_base, path))
    }

    fn base_params(
        &self,
        def: &StreamDefinition,
        ctx: &Context,
        partition: &PartitionKey,
        token: &str,
        store: &dyn StateStore,
    ) -> Result<Vec<(String, String)>, SyncError> {
        let mut params = vec![("access_token".to_string(), token.to_string())];
        if let Some(key) = def.replication_key {
            params.push(("sort".to_string(), "asc".to_string()));
            params.push(("order_by".to_string(), key.to_string()));
        }
        match def.params {
            ParamStrategy::Fields { fields } => {
                params.push(("fields".to_string(), fields.join(",")));
            }
            ParamStrategy::FieldsWithLookback { fields } => {
                params.push(("fields".to_string(), fields.join(",")));
                if let Some(bookmark) = self.effective_bookmark(def, partition, store) {
                    let since = bookmark.replication_value
                        - Duration::days(i64::from(self.config.media_lookback_days));
                    params.push(("since".to_string(), since.timestamp().to_string()));
                }
            }
            ParamStrategy::MediaMetrics => {
                let media_type = ctx.get_str("media_type").ok_or_else(|| {
                    SyncError::Extract(
                        ExtractError::config(def.name, "context has no media_type")
                            .with_context(describe(ctx)),
                    )
                })?;
                let metrics = catalog::metrics_for_media(
                    def.name,
                    media_type,
                    ctx.get_str("media_product_type"),
                )
                .map_err(|e| SyncError::Extract(e.with_context(describe(ctx))))?;
                params.push(("metric".to_string(), metrics.join(",")));
            }
            ParamStrategy::LifetimeMetrics { metrics, period } => {
                params.push(("metric".to_string(), metrics.join(",")));
                params.push(("period".to_string(), period.to_string()));
            }
            ParamStrategy::WindowedMetrics { .. } => {
                unreachable!("windowed streams build params per window")
            }
        }
        Ok(params)
    }

    /// Committed bookmark for (stream, partition), falling back to the
    /// configured start date.
    fn effective_bookmark(
        &self,
        def: &StreamDefinition,
        partition: &PartitionKey,
        store: &dyn StateStore,
    ) -> Option<Bookmark> {
        store.get(def.name, partition).or_else(|| {
            self.config.start_date.map(|start| Bookmark {
                replication_value: start,
            })
        })
    }

    /// Stage the row's replication value; commit happens per page.
    fn stage_row_cursor(
        &self,
        def: &StreamDefinition,
        partition: &PartitionKey,
        row: &Row,
        key: &str,
        store: &mut dyn StateStore,
    ) {
        let Some(Value::String(raw)) = row.get(key) else {
            return;
        };
        match parse_replication_value(raw) {
            Some(ts) => store.advance(def.name, partition, ts),
            None => {
                tracing::warn!(
                    stream = def.name,
                    value = raw.as_str(),
                    "Row has unparseable replication value; bookmark not advanced"
                );
            }
        }
    }

    fn record_failure(&self, report: &mut RunReport, stream: &str, err: ExtractError) {
        tracing::error!(stream, "Context failed: {err}");
        report.summary_mut(stream).failed_contexts += 1;
        report.errors.push(err);
    }
}

/// Internal split between errors scoped to one context and errors that
/// must abort the run (sink failures).
enum SyncError {
    Extract(ExtractError),
    Abort(anyhow::Error),
}

/// Stable human-readable context description used in errors and logs.
fn describe(ctx: &Context) -> String {
    ctx.partition_key(None)
        .map(|k| k.as_key())
        .unwrap_or_else(|_| "<unresolvable>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn child_context_projects_declared_fields_over_parent() {
        let parent = Context::root(42);
        let row: Row = json!({"id": "123", "media_type": "VIDEO", "like_count": 7})
            .as_object()
            .unwrap()
            .clone();
        let fields = [
            ContextField {
                context_key: "media_id",
                record_field: "id",
                required: true,
            },
            ContextField {
                context_key: "media_type",
                record_field: "media_type",
                required: true,
            },
            ContextField {
                context_key: "media_product_type",
                record_field: "media_product_type",
                required: false,
            },
        ];
        let child = build_child_context(&parent, &fields, &row).unwrap();
        assert_eq!(child.get_str("user_id"), Some("42"));
        assert_eq!(child.get_str("media_id"), Some("123"));
        assert_eq!(child.get_str("media_type"), Some("VIDEO"));
        assert_eq!(child.get("media_product_type"), Some(&Value::Null));
        // Row fields not declared in the mapping never leak through.
        assert!(child.get("like_count").is_none());
    }

    #[test]
    fn child_context_missing_required_field_errors() {
        let parent = Context::root(42);
        let row: Row = json!({"media_type": "VIDEO"}).as_object().unwrap().clone();
        let fields = [ContextField {
            context_key: "media_id",
            record_field: "id",
            required: true,
        }];
        let err = build_child_context(&parent, &fields, &row).unwrap_err();
        assert_eq!(err, ContextError::MissingField("id".into()));
    }

    #[test]
    fn cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn report_success_requires_no_errors_and_no_cancel() {
        let mut report = RunReport::default();
        assert!(report.is_success());
        report.errors.push(ExtractError::server("media", 500, "x"));
        assert!(!report.is_success());
    }
}
