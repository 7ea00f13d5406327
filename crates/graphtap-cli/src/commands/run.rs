use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};

use graphtap_engine::config::parse_config;
use graphtap_engine::{CancellationToken, Executor, HttpTransport, JsonlSink};
use graphtap_state::{MemoryStateStore, StateSnapshot, StateStore};

/// Execute the `run` command: extract every selected stream for every
/// configured account.
pub fn execute(
    config_path: &Path,
    state_path: Option<&Path>,
    streams: Option<Vec<String>>,
) -> Result<()> {
    let config = parse_config(config_path)
        .with_context(|| format!("Failed to parse config: {}", config_path.display()))?;

    let snapshot = match state_path {
        Some(path) if path.exists() => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read state file: {}", path.display()))?;
            StateSnapshot::from_json(&raw)
                .with_context(|| format!("Failed to parse state file: {}", path.display()))?
        }
        _ => StateSnapshot::default(),
    };
    let mut store = MemoryStateStore::from_snapshot(&snapshot);

    tracing::info!(
        accounts = config.user_ids.len(),
        lookback_days = config.media_lookback_days,
        "Config loaded"
    );

    let transport = HttpTransport::new(
        std::time::Duration::from_secs(config.timeout_seconds),
        config.user_agent.as_deref(),
    )?;
    let cancel = CancellationToken::new();
    let mut executor = Executor::new(&config, &transport, cancel);
    if let Some(streams) = streams {
        executor = executor.with_streams(streams);
    }

    let stdout = std::io::stdout();
    let mut sink = JsonlSink::new(std::io::BufWriter::new(stdout.lock()));

    let started = Instant::now();
    let report = executor.run(&mut store, &mut sink)?;
    sink.into_inner()?;

    if let Some(path) = state_path {
        std::fs::write(path, store.snapshot().to_json()?)
            .with_context(|| format!("Failed to save state file: {}", path.display()))?;
    }

    eprintln!("Extraction finished in {:.2}s", started.elapsed().as_secs_f64());
    for (name, summary) in &report.streams {
        eprintln!(
            "  {name:32} {} rows, {} pages, {} contexts{}{}",
            summary.rows,
            summary.pages,
            summary.contexts,
            plural(summary.soft_skips, " skipped"),
            plural(summary.failed_contexts, " failed"),
        );
    }
    eprintln!("  total rows: {}", report.total_rows());

    if report.is_success() {
        Ok(())
    } else if report.cancelled {
        anyhow::bail!("Extraction cancelled")
    } else {
        anyhow::bail!("{} context(s) failed; see log for details", report.errors.len())
    }
}

fn plural(count: u64, suffix: &str) -> String {
    if count == 0 {
        String::new()
    } else {
        format!(", {count}{suffix}")
    }
}
