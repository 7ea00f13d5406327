use std::path::Path;

use anyhow::{Context, Result};

use graphtap_engine::auth::exchange_tokens;
use graphtap_engine::config::parse_config;
use graphtap_engine::HttpTransport;

/// Execute the `check` command: validate config and confirm a token can
/// be exchanged for every configured account.
pub fn execute(config_path: &Path) -> Result<()> {
    let config = parse_config(config_path)
        .with_context(|| format!("Failed to parse config: {}", config_path.display()))?;
    println!("Config structure: OK");

    let transport = HttpTransport::new(
        std::time::Duration::from_secs(config.timeout_seconds),
        config.user_agent.as_deref(),
    )?;

    match exchange_tokens(&transport, &config) {
        Ok(tokens) => {
            for user_id in tokens.keys() {
                println!("Account {user_id}:  OK");
            }
            println!("\nAll checks passed.");
            Ok(())
        }
        Err(err) => {
            anyhow::bail!("Token exchange failed: {err}")
        }
    }
}
