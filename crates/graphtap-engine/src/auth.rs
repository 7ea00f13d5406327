//! Per-account access token exchange.
//!
//! The configured user token is exchanged once per account id for a
//! page-scoped token before any stream runs. A failed exchange is fatal:
//! nothing under that account can be fetched without its token.

use std::collections::BTreeMap;

use graphtap_types::error::ExtractError;

use crate::config::TapConfig;
use crate::transport::Transport;

/// Exchange the configured token for a per-account token, for every
/// configured account id.
///
/// # Errors
///
/// Any non-success response or missing `access_token` field aborts the
/// whole run with a config-category error.
pub fn exchange_tokens(
    transport: &dyn Transport,
    config: &TapConfig,
) -> Result<BTreeMap<u64, String>, ExtractError> {
    let mut tokens = BTreeMap::new();
    for &user_id in &config.user_ids {
        tokens.insert(user_id, exchange_token(transport, config, user_id)?);
    }
    Ok(tokens)
}

fn exchange_token(
    transport: &dyn Transport,
    config: &TapConfig,
    user_id: u64,
) -> Result<String, ExtractError> {
    const STREAM: &str = "users";
    let url = format!("{}/{user_id}", config.api_base);
    let params = vec![
        ("fields".to_string(), "access_token,name".to_string()),
        ("access_token".to_string(), config.access_token.clone()),
    ];
    tracing::info!(user_id, "Exchanging access token");
    let resp = transport
        .execute("GET", &url, &params)
        .map_err(|e| ExtractError::transport(STREAM, e.message).into_fatal())?;
    if !(200..300).contains(&resp.status) {
        return Err(ExtractError::config(
            STREAM,
            format!(
                "token exchange for user {user_id} failed with status {}: {}",
                resp.status,
                resp.error_message().unwrap_or("no error detail")
            ),
        ));
    }
    let token = resp
        .body
        .get("access_token")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| {
            ExtractError::config(
                STREAM,
                format!("token exchange response for user {user_id} has no access_token"),
            )
        })?;
    tracing::info!(user_id, "Exchanged access token");
    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Response, TransportError};
    use serde_json::json;
    use std::cell::RefCell;

    struct OneShot {
        responses: RefCell<Vec<Response>>,
    }

    impl Transport for OneShot {
        fn execute(
            &self,
            _method: &str,
            _url: &str,
            _params: &[(String, String)],
        ) -> Result<Response, TransportError> {
            Ok(self.responses.borrow_mut().remove(0))
        }
    }

    fn config() -> TapConfig {
        TapConfig {
            access_token: "user-token".into(),
            user_ids: vec![17, 23],
            ..TapConfig::default()
        }
    }

    #[test]
    fn exchanges_one_token_per_account() {
        let transport = OneShot {
            responses: RefCell::new(vec![
                Response {
                    status: 200,
                    body: json!({"access_token": "page-17", "name": "A"}),
                },
                Response {
                    status: 200,
                    body: json!({"access_token": "page-23", "name": "B"}),
                },
            ]),
        };
        let tokens = exchange_tokens(&transport, &config()).unwrap();
        assert_eq!(tokens[&17], "page-17");
        assert_eq!(tokens[&23], "page-23");
    }

    #[test]
    fn failed_exchange_aborts_with_config_error() {
        let transport = OneShot {
            responses: RefCell::new(vec![Response {
                status: 400,
                body: json!({"error": {"message": "Invalid OAuth access token."}}),
            }]),
        };
        let err = exchange_tokens(&transport, &config()).unwrap_err();
        assert_eq!(err.category, graphtap_types::error::ErrorCategory::Config);
        assert!(err.message.contains("Invalid OAuth access token"));
    }

    #[test]
    fn missing_token_field_is_config_error() {
        let transport = OneShot {
            responses: RefCell::new(vec![Response {
                status: 200,
                body: json!({"name": "A"}),
            }]),
        };
        let err = exchange_tokens(&transport, &config()).unwrap_err();
        assert!(err.message.contains("no access_token"));
    }
}
