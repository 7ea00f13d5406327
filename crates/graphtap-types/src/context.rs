//! Extraction contexts and bookmark partition keys.
//!
//! A [`Context`] is the immutable mapping threaded from a parent record into
//! its child streams' requests. Created fresh per parent record, passed down
//! one level, never mutated after creation.

use serde_json::Value;

/// Errors raised when projecting a context.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContextError {
    /// A declared field is absent from the context.
    #[error("context is missing required field '{0}'")]
    MissingField(String),
}

/// Immutable request context produced by a parent record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Context {
    fields: serde_json::Map<String, Value>,
}

impl Context {
    /// Root context for a top-level account id.
    #[must_use]
    pub fn root(user_id: u64) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert("user_id".into(), Value::String(user_id.to_string()));
        Self { fields }
    }

    /// Build a context from explicit key/value pairs.
    #[must_use]
    pub fn from_fields(pairs: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            fields: pairs.into_iter().collect(),
        }
    }

    /// Look up a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Look up a field as a string slice.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Iterate fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the context carries no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Resolve `{placeholder}` segments of a path template against this
    /// context.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::MissingField`] if a placeholder names a field
    /// the context does not carry.
    pub fn resolve_path(&self, template: &str) -> Result<String, ContextError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open + 1..];
            let close = tail
                .find('}')
                .ok_or_else(|| ContextError::MissingField(tail.to_string()))?;
            let key = &tail[..close];
            let value = self
                .get(key)
                .ok_or_else(|| ContextError::MissingField(key.to_string()))?;
            match value {
                Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
            rest = &tail[close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Project this context onto the declared partition fields.
    ///
    /// `keys = None` partitions by the full context (all fields, insertion
    /// order). A narrower list lets nested streams share one bookmark across
    /// many same-ancestor contexts.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::MissingField`] if a declared partition field
    /// is absent.
    pub fn partition_key(&self, keys: Option<&[&str]>) -> Result<PartitionKey, ContextError> {
        let mut parts = Vec::new();
        match keys {
            Some(declared) => {
                for key in declared {
                    let value = self
                        .get(key)
                        .ok_or_else(|| ContextError::MissingField((*key).to_string()))?;
                    parts.push(((*key).to_string(), render(value)));
                }
            }
            None => {
                for (key, value) in self.iter() {
                    parts.push((key.clone(), render(value)));
                }
            }
        }
        Ok(PartitionKey::new(parts))
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Bookmark partition key: an ordered tuple of (field, value) pairs derived
/// from a context.
///
/// Serialized as `field=value` pairs joined by `&` so it can key nested
/// JSON state maps deterministically. An empty tuple (global bookmark)
/// serializes as `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    parts: Vec<(String, String)>,
}

impl PartitionKey {
    /// Build from ordered (field, value) pairs.
    #[must_use]
    pub fn new(parts: Vec<(String, String)>) -> Self {
        Self { parts }
    }

    /// The global (unpartitioned) key.
    #[must_use]
    pub fn global() -> Self {
        Self { parts: Vec::new() }
    }

    /// Stable string form used as a state-map key.
    #[must_use]
    pub fn as_key(&self) -> String {
        if self.parts.is_empty() {
            return "*".to_string();
        }
        self.parts
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn media_context() -> Context {
        Context::from_fields([
            ("user_id".to_string(), json!("17841400000000000")),
            ("media_id".to_string(), json!("123")),
            ("media_type".to_string(), json!("VIDEO")),
        ])
    }

    #[test]
    fn resolve_path_substitutes_placeholders() {
        let ctx = media_context();
        let path = ctx.resolve_path("/{media_id}/insights").unwrap();
        assert_eq!(path, "/123/insights");
    }

    #[test]
    fn resolve_path_missing_field_errors() {
        let ctx = Context::root(42);
        let err = ctx.resolve_path("/{media_id}/children").unwrap_err();
        assert_eq!(err, ContextError::MissingField("media_id".into()));
    }

    #[test]
    fn partition_key_projects_declared_fields_only() {
        let ctx = media_context();
        let key = ctx.partition_key(Some(&["user_id"])).unwrap();
        assert_eq!(key.as_key(), "user_id=17841400000000000");
    }

    #[test]
    fn partition_key_full_context_preserves_insertion_order() {
        let ctx = media_context();
        let key = ctx.partition_key(None).unwrap();
        assert_eq!(
            key.as_key(),
            "user_id=17841400000000000&media_id=123&media_type=VIDEO"
        );
    }

    #[test]
    fn partition_key_missing_declared_field_errors() {
        let ctx = Context::root(42);
        let err = ctx.partition_key(Some(&["media_id"])).unwrap_err();
        assert_eq!(err, ContextError::MissingField("media_id".into()));
    }

    #[test]
    fn global_partition_key_is_star() {
        assert_eq!(PartitionKey::global().as_key(), "*");
    }

    #[test]
    fn root_context_carries_user_id_as_string() {
        let ctx = Context::root(17_841_400_000_000_000);
        assert_eq!(ctx.get_str("user_id"), Some("17841400000000000"));
    }
}
