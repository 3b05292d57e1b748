//! Key naming: every key is `<domain>:<type>:<id>[:<field>]`

use crate::error::{CacheError, Result};
use crate::types::CacheKey;

/// Domain for user sessions
pub const SESSION_DOMAIN: &str = "session";

/// Domain for content engagement counters
pub const CONTENT_DOMAIN: &str = "content";

/// Domain for cached leaderboards
pub const RANKING_DOMAIN: &str = "ranking";

const SEPARATOR: char = ':';

/// Cache key builder for namespaced keys
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    domain: String,
    kind: Option<String>,
    id: Option<String>,
    field: Option<String>,
}

impl KeyBuilder {
    /// Create a new key builder for `domain`
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            kind: None,
            id: None,
            field: None,
        }
    }

    /// Set the type component
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Set the id component
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the optional trailing field component
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Build the cache key
    pub fn build(self) -> Result<CacheKey> {
        let kind = self
            .kind
            .ok_or_else(|| CacheError::InvalidArgument("key type is required".to_string()))?;
        let id = self
            .id
            .ok_or_else(|| CacheError::InvalidArgument("key id is required".to_string()))?;

        check_component("domain", &self.domain)?;
        check_component("type", &kind)?;
        check_component("id", &id)?;

        let mut key = format!("{}{sep}{}{sep}{}", self.domain, kind, id, sep = SEPARATOR);
        if let Some(field) = self.field {
            check_component("field", &field)?;
            key.push(SEPARATOR);
            key.push_str(&field);
        }

        Ok(key)
    }
}

fn check_component(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CacheError::InvalidArgument(format!(
            "key {} must not be empty",
            name
        )));
    }
    if value.contains(SEPARATOR) {
        return Err(CacheError::InvalidArgument(format!(
            "key {} '{}' must not contain '{}'",
            name, value, SEPARATOR
        )));
    }
    Ok(())
}

/// `session:data:<sessionId>`
pub fn session_key(session_id: &str) -> Result<CacheKey> {
    KeyBuilder::new(SESSION_DOMAIN).kind("data").id(session_id).build()
}

/// `session:user:<userId>`, the per-user session index
pub fn user_sessions_key(user_id: &str) -> Result<CacheKey> {
    KeyBuilder::new(SESSION_DOMAIN).kind("user").id(user_id).build()
}

/// `content:stats:<type>:<id>`
pub fn content_stats_key(content_type: &str, content_id: &str) -> Result<CacheKey> {
    KeyBuilder::new(CONTENT_DOMAIN)
        .kind("stats")
        .id(content_type)
        .field(content_id)
        .build()
}

/// `content:index:<type>`, the set of content ids with counters
pub fn content_index_key(content_type: &str) -> Result<CacheKey> {
    KeyBuilder::new(CONTENT_DOMAIN).kind("index").id(content_type).build()
}

/// `ranking:hot:<type>`
pub fn hot_ranking_key(content_type: &str) -> Result<CacheKey> {
    KeyBuilder::new(RANKING_DOMAIN).kind("hot").id(content_type).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builder() {
        let key = KeyBuilder::new("content")
            .kind("stats")
            .id("work")
            .field("w1")
            .build()
            .unwrap();
        assert_eq!(key, "content:stats:work:w1");

        let key = KeyBuilder::new("session").kind("user").id("u1").build().unwrap();
        assert_eq!(key, "session:user:u1");
    }

    #[test]
    fn test_key_builder_rejects_bad_components() {
        assert!(KeyBuilder::new("session").id("u1").build().is_err());
        assert!(KeyBuilder::new("session").kind("user").build().is_err());
        assert!(KeyBuilder::new("").kind("user").id("u1").build().is_err());
        assert!(KeyBuilder::new("session").kind("user").id("").build().is_err());
        assert!(matches!(
            KeyBuilder::new("session").kind("user").id("a:b").build(),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_domain_keys() {
        assert_eq!(session_key("abc").unwrap(), "session:data:abc");
        assert_eq!(user_sessions_key("u1").unwrap(), "session:user:u1");
        assert_eq!(content_index_key("work").unwrap(), "content:index:work");
        assert_eq!(hot_ranking_key("work").unwrap(), "ranking:hot:work");
    }
}
