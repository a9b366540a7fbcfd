//! Stream registry implementation
//!
//! Maps application names to live streams. One publisher per application;
//! a second publish attempt on an occupied name is rejected rather than
//! taking the stream over.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::error::RegistryError;
use super::stream::{Stream, DEFAULT_GOP_CAPACITY};

/// Central registry for all active streams
pub struct StreamRegistry {
    streams: RwLock<HashMap<String, Arc<Stream>>>,
    gop_capacity: usize,
}

impl StreamRegistry {
    /// Create a registry with the default GOP cache capacity
    pub fn new() -> Self {
        Self::with_gop_capacity(DEFAULT_GOP_CAPACITY)
    }

    /// Create a registry with a custom GOP cache capacity
    pub fn with_gop_capacity(gop_capacity: usize) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            gop_capacity,
        }
    }

    /// Register a publisher under its application name, creating the stream
    ///
    /// `stream_key` is the secret from the publish command; it names nothing
    /// here, subscribers resolve streams by `app` alone.
    pub async fn publish(
        &self,
        app: &str,
        stream_key: &str,
        publisher_id: u64,
    ) -> Result<Arc<Stream>, RegistryError> {
        let mut streams = self.streams.write().await;
        if streams.contains_key(app) {
            return Err(RegistryError::AlreadyPublishing(app.to_string()));
        }

        let stream = Arc::new(Stream::new(app, stream_key, publisher_id, self.gop_capacity));
        streams.insert(app.to_string(), Arc::clone(&stream));

        tracing::info!(stream = app, session_id = publisher_id, "Publisher registered");
        Ok(stream)
    }

    /// Look up a stream by name
    pub async fn get(&self, name: &str) -> Option<Arc<Stream>> {
        self.streams.read().await.get(name).cloned()
    }

    /// Remove `name` if it is owned by `publisher_id`
    ///
    /// Returns the removed stream so the caller can close it. A mismatched
    /// id leaves the registry untouched; a stale disconnect must not tear
    /// down a stream that was never that session's.
    pub async fn unpublish(&self, name: &str, publisher_id: u64) -> Option<Arc<Stream>> {
        let mut streams = self.streams.write().await;
        match streams.get(name) {
            Some(stream) if stream.publisher_id() == publisher_id => {
                let stream = streams.remove(name);
                tracing::info!(stream = name, session_id = publisher_id, "Publisher removed");
                stream
            }
            Some(stream) => {
                tracing::warn!(
                    stream = name,
                    expected = stream.publisher_id(),
                    actual = publisher_id,
                    "Unpublish by non-owner ignored"
                );
                None
            }
            None => None,
        }
    }

    /// Number of active streams
    pub async fn len(&self) -> usize {
        self.streams.read().await.len()
    }

    /// Check whether no streams are active
    pub async fn is_empty(&self) -> bool {
        self.streams.read().await.is_empty()
    }

    /// Names of all active streams
    pub async fn stream_names(&self) -> Vec<String> {
        self.streams.read().await.keys().cloned().collect()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registered_under_app_not_key() {
        let registry = StreamRegistry::new();
        let stream = registry.publish("live", "secret", 1).await.unwrap();

        assert_eq!(stream.name(), "live");
        assert_eq!(stream.stream_key(), "secret");
        assert!(registry.get("live").await.is_some());
        // the key is a secret, not an address
        assert!(registry.get("secret").await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_second_publisher_rejected() {
        let registry = StreamRegistry::new();
        registry.publish("live", "secret", 1).await.unwrap();

        let result = registry.publish("live", "other", 2).await;
        assert_eq!(
            result.unwrap_err(),
            RegistryError::AlreadyPublishing("live".to_string())
        );
        // original publisher untouched
        assert_eq!(registry.get("live").await.unwrap().publisher_id(), 1);
    }

    #[tokio::test]
    async fn test_unpublish_requires_owner() {
        let registry = StreamRegistry::new();
        registry.publish("live", "secret", 1).await.unwrap();

        assert!(registry.unpublish("live", 99).await.is_none());
        assert_eq!(registry.len().await, 1);

        assert!(registry.unpublish("live", 1).await.is_some());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_name_free_after_unpublish() {
        let registry = StreamRegistry::new();
        registry.publish("live", "secret", 1).await.unwrap();
        registry.unpublish("live", 1).await;

        assert!(registry.publish("live", "other", 2).await.is_ok());
    }

    #[tokio::test]
    async fn test_stream_names() {
        let registry = StreamRegistry::new();
        registry.publish("a", "secret", 1).await.unwrap();
        registry.publish("b", "secret", 2).await.unwrap();

        let mut names = registry.stream_names().await;
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
