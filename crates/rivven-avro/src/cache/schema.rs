//! Schema document cache

use super::{CacheStats, MemoCache};
use crate::error::Result;
use crate::registry::{with_deadline, SchemaRegistryGateway};
use crate::types::{SchemaDocument, SchemaIdentity};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Memoizes `SchemaIdentity -> SchemaDocument` in front of a registry
///
/// Only successful fetches are stored. A fetch that fails, times out or is
/// cancelled leaves the cache unchanged and is retried by the next caller.
pub struct SchemaCache {
    registry: Arc<dyn SchemaRegistryGateway>,
    entries: MemoCache<SchemaIdentity, SchemaDocument>,
    timeout: Duration,
}

impl SchemaCache {
    pub fn new(registry: Arc<dyn SchemaRegistryGateway>, timeout: Duration) -> Self {
        Self {
            registry,
            entries: MemoCache::new(),
            timeout,
        }
    }

    /// Document for `identity`, fetched from the registry on first use
    pub async fn get_schema(&self, identity: &SchemaIdentity) -> Result<SchemaDocument> {
        self.entries
            .get_or_try_load(identity, || async {
                debug!(
                    subject = %identity.subject,
                    version = %identity.version,
                    "Schema cache miss, fetching from registry"
                );

                with_deadline(
                    self.timeout,
                    format!("fetching schema {}", identity),
                    self.registry
                        .fetch_schema(&identity.subject, identity.version),
                )
                .await
            })
            .await
    }

    pub fn contains(&self, identity: &SchemaIdentity) -> bool {
        self.entries.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.entries.stats()
    }

    pub fn registry(&self) -> &Arc<dyn SchemaRegistryGateway> {
        &self.registry
    }

    /// Deadline applied to each registry call
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TranscodeError;
    use crate::registry::MemoryRegistry;
    use crate::types::{SchemaVersion, Subject};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SCHEMA: &str =
        r#"{"type": "record", "name": "Order", "fields": [{"name": "id", "type": "long"}]}"#;

    struct SlowRegistry;

    #[async_trait]
    impl SchemaRegistryGateway for SlowRegistry {
        async fn fetch_schema(
            &self,
            _subject: &Subject,
            _version: SchemaVersion,
        ) -> Result<SchemaDocument> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(SCHEMA.into())
        }

        async fn lookup(
            &self,
            _subject: &Subject,
            _document: &SchemaDocument,
        ) -> Result<Option<SchemaVersion>> {
            Ok(None)
        }

        async fn register(
            &self,
            _subject: &Subject,
            _document: &SchemaDocument,
        ) -> Result<SchemaVersion> {
            Ok(SchemaVersion::new(1))
        }
    }

    struct CountingRegistry {
        inner: MemoryRegistry,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl SchemaRegistryGateway for CountingRegistry {
        async fn fetch_schema(
            &self,
            subject: &Subject,
            version: SchemaVersion,
        ) -> Result<SchemaDocument> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch_schema(subject, version).await
        }

        async fn lookup(
            &self,
            subject: &Subject,
            document: &SchemaDocument,
        ) -> Result<Option<SchemaVersion>> {
            self.inner.lookup(subject, document).await
        }

        async fn register(
            &self,
            subject: &Subject,
            document: &SchemaDocument,
        ) -> Result<SchemaVersion> {
            self.inner.register(subject, document).await
        }
    }

    #[tokio::test]
    async fn test_fetches_once_per_identity() {
        let registry = Arc::new(CountingRegistry {
            inner: MemoryRegistry::new(),
            fetches: AtomicUsize::new(0),
        });
        let subject = Subject::value("orders");
        let version = registry.register(&subject, &SCHEMA.into()).await.unwrap();

        let cache = SchemaCache::new(registry.clone(), Duration::from_secs(5));
        let identity = SchemaIdentity::new(subject, version);

        for _ in 0..10 {
            let doc = cache.get_schema(&identity).await.unwrap();
            assert_eq!(doc.as_str(), SCHEMA);
        }
        assert_eq!(registry.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_retried() {
        let registry = Arc::new(CountingRegistry {
            inner: MemoryRegistry::new(),
            fetches: AtomicUsize::new(0),
        });
        let cache = SchemaCache::new(registry.clone(), Duration::from_secs(5));
        let identity = SchemaIdentity::new("orders-value", 99);

        for attempt in 1..=2 {
            let err = cache.get_schema(&identity).await.unwrap_err();
            assert!(matches!(err, TranscodeError::SchemaNotFound { .. }));
            assert!(!cache.contains(&identity));
            assert_eq!(registry.fetches.load(Ordering::SeqCst), attempt);
        }
    }

    #[tokio::test]
    async fn test_timeout_is_registry_unavailable() {
        let cache = SchemaCache::new(Arc::new(SlowRegistry), Duration::from_millis(20));
        let identity = SchemaIdentity::new("orders-value", 1);

        let err = cache.get_schema(&identity).await.unwrap_err();
        assert!(matches!(err, TranscodeError::RegistryUnavailable(_)));
        assert!(err.is_retryable());
        assert!(cache.is_empty());
    }
}
