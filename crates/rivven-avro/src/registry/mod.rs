//! Schema registry gateways
//!
//! The gateway is the network boundary to the registry. It never caches;
//! memoization lives in [`crate::cache`].
//!
//! - [`HttpRegistry`]: Confluent-compatible REST registries (Confluent,
//!   Apicurio, rivven-schema)
//! - [`MemoryRegistry`]: in-process registry for development and tests

mod http;
mod memory;

pub use http::HttpRegistry;
pub use memory::MemoryRegistry;

use crate::error::Result;
use crate::types::{SchemaDocument, SchemaVersion, Subject};
use async_trait::async_trait;

/// Operations the transcoder needs from a schema registry
#[async_trait]
pub trait SchemaRegistryGateway: Send + Sync {
    /// Schema text registered as `version` of `subject`
    ///
    /// Fails with `SchemaNotFound` when the registry has no such version and
    /// `RegistryUnavailable` on transport errors.
    async fn fetch_schema(
        &self,
        subject: &Subject,
        version: SchemaVersion,
    ) -> Result<SchemaDocument>;

    /// Version under which `document` is registered for `subject`, if any
    async fn lookup(
        &self,
        subject: &Subject,
        document: &SchemaDocument,
    ) -> Result<Option<SchemaVersion>>;

    /// Register `document` under `subject` and return its version
    ///
    /// Registering an identical document again returns the existing version.
    async fn register(&self, subject: &Subject, document: &SchemaDocument)
        -> Result<SchemaVersion>;
}

#[async_trait]
impl<T: SchemaRegistryGateway + ?Sized> SchemaRegistryGateway for std::sync::Arc<T> {
    async fn fetch_schema(
        &self,
        subject: &Subject,
        version: SchemaVersion,
    ) -> Result<SchemaDocument> {
        (**self).fetch_schema(subject, version).await
    }

    async fn lookup(
        &self,
        subject: &Subject,
        document: &SchemaDocument,
    ) -> Result<Option<SchemaVersion>> {
        (**self).lookup(subject, document).await
    }

    async fn register(
        &self,
        subject: &Subject,
        document: &SchemaDocument,
    ) -> Result<SchemaVersion> {
        (**self).register(subject, document).await
    }
}

/// Run a registry call under a deadline
///
/// Expiry is reported as `RegistryUnavailable`; the call is dropped and has
/// no further effect.
pub(crate) async fn with_deadline<T, F>(
    timeout: std::time::Duration,
    operation: impl std::fmt::Display,
    call: F,
) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation = %operation,
                timeout_ms = timeout.as_millis() as u64,
                "Schema registry call timed out"
            );
            Err(crate::error::TranscodeError::RegistryUnavailable(format!(
                "{} timed out after {:?}",
                operation, timeout
            )))
        }
    }
}
