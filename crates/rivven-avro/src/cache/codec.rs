//! Compiled codec cache

use super::{CacheStats, MemoCache, SchemaCache};
use crate::avro::{AvroCodec, SchemaCompiler};
use crate::error::Result;
use crate::types::{SchemaDocument, SchemaIdentity};
use std::sync::Arc;
use tracing::debug;

/// Memoizes `SchemaIdentity -> AvroCodec`
///
/// Each identity is compiled at most once; concurrent misses share one
/// registry fetch and one compilation. Nothing is stored when the fetch or the
/// compilation fails.
pub struct CodecCache {
    schemas: Arc<SchemaCache>,
    compiler: Arc<dyn SchemaCompiler>,
    entries: MemoCache<SchemaIdentity, Arc<AvroCodec>>,
}

impl CodecCache {
    pub fn new(schemas: Arc<SchemaCache>, compiler: Arc<dyn SchemaCompiler>) -> Self {
        Self {
            schemas,
            compiler,
            entries: MemoCache::new(),
        }
    }

    /// Codec for `identity`, fetching and compiling its schema on first use
    pub async fn get_codec(&self, identity: &SchemaIdentity) -> Result<Arc<AvroCodec>> {
        self.entries
            .get_or_try_load(identity, || async {
                let document = self.schemas.get_schema(identity).await?;
                self.compile(identity, &document)
            })
            .await
    }

    /// Codec for `identity` compiled from a document the caller already holds
    ///
    /// Used on the encode path once the registry has confirmed the version of
    /// `document`. An existing entry for `identity` is reused as is.
    pub async fn get_or_compile(
        &self,
        identity: &SchemaIdentity,
        document: &SchemaDocument,
    ) -> Result<Arc<AvroCodec>> {
        self.entries
            .get_or_try_load(identity, || async { self.compile(identity, document) })
            .await
    }

    fn compile(
        &self,
        identity: &SchemaIdentity,
        document: &SchemaDocument,
    ) -> Result<Arc<AvroCodec>> {
        debug!(
            subject = %identity.subject,
            version = %identity.version,
            "Compiling schema"
        );
        self.compiler.compile(document).map(Arc::new)
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

    /// The schema cache this cache loads documents through
    pub fn schemas(&self) -> &Arc<SchemaCache> {
        &self.schemas
    }
}
