//! Kafka message transcoder
//!
//! Converts between Confluent-framed Avro payloads and JSON documents.
//!
//! # Example
//!
//! ```rust,ignore
//! use rivven_avro::{MessageTranscoder, TranscoderConfig};
//!
//! let transcoder = MessageTranscoder::from_config(
//!     &TranscoderConfig::new("http://localhost:8081"),
//! )?;
//!
//! // consumer side
//! let order = transcoder.decode("orders", false, &payload).await?;
//!
//! // producer side
//! let bytes = transcoder
//!     .encode("orders", false, &schema, &order, true)
//!     .await?;
//! ```

use crate::avro::{AvroCodec, AvroCompiler, SchemaCompiler};
use crate::cache::{CodecCache, SchemaCache};
use crate::config::TranscoderConfig;
use crate::error::{Result, TranscodeError};
use crate::registry::{with_deadline, HttpRegistry, SchemaRegistryGateway};
use crate::subject::{SubjectNameStrategy, TopicNameStrategy};
use crate::types::{SchemaDocument, SchemaIdentity, SchemaVersion, Subject};
use crate::wire::{parse_header, WireHeader, HEADER_LEN};
use bytes::{Bytes, BytesMut};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::debug;

/// Transcodes Kafka payloads using schemas held in a registry
///
/// Decoding resolves the writer schema from the payload header; encoding
/// registers or looks up the caller's schema. Compiled codecs are cached for
/// the lifetime of the transcoder and shared by all concurrent callers.
pub struct MessageTranscoder {
    strategy: Arc<dyn SubjectNameStrategy>,
    registry: Arc<dyn SchemaRegistryGateway>,
    codecs: CodecCache,
    config: TranscoderConfig,
}

impl std::fmt::Debug for MessageTranscoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageTranscoder")
            .field("config", &self.config)
            .field("cached_codecs", &self.codecs.len())
            .finish()
    }
}

impl MessageTranscoder {
    /// Start building a transcoder on top of `registry`
    pub fn builder(registry: impl SchemaRegistryGateway + 'static) -> MessageTranscoderBuilder {
        MessageTranscoderBuilder::new(Arc::new(registry))
    }

    /// Transcoder backed by the HTTP registry named in `config`
    pub fn from_config(config: &TranscoderConfig) -> Result<Self> {
        config.validate()?;
        let registry = HttpRegistry::new(&config.registry)?;
        Ok(Self::builder(registry).config(config.clone()).build())
    }

    /// Decode a framed payload read from `topic`
    ///
    /// Bytes following the datum are ignored; use
    /// [`decode_with_remainder`](Self::decode_with_remainder) to see them.
    pub async fn decode(&self, topic: &str, is_key: bool, payload: &[u8]) -> Result<JsonValue> {
        self.decode_with_remainder(topic, is_key, payload)
            .await
            .map(|(value, _)| value)
    }

    /// Decode a framed payload and return the bytes left after the datum
    pub async fn decode_with_remainder<'a>(
        &self,
        topic: &str,
        is_key: bool,
        payload: &'a [u8],
    ) -> Result<(JsonValue, &'a [u8])> {
        let (header, body) = parse_header(payload)?;
        let subject = self.strategy.subject_name(topic, is_key);
        let identity = SchemaIdentity::new(subject, header.version);

        let codec = self.codecs.get_codec(&identity).await?;
        let (value, consumed) = codec.decode_datum(body)?;
        Ok((value, &body[consumed..]))
    }

    /// Decode a record key read from `topic`
    pub async fn decode_key(&self, topic: &str, payload: &[u8]) -> Result<JsonValue> {
        self.decode(topic, true, payload).await
    }

    /// Decode a record value read from `topic`
    pub async fn decode_value(&self, topic: &str, payload: &[u8]) -> Result<JsonValue> {
        self.decode(topic, false, payload).await
    }

    /// Encode `value` with `document` as the writer schema
    ///
    /// With `auto_register` the document is registered under the topic's
    /// subject (a no-op if already present). Without it the document must
    /// already be registered, otherwise `SchemaNotRegistered` is returned and
    /// nothing is encoded.
    pub async fn encode(
        &self,
        topic: &str,
        is_key: bool,
        document: &SchemaDocument,
        value: &JsonValue,
        auto_register: bool,
    ) -> Result<Bytes> {
        self.resolve(topic, is_key, document, auto_register)
            .await?
            .encode(value)
    }

    /// [`encode`](Self::encode) using the configured auto-register setting
    pub async fn encode_with_config(
        &self,
        topic: &str,
        is_key: bool,
        document: &SchemaDocument,
        value: &JsonValue,
    ) -> Result<Bytes> {
        self.encode(topic, is_key, document, value, self.config.auto_register)
            .await
    }

    /// Encoder bound to one subject and schema
    ///
    /// The registry is consulted once here; the returned encoder frames any
    /// number of values without further registry calls.
    pub async fn subject_encoder(
        &self,
        topic: &str,
        is_key: bool,
        document: &SchemaDocument,
        auto_register: bool,
    ) -> Result<SubjectEncoder> {
        self.resolve(topic, is_key, document, auto_register).await
    }

    async fn resolve(
        &self,
        topic: &str,
        is_key: bool,
        document: &SchemaDocument,
        auto_register: bool,
    ) -> Result<SubjectEncoder> {
        let subject = self.strategy.subject_name(topic, is_key);
        let version = self
            .resolve_version(&subject, document, auto_register)
            .await?;
        let identity = SchemaIdentity::new(subject, version);

        let codec = self.codecs.get_or_compile(&identity, document).await?;
        Ok(SubjectEncoder { identity, codec })
    }

    async fn resolve_version(
        &self,
        subject: &Subject,
        document: &SchemaDocument,
        auto_register: bool,
    ) -> Result<SchemaVersion> {
        let timeout = self.config.registry_timeout();

        if auto_register {
            return with_deadline(
                timeout,
                format!("registering schema under {}", subject),
                self.registry.register(subject, document),
            )
            .await;
        }

        let found = with_deadline(
            timeout,
            format!("looking up schema under {}", subject),
            self.registry.lookup(subject, document),
        )
        .await?;

        match found {
            Some(version) => {
                debug!(subject = %subject, version = %version, "Schema already registered");
                Ok(version)
            }
            None => Err(TranscodeError::SchemaNotRegistered {
                subject: subject.clone(),
            }),
        }
    }

    pub fn config(&self) -> &TranscoderConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<dyn SchemaRegistryGateway> {
        &self.registry
    }

    pub fn codec_cache(&self) -> &CodecCache {
        &self.codecs
    }

    pub fn schema_cache(&self) -> &Arc<SchemaCache> {
        self.codecs.schemas()
    }
}

/// Builder for [`MessageTranscoder`]
pub struct MessageTranscoderBuilder {
    registry: Arc<dyn SchemaRegistryGateway>,
    strategy: Arc<dyn SubjectNameStrategy>,
    compiler: Arc<dyn SchemaCompiler>,
    config: TranscoderConfig,
}

impl MessageTranscoderBuilder {
    pub fn new(registry: Arc<dyn SchemaRegistryGateway>) -> Self {
        Self {
            registry,
            strategy: Arc::new(TopicNameStrategy),
            compiler: Arc::new(AvroCompiler),
            config: TranscoderConfig::default(),
        }
    }

    /// Subject naming strategy (default: `TopicNameStrategy`)
    pub fn strategy(mut self, strategy: impl SubjectNameStrategy + 'static) -> Self {
        self.strategy = Arc::new(strategy);
        self
    }

    /// Schema compiler (default: `AvroCompiler`)
    pub fn compiler(mut self, compiler: impl SchemaCompiler + 'static) -> Self {
        self.compiler = Arc::new(compiler);
        self
    }

    pub fn config(mut self, config: TranscoderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> MessageTranscoder {
        let schemas = Arc::new(SchemaCache::new(
            self.registry.clone(),
            self.config.registry_timeout(),
        ));
        MessageTranscoder {
            strategy: self.strategy,
            registry: self.registry,
            codecs: CodecCache::new(schemas, self.compiler),
            config: self.config,
        }
    }
}

/// Frames values for one subject and schema version
#[derive(Debug, Clone)]
pub struct SubjectEncoder {
    identity: SchemaIdentity,
    codec: Arc<AvroCodec>,
}

impl SubjectEncoder {
    /// Encode `value` and prepend the wire header
    pub fn encode(&self, value: &JsonValue) -> Result<Bytes> {
        let body = self.codec.encode(value)?;

        let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
        WireHeader::new(self.identity.version).encode_to(&mut buf);
        buf.extend_from_slice(&body);
        Ok(buf.freeze())
    }

    pub fn subject(&self) -> &Subject {
        &self.identity.subject
    }

    pub fn version(&self) -> SchemaVersion {
        self.identity.version
    }

    pub fn identity(&self) -> &SchemaIdentity {
        &self.identity
    }

    pub fn codec(&self) -> &Arc<AvroCodec> {
        &self.codec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use serde_json::json;

    const ORDER: &str = r#"{
        "type": "record",
        "name": "Order",
        "namespace": "shop",
        "fields": [
            {"name": "id", "type": "long"},
            {"name": "sku", "type": "string"}
        ]
    }"#;

    fn transcoder(registry: Arc<MemoryRegistry>) -> MessageTranscoder {
        MessageTranscoder::builder(registry).build()
    }

    #[tokio::test]
    async fn test_encode_then_decode() {
        let registry = Arc::new(MemoryRegistry::new());
        let transcoder = transcoder(registry.clone());
        let order = json!({"id": 7, "sku": "A-1"});

        let bytes = transcoder
            .encode("orders", false, &ORDER.into(), &order, true)
            .await
            .unwrap();
        assert_eq!(&bytes[..HEADER_LEN], &[0, 0, 0, 0, 1]);

        let decoded = transcoder.decode("orders", false, &bytes).await.unwrap();
        assert_eq!(decoded, order);
        assert_eq!(registry.versions(&Subject::value("orders")).len(), 1);
    }

    #[tokio::test]
    async fn test_decode_with_remainder_returns_tail() {
        let transcoder = transcoder(Arc::new(MemoryRegistry::new()));
        let order = json!({"id": 9, "sku": "C-3"});

        let bytes = transcoder
            .encode("orders", false, &ORDER.into(), &order, true)
            .await
            .unwrap();
        let mut payload = bytes.to_vec();
        payload.extend_from_slice(&[0xde, 0xad]);

        let (decoded, rest) = transcoder
            .decode_with_remainder("orders", false, &payload)
            .await
            .unwrap();
        assert_eq!(decoded, order);
        assert_eq!(rest, &[0xde_u8, 0xad][..]);

        assert_eq!(transcoder.decode("orders", false, &payload).await.unwrap(), order);
        let (_, rest) = transcoder
            .decode_with_remainder("orders", false, &bytes)
            .await
            .unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_encode_without_auto_register() {
        let registry = Arc::new(MemoryRegistry::new());
        let transcoder = transcoder(registry.clone());

        let err = transcoder
            .encode("orders", false, &ORDER.into(), &json!({"id": 1, "sku": "x"}), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TranscodeError::SchemaNotRegistered { ref subject } if subject.as_str() == "orders-value"
        ));
        assert_eq!(registry.versions(&Subject::value("orders")).len(), 0);
        assert!(transcoder.codec_cache().is_empty());
    }

    #[tokio::test]
    async fn test_encode_with_config_honours_auto_register() {
        let registry = Arc::new(MemoryRegistry::new());
        let transcoder = MessageTranscoder::builder(registry)
            .config(TranscoderConfig::default().with_auto_register(false))
            .build();

        let err = transcoder
            .encode_with_config("orders", false, &ORDER.into(), &json!({"id": 1, "sku": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::SchemaNotRegistered { .. }));
    }

    #[tokio::test]
    async fn test_key_and_value_subjects_are_separate() {
        let registry = Arc::new(MemoryRegistry::new());
        let transcoder = transcoder(registry.clone());
        let key_schema = SchemaDocument::from(r#""string""#);

        let key = transcoder
            .encode("orders", true, &key_schema, &json!("order-7"), true)
            .await
            .unwrap();
        assert_eq!(
            transcoder.decode_key("orders", &key).await.unwrap(),
            json!("order-7")
        );

        // version 1 of orders-value does not exist
        let err = transcoder.decode_value("orders", &key).await.unwrap_err();
        assert!(matches!(err, TranscodeError::SchemaNotFound { .. }));
    }

    #[tokio::test]
    async fn test_custom_strategy() {
        let registry = Arc::new(MemoryRegistry::new());
        let transcoder = MessageTranscoder::builder(registry.clone())
            .strategy(|topic: &str, _is_key: bool| Subject::new(format!("shared.{}", topic)))
            .build();

        let bytes = transcoder
            .encode("orders", false, &ORDER.into(), &json!({"id": 1, "sku": "x"}), true)
            .await
            .unwrap();
        assert_eq!(registry.versions(&Subject::new("shared.orders")).len(), 1);
        assert!(transcoder.decode("orders", true, &bytes).await.is_ok());
    }

    #[tokio::test]
    async fn test_subject_encoder_frames_values() {
        let registry = Arc::new(MemoryRegistry::new());
        let transcoder = transcoder(registry);

        let encoder = transcoder
            .subject_encoder("orders", false, &ORDER.into(), true)
            .await
            .unwrap();
        assert_eq!(encoder.subject().as_str(), "orders-value");
        assert_eq!(encoder.version(), SchemaVersion::new(1));

        for id in 0..3 {
            let order = json!({"id": id, "sku": "B"});
            let bytes = encoder.encode(&order).unwrap();
            assert_eq!(transcoder.decode_value("orders", &bytes).await.unwrap(), order);
        }
    }

    #[tokio::test]
    async fn test_encode_value_mismatch() {
        let transcoder = transcoder(Arc::new(MemoryRegistry::new()));

        let err = transcoder
            .encode("orders", false, &ORDER.into(), &json!({"id": "seven"}), true)
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Encode(_)));
    }

    #[test]
    fn test_from_config_rejects_bad_url() {
        let err = MessageTranscoder::from_config(&TranscoderConfig::new("localhost:8081"))
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Config(_)));
    }
}
