//! Rivven Avro - Confluent wire format transcoding for Kafka messages
//!
//! Converts between framed Avro payloads and `serde_json::Value` documents,
//! resolving writer schemas through a Confluent-compatible schema registry.
//!
//! # Wire format
//!
//! ```text
//! +-------+------------------------+------------------+
//! | 0x00  | schema version (u32 BE)| Avro binary body |
//! +-------+------------------------+------------------+
//! ```
//!
//! The header carries the *subject version*; the subject itself is derived
//! from the topic by a [`SubjectNameStrategy`] (`<topic>-key` /
//! `<topic>-value` by default).
//!
//! # Features
//!
//! - **Decode / encode**: [`MessageTranscoder`] handles framing, schema
//!   resolution and Avro conversion
//! - **Caching**: fetched schemas and compiled codecs are memoized per
//!   `(subject, version)` with single-flight loading
//! - **Registries**: [`HttpRegistry`] for Confluent REST, [`MemoryRegistry`]
//!   for tests and development
//!
//! # Example
//!
//! ```rust,ignore
//! use rivven_avro::{MemoryRegistry, MessageTranscoder};
//! use serde_json::json;
//!
//! let transcoder = MessageTranscoder::builder(MemoryRegistry::new()).build();
//! let schema = r#"{"type": "record", "name": "Order",
//!     "fields": [{"name": "id", "type": "long"}]}"#.into();
//!
//! let bytes = transcoder
//!     .encode("orders", false, &schema, &json!({"id": 1}), true)
//!     .await?;
//! let order = transcoder.decode_value("orders", &bytes).await?;
//! ```

pub mod avro;
pub mod cache;
pub mod config;
pub mod error;
pub mod registry;
pub mod subject;
pub mod transcoder;
pub mod types;
pub mod wire;

pub use avro::{AvroCodec, AvroCompiler, SchemaCompiler};
pub use cache::{CacheStats, CodecCache, SchemaCache};
pub use config::{RegistryConfig, TranscoderConfig};
pub use error::{Result, TranscodeError};
pub use registry::{HttpRegistry, MemoryRegistry, SchemaRegistryGateway};
pub use subject::{SubjectNameStrategy, TopicNameStrategy};
pub use transcoder::{MessageTranscoder, MessageTranscoderBuilder, SubjectEncoder};
pub use types::{SchemaDocument, SchemaIdentity, SchemaVersion, Subject};
pub use wire::{WireHeader, HEADER_LEN, MAGIC_BYTE};
