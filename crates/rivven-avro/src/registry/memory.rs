//! In-memory registry for testing and development

use super::SchemaRegistryGateway;
use crate::error::{Result, TranscodeError};
use crate::types::{SchemaDocument, SchemaVersion, Subject};
use apache_avro::Schema as AvroSchemaInner;
use async_trait::async_trait;
use dashmap::DashMap;

/// In-memory registry
///
/// Versions start at 1 for every subject. Two documents are the same schema
/// when their Avro canonical forms match, so whitespace and attribute order do
/// not create new versions.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    /// Subject -> documents, index `i` holds version `i + 1`
    subjects: DashMap<Subject, Vec<SchemaDocument>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subjects with at least one version
    pub fn subjects(&self) -> Vec<Subject> {
        let mut subjects: Vec<Subject> = self.subjects.iter().map(|e| e.key().clone()).collect();
        subjects.sort();
        subjects
    }

    /// Registered versions of a subject
    pub fn versions(&self, subject: &Subject) -> Vec<SchemaVersion> {
        self.subjects
            .get(subject)
            .map(|docs| (1..=docs.len() as u32).map(SchemaVersion::new).collect())
            .unwrap_or_default()
    }
}

fn canonical(document: &SchemaDocument) -> String {
    AvroSchemaInner::parse_str(document.as_str())
        .map(|schema| schema.canonical_form())
        .unwrap_or_else(|_| document.as_str().to_string())
}

fn position(docs: &[SchemaDocument], document: &SchemaDocument) -> Option<SchemaVersion> {
    let wanted = canonical(document);
    docs.iter()
        .position(|doc| doc == document || canonical(doc) == wanted)
        .map(|idx| SchemaVersion::new(idx as u32 + 1))
}

#[async_trait]
impl SchemaRegistryGateway for MemoryRegistry {
    async fn fetch_schema(
        &self,
        subject: &Subject,
        version: SchemaVersion,
    ) -> Result<SchemaDocument> {
        let idx = (version.0 as usize).checked_sub(1);
        self.subjects
            .get(subject)
            .and_then(|docs| idx.and_then(|i| docs.get(i).cloned()))
            .ok_or_else(|| TranscodeError::SchemaNotFound {
                subject: subject.clone(),
                version,
            })
    }

    async fn lookup(
        &self,
        subject: &Subject,
        document: &SchemaDocument,
    ) -> Result<Option<SchemaVersion>> {
        Ok(self
            .subjects
            .get(subject)
            .and_then(|docs| position(&docs, document)))
    }

    async fn register(
        &self,
        subject: &Subject,
        document: &SchemaDocument,
    ) -> Result<SchemaVersion> {
        AvroSchemaInner::parse_str(document.as_str()).map_err(|e| {
            TranscodeError::RegistryRejected {
                status: 422,
                message: format!("invalid schema: {}", e),
            }
        })?;

        let mut docs = self.subjects.entry(subject.clone()).or_default();
        if let Some(version) = position(&docs, document) {
            return Ok(version);
        }

        docs.push(document.clone());
        let version = SchemaVersion::new(docs.len() as u32);
        tracing::info!(subject = %subject, version = %version, "Registered schema");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER_V1: &str =
        r#"{"type": "record", "name": "User", "fields": [{"name": "id", "type": "long"}]}"#;
    const USER_V2: &str = r#"{"type": "record", "name": "User", "fields": [{"name": "id", "type": "long"}, {"name": "name", "type": "string", "default": ""}]}"#;

    #[tokio::test]
    async fn test_register_assigns_sequential_versions() {
        let registry = MemoryRegistry::new();
        let subject = Subject::value("users");

        let v1 = registry.register(&subject, &USER_V1.into()).await.unwrap();
        let v2 = registry.register(&subject, &USER_V2.into()).await.unwrap();
        assert_eq!(v1, SchemaVersion::new(1));
        assert_eq!(v2, SchemaVersion::new(2));
        assert_eq!(registry.versions(&subject).len(), 2);

        let doc = registry.fetch_schema(&subject, v2).await.unwrap();
        assert_eq!(doc.as_str(), USER_V2);
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = MemoryRegistry::new();
        let subject = Subject::value("users");

        let v1 = registry.register(&subject, &USER_V1.into()).await.unwrap();
        let reformatted = r#"{
            "type": "record",
            "name": "User",
            "fields": [{"name": "id", "type": "long"}]
        }"#;
        let again = registry
            .register(&subject, &reformatted.into())
            .await
            .unwrap();
        assert_eq!(v1, again);
        assert_eq!(registry.versions(&subject), vec![SchemaVersion::new(1)]);
    }

    #[tokio::test]
    async fn test_lookup() {
        let registry = MemoryRegistry::new();
        let subject = Subject::value("users");

        assert_eq!(registry.lookup(&subject, &USER_V1.into()).await.unwrap(), None);
        registry.register(&subject, &USER_V1.into()).await.unwrap();
        assert_eq!(
            registry.lookup(&subject, &USER_V1.into()).await.unwrap(),
            Some(SchemaVersion::new(1))
        );
        assert_eq!(registry.lookup(&subject, &USER_V2.into()).await.unwrap(), None);
        assert_eq!(
            registry
                .lookup(&Subject::key("users"), &USER_V1.into())
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_missing_versions() {
        let registry = MemoryRegistry::new();
        let subject = Subject::value("users");
        registry.register(&subject, &USER_V1.into()).await.unwrap();

        for version in [0, 2, 99] {
            let err = registry
                .fetch_schema(&subject, SchemaVersion::new(version))
                .await
                .unwrap_err();
            assert!(matches!(err, TranscodeError::SchemaNotFound { .. }));
        }
    }

    #[tokio::test]
    async fn test_invalid_schema_is_rejected() {
        let registry = MemoryRegistry::new();
        let err = registry
            .register(&Subject::value("users"), &"{not avro".into())
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::RegistryRejected { .. }));
        assert!(registry.subjects().is_empty());
    }
}
