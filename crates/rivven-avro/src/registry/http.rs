//! Confluent-compatible REST registry client

use super::SchemaRegistryGateway;
use crate::config::RegistryConfig;
use crate::error::{error_codes, Result, TranscodeError};
use crate::types::{SchemaDocument, SchemaVersion, Subject};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

const CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

/// Request body for registering or looking up a schema
#[derive(Debug, Serialize)]
struct SchemaRequest<'a> {
    schema: &'a str,
    #[serde(rename = "schemaType")]
    schema_type: &'static str,
}

/// Response from registering a schema
#[derive(Debug, Deserialize)]
struct RegisterSchemaResponse {
    id: u32,
}

/// Response from getting or looking up a subject version
#[derive(Debug, Deserialize)]
struct SubjectVersionResponse {
    version: u32,
    #[serde(default)]
    schema: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error_code: Option<u32>,
    message: Option<String>,
}

/// Client for registries that implement the Confluent REST API
///
/// Only the three calls the transcoder needs are implemented. No response is
/// cached here.
pub struct HttpRegistry {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for HttpRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRegistry")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpRegistry {
    /// Create a client from configuration
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| TranscodeError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a client for `url` with default settings
    pub fn with_url(url: impl Into<String>) -> Result<Self> {
        Self::new(&RegistryConfig::new(url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn subject_url(&self, subject: &Subject) -> String {
        format!(
            "{}/subjects/{}",
            self.base_url,
            urlencoding::encode(subject.as_str())
        )
    }

    /// POST /subjects/{subject}: which version of this subject is `document`
    async fn lookup_version(
        &self,
        subject: &Subject,
        document: &SchemaDocument,
    ) -> Result<Option<SchemaVersion>> {
        let url = self.subject_url(subject);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", CONTENT_TYPE)
            .header("Accept", CONTENT_TYPE)
            .json(&SchemaRequest {
                schema: document.as_str(),
                schema_type: "AVRO",
            })
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status, &body, subject, None));
        }

        let result: SubjectVersionResponse = response.json().await?;
        Ok(Some(SchemaVersion::new(result.version)))
    }
}

#[async_trait]
impl SchemaRegistryGateway for HttpRegistry {
    async fn fetch_schema(
        &self,
        subject: &Subject,
        version: SchemaVersion,
    ) -> Result<SchemaDocument> {
        let url = format!("{}/versions/{}", self.subject_url(subject), version.0);

        let response = self
            .client
            .get(&url)
            .header("Accept", CONTENT_TYPE)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status, &body, subject, Some(version)));
        }

        let result: SubjectVersionResponse = response.json().await?;
        Ok(SchemaDocument::from(result.schema))
    }

    async fn lookup(
        &self,
        subject: &Subject,
        document: &SchemaDocument,
    ) -> Result<Option<SchemaVersion>> {
        self.lookup_version(subject, document).await
    }

    async fn register(
        &self,
        subject: &Subject,
        document: &SchemaDocument,
    ) -> Result<SchemaVersion> {
        let url = format!("{}/versions", self.subject_url(subject));

        let response = self
            .client
            .post(&url)
            .header("Content-Type", CONTENT_TYPE)
            .header("Accept", CONTENT_TYPE)
            .json(&SchemaRequest {
                schema: document.as_str(),
                schema_type: "AVRO",
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status, &body, subject, None));
        }

        // the registration response only carries the global id
        let registered: RegisterSchemaResponse = response.json().await?;

        let version = self.lookup_version(subject, document).await?.ok_or_else(|| {
            TranscodeError::RegistryRejected {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: format!(
                    "schema id {} registered under {} but lookup found no version",
                    registered.id, subject
                ),
            }
        })?;

        tracing::info!(
            subject = %subject,
            schema_id = registered.id,
            version = %version,
            "Registered schema"
        );

        Ok(version)
    }
}

fn parse_error(
    status: StatusCode,
    body: &str,
    subject: &Subject,
    version: Option<SchemaVersion>,
) -> TranscodeError {
    let parsed = serde_json::from_str::<ErrorResponse>(body).ok();
    let code = parsed.as_ref().and_then(|e| e.error_code);
    let message = parsed
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string());

    let not_found = matches!(
        code,
        Some(error_codes::SUBJECT_NOT_FOUND)
            | Some(error_codes::VERSION_NOT_FOUND)
            | Some(error_codes::SCHEMA_NOT_FOUND)
            | Some(error_codes::INVALID_VERSION)
    ) || status == StatusCode::NOT_FOUND;

    match version {
        Some(version) if not_found => TranscodeError::SchemaNotFound {
            subject: subject.clone(),
            version,
        },
        _ if status.is_server_error() => {
            TranscodeError::RegistryUnavailable(format!("{}: {}", status, message))
        }
        _ => TranscodeError::RegistryRejected {
            status: status.as_u16(),
            message: match code {
                Some(error_codes::INVALID_SCHEMA) => format!("invalid schema: {}", message),
                Some(error_codes::INCOMPATIBLE_SCHEMA) => {
                    format!("incompatible schema: {}", message)
                }
                _ => message,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let registry = HttpRegistry::with_url("http://localhost:8081/").unwrap();
        assert_eq!(registry.base_url(), "http://localhost:8081");
    }

    #[test]
    fn test_subject_is_percent_encoded() {
        let registry = HttpRegistry::with_url("http://localhost:8081").unwrap();
        assert_eq!(
            registry.subject_url(&Subject::new("a/b c")),
            "http://localhost:8081/subjects/a%2Fb%20c"
        );
    }

    #[test]
    fn test_not_found_codes_on_fetch() {
        let subject = Subject::value("orders");
        for code in [40401, 40402] {
            let body = format!(r#"{{"error_code":{},"message":"missing"}}"#, code);
            let err = parse_error(
                StatusCode::NOT_FOUND,
                &body,
                &subject,
                Some(SchemaVersion::new(99)),
            );
            assert!(matches!(
                err,
                TranscodeError::SchemaNotFound { version, .. } if version.0 == 99
            ));
        }
    }

    #[test]
    fn test_server_errors_are_unavailable() {
        let err = parse_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "down",
            &Subject::value("orders"),
            Some(SchemaVersion::new(1)),
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_invalid_schema_is_rejected() {
        let err = parse_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"error_code":42201,"message":"Invalid schema"}"#,
            &Subject::value("orders"),
            None,
        );
        assert!(matches!(
            err,
            TranscodeError::RegistryRejected { status: 422, .. }
        ));
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        assert!(matches!(
            HttpRegistry::with_url("localhost:8081"),
            Err(TranscodeError::Config(_))
        ));
    }
}
