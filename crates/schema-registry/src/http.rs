//! Client for the Confluent-compatible schema registry REST API.

use async_trait::async_trait;
use kafka_types::SchemaId;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::SchemaRegistry;

const SCHEMA_REGISTRY_CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

/// Default timeout applied to every registry request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct RegisterRequest<'a> {
    schema: &'a str,
}

#[derive(Deserialize)]
struct RegisterResponse {
    id: u32,
}

#[derive(Deserialize)]
struct SchemaResponse {
    schema: String,
}

#[derive(Deserialize, Default)]
struct ErrorResponse {
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

/// Registry reached over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpSchemaRegistry {
    client: Client,
    base_url: Url,
    basic_auth: Option<(String, String)>,
}

impl HttpSchemaRegistry {
    /// Create a client for the registry at `url`. Every request is bounded by `timeout`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let invalid = |reason: String| RegistryError::InvalidUrl {
            url: url.to_string(),
            reason,
        };
        let base_url = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("not a base URL".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Unavailable(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            basic_auth: None,
        })
    }

    /// Authenticate with `user:password` (the registry's basic auth user info).
    pub fn with_basic_auth(mut self, user_info: &str) -> Self {
        let (user, password) = user_info.split_once(':').unwrap_or((user_info, ""));
        self.basic_auth = Some((user.to_string(), password.to_string()));
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// `segments` appended to the base URL, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: reqwest::Method, url: &Url) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url.clone())
            .header(ACCEPT, SCHEMA_REGISTRY_CONTENT_TYPE);
        match &self.basic_auth {
            Some((user, password)) => builder.basic_auth(user, Some(password)),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder, url: &Url) -> Result<Response> {
        builder
            .send()
            .await
            .map_err(|e| RegistryError::Unavailable(format!("Request to '{url}' failed: {e}")))
    }
}

/// Turn a non-success response into the matching error.
async fn error_from_response(response: Response, subject: Option<&str>, id: Option<SchemaId>) -> RegistryError {
    let status = response.status();
    let body: ErrorResponse = response.json().await.unwrap_or_default();
    let message = body
        .message
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());

    if status.is_server_error() {
        return RegistryError::Unavailable(format!("registry returned {status}: {message}"));
    }

    match (status, id) {
        (StatusCode::NOT_FOUND, Some(id)) => RegistryError::NotFound(id),
        (StatusCode::CONFLICT, _) => RegistryError::Incompatible {
            subject: subject.unwrap_or_default().to_string(),
            message,
        },
        (StatusCode::UNPROCESSABLE_ENTITY, _) => RegistryError::InvalidSchema(match body.error_code {
            Some(code) => format!("{message} (error code {code})"),
            None => message,
        }),
        _ => RegistryError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl SchemaRegistry for HttpSchemaRegistry {
    async fn register(&self, subject: &str, schema: &str) -> Result<SchemaId> {
        let url = self.endpoint(&["subjects", subject, "versions"]);
        debug!("Registering schema under subject '{subject}' at {url}");

        let body = serde_json::to_vec(&RegisterRequest { schema })
            .map_err(|e| RegistryError::InvalidSchema(e.to_string()))?;
        let builder = self
            .request(reqwest::Method::POST, &url)
            .header(CONTENT_TYPE, SCHEMA_REGISTRY_CONTENT_TYPE)
            .body(body);
        let response = self.send(builder, &url).await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, Some(subject), None).await);
        }

        let status = response.status().as_u16();
        let registered: RegisterResponse =
            response.json().await.map_err(|e| RegistryError::Rejected {
                status,
                message: format!("unexpected register response: {e}"),
            })?;

        debug!("Subject '{subject}' resolved to schema id {}", registered.id);
        Ok(SchemaId(registered.id))
    }

    async fn lookup(&self, id: SchemaId) -> Result<String> {
        let url = self.endpoint(&["schemas", "ids", &id.to_string()]);
        debug!("Looking up schema {id} at {url}");

        let builder = self.request(reqwest::Method::GET, &url);
        let response = self.send(builder, &url).await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, None, Some(id)).await);
        }

        let status = response.status().as_u16();
        let found: SchemaResponse = response.json().await.map_err(|e| RegistryError::Rejected {
            status,
            message: format!("unexpected schema response: {e}"),
        })?;
        Ok(found.schema)
    }
}
