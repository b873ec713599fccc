//! HashiCorp Vault over HTTP
//!
//! Talks to the KV v2 engine, the Approle auth method and `sys/health`.
//! Retries are not attempted here; timeouts come from the connection info.

use super::{
    zeroize_value, ApproleLogin, SecretFields, SecretRequest, StoreClient, StoreConnector,
    StoreError, StoreHealth,
};
use crate::config::ClientConnectionInfo;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Certificate, Client, Identity, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use url::Url;
use zeroize::Zeroizing;

const TOKEN_HEADER: &str = "X-Vault-Token";

/// Status-code overrides so that sealed, uninitialised and standby nodes
/// still answer with a parseable body.
const HEALTH_QUERY: &[(&str, &str)] = &[
    ("standbyok", "true"),
    ("perfstandbyok", "true"),
    ("uninitcode", "299"),
    ("sealedcode", "299"),
    ("drsecondarycode", "299"),
];

#[derive(Debug, Deserialize)]
struct HealthResponse {
    initialized: bool,
    sealed: bool,
}

#[derive(Deserialize)]
struct KvReadResponse {
    data: Option<KvData>,
}

#[derive(Deserialize)]
struct KvData {
    data: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: Option<LoginAuth>,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
}

/// Serialize a request body holding secrets, then wipe the JSON value
///
/// The returned bytes move into reqwest's request body and are not wiped
/// after sending.
fn encode_body(body: &mut Value) -> Result<Vec<u8>, StoreError> {
    let encoded = serde_json::to_vec(&*body)
        .map_err(|e| StoreError::Response(format!("unable to encode request: {}", e)));
    zeroize_value(body);
    encoded
}

/// Vault client bound to one server
pub struct VaultHttpClient {
    client: Client,
    base: Url,
}

impl VaultHttpClient {
    /// Create a client from connection info, loading any TLS material
    pub fn new(info: &ClientConnectionInfo) -> Result<Self, StoreError> {
        let base = Url::parse(&info.url).map_err(|e| StoreError::Config(e.to_string()))?;

        let mut builder = Client::builder().timeout(info.timeout());

        if let Some(ca_path) = &info.ca_cert {
            let pem = std::fs::read(ca_path)?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| StoreError::Config(format!("CA certificate {}: {}", ca_path, e)))?;
            builder = builder.add_root_certificate(cert);
        }

        match (&info.client_cert, &info.client_key) {
            (Some(cert_path), Some(key_path)) => {
                let mut pem = Zeroizing::new(std::fs::read(cert_path)?);
                pem.push(b'\n');
                pem.extend_from_slice(&Zeroizing::new(std::fs::read(key_path)?));
                let identity = Identity::from_pem(&pem)
                    .map_err(|e| StoreError::Config(format!("client identity: {}", e)))?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(StoreError::Config(
                    "client_cert and client_key must be set together".to_string(),
                ))
            }
        }

        Ok(Self {
            client: builder.build()?,
            base,
        })
    }

    /// Build the API endpoint URL for a logical path
    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        let base = self.base.as_str().trim_end_matches('/');
        let url = format!("{}/v1/{}", base, path.trim_start_matches('/'));
        Url::parse(&url).map_err(|e| StoreError::Config(e.to_string()))
    }

    fn with_token(request: RequestBuilder, token: Option<&SecretString>) -> RequestBuilder {
        match token {
            Some(token) => request.header(TOKEN_HEADER, token.expose_secret()),
            None => request,
        }
    }

    fn with_json(request: RequestBuilder, body: Vec<u8>) -> RequestBuilder {
        request.header(CONTENT_TYPE, "application/json").body(body)
    }

    /// Turn a non-success response into a `StoreError::Status`
    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body
            .get("errors")
            .and_then(|e| e.as_array())
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl StoreClient for VaultHttpClient {
    async fn health(&self) -> Result<StoreHealth, StoreError> {
        let response = self
            .client
            .get(self.endpoint("sys/health")?)
            .query(HEALTH_QUERY)
            .send()
            .await?;

        let health: HealthResponse = Self::check(response).await?.json().await?;
        Ok(StoreHealth {
            initialized: health.initialized,
            sealed: health.sealed,
        })
    }

    async fn read_secret(
        &self,
        token: Option<&SecretString>,
        request: &SecretRequest,
    ) -> Result<Option<SecretFields>, StoreError> {
        let http_request = self
            .client
            .get(self.endpoint(&request.path)?)
            .query(&request.query);
        let response = Self::with_token(http_request, token).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: KvReadResponse = Self::check(response).await?.json().await?;
        let fields = body
            .data
            .and_then(|d| d.data)
            .ok_or_else(|| StoreError::Response("missing data.data object".to_string()))?;

        Ok(Some(SecretFields::new(fields)))
    }

    async fn write_secret(
        &self,
        token: Option<&SecretString>,
        path: &str,
        fields: &SecretFields,
    ) -> Result<(), StoreError> {
        let body = encode_body(&mut fields.to_write_body())?;
        let http_request = Self::with_json(self.client.post(self.endpoint(path)?), body);

        let response = Self::with_token(http_request, token).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn authenticate(&self, login: ApproleLogin<'_>) -> Result<SecretString, StoreError> {
        let body = encode_body(&mut json!({
            "role_id": login.role_id.expose_secret(),
            "secret_id": login.secret_id.expose_secret(),
        }))?;
        let http_request = Self::with_json(
            self.client
                .post(self.endpoint(&format!("auth/{}/login", login.path))?),
            body,
        );

        let response = http_request.send().await?;
        let login: LoginResponse = Self::check(response).await?.json().await?;
        let auth = login
            .auth
            .ok_or_else(|| StoreError::Response("login response missing auth".to_string()))?;

        Ok(SecretString::from(auth.client_token))
    }
}

/// Connector producing [`VaultHttpClient`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

impl StoreConnector for HttpConnector {
    fn connect(&self, info: &ClientConnectionInfo) -> Result<Arc<dyn StoreClient>, StoreError> {
        Ok(Arc::new(VaultHttpClient::new(info)?))
    }
}
