//! REST client for the fragments microservice.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use fragments_common::{Error, FragmentContent, FragmentId, FragmentRecord, Result};

use super::auth::AuthProvider;
use super::RemoteFragments;

/// Body of `GET /v1/fragments`.
#[derive(Debug, Deserialize)]
struct IdListResponse {
    fragments: Vec<FragmentId>,
}

/// Body of `GET /v1/fragments?expand=1`.
#[derive(Debug, Deserialize)]
struct ExpandedListResponse {
    fragments: Vec<FragmentRecord>,
}

/// Body of `POST /v1/fragments`.
#[derive(Debug, Deserialize)]
struct FragmentResponse {
    fragment: FragmentRecord,
}

/// Error body: `{ "status": "error", "error": { "code": 404, "message": "..." } }`.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// HTTP client for the fragments API.
///
/// Every call carries the headers of the user returned by the auth
/// provider. No timeouts or retries are added on top of `reqwest`'s own.
pub struct HttpFragmentsClient {
    http: Client,
    base_url: Url,
    auth: Arc<dyn AuthProvider>,
}

impl HttpFragmentsClient {
    /// Create a client for the API at `base_url`.
    ///
    /// # Errors
    /// - URL is invalid or cannot carry a path
    /// - HTTP client construction fails
    pub fn new(base_url: &str, auth: Arc<dyn AuthProvider>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::InvalidInput(format!("Invalid API URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidInput(format!(
                "API URL cannot carry a path: {}",
                base_url
            )));
        }

        let http = Client::builder()
            .user_agent(concat!("fragments-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            auth,
        })
    }

    /// The API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build `<base>/v1/fragments[/<segment>]`.
    fn endpoint(&self, segment: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["v1", "fragments"]);
            if let Some(segment) = segment {
                segments.push(segment);
            }
        }
        url
    }

    /// Authorization headers of the signed-in user.
    async fn headers(&self, content_type: Option<&str>) -> Result<HeaderMap> {
        let user = self
            .auth
            .get_user()
            .await?
            .ok_or_else(|| Error::Unauthenticated("No signed-in user".to_string()))?;
        user.authorization_headers(content_type)
    }

    /// Send a request and turn transport failures and non-2xx into errors.
    async fn send(&self, request: RequestBuilder, action: &str) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            warn!("Unable to {}: {}", action, e);
            Error::RemoteUnreachable(format!("Failed to {}: {}", action, e))
        })?;

        let status = response.status();
        if status.is_success() {
            debug!("{} succeeded ({})", action, status);
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        warn!("Unable to {}: {} {}", action, status, message);
        Err(Error::RemoteRejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
        response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse response: {}", e)))
    }

    async fn read_content(response: Response) -> Result<FragmentContent> {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = response
            .bytes()
            .await
            .map_err(|e| Error::RemoteUnreachable(format!("Failed to read body: {}", e)))?;
        Ok(FragmentContent::new(content_type, data.to_vec()))
    }
}

#[async_trait]
impl RemoteFragments for HttpFragmentsClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn ping(&self) -> Result<()> {
        self.send(self.http.get(self.base_url.clone()), "reach API")
            .await
            .map(|_| ())
    }

    async fn list_ids(&self) -> Result<Vec<FragmentId>> {
        let headers = self.headers(None).await?;
        let request = self.http.get(self.endpoint(None)).headers(headers);
        let response = self.send(request, "list fragments").await?;
        let body: IdListResponse = Self::read_json(response).await?;
        Ok(body.fragments)
    }

    async fn list_expanded(&self) -> Result<Vec<FragmentRecord>> {
        let headers = self.headers(None).await?;
        let request = self
            .http
            .get(self.endpoint(None))
            .query(&[("expand", "1")])
            .headers(headers);
        let response = self.send(request, "list expanded fragments").await?;
        let body: ExpandedListResponse = Self::read_json(response).await?;
        Ok(body.fragments)
    }

    async fn create(&self, content_type: &str, data: Vec<u8>) -> Result<FragmentRecord> {
        let headers = self.headers(Some(content_type)).await?;
        let request = self.http.post(self.endpoint(None)).headers(headers).body(data);
        let response = self.send(request, "create fragment").await?;
        let body: FragmentResponse = Self::read_json(response).await?;
        Ok(body.fragment)
    }

    async fn fetch(&self, id: &FragmentId) -> Result<FragmentContent> {
        let headers = self.headers(None).await?;
        let request = self.http.get(self.endpoint(Some(id.as_str()))).headers(headers);
        let response = self.send(request, "fetch fragment").await?;
        Self::read_content(response).await
    }

    async fn convert(&self, id: &FragmentId, ext: &str) -> Result<FragmentContent> {
        let ext = ext.trim_start_matches('.');
        let segment = format!("{}.{}", id.as_str(), ext);
        let headers = self.headers(None).await?;
        let request = self.http.get(self.endpoint(Some(&segment))).headers(headers);
        let response = self.send(request, "convert fragment").await?;
        Self::read_content(response).await
    }

    async fn update(&self, id: &FragmentId, content_type: &str, data: Vec<u8>) -> Result<()> {
        let headers = self.headers(Some(content_type)).await?;
        let request = self
            .http
            .put(self.endpoint(Some(id.as_str())))
            .headers(headers)
            .body(data);
        self.send(request, "update fragment").await.map(|_| ())
    }

    async fn delete(&self, id: &FragmentId) -> Result<()> {
        let headers = self.headers(None).await?;
        let request = self
            .http
            .delete(self.endpoint(Some(id.as_str())))
            .headers(headers);
        self.send(request, "delete fragment").await.map(|_| ())
    }
}
