//! Authenticated request pipeline for protected endpoints.
//!
//! Every resource call goes through the gateway: it attaches the stored
//! bearer token, and on the first 401 it drives exactly one coordinated
//! refresh and replays the call once. A second 401, and every non-401
//! failure, propagates to the caller untouched. When refresh itself fails
//! the gateway fails closed: tokens are cleared, the session returns to
//! anonymous, and the caller receives `SessionExpired`.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

use crate::auth::{RefreshCoordinator, Session};
use crate::error::Error;
use crate::store::{TokenKind, TokenStore};

/// Entry point for calls to protected endpoints
pub struct Gateway {
    http: Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    session: Session,
    refresh: Arc<RefreshCoordinator>,
}

impl Gateway {
    pub(crate) fn new(
        http: Client,
        base_url: &str,
        store: Arc<dyn TokenStore>,
        session: Session,
        refresh: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
            store,
            session,
            refresh,
        }
    }

    /// Start building a request for a protected endpoint
    pub fn request(&self, method: Method, path: &str) -> GatewayRequest<'_> {
        GatewayRequest {
            gateway: self,
            method,
            path: path.to_string(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Create a GET request
    pub fn get(&self, path: &str) -> GatewayRequest<'_> {
        self.request(Method::GET, path)
    }

    /// Create a POST request
    pub fn post(&self, path: &str) -> GatewayRequest<'_> {
        self.request(Method::POST, path)
    }

    /// Create a PUT request
    pub fn put(&self, path: &str) -> GatewayRequest<'_> {
        self.request(Method::PUT, path)
    }

    /// Create a PATCH request
    pub fn patch(&self, path: &str) -> GatewayRequest<'_> {
        self.request(Method::PATCH, path)
    }

    /// Create a DELETE request
    pub fn delete(&self, path: &str) -> GatewayRequest<'_> {
        self.request(Method::DELETE, path)
    }

    /// One-shot form of the pipeline for callers that don't need the builder
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, Error> {
        let mut request = self.request(method, path);
        if let Some(body) = body {
            request = request.json(body)?;
        }
        request.send().await
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Builder for a single gateway call
pub struct GatewayRequest<'a> {
    gateway: &'a Gateway,
    method: Method,
    path: String,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl GatewayRequest<'_> {
    /// Add a header to the request
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.parse::<reqwest::header::HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Add a query parameter to the request
    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    /// Add a JSON body to the request
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, Error> {
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self)
    }

    /// Execute the request and parse the response as JSON
    pub async fn execute<T: DeserializeOwned>(self) -> Result<T, Error> {
        let response = self.send().await?;
        Ok(response.json::<T>().await?)
    }

    /// Execute the request, returning the raw response on success
    pub async fn send(self) -> Result<reqwest::Response, Error> {
        let token = self.gateway.store.get(TokenKind::Access)?;
        tracing::debug!(method = %self.method, path = %self.path, "dispatching request");

        // Anonymous callers go out with no Authorization header; the server
        // decides whether the endpoint needs one.
        let response = self.build(token.as_deref())?.send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return finish(response).await;
        }

        tracing::debug!(path = %self.path, "access token rejected, attempting refresh");
        match self.gateway.refresh.refresh(token.as_deref()).await {
            Ok(fresh) => {
                // Exactly one replay; whatever it returns is final
                let retry = self.build(Some(&fresh))?.send().await?;
                finish(retry).await
            }
            Err(_) => {
                tracing::warn!(path = %self.path, "token refresh failed, clearing session");
                if let Err(err) = self.gateway.store.clear_all() {
                    tracing::warn!(%err, "failed to clear stored tokens");
                }
                self.gateway.session.reset_anonymous();
                Err(Error::SessionExpired)
            }
        }
    }

    fn build(&self, token: Option<&str>) -> Result<reqwest::RequestBuilder, Error> {
        let mut url = Url::parse(&self.gateway.endpoint(&self.path))?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.query {
                pairs.append_pair(name, value);
            }
        }

        let mut request = self.gateway.http.request(self.method.clone(), url.as_str());
        request = request.headers(self.headers.clone());
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = &self.body {
            request = request
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body.clone());
        }
        Ok(request)
    }
}

/// Convert a terminal response into the error taxonomy
async fn finish(response: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(Error::from_status(status.as_u16(), message))
}
