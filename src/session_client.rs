//! Session client with bearer injection and one-shot token refresh

use crate::config::{resolve, ClientConfig};
use crate::error::{ClientError, Result};
use crate::token_store::{MemoryTokenStore, TokenStore};
use crate::types::{RefreshRequest, RefreshResponse};
use async_singleflight::Group;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

/// Macro to check HTTP response status and return the surfaced error if not successful
macro_rules! check_response {
    ($response:expr) => {
        if !$response.status().is_success() {
            let status = $response.status();
            let text = $response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, text));
        }
    };
}

const SESSION_EVENT_CAPACITY: usize = 16;
const REFRESH_FLIGHT_KEY: &str = "refresh";

/// Session lifecycle notifications
///
/// `Expired` replaces a forced redirect to the login page: the application
/// decides how to send the user back through `login`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    Refreshed,
    LoggedOut,
    Expired { reason: String },
}

/// A logical call travelling through the funnel
#[derive(Debug)]
struct PendingRequest {
    method: Method,
    path: String,
    body: Option<Value>,
    headers: HeaderMap,
    /// Set once the request has been replayed after a refresh
    retried: bool,
    /// Access token attached on replay, taking precedence over the store
    bearer: Option<String>,
}

/// HTTP client that injects the stored access token into every request
/// and recovers from a rejected access token with a single refresh
pub struct SessionClient<S = MemoryTokenStore> {
    config: ClientConfig,
    base_url: Url,
    refresh_url: Url,
    http_client: Client,
    token_store: S,
    events: broadcast::Sender<SessionEvent>,
    /// Error type is String because singleflight requires a shared, cloneable error type
    refresh_singleflight: Group<String, String>,
}

impl SessionClient<MemoryTokenStore> {
    /// Client whose session lives only as long as the process
    pub fn in_memory(config: ClientConfig) -> Result<Self> {
        Self::new(config, MemoryTokenStore::new())
    }
}

impl<S: TokenStore> SessionClient<S> {
    /// Create a session client over an existing token store
    ///
    /// # Arguments
    /// * `config` - Client configuration; `base_url` must be an http(s) URL
    /// * `token_store` - Where the access/refresh pair is read from and written to
    ///
    /// Tokens already in the store are used by the first request.
    pub fn new(config: ClientConfig, token_store: S) -> Result<Self> {
        let base_url = config.parsed_base_url()?;
        let refresh_url = resolve(&base_url, &config.refresh_path)?;

        let mut builder = Client::builder().user_agent(config.user_agent.as_str());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);

        debug!(base_url = %base_url, refresh_url = %refresh_url, "Created session client");

        Ok(Self {
            config,
            base_url,
            refresh_url,
            http_client,
            token_store,
            events,
            refresh_singleflight: Group::new(),
        })
    }

    /// Configuration the client was built from
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Normalised origin every request path is resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get the token store (for advanced usage)
    pub fn token_store(&self) -> &S {
        &self.token_store
    }

    /// Receive session events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Whether an access token is currently stored
    pub fn is_authenticated(&self) -> bool {
        self.token_store.access_token().is_some()
    }

    /// Send a request through the session funnel
    ///
    /// - A stored access token is attached as `Authorization: Bearer <token>`
    /// - 2xx responses are returned unchanged
    /// - The first 401 triggers one refresh and one replay with the new token
    /// - A failed refresh, or a missing refresh token, clears the session,
    ///   emits [`SessionEvent::Expired`] and returns [`ClientError::SessionExpired`]
    /// - Any other status, including a 401 on the replay, is returned as an error
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        headers: Option<HeaderMap>,
    ) -> Result<Response> {
        let request = PendingRequest {
            method,
            path: path.to_string(),
            body: body.cloned(),
            headers: headers.unwrap_or_default(),
            retried: false,
            bearer: None,
        };

        self.dispatch(request).await
    }

    /// GET `path` through the funnel
    pub async fn get(&self, path: &str) -> Result<Response> {
        self.request(Method::GET, path, None, None).await
    }

    /// POST a JSON `body` to `path` through the funnel
    pub async fn post(&self, path: &str, body: &Value) -> Result<Response> {
        self.request(Method::POST, path, Some(body), None).await
    }

    /// PATCH `path` with a partial JSON `body` through the funnel
    pub async fn patch(&self, path: &str, body: &Value) -> Result<Response> {
        self.request(Method::PATCH, path, Some(body), None).await
    }

    /// DELETE `path` through the funnel
    pub async fn delete(&self, path: &str) -> Result<Response> {
        self.request(Method::DELETE, path, None, None).await
    }

    async fn dispatch(&self, mut request: PendingRequest) -> Result<Response> {
        loop {
            let response = self.send(&request).await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::UNAUTHORIZED && !request.retried {
                debug!(
                    method = %request.method,
                    path = %request.path,
                    "Access token rejected, attempting refresh"
                );

                let access_token = self.recover_session().await?;
                request.retried = true;
                request.bearer = Some(access_token);
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            debug!(
                method = %request.method,
                path = %request.path,
                status = %status,
                retried = request.retried,
                "Request failed"
            );
            return Err(ClientError::from_status(status, body));
        }
    }

    async fn send(&self, request: &PendingRequest) -> Result<Response> {
        let url = resolve(&self.base_url, &request.path)?;

        let mut headers = request.headers.clone();
        let bearer = request
            .bearer
            .clone()
            .or_else(|| self.token_store.access_token());
        if let Some(token) = bearer {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
        }

        let mut builder = self
            .http_client
            .request(request.method.clone(), url)
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(
            method = %request.method,
            path = %request.path,
            retried = request.retried,
            "Dispatching request"
        );

        Ok(builder.send().await?)
    }

    /// Send a request outside the funnel: no bearer token, no refresh on 401
    pub(crate) async fn send_public(&self, path: &str, body: &Value) -> Result<Response> {
        let url = resolve(&self.base_url, path)?;
        let response = self.http_client.post(url).json(body).send().await?;
        check_response!(response);
        Ok(response)
    }

    /// Exchange the stored refresh token for a new access token, or tear the
    /// session down when that is impossible
    async fn recover_session(&self) -> Result<String> {
        let Some(refresh_token) = self.token_store.refresh_token() else {
            return Err(self.expire_session("no refresh token stored".to_string()));
        };

        let outcome = if self.config.coalesce_refresh {
            self.refresh_access_token_singleflight(&refresh_token).await
        } else {
            self.refresh_access_token(&refresh_token).await
        };

        outcome.map_err(|e| self.expire_session(e.to_string()))
    }

    async fn refresh_access_token_singleflight(&self, refresh_token: &str) -> Result<String> {
        // Only one task performs the refresh call; the others wait and reuse its result
        let (success_opt, error_opt, _shared) = self
            .refresh_singleflight
            .work(REFRESH_FLIGHT_KEY, async {
                self.refresh_access_token(refresh_token)
                    .await
                    .map_err(|e| e.to_string())
            })
            .await;

        match (success_opt, error_opt) {
            (Some(token), None) => Ok(token),
            (None, Some(err_str)) => Err(ClientError::Refresh(err_str)),
            _ => Err(ClientError::Refresh("Unknown error during token refresh".to_string())),
        }
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String> {
        let request = RefreshRequest {
            refresh: refresh_token.to_string(),
        };

        // Deliberately bypasses the funnel so a rejected refresh cannot recurse
        let response = self
            .http_client
            .post(self.refresh_url.clone())
            .json(&request)
            .send()
            .await?;

        check_response!(response);

        let refreshed: RefreshResponse = response.json().await?;
        self.token_store.set_access_token(refreshed.access.clone())?;

        info!("Access token refreshed successfully");
        self.emit(SessionEvent::Refreshed);

        Ok(refreshed.access)
    }

    /// Clear both tokens, announce the expiry and build the caller's error
    fn expire_session(&self, reason: String) -> ClientError {
        warn!(reason = %reason, "Session expired, clearing stored tokens");

        if let Err(e) = self.token_store.clear() {
            warn!(error = %e, "Failed to clear stored tokens");
        }

        self.emit(SessionEvent::Expired {
            reason: reason.clone(),
        });

        ClientError::SessionExpired(reason)
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // Sending only fails when nobody is subscribed
        let _ = self.events.send(event);
    }
}
