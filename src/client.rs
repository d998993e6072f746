//! MOLGENIS session.
//!
//! Low-level HTTP transport that handles URL resolution, the session token
//! and error translation. Entity operations are implemented on [`Session`]
//! in the `rows`, `pagination`, `metadata`, `upload` and `import` modules.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{resolve_urls, SessionConfig};
use crate::error::{MolgenisError, Result};

/// Header carrying the session token.
pub const TOKEN_HEADER: &str = "x-molgenis-token";

/// A session with the MOLGENIS REST API.
///
/// A session starts unauthenticated (or with a pre-issued token), becomes
/// authenticated after [`login`](Session::login) and is unauthenticated again
/// after [`logout`](Session::logout).
///
/// The transport keeps no cookies between requests; authentication relies on
/// the token header alone.
///
/// # Example
///
/// ```no_run
/// use molgenis_client::Session;
///
/// # async fn example() -> molgenis_client::Result<()> {
/// let mut session = Session::new("http://localhost:8080/")?;
/// session.login("admin", "admin").await?;
/// let people = session.get("Person", &Default::default(), None).await?;
/// println!("{} people", people.len());
/// session.logout().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    http: Client,
    root_url: Url,
    api_url: Url,
    token: Option<String>,
    poll_interval: Duration,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("api_url", &self.api_url.as_str())
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

impl Session {
    /// Create an unauthenticated session for the given server URL.
    ///
    /// The URL may be given with or without a trailing `/api` segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(url: &str) -> Result<Self> {
        Self::from_config(SessionConfig::new(url))
    }

    /// Create a session that reuses an existing token.
    pub fn with_token(url: &str, token: &str) -> Result<Self> {
        Self::from_config(SessionConfig::new(url).with_token(token))
    }

    /// Create a session from a full configuration.
    pub fn from_config(config: SessionConfig) -> Result<Self> {
        let (root_url, api_url) = resolve_urls(&config.url)?;

        let http = Client::builder()
            .user_agent(config.user_agent)
            .brotli(true)
            .gzip(true)
            .deflate(true)
            .timeout(config.timeout)
            .build()
            .map_err(MolgenisError::HttpError)?;

        Ok(Self {
            http,
            root_url,
            api_url,
            token: config.token,
            poll_interval: config.poll_interval,
        })
    }

    /// Root URL of the server, e.g. `https://host/`.
    pub fn root_url(&self) -> &Url {
        &self.root_url
    }

    /// API URL of the server, e.g. `https://host/api/`.
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// The current session token, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Whether the session currently holds a token.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Log in and store the acquired token in this session.
    ///
    /// # Errors
    ///
    /// Returns [`MolgenisError::Authentication`] if the server rejects the
    /// credentials.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let url = self.api_url.join("v1/login")?;
        let response = self
            .http
            .post(url)
            .json(&LoginRequest { username, password })
            .send()
            .await
            .map_err(MolgenisError::HttpError)?;

        let response = match Self::check_response(response).await {
            Ok(response) => response,
            Err(MolgenisError::RequestError {
                message,
                status_code,
            }) => {
                return Err(MolgenisError::Authentication {
                    message,
                    status_code,
                })
            }
            Err(e) => return Err(e),
        };

        let login: LoginResponse = response.json().await.map_err(MolgenisError::HttpError)?;
        self.token = Some(login.token);
        tracing::debug!("logged in");
        Ok(())
    }

    /// Invalidate the current token on the server and forget it locally.
    #[tracing::instrument(skip(self))]
    pub async fn logout(&mut self) -> Result<()> {
        self.send(self.request(Method::POST, "v1/logout")?).await?;
        self.token = None;
        tracing::debug!("logged out");
        Ok(())
    }

    /// Start a request to a path relative to the API URL.
    pub(crate) fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.api_url.join(path)?;
        Ok(self.request_url(method, url))
    }

    /// Start a request to an absolute URL, attaching the token header.
    pub(crate) fn request_url(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.header(TOKEN_HEADER, token),
            None => builder,
        }
    }

    /// Start a request with a JSON body.
    pub(crate) fn request_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<RequestBuilder> {
        let body = serde_json::to_vec(body)?;
        Ok(self
            .request(method, path)?
            .header(CONTENT_TYPE, "application/json")
            .body(body))
    }

    /// Send a request and translate error responses.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(MolgenisError::HttpError)?;
        Self::check_response(response).await
    }

    /// Make a GET request to a path relative to the API URL.
    #[tracing::instrument(skip(self))]
    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        let response = self.send(self.request(Method::GET, path)?).await?;
        response.json().await.map_err(MolgenisError::HttpError)
    }

    /// Check response status and convert errors.
    async fn check_response(response: Response) -> Result<Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        let message = error_message(status, &url, &body);
        tracing::debug!(%status, %message, "request failed");

        Err(MolgenisError::RequestError {
            message,
            status_code: Some(status.as_u16()),
        })
    }
}

/// Build the message for a failed request.
///
/// The status line is always present; the server's `errors[0].message` is
/// appended when the body is JSON that carries one.
pub(crate) fn error_message(status: StatusCode, url: &Url, body: &str) -> String {
    let status_line = format!("{status} for url: {url}");

    let server_message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.pointer("/errors/0/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        });

    match server_message {
        Some(msg) => format!("{status_line}: {msg}"),
        None => status_line,
    }
}

/// Percent-encode a single path segment.
pub(crate) fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
