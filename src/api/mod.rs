pub mod models;
pub mod paging;

#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Default Spotify Web API root.
pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";

/// Per-request timeout for the production backend.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),
    #[error("HTTP {method} {url} failed: {message}")]
    Transport {
        method: Method,
        url: String,
        message: String,
    },
    #[error("{context} failed with HTTP {status}")]
    UnexpectedStatus { context: String, status: u16 },
    #[error("Failed to decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        })
    }
}

/// A fully prepared request, headers included.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<String>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status, `Retry-After` and raw body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub retry_after: Option<u64>,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, 200 | 201)
    }

    /// Decode the body as JSON, labelling failures with `context`.
    pub fn json<T: DeserializeOwned>(&self, context: &str) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|source| ApiError::Decode {
            context: context.to_string(),
            source,
        })
    }

    /// Turn anything other than 200/201 into an `UnexpectedStatus` error.
    pub fn ensure_success(self, context: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::UnexpectedStatus {
                context: context.to_string(),
                status: self.status,
            })
        }
    }
}

/// Something that can put a request on the wire.
///
/// Non-2xx statuses are returned as a normal `Response`; only failures that
/// produced no HTTP status at all are errors.
pub trait HttpBackend {
    fn execute(&self, request: &Request) -> Result<Response>;
}

impl<B: HttpBackend + ?Sized> HttpBackend for &B {
    fn execute(&self, request: &Request) -> Result<Response> {
        (**self).execute(request)
    }
}

/// Production backend on a shared `ureq` agent.
pub struct UreqBackend {
    agent: ureq::Agent,
}

impl UreqBackend {
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

impl Default for UreqBackend {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(&'static str, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    builder
}

impl HttpBackend for UreqBackend {
    fn execute(&self, request: &Request) -> Result<Response> {
        let transport_err = |e: ureq::Error| ApiError::Transport {
            method: request.method,
            url: request.url.clone(),
            message: e.to_string(),
        };

        let body = request.body.as_deref().unwrap_or("");
        let result = match request.method {
            Method::Get => with_headers(self.agent.get(&request.url), &request.headers).call(),
            Method::Post => {
                with_headers(self.agent.post(&request.url), &request.headers).send(body)
            }
            Method::Put => with_headers(self.agent.put(&request.url), &request.headers).send(body),
        };
        let mut response = result.map_err(transport_err)?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(transport_err)?;

        Ok(Response {
            status,
            retry_after,
            body,
        })
    }
}

/// Bounded retry settings for transient failures (429 and 5xx).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per request, the first one included.
    pub max_attempts: u32,
    /// Added on top of the server's `Retry-After` value.
    pub rate_limit_buffer_secs: u64,
    /// Used when a 429 carries no usable `Retry-After` header.
    pub default_retry_after_secs: u64,
    /// Linear backoff step for 5xx: attempt `n` sleeps `n * step`.
    pub server_error_step_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            rate_limit_buffer_secs: 1,
            default_retry_after_secs: 2,
            server_error_step_secs: 2,
        }
    }
}

impl RetryPolicy {
    /// How long to wait before retrying after `response` on the 1-based
    /// `attempt`, or `None` if the response should be handed back as is.
    pub fn backoff(&self, response: &Response, attempt: u32) -> Option<Duration> {
        match response.status {
            429 => {
                let wait = response.retry_after.unwrap_or(self.default_retry_after_secs);
                Some(Duration::from_secs(
                    wait.saturating_add(self.rate_limit_buffer_secs),
                ))
            }
            s if s >= 500 => Some(Duration::from_secs(
                self.server_error_step_secs
                    .saturating_mul(u64::from(attempt)),
            )),
            _ => None,
        }
    }
}

type Sleeper = Box<dyn Fn(Duration)>;

/// Authenticated request issuer with retry/backoff on rate limiting and
/// server errors.
pub struct Transport<B> {
    backend: B,
    token: String,
    policy: RetryPolicy,
    sleeper: Sleeper,
}

impl<B: HttpBackend> Transport<B> {
    /// Build a transport. A blank token is a configuration error.
    pub fn new(backend: B, token: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ApiError::MissingCredential("SPOTIFY_ACCESS_TOKEN"));
        }
        Ok(Self {
            backend,
            token: token.to_string(),
            policy: RetryPolicy::default(),
            sleeper: Box::new(thread::sleep),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn get(&self, url: &str) -> Result<Response> {
        self.request(Method::Get, url, None)
    }

    /// Send a request, retrying transient failures.
    ///
    /// Once attempts run out the last response is returned unchanged, so the
    /// caller always has to check the status itself.
    pub fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response> {
        let request = Request {
            method,
            url: url.to_string(),
            headers: vec![
                ("Authorization", format!("Bearer {}", self.token)),
                ("Content-Type", "application/json".to_string()),
            ],
            body: body.map(|b| b.to_string()),
        };

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            log::trace!("{method} {url} (attempt {attempt}/{max_attempts})");
            let response = self.backend.execute(&request)?;

            let Some(wait) = self.policy.backoff(&response, attempt) else {
                log::debug!("{method} {url} -> {}", response.status);
                return Ok(response);
            };
            if attempt >= max_attempts {
                log::warn!(
                    "{method} {url} still failing with HTTP {} after {attempt} attempts",
                    response.status
                );
                return Ok(response);
            }

            log::warn!(
                "{method} {url} -> HTTP {}, retrying in {}s",
                response.status,
                wait.as_secs()
            );
            (self.sleeper)(wait);
            attempt += 1;
        }
    }
}
