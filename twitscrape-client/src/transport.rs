//! Guest sessions against the remote service.
//!
//! A [`Transport`] hands out one [`Session`] per attempt. Sessions are never
//! repaired: when anything goes wrong the caller drops the session and opens a
//! new one, which with a Tor proxy also means a new circuit.

use crate::config::ClientConfig;
use reqwest::{
    StatusCode, Url,
    blocking::Client,
    header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, InvalidHeaderValue, USER_AGENT},
};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const GUEST_TOKEN_HEADER: &str = "x-guest-token";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Building the HTTP client failed: {0}")]
    Build(reqwest::Error),
    #[error("Invalid proxy url: {0}")]
    InvalidProxyUrl(String),
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
    #[error("Request failed: {0}")]
    Request(reqwest::Error),
    #[error("Failed to get guest token, status {0}")]
    GuestTokenRejected(StatusCode),
}

impl TransportError {
    /// Whether opening a fresh session might get past this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Request(_))
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: String,
}

pub trait Session {
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<TransportResponse, TransportError>;
}

pub trait Transport {
    type Session: Session;

    fn open_session(&self) -> Result<Self::Session, TransportError>;
}

#[derive(Deserialize)]
struct GuestToken {
    guest_token: String,
}

/// Unauthenticated sessions carrying a guest token, optionally over a SOCKS
/// proxy.
#[derive(Clone, Debug)]
pub struct GuestTransport {
    headers: HeaderMap,
    guest_activate_url: String,
    proxy_url: Option<Url>,
}

impl GuestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(&config.user_agent)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", config.bearer_token))?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);

        let proxy_url = config
            .proxy_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|err| TransportError::InvalidProxyUrl(err.to_string()))?;

        Ok(Self {
            headers,
            guest_activate_url: config.guest_activate_url.clone(),
            proxy_url,
        })
    }

    fn build_client(&self) -> Result<Client, TransportError> {
        let mut builder = Client::builder().default_headers(self.headers.clone());

        if let Some(proxy_url) = &self.proxy_url {
            // Tor isolates streams by SOCKS credentials, so random ones give
            // every session its own circuit.
            let mut proxy_url = proxy_url.clone();
            let username = format!("{:016x}", rand::random::<u64>());
            let password = format!("{:016x}", rand::random::<u64>());
            proxy_url
                .set_username(&username)
                .and_then(|()| proxy_url.set_password(Some(&password)))
                .map_err(|()| TransportError::InvalidProxyUrl(proxy_url.to_string()))?;

            let proxy = reqwest::Proxy::all(proxy_url).map_err(TransportError::Build)?;
            builder = builder.proxy(proxy);
        }

        builder.build().map_err(TransportError::Build)
    }
}

impl Transport for GuestTransport {
    type Session = GuestSession;

    fn open_session(&self) -> Result<GuestSession, TransportError> {
        loop {
            let client = self.build_client()?;
            let response = client
                .post(&self.guest_activate_url)
                .send()
                .map_err(TransportError::Request)?;

            match response.status() {
                StatusCode::OK => {
                    let GuestToken { guest_token } =
                        response.json().map_err(TransportError::Request)?;
                    debug!("Obtained guest token");

                    return Ok(GuestSession {
                        client,
                        guest_token,
                    });
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    debug!("Guest token request was rate limited, re-circuiting...");
                }
                status => return Err(TransportError::GuestTokenRejected(status)),
            }
        }
    }
}

pub struct GuestSession {
    client: Client,
    guest_token: String,
}

impl Session for GuestSession {
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .header(GUEST_TOKEN_HEADER, &self.guest_token)
            .send()
            .map_err(TransportError::Request)?;

        let status = response.status();
        let body = response.text().map_err(TransportError::Request)?;

        Ok(TransportResponse { status, body })
    }
}
