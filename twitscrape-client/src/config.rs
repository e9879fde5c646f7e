use std::fmt::{Debug, Formatter};

pub const GRAPHQL_BASE_URL: &str = "https://twitter.com/i/api/graphql";
pub const GUEST_ACTIVATE_URL: &str = "https://api.twitter.com/1.1/guest/activate.json";
/// Bearer token embedded in the public web client.
pub const WEB_BEARER_TOKEN: &str = "AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; rv:78.0) Gecko/20100101 Firefox/78.0";
pub const DEFAULT_BATCH_COUNT: u32 = 20;

/// Everything the client layers need, built once at startup.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct ClientConfig {
    pub graphql_base_url: String,
    pub guest_activate_url: String,
    pub bearer_token: String,
    pub user_agent: String,
    /// e.g. `socks5h://127.0.0.1:9050` for a local Tor daemon.
    pub proxy_url: Option<String>,
    /// Page size requested per timeline query.
    pub batch_count: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            graphql_base_url: GRAPHQL_BASE_URL.to_owned(),
            guest_activate_url: GUEST_ACTIVATE_URL.to_owned(),
            bearer_token: WEB_BEARER_TOKEN.to_owned(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            proxy_url: None,
            batch_count: DEFAULT_BATCH_COUNT,
        }
    }
}

impl Debug for ClientConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("graphql_base_url", &self.graphql_base_url)
            .field("guest_activate_url", &self.guest_activate_url)
            .field("bearer_token", &"[redacted]")
            .field("user_agent", &self.user_agent)
            .field("proxy_url", &self.proxy_url)
            .field("batch_count", &self.batch_count)
            .finish()
    }
}
