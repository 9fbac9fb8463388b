use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Ordered upstream endpoints, raced in parallel for every query.
    /// Accepted forms: `udp://`, `tcp://`, `tls://`, `doq://`, `https://`,
    /// or a bare `IP:PORT` (treated as UDP).
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,

    /// Single IP used to resolve upstream hostnames at startup, so the
    /// proxy never depends on itself for name resolution.
    #[serde(default = "default_bootstrap")]
    pub bootstrap: String,

    /// Per-attempt bound in seconds for one upstream exchange inside a race.
    #[serde(default = "default_query_timeout")]
    pub query_timeout: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            bootstrap: default_bootstrap(),
            query_timeout: default_query_timeout(),
        }
    }
}

fn default_servers() -> Vec<String> {
    vec!["8.8.8.8:53".to_string(), "1.1.1.1:53".to_string()]
}

fn default_bootstrap() -> String {
    "8.8.8.8".to_string()
}

fn default_query_timeout() -> u64 {
    5
}
