use serde::{Deserialize, Serialize};

/// Process-wide configuration shared by both binaries, loaded by each
/// `main.rs` via the `config` crate layered over a YAML file and the
/// environment (teacher's `podautoscaler/main.rs` `CONFIG` pattern).
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterConfig {
    /// Orchestrator API server base URL.
    pub api_server_url: String,
    /// Orchestrator API server watch (websocket) base URL.
    pub api_server_watch_url: String,

    /// Minimum TLS version accepted on the Metric Adapter Service's HTTP
    /// listener. Read from `KEDA_HTTP_MIN_TLS_VERSION` (§6, External
    /// Interfaces) with this field's own name layered under it.
    #[serde(default = "default_http_min_tls_version")]
    pub keda_http_min_tls_version: String,
    /// Minimum TLS version accepted on the Metric Adapter Service's gRPC
    /// listener. Read from `KEDA_GRPC_MIN_TLS_VERSION` (§6).
    #[serde(default = "default_grpc_min_tls_version")]
    pub keda_grpc_min_tls_version: String,
}

fn default_http_min_tls_version() -> String {
    "TLS12".to_string()
}

fn default_grpc_min_tls_version() -> String {
    "TLS13".to_string()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            api_server_url: "http://localhost:8080".to_string(),
            api_server_watch_url: "ws://localhost:8080".to_string(),
            keda_http_min_tls_version: default_http_min_tls_version(),
            keda_grpc_min_tls_version: default_grpc_min_tls_version(),
        }
    }
}
