//! Shared async HTTP plumbing behind a blocking interface.
//!
//! Slice workers are plain pool threads; each request is driven to
//! completion on a shared tokio runtime with `block_on`.

use std::sync::LazyLock;

use esdump_core::ExportError;

use crate::config::ElasticConfig;

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("esdump-http")
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Build the connection pool shared by all workers of a client.
pub fn build_client(config: &ElasticConfig) -> Result<reqwest::Client, ExportError> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .pool_max_idle_per_host(config.pool_size.max(1))
        .danger_accept_invalid_certs(config.insecure)
        .build()
        .map_err(|e| ExportError::Connection(format!("cannot build HTTP client: {e}")))
}

/// Map a transport-level reqwest error (no usable response) to the taxonomy.
pub fn transport_error(e: reqwest::Error) -> ExportError {
    let e = e.without_url();
    if let Some(status) = e.status() {
        return ExportError::Http {
            status: status.as_u16(),
            message: e.to_string(),
        };
    }
    if e.is_timeout() {
        ExportError::Connection(format!("timed out: {e}"))
    } else {
        ExportError::Connection(e.to_string())
    }
}
