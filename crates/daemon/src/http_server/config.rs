use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Listen address
    pub listen_addr: SocketAddr,
    // log level for http tracing
    pub log_level: tracing::Level,
    // how long a single request may run
    pub request_timeout: Duration,
}

impl Config {
    pub fn new(listen_addr: SocketAddr, request_timeout: Duration) -> Self {
        tracing::info!(
            "Creating HTTP server Config: listen_addr={}, request_timeout={:?}",
            listen_addr,
            request_timeout
        );
        Self {
            listen_addr,
            log_level: tracing::Level::INFO,
            request_timeout,
        }
    }
}
