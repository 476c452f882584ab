//! Gateway configuration.
//!
//! For now this only configures the HTTP listen address. The underlying
//! validator configuration is taken from `validator_core::ValidatorConfig::default()`.

use std::net::SocketAddr;

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let addr: SocketAddr = "0.0.0.0:8091".parse().expect("hard-coded gateway listen address should parse");
        Self { listen_addr: addr }
    }
}
