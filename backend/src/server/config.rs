//! HTTP server configuration object.

use std::net::SocketAddr;

use imei_registry::domain::RegistryServices;

/// Everything the server factory needs to build an app per worker.
pub struct ServerConfig {
    pub(crate) bind_addr: SocketAddr,
    pub(crate) services: RegistryServices,
}

impl ServerConfig {
    #[must_use]
    pub fn new(bind_addr: SocketAddr, services: RegistryServices) -> Self {
        Self {
            bind_addr,
            services,
        }
    }
}
