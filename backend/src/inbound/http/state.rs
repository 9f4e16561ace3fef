//! Shared HTTP adapter state.
//!
//! Handlers receive this through `web::Data` and depend only on domain
//! services, so they can be exercised over in-memory adapters.

use crate::domain::RegistryServices;

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub services: RegistryServices,
}

impl HttpState {
    pub fn new(services: RegistryServices) -> Self {
        Self { services }
    }
}
