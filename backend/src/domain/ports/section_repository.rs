//! Port for review section persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Section, SectionComment, SectionType};

use super::define_port_error;

define_port_error! {
    /// Errors raised by section repository adapters.
    pub enum SectionRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "section repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "section repository query failed: {message}",
    }
}

/// Port for recording section reviews.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SectionRepository: Send + Sync {
    /// Append a comment and set the section's current status in one
    /// transaction, creating the section on first review.
    async fn record(
        &self,
        request_id: &Uuid,
        section_type: SectionType,
        comment: &SectionComment,
    ) -> Result<Section, SectionRepositoryError>;

    /// Sections of a request with their comment logs.
    async fn list(&self, request_id: &Uuid) -> Result<Vec<Section>, SectionRepositoryError>;
}
