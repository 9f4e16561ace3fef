//! Driven port for request files and supporting documents.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use super::define_port_error;

/// Largest accepted file, in bytes.
pub const MAX_DOCUMENT_BYTES: usize = 26 * 1024 * 1024;

/// What a stored file is for; decides the accepted extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// The IMEI batch file.
    ImeiFile,
    /// Supporting documents attached for review.
    Supporting,
}

impl DocumentKind {
    /// Lower-case extensions accepted for this kind.
    pub fn allowed_extensions(self) -> &'static [&'static str] {
        match self {
            Self::ImeiFile => &["txt", "csv"],
            Self::Supporting => &["pdf", "jpg", "png"],
        }
    }
}

/// Metadata of a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub name: String,
    pub size: usize,
    /// Hex-encoded SHA-256 of the content.
    pub sha256: String,
}

define_port_error! {
    /// Errors raised by document store adapters.
    pub enum DocumentStoreError {
        /// The file exceeds [`MAX_DOCUMENT_BYTES`].
        TooLarge { size: usize } => "file of {size} bytes exceeds the upload limit",
        /// The file name is unsafe or has a disallowed extension.
        InvalidName { name: String } => "file name is not accepted: {name}",
        /// No such file for the request.
        NotFound { name: String } => "file not found: {name}",
        /// Underlying storage failed.
        Io { message: String } => "document storage failed: {message}",
    }
}

/// Check a file name and size before storing.
///
/// Names must be a single path component with an extension accepted for
/// `kind`.
pub fn validate_upload(kind: DocumentKind, name: &str, size: usize) -> Result<(), DocumentStoreError> {
    if size > MAX_DOCUMENT_BYTES {
        return Err(DocumentStoreError::too_large(size));
    }
    let single_component = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && name != "..";
    let extension_ok = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .is_some_and(|ext| kind.allowed_extensions().contains(&ext.as_str()));
    if single_component && extension_ok {
        Ok(())
    } else {
        Err(DocumentStoreError::invalid_name(name))
    }
}

/// Port for per-request file storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store `content` under the request's directory, replacing any file of
    /// the same name.
    async fn store(
        &self,
        tracking_id: &Uuid,
        kind: DocumentKind,
        name: &str,
        content: &[u8],
    ) -> Result<StoredDocument, DocumentStoreError>;

    /// Read a stored file back.
    async fn read(&self, tracking_id: &Uuid, name: &str) -> Result<Vec<u8>, DocumentStoreError>;

    /// Names of the files stored for a request.
    async fn list(&self, tracking_id: &Uuid) -> Result<Vec<String>, DocumentStoreError>;
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(DocumentKind::ImeiFile, "imeis.csv", true)]
    #[case(DocumentKind::ImeiFile, "IMEIS.TXT", true)]
    #[case(DocumentKind::ImeiFile, "imeis.pdf", false)]
    #[case(DocumentKind::Supporting, "invoice.pdf", true)]
    #[case(DocumentKind::Supporting, "../invoice.pdf", false)]
    #[case(DocumentKind::Supporting, ".hidden.png", false)]
    #[case(DocumentKind::Supporting, "noextension", false)]
    fn names_are_checked_per_kind(
        #[case] kind: DocumentKind,
        #[case] name: &str,
        #[case] accepted: bool,
    ) {
        assert_eq!(validate_upload(kind, name, 10).is_ok(), accepted);
    }

    #[rstest]
    fn oversized_files_are_rejected() {
        let err = validate_upload(DocumentKind::ImeiFile, "a.txt", MAX_DOCUMENT_BYTES + 1)
            .expect_err("too large");
        assert_eq!(err, DocumentStoreError::too_large(MAX_DOCUMENT_BYTES + 1));
    }
}
