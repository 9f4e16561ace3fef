//! `DocumentStore` over a capability-scoped upload directory.

use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cap_std::fs::Dir;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use super::atomic::{open_root, write_replacing};
use crate::domain::ports::{
    DocumentKind, DocumentStore, DocumentStoreError, StoredDocument, validate_upload,
};

/// Stores each request's files under `<root>/<tracking id>/`.
#[derive(Clone)]
pub struct CapStdDocumentStore {
    root: Arc<Dir>,
}

impl CapStdDocumentStore {
    /// Open (creating if needed) the upload root.
    ///
    /// # Errors
    ///
    /// Returns the I/O error when the directory cannot be created or opened.
    pub fn open(root: &Path) -> io::Result<Self> {
        Ok(Self {
            root: Arc::new(open_root(root)?),
        })
    }
}

fn io_error(error: &io::Error) -> DocumentStoreError {
    DocumentStoreError::io(error.to_string())
}

fn join_error(error: &tokio::task::JoinError) -> DocumentStoreError {
    DocumentStoreError::io(format!("storage task failed: {error}"))
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\'])
}

#[async_trait]
impl DocumentStore for CapStdDocumentStore {
    async fn store(
        &self,
        tracking_id: &Uuid,
        kind: DocumentKind,
        name: &str,
        content: &[u8],
    ) -> Result<StoredDocument, DocumentStoreError> {
        validate_upload(kind, name, content.len())?;
        let root = Arc::clone(&self.root);
        let folder = tracking_id.to_string();
        let file_name = name.to_owned();
        let bytes = content.to_vec();

        let stored = tokio::task::spawn_blocking(move || -> io::Result<StoredDocument> {
            root.create_dir_all(&folder)?;
            let dir = root.open_dir(&folder)?;
            write_replacing(&dir, &file_name, &bytes)?;
            Ok(StoredDocument {
                name: file_name,
                size: bytes.len(),
                sha256: hex::encode(Sha256::digest(&bytes)),
            })
        })
        .await
        .map_err(|err| join_error(&err))?
        .map_err(|err| io_error(&err))?;

        debug!(%tracking_id, name = %stored.name, size = stored.size, "document stored");
        Ok(stored)
    }

    async fn read(&self, tracking_id: &Uuid, name: &str) -> Result<Vec<u8>, DocumentStoreError> {
        if !is_plain_name(name) {
            return Err(DocumentStoreError::invalid_name(name));
        }
        let root = Arc::clone(&self.root);
        let path = Path::new(&tracking_id.to_string()).join(name);
        let missing = name.to_owned();

        tokio::task::spawn_blocking(move || root.read(&path))
            .await
            .map_err(|err| join_error(&err))?
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => DocumentStoreError::not_found(missing),
                _ => io_error(&err),
            })
    }

    async fn list(&self, tracking_id: &Uuid) -> Result<Vec<String>, DocumentStoreError> {
        let root = Arc::clone(&self.root);
        let folder = tracking_id.to_string();

        tokio::task::spawn_blocking(move || -> io::Result<Vec<String>> {
            let entries = match root.read_dir(&folder) {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(err) => return Err(err),
            };
            let mut names = Vec::new();
            for entry in entries {
                let name = entry?.file_name().to_string_lossy().into_owned();
                if is_plain_name(&name) {
                    names.push(name);
                }
            }
            names.sort();
            Ok(names)
        })
        .await
        .map_err(|err| join_error(&err))?
        .map_err(|err| io_error(&err))
    }
}
