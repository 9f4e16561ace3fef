//! File-system adapters for request documents and generated lists.
//!
//! Both adapters hold a capability-scoped [`cap_std::fs::Dir`] and run their
//! blocking I/O on Tokio's blocking pool. Writes go to a hidden staging name
//! first and are renamed into place.

mod atomic;
mod document_store;
mod list_writer;

pub use document_store::CapStdDocumentStore;
pub use list_writer::CsvListWriter;
