//! Gateway operations
//!
//! Composes the object store and the folder-size cache into the operations
//! the HTTP layer exposes.

pub mod service;

pub use service::{FileItem, FolderItem, FolderListing, Gateway, GatewayStatus};
