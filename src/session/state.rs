//! Mutable state owned by one session. Constructed once per controller;
//! no module-level globals, so tests can run independent sessions side by
//! side.

use crate::file_handle::DirectoryHandle;
use crate::session::scanner::SortOrder;
use crate::session::store::{FileDescriptor, FileDescriptorStore};
use crate::session::tokens::TokenRegistry;

pub struct SessionState {
    pub tokens: TokenRegistry,
    pub store: FileDescriptorStore,
    /// The one launch directory; replaced wholesale on every new launch,
    /// never merged.
    pub current_directory: Option<DirectoryHandle>,
    /// Subtitle sidecar attached to the focus file, outside the ring.
    pub sidecar: Option<FileDescriptor>,
    pub sort_order: SortOrder,
}

impl SessionState {
    pub fn new(sort_order: SortOrder) -> Self {
        Self {
            tokens: TokenRegistry::new(),
            store: FileDescriptorStore::new(),
            current_directory: None,
            sidecar: None,
            sort_order,
        }
    }
}
