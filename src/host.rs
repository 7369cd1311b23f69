//! Native host services the session consumes as opaque collaborators:
//! file pickers and the external-app delegate. Injected into the
//! controller so tests can substitute scripted implementations.

use std::future::Future;
use std::pin::Pin;

use log::{info, warn};

use crate::error::SessionError;
use crate::file_handle::{DirectoryHandle, FileHandle};
use crate::media_type;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone)]
pub struct SaveFilePickerOptions {
    pub suggested_name: String,
    pub mime_type: String,
    pub start_in: Option<DirectoryHandle>,
    pub accept: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct OpenFilePickerOptions {
    pub start_in: Option<DirectoryHandle>,
    pub accept: Vec<String>,
    pub single_file: bool,
}

/// Native file picker surface. A `None` save pick or an empty open pick
/// means the user dismissed the dialog.
pub trait FilePicker: Send {
    fn pick_save_file<'a>(
        &'a self,
        options: SaveFilePickerOptions,
    ) -> BoxFuture<'a, Option<FileHandle>>;

    fn pick_open_files<'a>(
        &'a self,
        options: OpenFilePickerOptions,
    ) -> BoxFuture<'a, Vec<FileHandle>>;
}

/// Host surface for operations outside the session's own file capabilities.
pub trait HostDelegate: Send {
    fn is_externally_writable<'a>(&'a self, handle: &'a FileHandle) -> BoxFuture<'a, bool>;

    fn open_in_editor<'a>(
        &'a self,
        handle: &'a FileHandle,
        mime_type: &'a str,
    ) -> BoxFuture<'a, Result<(), SessionError>>;
}

/// Non-interactive picker backed by one directory: save picks create the
/// suggested name there, open picks return the directory's files filtered
/// by the accepted extensions.
pub struct DirectoryPicker {
    directory: DirectoryHandle,
}

impl DirectoryPicker {
    pub fn new(directory: DirectoryHandle) -> Self {
        Self { directory }
    }

    fn accepts(accept: &[String], name: &str) -> bool {
        if accept.is_empty() {
            return true;
        }
        accept.iter().any(|key| {
            media_type::mime_for(name)
                .map(|mime| mime.starts_with(key.trim_end_matches('*')))
                .unwrap_or(false)
                || name.to_ascii_lowercase().ends_with(&key.to_ascii_lowercase())
        })
    }
}

impl FilePicker for DirectoryPicker {
    fn pick_save_file<'a>(
        &'a self,
        options: SaveFilePickerOptions,
    ) -> BoxFuture<'a, Option<FileHandle>> {
        Box::pin(async move {
            let directory = options.start_in.unwrap_or_else(|| self.directory.clone());
            match directory.create_file(&options.suggested_name).await {
                Ok(handle) => Some(handle),
                Err(err) => {
                    warn!("save pick of {:?} failed: {err}", options.suggested_name);
                    None
                }
            }
        })
    }

    fn pick_open_files<'a>(
        &'a self,
        options: OpenFilePickerOptions,
    ) -> BoxFuture<'a, Vec<FileHandle>> {
        Box::pin(async move {
            let directory = options.start_in.unwrap_or_else(|| self.directory.clone());
            let mut read_dir = match directory.read_dir().await {
                Ok(read_dir) => read_dir,
                Err(err) => {
                    warn!("open pick in {:?} failed: {err}", directory.path());
                    return Vec::new();
                }
            };

            let mut picked = Vec::new();
            while let Ok(Some(entry)) = read_dir.next_entry().await {
                let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
                if !is_file {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if !Self::accepts(&options.accept, &name) {
                    continue;
                }
                picked.push(directory.file_handle(&name));
                if options.single_file {
                    break;
                }
            }
            picked.sort_by(|a, b| a.name().cmp(&b.name()));
            picked
        })
    }
}

/// Delegate for hosts with no external integrations: nothing is externally
/// writable and there is no editor to hand off to.
pub struct NullHostDelegate;

impl HostDelegate for NullHostDelegate {
    fn is_externally_writable<'a>(&'a self, _handle: &'a FileHandle) -> BoxFuture<'a, bool> {
        Box::pin(async { false })
    }

    fn open_in_editor<'a>(
        &'a self,
        handle: &'a FileHandle,
        mime_type: &'a str,
    ) -> BoxFuture<'a, Result<(), SessionError>> {
        Box::pin(async move {
            info!("no editor registered for {:?} ({mime_type})", handle.path());
            Ok(())
        })
    }
}
