//! Mutating file operations requested by the untrusted side. Every
//! handler re-validates store indices after awaits: another handler may
//! have run while this one was suspended.

use log::{info, warn};

use crate::error::SessionError;
use crate::host::SaveFilePickerOptions;
use crate::media_type;
use crate::protocol::{OverwriteResult, RenameResult};
use crate::session::controller::SessionController;
use crate::session::store::FileDescriptor;
use crate::session::tokens::Token;

/// Remove the file from the launch directory and the store, then fill the
/// navigation gap.
pub async fn handle_delete(
    session: &mut SessionController,
    token: Token,
) -> Result<(), SessionError> {
    let directory = session
        .state
        .current_directory
        .clone()
        .ok_or(SessionError::NoLaunchDirectory)?;
    let index = session
        .state
        .store
        .find_by_token(token)
        .ok_or(SessionError::UnknownToken(token))?;
    let name = session.state.store.get(index).map(|fd| fd.name()).unwrap_or_default();

    // Fails NotFound when the file moved or was renamed since the last
    // resolve.
    directory.remove_entry(&name).await?;
    info!("deleted {name}");

    // Re-find after the await; the list may have shifted underneath us.
    if let Some(index) = session.state.store.find_by_token(token) {
        session.state.store.remove_at(index);
    }
    session.push_snapshot().await
}

/// Copy to the new name inside the launch directory, drop the source, and
/// rebind the token. Collisions and a vanished source are expected
/// conditions reported as values, not errors.
pub async fn handle_rename(
    session: &mut SessionController,
    token: Token,
    new_name: String,
) -> Result<RenameResult, SessionError> {
    let directory = session
        .state
        .current_directory
        .clone()
        .ok_or(SessionError::NoLaunchDirectory)?;
    let index = session
        .state
        .store
        .find_by_token(token)
        .ok_or(SessionError::UnknownToken(token))?;
    let source = session
        .state
        .store
        .get(index)
        .map(|fd| fd.handle.clone())
        .ok_or(SessionError::UnknownToken(token))?;

    if directory.contains(&new_name).await {
        return Ok(RenameResult::FileExists);
    }

    let bytes = match source.read().await {
        Ok(bytes) => bytes,
        Err(SessionError::NotFound(_)) | Err(SessionError::NotAFile(_)) => {
            return Ok(RenameResult::FileNoLongerInLastOpenedDirectory);
        }
        Err(err) => return Err(err),
    };

    let renamed = directory.create_file(&new_name).await?;
    renamed.write_contents(&bytes).await?;
    if let Err(err) = directory.remove_entry(&source.name()).await {
        // The copy already happened; a source that vanished underneath us
        // is not worth failing the rename over.
        warn!("could not remove {:?} after rename: {err}", source.name());
    }

    session.state.tokens.rebind(token, renamed.clone())?;
    // The awaits above are suspension points; find the slot again before
    // touching it.
    if let Some(index) = session.state.store.find_by_token(token) {
        if let Some(fd) = session.state.store.get_mut(index) {
            fd.handle = renamed;
            fd.cached_bytes = None;
            fd.last_error = None;
        }
    }
    info!("renamed token {token} to {new_name}");

    session.push_snapshot().await?;
    Ok(RenameResult::Success)
}

/// Write in place. Zero-byte blobs are refused outright before any I/O;
/// other write failures fall back to a save-file picker.
pub async fn handle_overwrite(
    session: &mut SessionController,
    token: Token,
    bytes: Vec<u8>,
) -> Result<OverwriteResult, SessionError> {
    if bytes.is_empty() {
        return Err(SessionError::EmptyWrite);
    }
    let handle = session.state.tokens.resolve(token)?.clone();

    match handle.write_contents(&bytes).await {
        Ok(()) => Ok(OverwriteResult::default()),
        Err(err) => {
            warn!(
                "in-place overwrite of {:?} failed: {err}; prompting for a new destination",
                handle.name()
            );
            let options = SaveFilePickerOptions {
                suggested_name: handle.name(),
                mime_type: media_type::mime_for(&handle.name()).unwrap_or_default().to_string(),
                start_in: session.state.current_directory.clone(),
                accept: Vec::new(),
            };
            let Some(destination) = session.picker.pick_save_file(options).await else {
                return Ok(OverwriteResult {
                    renamed_to: None,
                    error_name: Some(err.name().to_string()),
                });
            };

            destination.write_contents(&bytes).await?;
            let renamed_to = destination.name();
            let in_directory = session
                .state
                .current_directory
                .as_ref()
                .map(|dir| dir.owns(&destination))
                .unwrap_or(false);
            session.state.tokens.rebind(token, destination.clone())?;
            if let Some(index) = session.state.store.find_by_token(token) {
                if let Some(fd) = session.state.store.get_mut(index) {
                    fd.handle = destination;
                    fd.cached_bytes = None;
                    fd.last_error = None;
                    fd.in_current_directory = in_directory;
                }
            }
            session.push_snapshot().await?;
            Ok(OverwriteResult {
                renamed_to: Some(renamed_to),
                error_name: None,
            })
        }
    }
}

/// Write to the pre-picked destination. On success the picked descriptor
/// becomes the current file, inserted right after the old entry, and the
/// old entry keeps its slot under a freshly issued token. No token or
/// store mutation happens until the write has succeeded, so a failed write
/// leaves every binding intact.
pub async fn handle_save_as(
    session: &mut SessionController,
    bytes: Vec<u8>,
    old_token: Option<Token>,
    picked_token: Token,
) -> Result<String, SessionError> {
    let destination = session.state.tokens.resolve(picked_token)?.clone();
    destination.write_contents(&bytes).await?;
    let new_name = destination.name();

    let in_directory = session
        .state
        .current_directory
        .as_ref()
        .map(|dir| dir.owns(&destination))
        .unwrap_or(false);
    let picked = FileDescriptor::new(picked_token, destination, in_directory);

    let old_index = old_token.and_then(|token| session.state.store.find_by_token(token));
    let at = match old_index {
        Some(old_index) => {
            // The old file hands "current" over to the saved copy but
            // keeps its position, under a fresh token.
            let old_handle = session
                .state
                .store
                .get(old_index)
                .map(|fd| fd.handle.clone())
                .ok_or(SessionError::UnknownToken(picked_token))?;
            let fresh = session.state.tokens.issue(old_handle);
            if let Some(fd) = session.state.store.get_mut(old_index) {
                fd.token = fresh;
                fd.cached_bytes = None;
            }
            session.state.store.insert_at(old_index + 1, picked)
        }
        None => session.state.store.insert_after_current(picked),
    };
    session.state.store.set_current(at as i64);
    info!("saved as {new_name} (token {picked_token})");

    session.push_snapshot().await?;
    Ok(new_name)
}
