//! Navigation, picker, and query handlers.

use log::info;

use crate::error::SessionError;
use crate::file_handle::DirectoryHandle;
use crate::host::{OpenFilePickerOptions, SaveFilePickerOptions};
use crate::protocol::FileContext;
use crate::session::controller::SessionController;
use crate::session::store::FileDescriptor;
use crate::session::tokens::Token;

/// Move the cursor and push a fresh snapshot. Never fails: an empty store
/// just parks the cursor at -1.
pub async fn handle_navigate(
    session: &mut SessionController,
    direction: i64,
    from_token: Option<Token>,
) -> Result<(), SessionError> {
    let index = session.state.store.advance(direction, from_token);
    info!("navigated by {direction} to index {index}");
    session.push_snapshot().await
}

/// Run the save-file picker and register the picked destination under a
/// fresh token. The picked file is not added to the ring; a follow-up
/// save-as inserts it.
pub async fn handle_request_save_file(
    session: &mut SessionController,
    suggested_name: String,
    mime_type: String,
    start_in_token: Option<Token>,
    accept: Vec<String>,
) -> Result<Option<FileContext>, SessionError> {
    let start_in = start_in_directory(session, start_in_token);
    let options = SaveFilePickerOptions {
        suggested_name,
        mime_type,
        start_in,
        accept,
    };
    let Some(picked) = session.picker.pick_save_file(options).await else {
        return Ok(None);
    };

    let token = session.state.tokens.issue(picked.clone());
    Ok(Some(FileContext {
        token,
        file: None,
        name: picked.name(),
        error: String::new(),
        can_delete: false,
        can_rename: false,
    }))
}

/// Full relaunch from the open-file picker. An empty pick is a silent
/// no-op, not an error.
pub async fn handle_open_files_with_picker(
    session: &mut SessionController,
    start_in_token: Option<Token>,
    accept: Vec<String>,
    single_file: bool,
) -> Result<(), SessionError> {
    let start_in = start_in_directory(session, start_in_token);
    let options = OpenFilePickerOptions {
        start_in,
        accept,
        single_file,
    };
    let picked = session.picker.pick_open_files(options).await;
    if picked.is_empty() {
        info!("open picker dismissed");
        return Ok(());
    }

    let generation = session.sequencer.begin_launch();
    session.state.current_directory = None;
    session.state.sidecar = None;
    let descriptors: Vec<FileDescriptor> = picked
        .into_iter()
        .map(|handle| {
            let token = session.state.tokens.issue(handle.clone());
            FileDescriptor::new(token, handle, false)
        })
        .collect();
    info!("relaunching with {} picked files", descriptors.len());
    session.state.store.replace_all(descriptors, 0);
    session.push_snapshot_for(generation).await
}

/// Bytes for a previously shared token; the re-request path for files
/// whose snapshot bytes were blanked.
pub async fn handle_open_allowed_file(
    session: &mut SessionController,
    token: Token,
) -> Result<Vec<u8>, SessionError> {
    let handle = session.state.tokens.resolve(token)?.clone();
    handle.read().await
}

pub async fn handle_is_file_writable(
    session: &mut SessionController,
    token: Token,
) -> Result<bool, SessionError> {
    let handle = session.state.tokens.resolve(token)?.clone();
    handle.is_writable().await
}

pub async fn handle_is_file_externally_writable(
    session: &mut SessionController,
    token: Token,
) -> Result<bool, SessionError> {
    let handle = session.state.tokens.resolve(token)?.clone();
    Ok(session.host.is_externally_writable(&handle).await)
}

pub async fn handle_open_in_editor(
    session: &mut SessionController,
    token: Token,
    mime_type: String,
) -> Result<(), SessionError> {
    let handle = session.state.tokens.resolve(token)?.clone();
    session.host.open_in_editor(&handle, &mime_type).await
}

/// Starting directory for a picker: the parent of the referenced token's
/// file when it resolves, the launch directory otherwise.
fn start_in_directory(
    session: &SessionController,
    start_in_token: Option<Token>,
) -> Option<DirectoryHandle> {
    start_in_token
        .and_then(|token| session.state.tokens.resolve(token).ok())
        .and_then(|handle| handle.path().parent().map(|p| DirectoryHandle::new(p.to_path_buf())))
        .or_else(|| session.state.current_directory.clone())
}
