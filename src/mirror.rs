//! Untrusted-side mirror of the session's file list. Receives snapshots,
//! wraps each file in a handle whose operations are pipe round-trips; the
//! mirror never touches the file system itself.

use std::sync::{Arc, Mutex};

use log::warn;

use crate::error::SessionError;
use crate::pipe::{PipeEnd, PipeReceiver, PipeSender};
use crate::protocol::{FileContext, Message, OverwriteResult, RenameResult, Reply, Snapshot};
use crate::session::tokens::Token;

/// Explicit capability set attached to each mirrored file, derived from
/// the server-declared flags. Callers check it; the privileged side
/// enforces it regardless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub delete: bool,
    pub rename: bool,
}

/// One file as seen from the untrusted side.
#[derive(Debug, Clone)]
pub struct MirrorFile {
    token: Token,
    name: String,
    error: String,
    bytes: Option<Vec<u8>>,
    capabilities: Capabilities,
    pipe: PipeSender,
}

impl MirrorFile {
    fn from_context(context: FileContext, pipe: PipeSender) -> Self {
        Self {
            token: context.token,
            name: context.name,
            error: context.error,
            bytes: context.file,
            capabilities: Capabilities {
                delete: context.can_delete,
                rename: context.can_rename,
            },
            pipe,
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    /// Bytes carried by the last snapshot; only the focus file has them.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.bytes.as_deref()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub async fn delete_original(&self) -> Result<(), SessionError> {
        if !self.capabilities.delete {
            return Err(SessionError::NotCapable);
        }
        self.pipe
            .send(Message::DeleteFile { token: self.token })
            .await?;
        Ok(())
    }

    pub async fn rename_original(&self, new_name: &str) -> Result<RenameResult, SessionError> {
        if !self.capabilities.rename {
            return Err(SessionError::NotCapable);
        }
        match self
            .pipe
            .send(Message::RenameFile {
                token: self.token,
                new_filename: new_name.to_string(),
            })
            .await?
        {
            Reply::Rename { rename_result } => Ok(rename_result),
            _ => Err(SessionError::UnexpectedMessage),
        }
    }

    pub async fn overwrite_original(&self, bytes: Vec<u8>) -> Result<OverwriteResult, SessionError> {
        match self
            .pipe
            .send(Message::OverwriteFile {
                token: self.token,
                bytes,
            })
            .await?
        {
            Reply::Overwrite(result) => Ok(result),
            _ => Err(SessionError::UnexpectedMessage),
        }
    }

    /// Save a copy under `suggested_name`: runs the save picker, then
    /// writes to the picked destination. `None` when the picker was
    /// dismissed.
    pub async fn save_as(
        &self,
        bytes: Vec<u8>,
        suggested_name: &str,
        mime_type: &str,
    ) -> Result<Option<String>, SessionError> {
        let Some(picked) = self
            .request_save_file(suggested_name, mime_type)
            .await?
        else {
            return Ok(None);
        };
        match self
            .pipe
            .send(Message::SaveAs {
                bytes,
                old_file_token: Some(self.token),
                picked_file_token: picked.token,
            })
            .await?
        {
            Reply::SavedAs { new_filename } => Ok(Some(new_filename)),
            _ => Err(SessionError::UnexpectedMessage),
        }
    }

    /// Run the save picker and hand back the destination context without
    /// writing to it (export flows).
    pub async fn request_save_file(
        &self,
        suggested_name: &str,
        mime_type: &str,
    ) -> Result<Option<FileContext>, SessionError> {
        match self
            .pipe
            .send(Message::RequestSaveFile {
                suggested_name: suggested_name.to_string(),
                mime_type: mime_type.to_string(),
                start_in_token: Some(self.token),
                accept: Vec::new(),
            })
            .await?
        {
            Reply::PickedSaveFile { picked_file } => Ok(picked_file),
            _ => Err(SessionError::UnexpectedMessage),
        }
    }

    /// Re-request this file's bytes; snapshots blank everything but the
    /// focus file.
    pub async fn read_contents(&self) -> Result<Vec<u8>, SessionError> {
        match self
            .pipe
            .send(Message::OpenAllowedFile {
                file_token: self.token,
            })
            .await?
        {
            Reply::FileContents { bytes } => Ok(bytes),
            _ => Err(SessionError::UnexpectedMessage),
        }
    }

    pub async fn is_writable(&self) -> Result<bool, SessionError> {
        match self
            .pipe
            .send(Message::IsFileWritable { token: self.token })
            .await?
        {
            Reply::Writable { writable } => Ok(writable),
            _ => Err(SessionError::UnexpectedMessage),
        }
    }

    pub async fn is_externally_writable(&self) -> Result<bool, SessionError> {
        match self
            .pipe
            .send(Message::IsFileExternallyWritable { token: self.token })
            .await?
        {
            Reply::Writable { writable } => Ok(writable),
            _ => Err(SessionError::UnexpectedMessage),
        }
    }

    pub async fn open_in_editor(&self, mime_type: &str) -> Result<(), SessionError> {
        self.pipe
            .send(Message::OpenInEditor {
                token: self.token,
                mime_type: mime_type.to_string(),
            })
            .await?;
        Ok(())
    }
}

/// The mirrored list. Mutated only by full replacement (`load-files`),
/// append-only growth (`load-extra-files`) and `filter_in_place`; every
/// structural change originates on the privileged side.
#[derive(Debug, Default)]
pub struct MirrorList {
    files: Vec<MirrorFile>,
    current_index: i64,
    sidecar: Option<MirrorFile>,
}

impl MirrorList {
    fn load(&mut self, snapshot: Snapshot, pipe: &PipeSender) {
        self.files = snapshot
            .files
            .into_iter()
            .map(|context| MirrorFile::from_context(context, pipe.clone()))
            .collect();
        self.current_index = snapshot.current_file_index;
        self.sidecar = snapshot
            .sidecar
            .map(|context| MirrorFile::from_context(context, pipe.clone()));
    }

    fn load_extra(&mut self, extra: Vec<FileContext>, pipe: &PipeSender) {
        self.files.extend(
            extra
                .into_iter()
                .map(|context| MirrorFile::from_context(context, pipe.clone())),
        );
    }

    fn filter_in_place(&mut self, keep: &dyn Fn(&MirrorFile) -> bool) {
        let current_token = usize::try_from(self.current_index)
            .ok()
            .and_then(|index| self.files.get(index))
            .map(MirrorFile::token);
        self.files.retain(|file| keep(file));
        self.current_index = match current_token
            .and_then(|token| self.files.iter().position(|f| f.token() == token))
        {
            Some(index) => index as i64,
            None if self.files.is_empty() => -1,
            None => self.current_index.clamp(0, self.files.len() as i64 - 1),
        };
    }
}

/// Handle the untrusted application surface holds on the mirrored state.
#[derive(Clone)]
pub struct Mirror {
    shared: Arc<Mutex<MirrorList>>,
    pipe: PipeSender,
}

impl Mirror {
    /// Split the pipe, perform the ready handshake, and hand back the
    /// mirror plus the pump that applies host pushes. The handshake runs
    /// before this returns, so the host never sends a snapshot that
    /// nothing is listening for.
    pub async fn attach(end: PipeEnd) -> Result<(Mirror, MirrorPump), SessionError> {
        let (sender, receiver) = end.split();
        sender.send(Message::IframeReady).await?;
        let shared = Arc::new(Mutex::new(MirrorList::default()));
        let mirror = Mirror {
            shared: shared.clone(),
            pipe: sender.clone(),
        };
        Ok((
            mirror,
            MirrorPump {
                shared,
                pipe: sender,
                receiver,
            },
        ))
    }

    pub fn files(&self) -> Vec<MirrorFile> {
        self.shared.lock().unwrap().files.clone()
    }

    pub fn current_index(&self) -> i64 {
        self.shared.lock().unwrap().current_index
    }

    pub fn current(&self) -> Option<MirrorFile> {
        let list = self.shared.lock().unwrap();
        usize::try_from(list.current_index)
            .ok()
            .and_then(|index| list.files.get(index))
            .cloned()
    }

    pub fn sidecar(&self) -> Option<MirrorFile> {
        self.shared.lock().unwrap().sidecar.clone()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().unwrap().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn filter_in_place(&self, keep: &dyn Fn(&MirrorFile) -> bool) {
        self.shared.lock().unwrap().filter_in_place(keep);
    }

    /// Step the focus cursor, navigating relative to the file this view
    /// believes is current.
    pub async fn navigate(&self, direction: i64) -> Result<(), SessionError> {
        let current_file_token = self.current().map(|file| file.token());
        self.pipe
            .send(Message::Navigate {
                direction,
                current_file_token,
            })
            .await?;
        Ok(())
    }

    /// Ask the privileged side for a full relaunch from the open picker.
    pub async fn open_files_with_picker(
        &self,
        accept: Vec<String>,
        single_file: bool,
    ) -> Result<(), SessionError> {
        let start_in_token = self.current().map(|file| file.token());
        self.pipe
            .send(Message::OpenFilesWithPicker {
                start_in_token,
                accept,
                is_single_file: single_file,
            })
            .await?;
        Ok(())
    }
}

/// Applies host pushes to the shared list until the host side closes.
pub struct MirrorPump {
    shared: Arc<Mutex<MirrorList>>,
    pipe: PipeSender,
    receiver: PipeReceiver,
}

impl MirrorPump {
    pub async fn run(mut self) {
        while let Some(incoming) = self.receiver.recv().await {
            let (message, responder) = incoming.into_parts();
            match message {
                Message::LoadFiles(snapshot) => {
                    self.shared.lock().unwrap().load(snapshot, &self.pipe);
                }
                Message::LoadExtraFiles { extra_files } => {
                    self.shared.lock().unwrap().load_extra(extra_files, &self.pipe);
                }
                other => {
                    warn!("unexpected guest-directed message: {other:?}");
                }
            }
            responder.send(Ok(Reply::None));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(token: u32, name: &str, can_delete: bool) -> FileContext {
        FileContext {
            token: Token::from_raw(token),
            file: None,
            name: name.to_string(),
            error: String::new(),
            can_delete,
            can_rename: can_delete,
        }
    }

    fn list_with(pipe: &PipeSender, contexts: Vec<FileContext>, current: i64) -> MirrorList {
        let mut list = MirrorList::default();
        list.load(
            Snapshot {
                current_file_index: current,
                files: contexts,
                sidecar: None,
            },
            pipe,
        );
        list
    }

    #[tokio::test]
    async fn capability_check_precedes_any_pipe_traffic() {
        let (host, guest) = PipeEnd::pair();
        let (sender, _receiver) = guest.split();
        let file = MirrorFile::from_context(context(1, "a.jpg", false), sender);
        // The pipe peer is alive but the capability gate fails first.
        assert!(matches!(
            file.delete_original().await,
            Err(SessionError::NotCapable)
        ));
        assert!(matches!(
            file.rename_original("b.jpg").await,
            Err(SessionError::NotCapable)
        ));
        drop(host);
    }

    #[tokio::test]
    async fn filter_in_place_follows_the_current_file() {
        let (_host, guest) = PipeEnd::pair();
        let (sender, _receiver) = guest.split();
        let mut list = list_with(
            &sender,
            vec![
                context(1, "a.jpg", true),
                context(2, "b.jpg", true),
                context(3, "c.jpg", true),
            ],
            1,
        );

        list.filter_in_place(&|file| file.name() != "a.jpg");
        assert_eq!(list.current_index, 0);
        assert_eq!(list.files[0].name(), "b.jpg");

        list.filter_in_place(&|file| file.name() != "b.jpg");
        assert_eq!(list.current_index, 0);
        assert_eq!(list.files[0].name(), "c.jpg");

        list.filter_in_place(&|_| false);
        assert_eq!(list.current_index, -1);
        assert!(list.files.is_empty());
    }

    #[tokio::test]
    async fn extra_files_grow_the_list_without_moving_the_cursor() {
        let (_host, guest) = PipeEnd::pair();
        let (sender, _receiver) = guest.split();
        let mut list = list_with(&sender, vec![context(1, "a.jpg", true)], 0);
        list.load_extra(
            vec![context(2, "b.jpg", true), context(3, "c.jpg", true)],
            &sender,
        );
        assert_eq!(list.files.len(), 3);
        assert_eq!(list.current_index, 0);
    }
}
