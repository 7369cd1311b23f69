//! The privileged session controller. Owns the token registry, descriptor
//! store and launch sequencing; brokers every mutation requested over the
//! pipe; pushes snapshots to the untrusted mirror.

use std::collections::{HashSet, VecDeque};

use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::error::SessionError;
use crate::file_handle::{DirectoryHandle, FileHandle};
use crate::host::{FilePicker, HostDelegate};
use crate::media_type::{self, MediaClass};
use crate::pipe::{Incoming, PipeEnd};
use crate::protocol::{ErrorShape, FileContext, Message, Reply, Snapshot};
use crate::session::handlers::{file_ops, nav_ops};
use crate::session::scanner::{Candidate, DirectoryScanner, ScanOutcome, SortOrder, sort_candidates};
use crate::session::sequencer::{LaunchGeneration, LaunchSequencer};
use crate::session::state::SessionState;
use crate::session::store::FileDescriptor;
use crate::session::tokens::Token;

/// Top-level launch events. Each one begins a new generation; navigation
/// within a launch never does.
#[derive(Debug)]
pub enum LaunchEvent {
    /// Launch with a directory and one focus file known to be inside it.
    Directory {
        directory: DirectoryHandle,
        focus: FileHandle,
    },
    /// Launch with a directory and an explicit multi-file selection.
    MultipleSelection {
        directory: DirectoryHandle,
        handles: Vec<FileHandle>,
    },
}

pub(crate) struct ScanCommit {
    pub(crate) generation: LaunchGeneration,
    pub(crate) outcome: ScanOutcome,
}

enum Tick {
    Launch(LaunchEvent),
    LaunchesClosed,
    Incoming(Incoming),
    PipeClosed,
    Scan(ScanCommit),
}

pub struct SessionController {
    pub(crate) state: SessionState,
    pub(crate) sequencer: LaunchSequencer,
    pub(crate) pipe: PipeEnd,
    pub(crate) picker: Box<dyn FilePicker>,
    pub(crate) host: Box<dyn HostDelegate>,
    scan_tx: mpsc::UnboundedSender<ScanCommit>,
    pub(crate) scan_rx: mpsc::UnboundedReceiver<ScanCommit>,
}

impl SessionController {
    pub fn new(
        pipe: PipeEnd,
        picker: Box<dyn FilePicker>,
        host: Box<dyn HostDelegate>,
        sort_order: SortOrder,
    ) -> Self {
        let (scan_tx, scan_rx) = mpsc::unbounded_channel();
        Self {
            state: SessionState::new(sort_order),
            sequencer: LaunchSequencer::new(),
            pipe,
            picker,
            host,
            scan_tx,
            scan_rx,
        }
    }

    /// Serve the session: launch events from the embedder, requests from
    /// the guest, scan completions from spawned scans. Launches are
    /// buffered until the guest's ready handshake has been observed, so a
    /// snapshot can never be sent into the void.
    pub async fn serve(mut self, mut launches: mpsc::UnboundedReceiver<LaunchEvent>) {
        let mut guest_ready = false;
        let mut pending: VecDeque<LaunchEvent> = VecDeque::new();
        loop {
            let tick = tokio::select! {
                launch = launches.recv() => match launch {
                    Some(event) => Tick::Launch(event),
                    None => Tick::LaunchesClosed,
                },
                incoming = self.pipe.recv() => match incoming {
                    Some(incoming) => Tick::Incoming(incoming),
                    None => Tick::PipeClosed,
                },
                Some(commit) = self.scan_rx.recv() => Tick::Scan(commit),
            };
            match tick {
                Tick::Launch(event) if guest_ready => self.handle_launch(event).await,
                Tick::Launch(event) => {
                    debug!("buffering launch until the guest is ready");
                    pending.push_back(event);
                }
                Tick::Incoming(incoming) => {
                    if matches!(incoming.message, Message::IframeReady) {
                        let (_, responder) = incoming.into_parts();
                        responder.send(Ok(Reply::None));
                        guest_ready = true;
                        while let Some(event) = pending.pop_front() {
                            self.handle_launch(event).await;
                        }
                    } else {
                        self.dispatch(incoming).await;
                    }
                }
                Tick::Scan(commit) => {
                    if let Err(err) = self.commit_scan(commit).await {
                        error!("scan commit failed: {err}");
                    }
                }
                Tick::LaunchesClosed | Tick::PipeClosed => break,
            }
        }
        info!("session ended");
    }

    async fn handle_launch(&mut self, event: LaunchEvent) {
        let result = match event {
            LaunchEvent::Directory { directory, focus } => {
                self.launch_with_directory(directory, focus).await
            }
            LaunchEvent::MultipleSelection { directory, handles } => {
                self.launch_with_multiple_selection(directory, handles).await
            }
        };
        if let Err(err) = result {
            error!("launch failed: {err}");
        }
    }

    /// New generation; the store becomes `[focus]` and a snapshot goes out
    /// immediately so the app is usable with one file, then the sibling
    /// scan runs in the background.
    pub async fn launch_with_directory(
        &mut self,
        directory: DirectoryHandle,
        focus: FileHandle,
    ) -> Result<(), SessionError> {
        let generation = self.sequencer.begin_launch();
        info!(
            "launching in {:?} focused on {:?}",
            directory.path(),
            focus.name()
        );
        self.state.current_directory = Some(directory.clone());
        self.state.sidecar = None;

        match focus.read().await {
            Ok(_) => {
                let token = self.state.tokens.issue(focus.clone());
                let descriptor = FileDescriptor::new(token, focus.clone(), true);
                self.state.store.replace_all(vec![descriptor], 0);
                self.attach_sidecar(&directory, &focus.name()).await;
                self.push_snapshot_for(generation).await?;
                self.spawn_scan(directory, focus.name(), generation);
            }
            Err(err) => {
                // A focus file that cannot open becomes a single
                // error-flagged descriptor with the sentinel token; no
                // scan is attempted.
                warn!("focus file {:?} failed to open: {err}", focus.name());
                let mut descriptor = FileDescriptor::new(Token::NONE, focus, true);
                descriptor.last_error = Some(err.name().to_string());
                self.state.store.replace_all(vec![descriptor], 0);
                self.push_snapshot_for(generation).await?;
            }
        }
        Ok(())
    }

    /// New generation; the store becomes exactly the given files (non-file
    /// entries dropped), sorted per the session order.
    pub async fn launch_with_multiple_selection(
        &mut self,
        directory: DirectoryHandle,
        handles: Vec<FileHandle>,
    ) -> Result<(), SessionError> {
        let generation = self.sequencer.begin_launch();
        info!(
            "launching in {:?} with {} selected files",
            directory.path(),
            handles.len()
        );
        self.state.current_directory = Some(directory);
        self.state.sidecar = None;

        let want_mtime = self.state.sort_order == SortOrder::NewestFirst;
        let mut candidates = Vec::new();
        for handle in handles {
            if !handle.is_file().await {
                continue;
            }
            let modified = if want_mtime {
                handle.last_modified().await
            } else {
                None
            };
            candidates.push(Candidate { handle, modified });
        }
        sort_candidates(self.state.sort_order, &mut candidates);

        let handles = candidates.into_iter().map(|c| c.handle).collect();
        let descriptors = self.adopt(handles);
        self.state.store.replace_all(descriptors, 0);
        self.push_snapshot_for(generation).await
    }

    /// Best-effort subtitle attachment for a video focus file.
    async fn attach_sidecar(&mut self, directory: &DirectoryHandle, focus_name: &str) {
        if media_type::classify(focus_name) != MediaClass::Video {
            return;
        }
        let Some(name) = media_type::sidecar_name(focus_name) else {
            return;
        };
        match directory.lookup(&name).await {
            Ok(handle) => {
                let token = self.state.tokens.issue(handle.clone());
                self.state.sidecar = Some(FileDescriptor::new(token, handle, true));
                info!("attached subtitle sidecar {name}");
            }
            Err(SessionError::NotFound(_)) | Err(SessionError::NotAFile(_)) => {}
            Err(err) => warn!("sidecar lookup for {name} failed: {err}"),
        }
    }

    fn spawn_scan(
        &self,
        directory: DirectoryHandle,
        focus_name: String,
        generation: LaunchGeneration,
    ) {
        let scanner = DirectoryScanner::new(self.sequencer.clone(), self.state.sort_order);
        let mut exclude: HashSet<String> =
            self.state.store.names_after_head().into_iter().collect();
        if let Some(sidecar) = &self.state.sidecar {
            exclude.insert(sidecar.name());
        }
        let tx = self.scan_tx.clone();
        tokio::spawn(async move {
            let outcome = scanner
                .scan(&directory, &focus_name, &exclude, generation)
                .await;
            let _ = tx.send(ScanCommit {
                generation,
                outcome,
            });
        });
    }

    /// Merge a finished scan into the store, re-checking the generation at
    /// this final commit point. Stale results are discarded silently.
    pub(crate) async fn commit_scan(&mut self, commit: ScanCommit) -> Result<(), SessionError> {
        if !self.sequencer.is_current(commit.generation) {
            debug!("discarding scan result from a superseded launch");
            return Ok(());
        }
        match commit.outcome {
            ScanOutcome::Abort => Ok(()),
            ScanOutcome::FocusFileRelevant(files) => {
                if files.is_empty() {
                    return Ok(());
                }
                let descriptors = self.adopt(files);
                let has_directory = self.state.current_directory.is_some();
                let extra_files: Vec<FileContext> = descriptors
                    .iter()
                    .map(|fd| self.file_context(fd, false, has_directory))
                    .collect();
                info!("scan found {} related files", extra_files.len());
                self.state.store.append(descriptors);
                self.pipe.notify(Message::LoadExtraFiles { extra_files })
            }
            ScanOutcome::FocusFileMissing(files) => {
                info!("focus file left the directory; reloading the ring");
                let descriptors = self.adopt(files);
                self.state.store.append(descriptors);
                self.push_snapshot().await
            }
        }
    }

    fn adopt(&mut self, files: Vec<FileHandle>) -> Vec<FileDescriptor> {
        files
            .into_iter()
            .map(|handle| {
                let token = self.state.tokens.issue(handle.clone());
                FileDescriptor::new(token, handle, true)
            })
            .collect()
    }

    pub(crate) async fn push_snapshot(&mut self) -> Result<(), SessionError> {
        self.push_snapshot_for(self.sequencer.current()).await
    }

    /// Re-resolve only the focus file's bytes (plus sidecar), transmit,
    /// then blank every live descriptor's cache. Superseded pushes send
    /// nothing; either way the caches are cleared so the next access
    /// re-opens.
    pub(crate) async fn push_snapshot_for(
        &mut self,
        generation: LaunchGeneration,
    ) -> Result<(), SessionError> {
        if let Some(fd) = self.state.store.current_mut() {
            if !fd.token.is_none() {
                match fd.handle.read().await {
                    Ok(bytes) => {
                        fd.cached_bytes = Some(bytes);
                        fd.last_error = None;
                    }
                    Err(err) => {
                        warn!("focus re-open of {:?} failed: {err}", fd.name());
                        fd.last_error = Some(err.name().to_string());
                    }
                }
            }
        }
        if let Some(sidecar) = self.state.sidecar.as_mut() {
            match sidecar.handle.read().await {
                Ok(bytes) => sidecar.cached_bytes = Some(bytes),
                Err(err) => sidecar.last_error = Some(err.name().to_string()),
            }
        }

        let result = if self.sequencer.is_current(generation) {
            let snapshot = self.build_snapshot();
            self.pipe.notify(Message::LoadFiles(snapshot))
        } else {
            debug!("snapshot superseded before transmit");
            Ok(())
        };

        self.state.store.clear_cached_bytes();
        if let Some(sidecar) = self.state.sidecar.as_mut() {
            sidecar.cached_bytes = None;
        }
        result
    }

    fn build_snapshot(&self) -> Snapshot {
        let has_directory = self.state.current_directory.is_some();
        let current = self.state.store.current_index();
        let files = self
            .state
            .store
            .files()
            .iter()
            .enumerate()
            .map(|(index, fd)| self.file_context(fd, index as i64 == current, has_directory))
            .collect();
        let sidecar = self
            .state
            .sidecar
            .as_ref()
            .map(|fd| self.file_context(fd, true, has_directory));
        Snapshot {
            current_file_index: current,
            files,
            sidecar,
        }
    }

    fn file_context(&self, fd: &FileDescriptor, include_bytes: bool, has_directory: bool) -> FileContext {
        let usable = !fd.token.is_none();
        FileContext {
            token: fd.token,
            file: if include_bytes {
                fd.cached_bytes.clone()
            } else {
                None
            },
            name: fd.name(),
            error: fd.last_error.clone().unwrap_or_default(),
            can_delete: usable && fd.in_current_directory && has_directory,
            can_rename: usable && fd.in_current_directory && has_directory,
        }
    }

    pub(crate) async fn dispatch(&mut self, incoming: Incoming) {
        let (message, responder) = incoming.into_parts();
        let result: Result<Reply, SessionError> = match message {
            Message::IframeReady => Ok(Reply::None),
            Message::DeleteFile { token } => file_ops::handle_delete(self, token)
                .await
                .map(|()| Reply::None),
            Message::RenameFile {
                token,
                new_filename,
            } => file_ops::handle_rename(self, token, new_filename)
                .await
                .map(|rename_result| Reply::Rename { rename_result }),
            Message::OverwriteFile { token, bytes } => {
                file_ops::handle_overwrite(self, token, bytes)
                    .await
                    .map(Reply::Overwrite)
            }
            Message::Navigate {
                direction,
                current_file_token,
            } => nav_ops::handle_navigate(self, direction, current_file_token)
                .await
                .map(|()| Reply::None),
            Message::RequestSaveFile {
                suggested_name,
                mime_type,
                start_in_token,
                accept,
            } => nav_ops::handle_request_save_file(
                self,
                suggested_name,
                mime_type,
                start_in_token,
                accept,
            )
            .await
            .map(|picked_file| Reply::PickedSaveFile { picked_file }),
            Message::SaveAs {
                bytes,
                old_file_token,
                picked_file_token,
            } => file_ops::handle_save_as(self, bytes, old_file_token, picked_file_token)
                .await
                .map(|new_filename| Reply::SavedAs { new_filename }),
            Message::OpenFilesWithPicker {
                start_in_token,
                accept,
                is_single_file,
            } => nav_ops::handle_open_files_with_picker(self, start_in_token, accept, is_single_file)
                .await
                .map(|()| Reply::None),
            Message::OpenAllowedFile { file_token } => {
                nav_ops::handle_open_allowed_file(self, file_token)
                    .await
                    .map(|bytes| Reply::FileContents { bytes })
            }
            Message::IsFileWritable { token } => nav_ops::handle_is_file_writable(self, token)
                .await
                .map(|writable| Reply::Writable { writable }),
            Message::IsFileExternallyWritable { token } => {
                nav_ops::handle_is_file_externally_writable(self, token)
                    .await
                    .map(|writable| Reply::Writable { writable })
            }
            Message::OpenInEditor { token, mime_type } => {
                nav_ops::handle_open_in_editor(self, token, mime_type)
                    .await
                    .map(|()| Reply::None)
            }
            Message::LoadFiles(_) | Message::LoadExtraFiles { .. } => {
                Err(SessionError::UnexpectedMessage)
            }
        };
        match result {
            Ok(reply) => responder.send(Ok(reply)),
            Err(err) => {
                if err.is_expected() {
                    warn!("request refused: {err}");
                } else {
                    error!("request failed: {err}");
                }
                responder.send(Err(ErrorShape::from(&err)));
            }
        }
    }
}
