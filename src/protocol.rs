//! Logical message catalog crossing the privileged/untrusted boundary.
//! Every payload is JSON-serializable; the transport itself is the opaque
//! request/response pipe in [`crate::pipe`].

use serde::{Deserialize, Serialize};

use crate::session::tokens::Token;

/// Wire shape of one tracked file as seen by the untrusted side. Bytes are
/// transient: only the focus file (and its sidecar) carry them, and the
/// receiver must re-request them otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContext {
    pub token: Token,
    pub file: Option<Vec<u8>>,
    pub name: String,
    pub error: String,
    pub can_delete: bool,
    pub can_rename: bool,
}

/// Full or incremental file list pushed from privileged to untrusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub current_file_index: i64,
    pub files: Vec<FileContext>,
    /// Subtitle sidecar attached to the focus file, outside the ring.
    pub sidecar: Option<FileContext>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RenameResult {
    Success,
    FileExists,
    FileNoLongerInLastOpenedDirectory,
}

/// Outcome of an overwrite that could not write in place and fell back to
/// the save-file picker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverwriteResult {
    pub renamed_to: Option<String>,
    pub error_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Message {
    /// Handshake from the untrusted side; observed before the first
    /// snapshot is sent.
    IframeReady,
    DeleteFile {
        token: Token,
    },
    RenameFile {
        token: Token,
        new_filename: String,
    },
    OverwriteFile {
        token: Token,
        bytes: Vec<u8>,
    },
    Navigate {
        direction: i64,
        current_file_token: Option<Token>,
    },
    RequestSaveFile {
        suggested_name: String,
        mime_type: String,
        start_in_token: Option<Token>,
        accept: Vec<String>,
    },
    SaveAs {
        bytes: Vec<u8>,
        old_file_token: Option<Token>,
        picked_file_token: Token,
    },
    OpenFilesWithPicker {
        start_in_token: Option<Token>,
        accept: Vec<String>,
        is_single_file: bool,
    },
    OpenAllowedFile {
        file_token: Token,
    },
    IsFileWritable {
        token: Token,
    },
    IsFileExternallyWritable {
        token: Token,
    },
    OpenInEditor {
        token: Token,
        mime_type: String,
    },
    // Privileged -> untrusted pushes.
    LoadFiles(Snapshot),
    LoadExtraFiles {
        extra_files: Vec<FileContext>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Reply {
    None,
    Rename {
        rename_result: RenameResult,
    },
    Overwrite(OverwriteResult),
    PickedSaveFile {
        picked_file: Option<FileContext>,
    },
    SavedAs {
        new_filename: String,
    },
    FileContents {
        bytes: Vec<u8>,
    },
    Writable {
        writable: bool,
    },
}

/// Error propagated back over the pipe as a rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub name: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_round_trip_as_json() {
        let message = Message::RenameFile {
            token: Token::from_raw(7),
            new_filename: "b.jpg".to_string(),
        };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"rename-file\""));
        let back: Message = serde_json::from_str(&json).unwrap();
        match back {
            Message::RenameFile { new_filename, .. } => assert_eq!(new_filename, "b.jpg"),
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn rename_result_uses_screaming_case() {
        let json = serde_json::to_string(&RenameResult::FileExists).unwrap();
        assert_eq!(json, "\"FILE_EXISTS\"");
    }
}
