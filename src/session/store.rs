//! The ordered list of files known to the session and its focus cursor.

use crate::file_handle::FileHandle;
use crate::session::tokens::Token;

/// Privileged-side record pairing a token with its handle and cached
/// state. At most one descriptor per token exists in the store at a time.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub token: Token,
    pub handle: FileHandle,
    /// Cleared after every snapshot push, forcing a re-open on next
    /// access.
    pub cached_bytes: Option<Vec<u8>>,
    pub last_error: Option<String>,
    pub in_current_directory: bool,
}

impl FileDescriptor {
    pub fn new(token: Token, handle: FileHandle, in_current_directory: bool) -> Self {
        Self {
            token,
            handle,
            cached_bytes: None,
            last_error: None,
            in_current_directory,
        }
    }

    pub fn name(&self) -> String {
        self.handle.name()
    }
}

/// Ordered descriptor sequence plus the focus cursor. Invariant:
/// `current_index` is -1 exactly when the store is empty, otherwise it is
/// a valid index.
#[derive(Debug, Default)]
pub struct FileDescriptorStore {
    files: Vec<FileDescriptor>,
    current_index: i64,
}

impl FileDescriptorStore {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            current_index: -1,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    pub fn current_index(&self) -> i64 {
        self.current_index
    }

    pub fn current(&self) -> Option<&FileDescriptor> {
        self.get(usize::try_from(self.current_index).ok()?)
    }

    pub fn current_mut(&mut self) -> Option<&mut FileDescriptor> {
        let index = usize::try_from(self.current_index).ok()?;
        self.files.get_mut(index)
    }

    pub fn get(&self, index: usize) -> Option<&FileDescriptor> {
        self.files.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut FileDescriptor> {
        self.files.get_mut(index)
    }

    pub fn find_by_token(&self, token: Token) -> Option<usize> {
        self.files.iter().position(|fd| fd.token == token)
    }

    /// Atomically swap the full list and cursor (relaunch flows).
    pub fn replace_all(&mut self, descriptors: Vec<FileDescriptor>, focus_index: i64) {
        self.files = descriptors;
        self.current_index = if self.files.is_empty() {
            -1
        } else {
            focus_index.clamp(0, self.files.len() as i64 - 1)
        };
    }

    /// Append extra descriptors without touching the cursor (scan merge).
    pub fn append(&mut self, descriptors: Vec<FileDescriptor>) {
        self.files.extend(descriptors);
        if self.current_index < 0 && !self.files.is_empty() {
            self.current_index = 0;
        }
    }

    /// Insert right after the cursor; returns the insertion index.
    pub fn insert_after_current(&mut self, descriptor: FileDescriptor) -> usize {
        let at = if self.files.is_empty() {
            0
        } else {
            self.current_index as usize + 1
        };
        self.insert_at(at, descriptor)
    }

    /// Insert at `index` (clamped); returns the actual index. The cursor
    /// keeps pointing at the same descriptor.
    pub fn insert_at(&mut self, index: usize, descriptor: FileDescriptor) -> usize {
        let at = index.min(self.files.len());
        self.files.insert(at, descriptor);
        if self.current_index < 0 {
            self.current_index = 0;
        } else if (at as i64) <= self.current_index && self.files.len() > 1 {
            self.current_index += 1;
        }
        at
    }

    /// Point the cursor at `index` (clamped into range; -1 on empty).
    pub fn set_current(&mut self, index: i64) {
        self.current_index = if self.files.is_empty() {
            -1
        } else {
            index.clamp(0, self.files.len() as i64 - 1)
        };
    }

    /// Remove the descriptor at `index`. The cursor follows the same
    /// modular rule as `advance`, so removing the focus file fills the gap
    /// with its successor (wrapping at the tail).
    pub fn remove_at(&mut self, index: usize) -> Option<FileDescriptor> {
        if index >= self.files.len() {
            return None;
        }
        let removed = self.files.remove(index);
        let len = self.files.len() as i64;
        if len == 0 {
            self.current_index = -1;
        } else if (index as i64) < self.current_index {
            self.current_index -= 1;
        } else if (index as i64) == self.current_index {
            self.current_index %= len;
        }
        Some(removed)
    }

    /// Move the cursor by `delta`, wrapping modulo the store length. The
    /// reference index is the cursor, unless `from_token` resolves to a
    /// present entry, in which case that entry's index is used instead
    /// (navigation relative to a file the UI still shows). A token that no
    /// longer resolves falls back to the stored cursor.
    pub fn advance(&mut self, delta: i64, from_token: Option<Token>) -> i64 {
        if self.files.is_empty() {
            self.current_index = -1;
            return -1;
        }
        let reference = from_token
            .and_then(|token| self.find_by_token(token))
            .map(|index| index as i64)
            .unwrap_or(self.current_index);
        self.current_index = (reference + delta).rem_euclid(self.files.len() as i64);
        self.current_index
    }

    /// Blank every descriptor's cached bytes (post-snapshot).
    pub fn clear_cached_bytes(&mut self) {
        for fd in &mut self.files {
            fd.cached_bytes = None;
        }
    }

    /// Filenames of everything after the head entry, for scan dedup.
    pub fn names_after_head(&self) -> Vec<String> {
        self.files.iter().skip(1).map(FileDescriptor::name).collect()
    }
}
