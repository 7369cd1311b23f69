//! Token issue and resolution. A token is the only identity the untrusted
//! side ever holds for a file.

use std::collections::HashMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::file_handle::FileHandle;

/// Opaque integer handle identifying one tracked file across the
/// privileged/untrusted boundary. Zero is never issued; it is the sentinel
/// for a failed open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(u32);

impl Token {
    pub const NONE: Token = Token(0);

    pub fn from_raw(value: u32) -> Self {
        Token(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const BLOCK_WORDS: usize = 32;

/// Maps live tokens to file handles. Tokens come from a batched CSPRNG
/// buffer; entries for files that fall out of scope are left in place
/// rather than purged (relaxed GC), so a token is never reused while its
/// mapping is still present.
pub struct TokenRegistry {
    entries: HashMap<Token, FileHandle>,
    block: [u32; BLOCK_WORDS],
    remaining: usize,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            block: [0; BLOCK_WORDS],
            remaining: 0,
        }
    }

    fn next_word(&mut self) -> u32 {
        if self.remaining == 0 {
            rand::rng().fill(&mut self.block[..]);
            self.remaining = BLOCK_WORDS;
        }
        self.remaining -= 1;
        self.block[self.remaining]
    }

    /// Draw a fresh token for `handle`. Zero and collisions with live
    /// tokens are redrawn.
    pub fn issue(&mut self, handle: FileHandle) -> Token {
        let token = loop {
            let word = self.next_word();
            if word == 0 {
                continue;
            }
            let candidate = Token(word);
            if !self.entries.contains_key(&candidate) {
                break candidate;
            }
        };
        self.entries.insert(token, handle);
        token
    }

    /// Precondition error when the token was never issued: callers must
    /// only present tokens they were given.
    pub fn resolve(&self, token: Token) -> Result<&FileHandle, SessionError> {
        self.entries
            .get(&token)
            .ok_or(SessionError::UnknownToken(token))
    }

    /// Point an existing token at a new handle (save-as takeover, rename).
    pub fn rebind(&mut self, token: Token, handle: FileHandle) -> Result<(), SessionError> {
        match self.entries.get_mut(&token) {
            Some(slot) => {
                *slot = handle;
                Ok(())
            }
            None => Err(SessionError::UnknownToken(token)),
        }
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;

    fn handle(name: &str) -> FileHandle {
        FileHandle::new(PathBuf::from("/tmp").join(name))
    }

    #[test]
    fn issued_tokens_are_unique_and_nonzero() {
        let mut registry = TokenRegistry::new();
        let mut seen = HashSet::new();
        for i in 0..500 {
            let token = registry.issue(handle(&format!("f{i}")));
            assert!(!token.is_none());
            assert!(seen.insert(token), "token {token} issued twice");
        }
    }

    #[test]
    fn resolve_unknown_token_is_a_precondition_error() {
        let registry = TokenRegistry::new();
        assert!(matches!(
            registry.resolve(Token::from_raw(42)),
            Err(SessionError::UnknownToken(_))
        ));
    }

    #[test]
    fn rebind_replaces_the_mapping_in_place() {
        let mut registry = TokenRegistry::new();
        let token = registry.issue(handle("old.jpg"));
        registry.rebind(token, handle("new.jpg")).unwrap();
        assert_eq!(registry.resolve(token).unwrap().name(), "new.jpg");

        assert!(matches!(
            registry.rebind(Token::from_raw(1), handle("x")),
            Err(SessionError::UnknownToken(_))
        ));
    }
}
