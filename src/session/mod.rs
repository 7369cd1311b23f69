pub mod controller;
pub mod handlers;
pub mod scanner;
pub mod sequencer;
pub mod state;
pub mod store;
pub mod tokens;

pub use controller::{LaunchEvent, SessionController};
pub use scanner::{DirectoryScanner, ScanOutcome, SortOrder};
pub use sequencer::{LaunchGeneration, LaunchSequencer};
pub use state::SessionState;
pub use store::{FileDescriptor, FileDescriptorStore};
pub use tokens::{Token, TokenRegistry};
