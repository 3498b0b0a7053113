//! Branching conversation machinery
//!
//! This module groups the pieces a session is built from: the tree that
//! records reply structure, the cursor that tracks the active branch,
//! the cache that keeps hot payloads close, and the assembler that
//! folds streamed deltas into one reply. [`ChatSession`] ties them
//! together.

pub mod cache;
pub mod cursor;
pub mod session;
pub mod streaming;
mod title;
pub mod tree;

pub use cache::{CacheSweeper, MessageCache};
pub use cursor::{CursorState, SessionCursor};
pub use session::ChatSession;
pub use streaming::{StreamingAssembler, StreamingUpdate};
pub use tree::ConversationTree;
