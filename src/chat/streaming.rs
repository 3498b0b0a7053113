//! Streaming reply assembly
//!
//! While an assistant reply streams in, consumers want to render the
//! partial text under a stable id before any node exists in the tree.
//! [`StreamingAssembler`] accumulates chunks under a provisional UUID and
//! emits an observable snapshot per non-empty chunk; only a successful
//! [`finalize`](StreamingAssembler::finalize) turns the accumulation into
//! text worth persisting.

use crate::error::{ModelFailure, Result, TangentError};
use crate::message::Role;
use uuid::Uuid;

/// Snapshot of an in-flight assistant reply.
///
/// The id is provisional: it identifies the stream, not the message
/// record that is eventually persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingUpdate {
    /// Stable id for this stream, distinct from any persisted message id
    pub provisional_id: String,
    /// Always [`Role::Assistant`]
    pub role: Role,
    /// Text accumulated so far
    pub content: String,
}

/// Accumulates streamed text chunks into one assistant reply.
#[derive(Debug)]
pub struct StreamingAssembler {
    provisional_id: String,
    buffer: String,
    finalized: bool,
}

impl StreamingAssembler {
    /// Creates an assembler with a fresh provisional id.
    pub fn new() -> Self {
        Self {
            provisional_id: Uuid::new_v4().to_string(),
            buffer: String::new(),
            finalized: false,
        }
    }

    /// Provisional id of the reply being assembled.
    pub fn provisional_id(&self) -> &str {
        &self.provisional_id
    }

    /// Text accumulated so far.
    pub fn content(&self) -> &str {
        &self.buffer
    }

    /// Feeds one chunk into the accumulation.
    ///
    /// Empty chunks are skipped and produce no snapshot; services emit
    /// them freely (role-only deltas, keep-alives).
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::InvalidState`] if the assembler was
    /// already finalized.
    pub fn on_chunk(&mut self, delta: &str) -> Result<Option<StreamingUpdate>> {
        if self.finalized {
            return Err(TangentError::InvalidState(
                "streaming assembler already finalized".to_string(),
            ));
        }
        if delta.is_empty() {
            return Ok(None);
        }
        self.buffer.push_str(delta);
        Ok(Some(StreamingUpdate {
            provisional_id: self.provisional_id.clone(),
            role: Role::Assistant,
            content: self.buffer.clone(),
        }))
    }

    /// Consumes the accumulation, exactly once.
    ///
    /// # Errors
    ///
    /// * [`TangentError::InvalidState`] - called a second time; the
    ///   first call consumes the accumulation whether it succeeded or not
    /// * [`TangentError::ModelService`] with
    ///   [`ModelFailure::EmptyResponse`] - nothing but empty or
    ///   whitespace chunks arrived; there is no reply to persist
    pub fn finalize(&mut self) -> Result<String> {
        if self.finalized {
            return Err(TangentError::InvalidState(
                "streaming assembler already finalized".to_string(),
            ));
        }
        self.finalized = true;
        if self.buffer.trim().is_empty() {
            return Err(TangentError::model(
                ModelFailure::EmptyResponse,
                "streamed reply was empty",
            ));
        }
        Ok(std::mem::take(&mut self.buffer))
    }
}

impl Default for StreamingAssembler {
    fn default() -> Self {
        Self::new()
    }
}
