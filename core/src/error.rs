use crate::types::ObjectId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Format errors ──────────────────────────────
    #[error("Unknown chunk '{name}' in save stream")]
    UnknownChunk { name: String },

    #[error("Save stream ended without the SG_EOF sentinel")]
    MissingEndOfFile,

    #[error("'{context}' has version {found}, newest supported is {max}")]
    VersionTooNew { context: String, found: u8, max: u8 },

    #[error("Corrupt state in '{field}': {reason}")]
    CorruptState { field: String, reason: String },

    #[error("Unexpected end of data reading '{field}' ({needed} bytes at offset {offset})")]
    UnexpectedEof { field: String, offset: usize, needed: usize },

    #[error("Segment '{segment}' overrun: declared {declared} bytes, read past its end")]
    SegmentOverrun { segment: String, declared: u32 },

    #[error("String '{field}' cannot be persisted: {reason}")]
    InvalidString { field: String, reason: String },

    #[error("Scope mismatch: expected to close {expected}, found {found}")]
    ScopeMismatch { expected: String, found: String },

    // ── Logical / configuration errors ─────────────
    #[error("State machine '{machine}' has no state {id}")]
    UnknownStateId { machine: String, id: u32 },

    #[error("State machine '{machine}' exceeded {limit} transitions in one frame")]
    TransitionLoop { machine: String, limit: u32 },

    #[error("Unknown module kind '{kind}'")]
    UnknownModuleKind { kind: String },

    #[error("Object {object} has no module tagged '{tag}'")]
    UnknownModuleTag { object: ObjectId, tag: String },

    #[error("Unknown object template '{name}'")]
    UnknownTemplate { name: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // ── Runtime assumption violations ──────────────
    #[error("Object {id} not found")]
    ObjectNotFound { id: ObjectId },

    #[error("Player {index} not found")]
    PlayerNotFound { index: u32 },

    #[error("Logic clock advanced while paused at frame {frame}")]
    ClockPaused { frame: u32 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    pub fn corrupt(field: &str, reason: impl Into<String>) -> Self {
        SimError::CorruptState {
            field:  field.to_string(),
            reason: reason.into(),
        }
    }

    /// True for failures caused by the bytes of a save stream rather than
    /// by engine configuration or runtime state.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            SimError::UnknownChunk { .. }
                | SimError::MissingEndOfFile
                | SimError::VersionTooNew { .. }
                | SimError::CorruptState { .. }
                | SimError::UnexpectedEof { .. }
                | SimError::SegmentOverrun { .. }
                | SimError::InvalidString { .. }
        )
    }
}
