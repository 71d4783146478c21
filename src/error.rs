//! Error types for pagetree

use std::borrow::Cow;
use std::fmt;
use std::io;
use thiserror::Error;

use crate::model::VersionKind;

/// The main error type for page tree operations
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The page code does not exist in the requested version
    #[error("Page '{code}' not found in the {version} tree")]
    NotFound {
        /// Code that was looked up
        code: String,
        /// Version (draft or online) the lookup ran against
        version: VersionKind,
    },

    /// Widget frame index outside `[0, frame_count)`
    #[error("Frame {frame} out of bounds: the page model defines {frame_count} frames")]
    FrameOutOfBounds {
        /// Requested frame index
        frame: i32,
        /// Number of frames of the page model
        frame_count: usize,
    },

    /// Reparenting a page under itself or one of its descendants
    #[error("Cannot move page '{code}' under '{target}': target is inside the moved subtree")]
    CyclicMove {
        /// Page being moved
        code: String,
        /// Requested new parent
        target: String,
    },

    /// Mutation of a slot holding (or receiving) a locked widget
    #[error("Widget type '{type_code}' in frame {frame} is locked")]
    LockedWidget {
        /// Locked widget type
        type_code: String,
        /// Frame the mutation targeted
        frame: i32,
    },

    /// Delete requested on a page that still has children
    #[error("Page '{0}' still has children")]
    HasChildren(String),

    /// Delete requested on a page that still has an online version
    #[error("Page '{0}' is online and must be taken offline before deletion")]
    PagePublished(String),

    /// A page with this code already exists
    #[error("Page code '{0}' already exists")]
    DuplicateCode(String),

    /// The page model is not known to the model lookup
    #[error("Unknown page model '{0}'")]
    UnknownPageModel(String),

    /// The widget type is not known to the widget type lookup
    #[error("Unknown widget type '{0}'")]
    UnknownWidgetType(String),

    /// Widget array length does not match the model frame count
    #[error("Page model '{model_code}' defines {expected} frames, version carries {found}")]
    FrameCountMismatch {
        /// Page model code
        model_code: String,
        /// Frame count of the model
        expected: usize,
        /// Length of the supplied widget array
        found: usize,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {0}")]
    InvalidOperation(&'static str),

    /// Transaction failure; the transaction has been rolled back
    #[error("Persistence failure: {0}")]
    Persistence(#[from] PersistenceError),
}

impl Error {
    /// Shorthand for a draft-tree `NotFound`
    pub fn draft_not_found(code: impl Into<String>) -> Self {
        Error::NotFound { code: code.into(), version: VersionKind::Draft }
    }

    /// Shorthand for an online-tree `NotFound`
    pub fn online_not_found(code: impl Into<String>) -> Self {
        Error::NotFound { code: code.into(), version: VersionKind::Online }
    }

    /// Whether this error implies a rolled-back transaction
    pub fn is_persistence(&self) -> bool {
        matches!(self, Error::Persistence(_))
    }
}

/// Failures raised by the row store inside a transaction
#[derive(Error, Debug, Clone)]
pub enum PersistenceError {
    /// A uniqueness or referential constraint was violated
    #[error("constraint violation on {table}: {details}")]
    Constraint {
        /// Table name
        table: &'static str,
        /// Description of the violated constraint
        details: String,
    },

    /// A statement expected a row that does not exist
    #[error("missing row in {table} for key {key}")]
    MissingRow {
        /// Table name
        table: &'static str,
        /// Key of the missing row
        key: String,
    },

    /// I/O error while persisting a snapshot
    #[error("I/O error: {0}")]
    Io(String),

    /// Snapshot encoding or decoding failed
    #[error("codec error: {0}")]
    Codec(Cow<'static, str>),

    /// Snapshot failed checksum validation
    #[error("corrupted snapshot: {details}")]
    Corruption {
        /// Description of the corruption
        details: String,
    },
}

impl From<io::Error> for PersistenceError {
    fn from(err: io::Error) -> Self {
        PersistenceError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Codec(err.to_string().into())
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Persistence(err.into())
    }
}

/// Transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result type alias for pagetree operations
pub type Result<T> = std::result::Result<T, Error>;
