//! Error types for the T-Balancer protocol stack
//!
//! Every [`TbanError`] maps onto a stable numeric [`ErrorCode`] so tooling can
//! render the same code/text pairs regardless of which layer failed.

use std::path::PathBuf;
use thiserror::Error;

use crate::variant::Variant;

/// Core error type for T-Balancer operations
#[derive(Error, Debug)]
pub enum TbanError {
    /// The handle has not been opened, or was closed
    #[error("Device is not open")]
    NotOpen,

    /// `open` called on a handle that is already open
    #[error("Device is already open")]
    AlreadyOpen,

    /// Channel, sensor or buffer index outside the valid range
    #[error("{what} index out of range: {index} (must be below {count})")]
    IndexOutOfBounds {
        what: &'static str,
        index: usize,
        count: usize,
    },

    /// Argument value outside the range the device accepts
    #[error("{what} value out of range: {value} (max {max})")]
    ValueOutOfBounds {
        what: &'static str,
        value: u32,
        max: u32,
    },

    /// The device firmware predates the requested feature
    #[error("Firmware too old: requires {required}, device reports {actual}")]
    FirmwareTooOld { required: u8, actual: u8 },

    /// A getter ran before the first successful query of that variant
    #[error("No {0} status has been queried yet")]
    NotQueried(Variant),

    /// The received status buffer failed its sentinel check
    #[error("Corrupt {0} status buffer")]
    CorruptData(Variant),

    /// Serial port could not be opened
    #[error("Failed to open serial port {path}: {reason}")]
    Open { path: String, reason: String },

    /// Serial port could not be closed cleanly
    #[error("Failed to close serial port: {0}")]
    Close(String),

    /// Writing a command frame failed
    #[error("Send failed: {0}")]
    Send(#[source] std::io::Error),

    /// Reading from the link failed outright
    #[error("Receive failed: {0}")]
    Receive(#[source] std::io::Error),

    /// Not enough bytes arrived before the deadline
    #[error("Receive timed out after {received} of {expected} bytes")]
    ReceiveTimeout { expected: usize, received: usize },

    /// Command frames carry between one and eight bytes
    #[error("Invalid command frame length: {0} (must be 1-8)")]
    FrameLength(usize),

    /// The lock file could not be created
    #[error("Cannot create lock file {}: {source}", .path.display())]
    CannotCreateLockFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another live process holds the lock and the wait timed out
    #[error("Device already in use (lock file {}, owner {})", .path.display(), owner_text(.pid))]
    AlreadyInUse { path: PathBuf, pid: Option<u32> },

    /// The lock file could not be removed on release
    #[error("Cannot delete lock file {}: {source}", .path.display())]
    CannotDeleteLockFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Lock path reconfigured while the lock is held
    #[error("Lock file cannot be changed while the lock is held")]
    LockFileChangeNotAllowed,

    /// The mini variant never drained its pass-through buffer
    #[error("Mini pass-through buffer still busy after {polls} polls")]
    PassThroughStalled { polls: u32 },

    /// One frame of a multi-frame command failed
    #[error("{operation}: step {step} of {total} failed: {source}")]
    Step {
        operation: &'static str,
        step: usize,
        total: usize,
        #[source]
        source: Box<TbanError>,
    },

    /// A shutdown was requested while the operation was waiting or between frames
    #[error("Interrupted")]
    Interrupted,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for T-Balancer operations
pub type Result<T> = std::result::Result<T, TbanError>;

fn owner_text(pid: &Option<u32>) -> String {
    match pid {
        Some(pid) => format!("pid {}", pid),
        None => "unknown".to_string(),
    }
}

impl From<toml::de::Error> for TbanError {
    fn from(err: toml::de::Error) -> Self {
        TbanError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for TbanError {
    fn from(err: toml::ser::Error) -> Self {
        TbanError::Config(err.to_string())
    }
}

impl TbanError {
    /// Stable numeric code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            TbanError::NotOpen => ErrorCode::NotOpened,
            TbanError::AlreadyOpen => ErrorCode::Error,
            TbanError::IndexOutOfBounds { .. } => ErrorCode::IndexOutOfBounds,
            TbanError::ValueOutOfBounds { .. } => ErrorCode::ValueOutOfBounds,
            TbanError::InvalidInput(_) => ErrorCode::ValueOutOfBounds,
            TbanError::FirmwareTooOld { .. } => ErrorCode::FwTooOld,
            TbanError::NotQueried(_) => ErrorCode::CorruptData,
            TbanError::CorruptData(_) => ErrorCode::CorruptData,
            TbanError::Open { .. } => ErrorCode::EOpen,
            TbanError::Close(_) => ErrorCode::EClose,
            TbanError::Send(_) => ErrorCode::ESend,
            TbanError::Receive(_) => ErrorCode::EReceive,
            TbanError::ReceiveTimeout { .. } => ErrorCode::EReceive,
            TbanError::PassThroughStalled { .. } => ErrorCode::EReceive,
            TbanError::FrameLength(_) => ErrorCode::VectorTooSmall,
            TbanError::CannotCreateLockFile { .. } => ErrorCode::CannotCreateLockFile,
            TbanError::AlreadyInUse { .. } => ErrorCode::AlreadyInUse,
            TbanError::CannotDeleteLockFile { .. } => ErrorCode::CannotDeleteLockFile,
            TbanError::LockFileChangeNotAllowed => ErrorCode::LockFileChangeNotAllowed,
            TbanError::Step { source, .. } => source.code(),
            TbanError::Interrupted => ErrorCode::Error,
            TbanError::Config(_) => ErrorCode::ConfigFileError,
            TbanError::Io(_) => ErrorCode::Error,
        }
    }

    /// Transient I/O failures that the caller may retry
    pub fn is_transient(&self) -> bool {
        match self {
            TbanError::Send(_)
            | TbanError::Receive(_)
            | TbanError::ReceiveTimeout { .. }
            | TbanError::CorruptData(_)
            | TbanError::PassThroughStalled { .. } => true,
            TbanError::Step { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Expected capability gaps; branch on these instead of aborting
    pub fn is_capability(&self) -> bool {
        match self {
            TbanError::FirmwareTooOld { .. } => true,
            TbanError::Step { source, .. } => source.is_capability(),
            _ => false,
        }
    }

    /// Another process owns the device or the lock file is unusable
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            TbanError::AlreadyInUse { .. }
                | TbanError::CannotCreateLockFile { .. }
                | TbanError::CannotDeleteLockFile { .. }
                | TbanError::LockFileChangeNotAllowed
        )
    }
}

/// Numeric status codes with their canonical text and description
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorCode {
    Ok = 0x00,
    Error = 0x01,
    IndexOutOfBounds = 0x02,
    ValueOutOfBounds = 0x03,
    NotOpened = 0x04,
    NotImplemented = 0x05,
    FwTooOld = 0x06,
    StructNullPtr = 0x30,
    ValueNullPtr = 0x31,
    BufNullPtr = 0x32,
    VectorTooSmall = 0x33,
    CannotMalloc = 0x40,
    CorruptData = 0x41,
    EOpen = 0x50,
    EClose = 0x51,
    ESend = 0x52,
    EReceive = 0x53,
    ESigAction = 0x54,
    ESigEmptySet = 0x55,
    CannotCreateLockFile = 0x60,
    AlreadyInUse = 0x61,
    CannotDeleteLockFile = 0x62,
    LockFileChangeNotAllowed = 0x63,
    ConfigFileError = 0xF0,
}

impl ErrorCode {
    /// Every known code, in ascending numeric order
    pub const ALL: [ErrorCode; 24] = [
        ErrorCode::Ok,
        ErrorCode::Error,
        ErrorCode::IndexOutOfBounds,
        ErrorCode::ValueOutOfBounds,
        ErrorCode::NotOpened,
        ErrorCode::NotImplemented,
        ErrorCode::FwTooOld,
        ErrorCode::StructNullPtr,
        ErrorCode::ValueNullPtr,
        ErrorCode::BufNullPtr,
        ErrorCode::VectorTooSmall,
        ErrorCode::CannotMalloc,
        ErrorCode::CorruptData,
        ErrorCode::EOpen,
        ErrorCode::EClose,
        ErrorCode::ESend,
        ErrorCode::EReceive,
        ErrorCode::ESigAction,
        ErrorCode::ESigEmptySet,
        ErrorCode::CannotCreateLockFile,
        ErrorCode::AlreadyInUse,
        ErrorCode::CannotDeleteLockFile,
        ErrorCode::LockFileChangeNotAllowed,
        ErrorCode::ConfigFileError,
    ];

    /// Look up a code by its numeric value
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| *c as u8 == code)
    }

    /// Numeric value
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Canonical symbolic name
    pub fn text(self) -> &'static str {
        match self {
            ErrorCode::Ok => "TBAN_OK",
            ErrorCode::Error => "TBAN_ERROR",
            ErrorCode::IndexOutOfBounds => "TBAN_INDEX_OUT_OF_BOUNDS",
            ErrorCode::ValueOutOfBounds => "TBAN_VALUE_OUT_OF_BOUNDS",
            ErrorCode::NotOpened => "TBAN_NOT_OPENED",
            ErrorCode::NotImplemented => "TBAN_NOT_IMPLEMENTED",
            ErrorCode::FwTooOld => "TBAN_FW_TOO_OLD",
            ErrorCode::StructNullPtr => "TBAN_STRUCT_NULL_PTR",
            ErrorCode::ValueNullPtr => "TBAN_VALUE_NULL_PTR",
            ErrorCode::BufNullPtr => "TBAN_BUF_NULL_PTR",
            ErrorCode::VectorTooSmall => "TBAN_VECTOR_TO_SMALL",
            ErrorCode::CannotMalloc => "TBAN_CANNOT_MALLOC",
            ErrorCode::CorruptData => "TBAN_CORRUPT_DATA",
            ErrorCode::EOpen => "TBAN_EOPEN",
            ErrorCode::EClose => "TBAN_ECLOSE",
            ErrorCode::ESend => "TBAN_ESEND",
            ErrorCode::EReceive => "TBAN_ERECEIVE",
            ErrorCode::ESigAction => "TBAN_ESIGACTION",
            ErrorCode::ESigEmptySet => "TBAN_ESIGEMPTYSET",
            ErrorCode::CannotCreateLockFile => "TBAN_CANNOT_CREATE_LOCKFILE",
            ErrorCode::AlreadyInUse => "TBAN_ALREADY_IN_USE",
            ErrorCode::CannotDeleteLockFile => "TBAN_CANNOT_DELETE_LOCK_FILE",
            ErrorCode::LockFileChangeNotAllowed => "TBAN_LOCK_FILE_CHANGE_NOT_ALLOWED",
            ErrorCode::ConfigFileError => "TBAN_CONFIG_FILE_ERROR",
        }
    }

    /// Human-readable description
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::Ok => "Command executed ok",
            ErrorCode::Error => "Unknown error",
            ErrorCode::IndexOutOfBounds => "The channel/sensor index is out of bounds",
            ErrorCode::ValueOutOfBounds => {
                "The value supplied as an argument to the function is out of bounds"
            }
            ErrorCode::NotOpened => "TBan hardware is not open",
            ErrorCode::NotImplemented => "Function not implemented yet",
            ErrorCode::FwTooOld => {
                "The currently loaded firmware is too old for the function that was trying to execute. Please upgrade"
            }
            ErrorCode::StructNullPtr => "The device handle has not been initialised",
            ErrorCode::ValueNullPtr => "The value supplied to the function is missing",
            ErrorCode::BufNullPtr => "The buffer supplied to the function is missing",
            ErrorCode::VectorTooSmall => "The resulting vector is too small",
            ErrorCode::CannotMalloc => "Memory could not be allocated",
            ErrorCode::CorruptData => {
                "The query vector is corrupt and unusable until a correct update is made to it."
            }
            ErrorCode::EOpen => "open function call failed",
            ErrorCode::EClose => "close function call failed",
            ErrorCode::ESend => "send function call failed",
            ErrorCode::EReceive => "Timeout when receiving data",
            ErrorCode::ESigAction => "Error when installing the serial communication handler",
            ErrorCode::ESigEmptySet => "Error when clearing the signal set",
            ErrorCode::CannotCreateLockFile => "Cannot create the lock file",
            ErrorCode::AlreadyInUse => {
                "The TBan is already in use by another program, timeout reached"
            }
            ErrorCode::CannotDeleteLockFile => "Cannot delete the lock file",
            ErrorCode::LockFileChangeNotAllowed => {
                "The lock file cannot be changed while the device is locked"
            }
            ErrorCode::ConfigFileError => "Error in the configuration file",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (0x{:02X})", self.text(), self.value())
    }
}
