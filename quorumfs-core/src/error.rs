use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuorumFsError {
    #[error("configuration daemon unreachable: {details}")]
    ChannelUnavailable { details: String },

    #[error("configuration daemon returned errno {errno}")]
    DaemonError { errno: i32 },

    #[error("malformed daemon response: {details}")]
    MalformedResponse { details: String },

    #[error("unknown configuration file: {name}")]
    UnknownFile { name: String },

    #[error("guest {guest_id} is not in the guest list")]
    UnknownGuest { guest_id: u32 },

    #[error("configuration file already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("no writer registered for {name}")]
    NoWriterRegistered { name: String },

    #[error("failed to parse {name}: {details}")]
    ParseError { name: String, details: String },

    #[error("failed to serialize {name}: {details}")]
    SerializeError { name: String, details: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("timed out acquiring lock '{lock_id}' after {duration:?}")]
    AcquireTimeout { lock_id: String, duration: Duration },

    #[error("cluster lost quorum while acquiring lock '{lock_id}'")]
    NoQuorum { lock_id: String },

    #[error("critical section for lock '{lock_id}' exceeded {duration:?}")]
    ExecutionTimeout { lock_id: String, duration: Duration },

    #[error("shared lock directory unavailable: {details}")]
    LockUnavailable { details: String },
}

pub type Result<T> = std::result::Result<T, QuorumFsError>;
