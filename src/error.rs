//! Error taxonomy (§7) with a libc-style exit-code mapping (§6).

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The Unix-style exit codes named in §6: `NOMEM, BUSY, EINVAL, EIO, ENOENT, ENOTTY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    NoMem,
    Busy,
    InvalidArgument,
    Io,
    NoSuchEntity,
    NoSuchControl,
}

/// Setup/control-plane errors. The record path (C3) never returns `Error`:
/// its failures are transient/counted (§7) and surfaced through stats
/// counters instead, never through this type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("allocation failed: {0}")]
    OutOfMemory(&'static str),

    #[error("resource busy: {0}")]
    Busy(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("I/O error mapping ring: {0}")]
    Io(#[from] std::io::Error),

    #[error("no such consumer or ring: {0}")]
    NotFound(&'static str),

    #[error("unknown control command")]
    UnknownCommand,
}

impl Error {
    /// Maps this error onto the exit-code taxonomy named in §6.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::OutOfMemory(_) => ExitCode::NoMem,
            Self::Busy(_) => ExitCode::Busy,
            Self::InvalidArgument(_) => ExitCode::InvalidArgument,
            Self::Io(_) => ExitCode::Io,
            Self::NotFound(_) => ExitCode::NoSuchEntity,
            Self::UnknownCommand => ExitCode::NoSuchControl,
        }
    }
}
