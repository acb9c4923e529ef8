//! Kernel error kinds.
//!
//! The syscall ABI returns a plain `i32`: zero or positive is success
//! (sometimes carrying a value, e.g. `read`'s byte count), negative is one
//! of the kinds below. There is no exception mechanism in this ABI —
//! every fallible kernel operation collapses to this flat space at the
//! syscall boundary, matching the C convention `if (r < 0) ...`.

use core::fmt;

/// A negated kernel error code, as returned on the wire by a failed syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ChronosError {
    /// Environment id does not name a live environment, or permission check failed.
    BadEnv = -1,
    /// Argument out of range, badly aligned, or otherwise malformed.
    Inval = -2,
    /// Out of physical memory (frames) or out of on-disk blocks.
    NoMem = -3,
    /// The environment table has no free slot.
    NoFreeEnv = -4,
    /// Path component, file, or directory entry does not exist.
    NotFound = -5,
    /// Path is malformed (empty component, trailing slash mismatch, `..`, etc).
    BadPath = -6,
    /// `file_create` target already exists.
    FileExists = -7,
    /// No block device / superblock backing the file system.
    NoDisk = -8,
    /// `ipc_try_send` found no matching receiver; callers should retry.
    IpcNotRecv = -9,
}

impl ChronosError {
    /// Returns the raw negative `i32` to hand back across the syscall ABI.
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Recover a `ChronosError` from a raw negative return value, if it
    /// names a known kind.
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::BadEnv),
            -2 => Some(Self::Inval),
            -3 => Some(Self::NoMem),
            -4 => Some(Self::NoFreeEnv),
            -5 => Some(Self::NotFound),
            -6 => Some(Self::BadPath),
            -7 => Some(Self::FileExists),
            -8 => Some(Self::NoDisk),
            -9 => Some(Self::IpcNotRecv),
            _ => None,
        }
    }
}

impl fmt::Display for ChronosError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadEnv => write!(f, "bad environment id"),
            Self::Inval => write!(f, "invalid argument"),
            Self::NoMem => write!(f, "out of memory"),
            Self::NoFreeEnv => write!(f, "no free environment slots"),
            Self::NotFound => write!(f, "not found"),
            Self::BadPath => write!(f, "malformed path"),
            Self::FileExists => write!(f, "file already exists"),
            Self::NoDisk => write!(f, "no disk attached"),
            Self::IpcNotRecv => write!(f, "no receiver waiting"),
        }
    }
}

/// Convenience result type for syscall-surface operations.
pub type ChronosResult<T = ()> = Result<T, ChronosError>;
