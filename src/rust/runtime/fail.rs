// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::libc::{
    c_int,
    EINVAL,
    EIO,
};
use ::std::{
    error,
    fmt,
    io,
};

//==============================================================================
// Structures
//==============================================================================

/// Failure
///
/// Carries a `libc` error number along with a human readable cause. Segment processing never hands one of these back
/// to its caller: failures on that path are dropped and counted. They surface at the edges instead (header decoding,
/// configuration loading and SYN+ACK transmission).
#[derive(Clone, PartialEq, Eq)]
pub struct Fail {
    /// Error code.
    pub errno: c_int,
    /// Cause.
    pub cause: String,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate Functions for Failures
impl Fail {
    /// Creates a new Failure
    pub fn new(errno: c_int, cause: &str) -> Self {
        Self {
            errno,
            cause: cause.to_string(),
        }
    }

    /// Checks whether the target failure carries `errno`.
    pub fn is(&self, errno: c_int) -> bool {
        self.errno == errno
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl fmt::Display for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {:?}: {:?}", self.errno, self.cause)
    }
}

impl fmt::Debug for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {:?}: {:?}", self.errno, self.cause)
    }
}

impl error::Error for Fail {}

/// I/O errors keep their description but collapse into `EIO` unless the OS reported a specific code.
impl From<io::Error> for Fail {
    fn from(e: io::Error) -> Self {
        Self {
            errno: e.raw_os_error().unwrap_or(EIO),
            cause: format!("I/O error: {}", e),
        }
    }
}

impl From<::yaml_rust::ScanError> for Fail {
    fn from(e: ::yaml_rust::ScanError) -> Self {
        Self {
            errno: EINVAL,
            cause: format!("malformed configuration: {}", e),
        }
    }
}

//==============================================================================
// Unit Tests
//==============================================================================
