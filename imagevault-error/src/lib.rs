// Copyright 2024 The Imagevault Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Shared error taxonomy used by every `imagevault-*` crate, so storage,
//! metadata, and service code all propagate the same `Error` type instead of
//! each crate inventing its own.

use std::fmt;
use std::io;

/// Error kind, following the kinds enumerated in the service specification:
/// `Validation`, `NotFound`, `Processing`, `Storage`, `Backend`, `Fatal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// Malformed input: bad UUID, unparseable resolution, empty filename,
    /// size mismatch, resolution exceeding the configured max, attempt to
    /// delete `"original"`.
    InvalidArgument,
    /// Resource + identifier could not be located.
    NotFound,
    /// The image codec rejected the bytes, dimensions were invalid, or the
    /// requested target was out of bounds.
    FailedPrecondition,
    /// Object-store operation failure.
    Unavailable,
    /// KV backend operation failure.
    Internal,
    /// Unrecoverable startup misconfiguration or backend loss.
    Fatal,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A single frame of context attached while an error propagates up the
/// call stack, in the order they were added (outermost last).
#[derive(Debug, Clone)]
pub struct Error {
    pub code: Code,
    pub messages: Vec<String>,
}

impl Error {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Error {
            code,
            messages: vec![message.into()],
        }
    }

    /// Adds additional context to the error without changing its code.
    #[must_use]
    pub fn append(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    /// Combines two errors recovered from concurrent operations into one,
    /// keeping the first error's code and concatenating messages. Used by
    /// best-effort cleanup paths that run more than one fallible step and
    /// want to surface everything that went wrong.
    #[must_use]
    pub fn merge(mut self, other: Error) -> Self {
        self.messages.extend(other.messages);
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.messages.join(" : "))
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        let code = match e.kind() {
            io::ErrorKind::NotFound => Code::NotFound,
            _ => Code::Internal,
        };
        Error::new(code, e.to_string())
    }
}

/// Constructs an `Error` with a code and a formatted message, mirroring the
/// `Code::Internal` default used for opaque backend failures.
#[macro_export]
macro_rules! make_err {
    ($code:expr, $($arg:tt)+) => {
        $crate::Error::new($code, format!($($arg)+))
    };
}

/// Constructs an `Error` with `Code::InvalidArgument`, the common case for
/// rejecting caller-supplied data.
#[macro_export]
macro_rules! make_input_err {
    ($($arg:tt)+) => {
        $crate::Error::new($crate::Code::InvalidArgument, format!($($arg)+))
    };
}

/// Early-returns a `Code::InvalidArgument` error if the condition holds.
#[macro_export]
macro_rules! error_if {
    ($cond:expr, $($arg:tt)+) => {
        if $cond {
            return Err($crate::make_input_err!($($arg)+));
        }
    };
}

/// Extension trait for attaching context to a `Result` as it propagates,
/// the way `anyhow::Context` does, but preserving our own `Code`.
pub trait ResultExt<T> {
    /// Attaches a context message, lazily evaluated, without changing the
    /// error's code.
    fn err_tip<F, M>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> M,
        M: Into<String>;

    /// Attaches a context message and overrides the error's code. Used when
    /// a lower layer's generic error needs to become a specific one (e.g. a
    /// KV miss becoming `Code::NotFound`).
    fn err_tip_with_code<F, M>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Error) -> (Code, M),
        M: Into<String>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<Error>,
{
    fn err_tip<F, M>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> M,
        M: Into<String>,
    {
        self.map_err(|e| e.into().append(f().into()))
    }

    fn err_tip_with_code<F, M>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Error) -> (Code, M),
        M: Into<String>,
    {
        self.map_err(|e| {
            let e = e.into();
            let (code, msg) = f(&e);
            Error {
                code,
                messages: {
                    let mut m = e.messages;
                    m.push(msg.into());
                    m
                },
            }
        })
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn err_tip<F, M>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> M,
        M: Into<String>,
    {
        self.ok_or_else(|| Error::new(Code::NotFound, f().into()))
    }

    fn err_tip_with_code<F, M>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Error) -> (Code, M),
        M: Into<String>,
    {
        self.ok_or_else(|| {
            let placeholder = Error::new(Code::NotFound, String::new());
            let (code, msg) = f(&placeholder);
            Error::new(code, msg.into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_err_sets_code_and_message() {
        let e = make_err!(Code::NotFound, "image {} missing", "abc");
        assert_eq!(e.code, Code::NotFound);
        assert_eq!(e.messages, vec!["image abc missing".to_string()]);
    }

    #[test]
    fn err_tip_appends_context() {
        let result: Result<(), Error> = Err(Error::new(Code::Internal, "boom"));
        let result = result.err_tip(|| "while doing the thing");
        let e = result.unwrap_err();
        assert_eq!(e.messages, vec!["boom", "while doing the thing"]);
    }

    #[test]
    fn option_err_tip_is_not_found() {
        let opt: Option<u32> = None;
        let e = opt.err_tip(|| "missing value").unwrap_err();
        assert_eq!(e.code, Code::NotFound);
    }

    #[test]
    fn merge_concatenates_messages() {
        let a = Error::new(Code::Internal, "a failed");
        let b = Error::new(Code::Internal, "b failed");
        let merged = a.merge(b);
        assert_eq!(merged.messages, vec!["a failed", "b failed"]);
    }
}
