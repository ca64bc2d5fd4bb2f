// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Error type shared by all units.

use thiserror::Error;

/// Errors reported by the driver core.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// A bounded hardware poll ran out of iterations.
    #[error("hardware did not respond in time")]
    Timeout,
    /// The hardware did not reach the expected state.
    #[error("hardware fault")]
    Fault,
    /// The operation could not be performed right now, e.g. because the GPU is powered off or the
    /// MMU could not be stalled.
    #[error("device busy")]
    Busy,
    /// A memory or page allocation failed.
    #[error("out of memory")]
    NoMemory,
    /// An argument was out of range.
    #[error("invalid argument")]
    InvalidArgs,
    /// A hardware resource or IRQ was not found.
    #[error("resource not found")]
    NotFound,
    /// The detected hardware is not supported.
    #[error("unsupported hardware")]
    Unsupported,
}

/// Result type using the crate [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
