// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Custom error type that carries a process exit code.
//!
//! Commands return `ExitError` instead of calling `std::process::exit()`
//! directly, allowing `main()` to handle process termination.

use std::fmt;

/// Conventional exit codes for the wrapper.
pub const EXIT_CONFIG: i32 = 64;
pub const EXIT_REPO_UNAVAILABLE: i32 = 65;
pub const EXIT_INTERNAL: i32 = 70;
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(EXIT_CONFIG, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(EXIT_INTERNAL, message)
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}

impl From<lw_engine::EngineError> for ExitError {
    fn from(err: lw_engine::EngineError) -> Self {
        match &err {
            lw_engine::EngineError::Storage(storage) if storage.is_transient() => {
                Self::new(EXIT_REPO_UNAVAILABLE, err.to_string())
            }
            lw_engine::EngineError::Domain(_) => Self::config(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

impl From<lw_policy::PolicyError> for ExitError {
    fn from(err: lw_policy::PolicyError) -> Self {
        Self::config(err.to_string())
    }
}
