// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage errors.

use lw_core::{ApplicationStatus, SessionStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("application not found: {0}")]
    ApplicationNotFound(String),

    #[error("illegal application transition {from} → {to}")]
    IllegalTransition { from: ApplicationStatus, to: ApplicationStatus },

    #[error("illegal session transition {from} → {to}")]
    IllegalSessionTransition { from: SessionStatus, to: SessionStatus },

    #[error("session {0} is terminal; counters are frozen")]
    SessionFrozen(String),

    #[error("duplicate row: {0}")]
    Duplicate(String),

    /// Transient backend failure; callers retry with backoff.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Whether a retry with backoff can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}
