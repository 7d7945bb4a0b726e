// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine errors.

use lw_adapters::MatchError;
use lw_core::DomainError;
use lw_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error("session {0} is not managed by this process")]
    UnknownSession(String),

    #[error("invalid operation: {0}")]
    InvalidState(String),
}
