// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Policy loading errors.

use thiserror::Error;

/// Errors raised while loading policy files. Runtime evaluation never
/// errors; everything malformed is caught here.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("rule {index}: expected exactly one action (upgrade_to, downgrade_to, skip, require_qa)")]
    AmbiguousAction { index: usize },

    #[error("rule {index}: unknown identifier '{ident}' in predicate {predicate:?}")]
    UnknownIdentifier { index: usize, ident: String, predicate: String },

    #[error("skip_threshold {0} outside [0, 1]")]
    BadThreshold(f64),
}
