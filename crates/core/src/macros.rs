// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-label plumbing for the status and event vocabularies.

/// Tie a unit-variant enum to its stable wire labels.
///
/// Generates a `const fn label(&self) -> &'static str` plus a `Display`
/// impl delegating to it, so status strings can flow into event details
/// and log lines without allocating. The labels must match the serde
/// snake_case form; tests assert the two stay in sync.
///
/// ```ignore
/// crate::simple_display! {
///     ApplicationStatus {
///         Queued => "queued",
///         InProgress => "in_progress",
///     }
/// }
/// ```
#[macro_export]
macro_rules! simple_display {
    ($enum:ty { $( $variant:ident => $label:literal ),+ $(,)? }) => {
        impl $enum {
            /// Stable wire label for this variant.
            pub const fn label(&self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl std::fmt::Display for $enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}
