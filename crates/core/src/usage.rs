// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Model usage: one LLM or embedding call attributed to an application
//! (or to the session itself, for profile embeddings).

use crate::id::{ApplicationId, SessionId};
use serde::{Deserialize, Serialize};

/// Why the call was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPurpose {
    CoverLetter,
    FieldAnswer,
    Embedding,
    QaReview,
    Other,
}

crate::simple_display! {
    CallPurpose {
        CoverLetter => "cover_letter",
        FieldAnswer => "field_answer",
        Embedding => "embedding",
        QaReview => "qa_review",
        Other => "other",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Ok,
    Error,
}

/// One recorded model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub session: SessionId,
    /// None for session-scoped calls (profile embedding)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<ApplicationId>,
    pub provider: String,
    pub model: String,
    pub purpose: CallPurpose,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost: f64,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    pub status: UsageStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_serde_round_trip() {
        let usage = ModelUsage {
            session: SessionId::from_string("ses-u"),
            application: Some(ApplicationId::from_string("app-u")),
            provider: "anthropic".to_string(),
            model: "claude-sonnet".to_string(),
            purpose: CallPurpose::CoverLetter,
            tokens_in: 1200,
            tokens_out: 600,
            cost: 0.02,
            started_at_ms: 1_000_000,
            ended_at_ms: 1_003_000,
            status: UsageStatus::Ok,
        };
        let json = serde_json::to_string(&usage).unwrap();
        let restored: ModelUsage = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, usage);
    }

    #[test]
    fn purpose_wire_form() {
        assert_eq!(serde_json::to_string(&CallPurpose::QaReview).unwrap(), "\"qa_review\"");
        assert_eq!(CallPurpose::FieldAnswer.to_string(), "field_answer");
    }
}
