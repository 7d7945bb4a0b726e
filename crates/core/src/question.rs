// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Question: one form-field interaction captured for audit.

use crate::id::ApplicationId;
use serde::{Deserialize, Serialize};

/// Kind of form field the executor interacted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    TextArea,
    Select,
    MultiSelect,
    Checkbox,
    Radio,
    File,
    Date,
    Number,
    Unknown,
}

crate::simple_display! {
    FieldKind {
        Text => "text",
        TextArea => "text_area",
        Select => "select",
        MultiSelect => "multi_select",
        Checkbox => "checkbox",
        Radio => "radio",
        File => "file",
        Date => "date",
        Number => "number",
        Unknown => "unknown",
    }
}

/// Where a filled value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    Profile,
    Llm,
    Default,
    Template,
    Manual,
}

crate::simple_display! {
    ValueSource {
        Profile => "profile",
        Llm => "llm",
        Default => "default",
        Template => "template",
        Manual => "manual",
    }
}

/// Descriptor of the form field as seen on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub kind: FieldKind,
    /// Normalized label used for matching ("years_of_experience")
    pub label: String,
    /// Verbatim label text from the page
    pub raw_label: String,
    #[serde(default)]
    pub required: bool,
}

/// One field interaction. `(application, step_index)` is unique and
/// strictly increasing per application; the repository assigns the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub application: ApplicationId,
    pub step_index: u32,
    pub field: FieldDescriptor,
    pub value: String,
    pub source: ValueSource,
    /// Executor confidence in the filled value, `[0, 1]`
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_by: Option<String>,
}

/// Question content as produced by the executor, before the repository
/// assigns the step index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub field: FieldDescriptor,
    pub value: String,
    pub source: ValueSource,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_error: Option<String>,
}

impl QuestionDraft {
    pub fn new(field: FieldDescriptor, value: impl Into<String>, source: ValueSource) -> Self {
        Self {
            field,
            value: value.into(),
            source,
            confidence: 1.0,
            validation_error: None,
        }
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn validation_error(mut self, error: impl Into<String>) -> Self {
        self.validation_error = Some(error.into());
        self
    }
}

#[cfg(test)]
#[path = "question_tests.rs"]
mod tests;
