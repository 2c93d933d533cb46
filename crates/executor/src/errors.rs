//! Step execution error taxonomy
//!
//! Every failed step carries a stable machine-readable code plus a canned
//! remediation hint. Codes are what report consumers switch on; the message
//! is free-form detail for humans.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable failure classification for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The step itself is malformed (missing bundle, missing value), or a
    /// hook vetoed it.
    ValidationFailed,
    /// No strategy produced an acceptable element.
    ElementNotFound,
    /// The element resolved but is hidden or fully transparent.
    ElementNotVisible,
    /// The element resolved but is disabled.
    ElementNotInteractable,
    /// The element kept moving for the whole stabilization budget.
    ElementNotStable,
    ClickFailed,
    InputFailed,
    EnterFailed,
    NavigationFailed,
    /// The step ran out of time.
    Timeout,
    /// The step's event kind is not one the executor knows.
    UnknownEvent,
    /// Anything that does not fit the categories above.
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::ElementNotFound => "ELEMENT_NOT_FOUND",
            ErrorCode::ElementNotVisible => "ELEMENT_NOT_VISIBLE",
            ErrorCode::ElementNotInteractable => "ELEMENT_NOT_INTERACTABLE",
            ErrorCode::ElementNotStable => "ELEMENT_NOT_STABLE",
            ErrorCode::ClickFailed => "CLICK_FAILED",
            ErrorCode::InputFailed => "INPUT_FAILED",
            ErrorCode::EnterFailed => "ENTER_FAILED",
            ErrorCode::NavigationFailed => "NAVIGATION_FAILED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::UnknownEvent => "UNKNOWN_EVENT",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Canned remediation hints surfaced alongside the failure.
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            ErrorCode::ValidationFailed => &[
                "Check the step carries the data its action needs",
                "Re-record the step if the bundle is empty",
            ],
            ErrorCode::ElementNotFound => &[
                "The page may have changed since recording; re-record the step",
                "Relax the minimum confidence threshold",
                "Check that the page finished loading",
            ],
            ErrorCode::ElementNotVisible => &[
                "Scroll the element into view",
                "Wait for the overlay hiding it to clear",
            ],
            ErrorCode::ElementNotInteractable => {
                &["A precondition step that enables this control may be missing"]
            }
            ErrorCode::ElementNotStable => &[
                "Wait for animations to finish before this step",
                "Increase the stabilization budget",
            ],
            ErrorCode::ClickFailed | ErrorCode::InputFailed | ErrorCode::EnterFailed => &[
                "The element may have detached mid-action; retry the step",
            ],
            ErrorCode::NavigationFailed => &["Check the recorded URL is still reachable"],
            ErrorCode::Timeout => &[
                "Increase the step timeout",
                "Check page load performance",
            ],
            ErrorCode::UnknownEvent => &["Re-record the step with a supported interaction"],
            ErrorCode::UnknownError => &["Inspect the logs for the underlying failure"],
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified step failure.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct StepError {
    pub code: ErrorCode,
    pub message: String,
}

impl StepError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn suggestions(&self) -> &'static [&'static str] {
        self.code.suggestions()
    }
}
