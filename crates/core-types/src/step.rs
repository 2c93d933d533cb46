//! Recorded steps - the replayable unit of user interaction

use crate::bundle::LocatorBundle;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The four recordable interaction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepEvent {
    /// Navigate to a URL (the only event without a bundle)
    Open,
    Click,
    Input,
    Enter,
}

impl StepEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepEvent::Open => "open",
            StepEvent::Click => "click",
            StepEvent::Input => "input",
            StepEvent::Enter => "enter",
        }
    }

    /// Navigation steps carry their target in `value`, not in a bundle.
    pub fn requires_bundle(&self) -> bool {
        !matches!(self, StepEvent::Open)
    }
}

impl std::fmt::Display for StepEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded interaction. Immutable once constructed; a sequence's order
/// is positional (array index), not a field of the step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub event: StepEvent,
    /// Absent only for `open` steps.
    #[serde(default)]
    pub bundle: Option<LocatorBundle>,
    /// Typed text, URL for `open`, or empty.
    #[serde(default)]
    pub value: Option<String>,
    /// Human-readable label inferred at record time; also the key for
    /// data-driven value substitution.
    #[serde(default)]
    pub label: Option<String>,
    /// Positional hints from the original pointer event.
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub metadata: Option<StepMetadata>,
}

impl Step {
    pub fn new(event: StepEvent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event,
            bundle: None,
            value: None,
            label: None,
            x: None,
            y: None,
            metadata: None,
        }
    }

    pub fn open(url: impl Into<String>) -> Self {
        Self::new(StepEvent::Open).with_value(url)
    }

    pub fn click(bundle: LocatorBundle) -> Self {
        Self::new(StepEvent::Click).with_bundle(bundle)
    }

    pub fn input(bundle: LocatorBundle, value: impl Into<String>) -> Self {
        Self::new(StepEvent::Input)
            .with_bundle(bundle)
            .with_value(value)
    }

    pub fn enter(bundle: LocatorBundle) -> Self {
        Self::new(StepEvent::Enter).with_bundle(bundle)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_bundle(mut self, bundle: LocatorBundle) -> Self {
        self.bundle = Some(bundle);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_metadata(mut self, metadata: StepMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Optional per-step overrides of the session-level retry/timeout settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StepMetadata {
    pub timeout_ms: Option<u64>,
    pub retry_attempts: Option<u32>,
}
