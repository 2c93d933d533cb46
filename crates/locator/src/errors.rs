//! Error types for the locator system

use thiserror::Error;

/// Locator error enumeration
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Named strategy is not registered
    #[error("Strategy not found: {0}")]
    StrategyNotFound(String),

    /// Recorded iframe chain entry has no counterpart on the page
    #[error("Frame not found: {0}")]
    FrameNotFound(String),

    /// Recorded shadow host path has no counterpart on the page
    #[error("Shadow root not found: {0}")]
    ShadowRootNotFound(String),

    /// Selector could not be parsed
    #[error("Invalid selector for '{strategy}': {reason}")]
    InvalidSelector { strategy: String, reason: String },
}
