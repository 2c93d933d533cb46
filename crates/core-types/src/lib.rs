//! Shared data model for the replay core
//!
//! Everything the recorder hands to the replayer lives here:
//! - [`LocatorBundle`] - recorded snapshot of an element's identifying attributes
//! - [`Step`] - one recorded user interaction
//! - [`PageModel`] - the searchable element tree strategies query against

pub mod bundle;
pub mod page;
pub mod step;

pub use bundle::*;
pub use page::*;
pub use step::*;
