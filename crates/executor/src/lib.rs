//! Single-step replay execution
//!
//! Takes one recorded step at a time through a fixed pipeline: validate the
//! step, run pre-hooks, re-find the element, verify it is interactable,
//! let the page settle, dispatch the action through the browser port, run
//! post-hooks. The orchestration layer drives this crate through the
//! [`StepRunner`] seam and never touches the port directly.

pub mod errors;
pub mod executor;
pub mod interaction;
pub mod ports;
pub mod types;

pub use errors::{ErrorCode, StepError};
pub use executor::{StepExecutor, StepHook};
pub use interaction::{apply_click, apply_input, classify, InteractionKind};
pub use ports::{BrowserPort, DispatchedAction, ElementHandle, PortError, SimulatedBrowser};
pub use types::{
    ExecPhase, ExecutorConfig, PhaseTiming, StepContext, StepExecution, StepRunner,
};
