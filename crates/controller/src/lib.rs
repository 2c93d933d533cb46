//! Replay orchestration
//!
//! Owns the run lifecycle around the single-step executor: the session state
//! machine (idle, running, paused, completed, failed), a pause gate with
//! single-stepping, breakpoints, per-step timeout and retry backoff, and
//! cumulative run statistics. Step execution itself is injected through the
//! [`replay_executor::StepRunner`] seam.
//!
//! ```
//! use replay_controller::{ReplayController, ReplaySession};
//! use replay_controller::runner::SimulatedStepRunner;
//! use replay_core_types::Step;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let session = ReplaySession::new("smoke", vec![Step::open("https://example.com")]);
//! let controller = ReplayController::new(Arc::new(SimulatedStepRunner::new()));
//! let result = controller.run(&session).await.unwrap();
//! assert!(result.success);
//! # });
//! ```

pub mod backoff;
pub mod controller;
pub mod errors;
pub mod gate;
pub mod runner;
pub mod types;

pub use backoff::retry_delay;
pub use controller::{ProgressCallback, ReplayController, StateCallback, StepCallback};
pub use errors::ReplayError;
pub use gate::{GateRelease, PauseGate};
pub use runner::{FnStepRunner, SimulatedStepRunner};
pub use types::{
    Breakpoint, BreakpointTarget, ReplayOptions, ReplayProgress, ReplayResult, ReplaySession,
    ReplayState, ReplayStats, RunStatus, StepResult, StepStatus, TestRun,
};
