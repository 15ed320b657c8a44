//! Licensing agent client.
//!
//! A prompt is submitted once to the agent platform, which answers with an
//! execution id. The execution is then polled at a fixed interval until it
//! reports `finished` (answer) or `failed`, or the attempt budget runs out.
//!
//! ```text
//! submit ──► execution id ──► sleep ─► status ─┬─ queued/running ─► sleep ...
//!                                              ├─ finished ──────► answer
//!                                              └─ failed ────────► error
//! ```

pub mod answer;
pub mod api;
mod client;
mod error;
pub mod types;

pub use answer::{AgentAnswer, ChartRow, StructuredAnswer};
pub use api::{AgentApi, HttpAgentApi};
pub use client::{ExecutionClient, PollPolicy};
pub use error::{is_transient_status, AgentError};
pub use types::{ExecutionHandle, ExecutionState, ExecutionStatus};
