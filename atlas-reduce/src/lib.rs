//! Atlas reduce worker.
//!
//! Runs reduction requests off the caller's async tasks and streams
//! progress frames back over a channel. The `atlas-reduce` binary exposes
//! the same worker over JSON lines on stdio.

pub mod config;
pub mod protocol;
pub mod stdio;
pub mod worker;

pub use config::WorkerConfig;
pub use protocol::{InputMessage, OutputMessage, RecordSet};
pub use worker::{ComputeWorker, Submission};
