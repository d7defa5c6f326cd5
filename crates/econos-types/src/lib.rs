//! Core data model for the Econos machine-to-machine marketplace.
//!
//! This crate defines the canonical task record, the worker offer snapshot,
//! and the authoritative task state machine shared by every other crate in
//! the workspace. It carries no I/O.

pub mod amount;
pub mod error;
pub mod id;
pub mod offer;
pub mod task;

pub use amount::Wei;
pub use error::{Result, TypesError};
pub use id::{Address, Bytes32, TaskId};
pub use offer::WorkerOffer;
pub use task::{AuthorizationRecord, Task, TaskStatus, TaskType};
