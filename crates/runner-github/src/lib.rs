//! GitHub REST plumbing for the runner: the authenticated gateway plus the
//! fork, workflow-dispatch and pull-request managers built on it.

pub mod client;
pub mod error;
pub mod fork;
pub mod pulls;
pub mod types;
pub mod workflow;

pub use client::*;
pub use error::*;
pub use fork::*;
pub use pulls::*;
pub use types::*;
pub use workflow::*;
