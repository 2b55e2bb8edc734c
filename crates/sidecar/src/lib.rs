//! k6 sidecar: runs inside the load-test Job
//!
//! The binary has three roles. `install` copies itself into the shared volume
//! so the k6 container can exec it, `generate` wraps k6 and `collect` samples
//! resource usage while serving health and metrics endpoints.

pub mod api;
pub mod config;
