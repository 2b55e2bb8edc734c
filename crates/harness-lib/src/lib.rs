//! Core library for the k6 load-test harness
//!
//! This crate provides the test-run lifecycle:
//! - Resource tier resolution and typed Job construction
//! - Job orchestration against a Kubernetes cluster
//! - The in-job metrics sidecar protocol
//! - Result persistence, trend comparison and reporting
//! - Cleanup of harness-managed cluster resources
//! - Suite execution across test types and request rates

pub mod cleanup;
pub mod cluster;
pub mod compare;
pub mod config;
pub mod duration;
pub mod error;
pub mod health;
pub mod job;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod quantity;
pub mod results;
pub mod sidecar;
pub mod suite;
pub mod tier;
pub mod wait;

pub use cleanup::{
    clean, CleanupCandidate, CleanupFailure, CleanupFilter, CleanupReport, CleanupScope,
};
pub use cluster::{ClusterApi, KubeCluster};
pub use compare::{compare, report, Trend, TrendReport};
pub use config::HarnessConfig;
pub use error::{HarnessError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use job::{JobDescriptor, JobSpecBuilder};
pub use models::*;
pub use observability::{SidecarMetrics, StructuredLogger};
pub use orchestrator::{JobRunner, LogSink, WaitPolicy};
pub use results::ResultStore;
pub use suite::{RunExecutor, SuiteMode, SuiteResult, SuiteRunner};
pub use tier::resolve_tier;
