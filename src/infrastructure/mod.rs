//! Infrastructure Layer
//!
//! Implementations for external collaborators:
//! - Database repositories (PostgreSQL and in-memory)
//! - Attachment object storage
//! - Prometheus metrics

pub mod database;
pub mod metrics;
pub mod repositories;
pub mod storage;
