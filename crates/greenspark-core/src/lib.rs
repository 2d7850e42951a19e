//! GreenSpark Core Library
//!
//! Shared functionality for the GreenSpark electricity bill service:
//! - Database access and migrations
//! - Normalized bill schema and input validation
//! - Proportional appliance estimation and appliance usage figures
//! - Rule-based insight reports, optionally refined by an AI backend
//! - Pluggable AI backends for bill extraction (Gemini, mock)
//! - Read-through cache over Redis or memory
//! - S3-compatible object storage with presigned uploads
//! - Transactional email and the background job queue tying it together

pub mod ai;
pub mod cache;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod estimation;
pub mod insights;
pub mod jobs;
pub mod models;
pub mod normalized;
pub mod security;
pub mod storage;
pub mod usage;
pub mod validation;

/// Test utilities including mock Gemini server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AIBackend, AIClient, GeminiBackend, MockBackend};
pub use cache::{CacheBackend, CacheSchema, CacheService, MemoryCache, RedisCache};
pub use config::Settings;
pub use db::{ApplianceFilter, BillFilter, Database};
pub use email::{EmailKind, EmailMessage, Mailer, TemplateContext};
pub use error::{AuthFailure, Error, Result};
pub use estimation::{estimate_bill, EstimationOutcome};
pub use insights::{InsightReport, Recommendation};
pub use jobs::{Job, JobQueue, RetryPolicy, TaskContext};
pub use normalized::NormalizedBill;
pub use security::{Claims, TokenPair, TokenService, TokenType};
pub use storage::Storage;
