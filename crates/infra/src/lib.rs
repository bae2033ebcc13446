//! Remote store boundaries used by the specialized processors.
//!
//! Each store is an async trait with no storage assumptions, plus an
//! in-memory implementation for tests and local development. The in-memory
//! stores record every call and can be told to fail.

pub mod analytics;
pub mod error;
pub mod failure;
pub mod profiles;
pub mod questions;

pub use analytics::{AnalyticsRecord, AnalyticsSink, InMemoryAnalyticsSink};
pub use error::StoreError;
pub use failure::FailureInjector;
pub use profiles::{FieldChange, InMemoryProfileStore, ProfilePatch, ProfileStore, UpdateOperation};
pub use questions::{InMemoryQuestionStore, Question, QuestionStore};
