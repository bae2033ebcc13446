//! `batchline-processors`: domain processors built on the batch engine.
//!
//! - `QuestionProcessor`: cache-first question lookup with batched misses
//! - `AnalyticsProcessor`: buffered event tracking with one insert per batch
//! - `UserDataSyncProcessor`: profile updates folded into one patch per user
//! - `ProcessorRegistry`: lazily created processors sharing injected stores
//! - `lifecycle`: suspend/terminate signals that flush or shut the registry down

pub mod analytics;
pub mod config;
pub mod lifecycle;
pub mod question;
pub mod registry;
pub mod user_sync;

pub use analytics::{AnalyticsEvent, AnalyticsProcessor};
pub use config::{ProcessorKind, RegistryConfig};
pub use lifecycle::{LifecycleBus, LifecycleHandle, LifecycleSignal, attach, forward_ctrl_c};
pub use question::{QuestionError, QuestionProcessor};
pub use registry::{ProcessorRegistry, Stores};
pub use user_sync::{UserDataSyncProcessor, UserDataUpdate};
