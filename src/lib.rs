//! RunTrack - Running Training and Progression Engine
//!
//! An open-source, self-hosted running tracker core. Records activities and
//! keeps the dependent aggregates (user level, challenge progress, training
//! plan week advancement) eventually consistent with the activity log through
//! an asynchronous, outbox-backed progression pipeline with bounded worker
//! concurrency, per-handler retry, and scheduled maintenance jobs over the
//! same data.

pub mod activities;
pub mod cache;
pub mod challenges;
pub mod plans;
pub mod progression;
pub mod scheduler;
pub mod storage;
pub mod users;

// Re-export commonly used types
pub use activities::{ActivityManager, ActivityRequest};
pub use cache::{Cache, MemoryCache};
pub use challenges::ChallengeManager;
pub use plans::PlanManager;
pub use progression::EventDispatcher;
pub use scheduler::JobScheduler;
pub use storage::{AppConfig, Database};
pub use users::User;
