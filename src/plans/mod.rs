//! Multi-week training plans and user participations.
//!
//! Plans carry a per-week schedule (distance and run-count targets). Week
//! advancement is driven by the progression pipeline as activities land.

pub mod manager;
pub mod store;
pub mod types;

pub use manager::{PlanError, PlanManager, WeekSpec};
pub use store::PlanStore;
pub use types::{GoalType, PlanDifficulty, PlanParticipation, PlanWeek, TrainingPlan};
