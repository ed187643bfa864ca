//! Activity progression pipeline.
//!
//! After an activity write commits, its event sits durably in the outbox;
//! the dispatcher fans each event out to the registered handlers on a
//! bounded worker pool, off the request path. Handlers update the user
//! level, challenge progress, and plan week advancement in independent
//! transactions, retrying transient failures.

pub mod dispatcher;
pub mod events;
pub mod handlers;
pub mod level;
pub mod outbox;

pub use dispatcher::EventDispatcher;
pub use events::{ActivityEvent, EventKind};
pub use handlers::{
    default_handlers, ChallengeProgressHandler, HandlerError, LevelUpdateHandler,
    PlanProgressHandler, ProgressionHandler,
};
pub use level::{calculate_level, DISTANCE_THRESHOLDS, MAX_LEVEL};
pub use outbox::{OutboxStore, StagedEvent};
