//! User accounts and progression state.
//!
//! Users carry the cumulative distance and derived level that the
//! progression pipeline maintains; request-path code never mutates them.

pub mod store;
pub mod types;

pub use store::UserStore;
pub use types::User;
