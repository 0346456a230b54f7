//! Session-scoped usage metrics.

pub mod heartbeat;
pub mod payload;
pub mod session;

pub use heartbeat::{
    AlwaysVisible, Heartbeat, Visibility, VisibilityFlag, HEARTBEAT_INTERVAL, SHUTDOWN_GRACE,
};
pub use session::{MetricsContext, MetricsSession, Session, SessionStorage};
