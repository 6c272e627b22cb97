pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod messages;
pub mod resource;
pub mod tags;

pub use audit::{AuditEvent, AuditResult};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use error::*;
pub use messages::*;
pub use resource::{ResourceId, ResourceKind, ResourceState, StopTagPolicy};
