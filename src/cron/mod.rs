pub mod heartbeat;
pub mod scheduler;
pub mod types;

pub use heartbeat::HeartbeatEngine;
pub use scheduler::CronScheduler;
pub use types::{CronSchedule, ExecutionRecord, ExecutionStatus, HeartbeatRecord, ScheduledJob};
