pub mod cli;
pub mod config;
pub mod job;
pub mod scheduler;

pub use config::{Config, Settings};
pub use job::BackupJob;
pub use scheduler::{OverlapPolicy, ScheduleSettings};
