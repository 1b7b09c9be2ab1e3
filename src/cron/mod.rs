pub mod service;
pub mod types;

pub use service::{CronService, detect_system_timezone, validate_cron_expr};
pub use types::{CronJob, CronJobState, CronSchedule, CronStore, UpdateJobParams};
