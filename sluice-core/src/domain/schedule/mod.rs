pub mod scheduled;
pub mod spec;

pub use scheduled::{RunStatus, ScheduledPipeline};
pub use spec::{DayOfWeek, IntervalUnit, ScheduleSpec};
