pub mod grading;

pub use grading::{GradingRequest, GradingResponse, GradingResultItem, HealthStatus};
