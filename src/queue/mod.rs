//! Queue module - rate-limiting submission lane for vendor calls

pub mod submission_queue;

pub use submission_queue::{QueueConfig, QueueStats, SubmissionQueue};
