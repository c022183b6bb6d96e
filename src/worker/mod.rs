pub mod job_kind;
pub mod pipe;
pub mod progress;
pub mod runner;
