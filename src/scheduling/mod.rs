pub mod session_scheduler;
pub mod types;
