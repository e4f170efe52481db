pub mod scenario;
pub mod venues;
