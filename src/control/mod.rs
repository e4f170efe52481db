pub mod api;
pub mod desk;
