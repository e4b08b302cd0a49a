pub mod api;
pub mod audit;
pub mod job;
pub mod label;
