//! labelops: steel product tag ingestion and printing.
//!
//! Operators upload batches of tag records from the mill's tracking exports.
//! Each record is keyed on its physical identity, stored once, and can then
//! be printed as a ZPL tag carrying two QR codes. Print jobs keep a bounded
//! retry budget and are only ever retried on request. Batch, print and retry
//! actions are recorded in an audit log.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
