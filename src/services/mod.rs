pub mod audit;
pub mod auth;
pub mod dedup;
pub mod identity;
pub mod ingest;
pub mod print_jobs;
pub mod printer;
pub mod qr;
pub mod store;
pub mod zpl;
