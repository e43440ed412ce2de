pub mod config;
pub mod tracer;
