pub mod args;
pub mod config;
pub mod core;
pub mod errors;
pub mod random;
pub mod runner;
pub mod segment;
