//! The generation worker: claims jobs from the queue, drives them
//! through the inference provider, persists artifacts, and records the
//! outcome.

pub mod config;
pub mod runner;

pub use config::WorkerConfig;
pub use runner::Worker;
