//
// jobs/mod.rs
//
// Job requests, the pending-request queue and the async runner
//

pub mod config;
pub mod queue;
pub mod request;
pub mod runner;

#[cfg(test)]
mod property_tests;

pub use config::*;
pub use queue::*;
pub use request::*;
pub use runner::*;
