//! Application-level orchestration.
//!
//! The run machine decides, the controller carries out what it decides (HTTP calls,
//! timers, file saves) and emits [`crate::model::UiEvent`]s. UI and CLI layers only send
//! [`UiCommand`]s and render events, which keeps responsibilities separated.

mod controller;
pub mod machine;
pub mod scheduler;

pub use controller::{run_controller, UiCommand};
