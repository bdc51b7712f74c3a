//! Client for the DRS device validation server: a terminal dashboard plus headless
//! subcommands sharing one controller.

pub mod api;
pub mod cli;
pub mod config;
pub mod format;
pub mod logging;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod storage;
pub mod stream;
#[cfg(feature = "tui")]
pub mod tui;
pub mod validators;
