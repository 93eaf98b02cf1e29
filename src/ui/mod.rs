//! Terminal user interface.
//!
//! - `loop_runner` - main event loop and terminal setup
//! - `input` - keyboard and mouse handling
//! - `render` - card layout for the visible window
//! - `status` - status bar widget

mod input;
mod loop_runner;
mod render;
mod status;

pub use loop_runner::run;
