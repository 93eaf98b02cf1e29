//! Helpers for the terminal front end.
//!
//! - **Text**: Unicode-aware width, truncation and sanitising of
//!   server-supplied strings, plus compact number and duration formatting
//! - **Share URLs**: checks a link is safe to hand to the system opener
//!
//! ```
//! use flick::util::{display_width, truncate_to_width};
//!
//! assert_eq!(display_width("你好"), 4);
//! assert_eq!(truncate_to_width("a long caption", 6), "a lon…");
//! ```

mod share;
mod text;

pub use share::{validate_share_url, ShareUrlError};
pub use text::{
    display_width, format_count, format_duration, strip_control_chars, truncate_to_width,
};
