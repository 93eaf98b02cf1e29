//! # flick
//!
//! Progressive delivery engine for short-video and poll feeds.
//!
//! ## Architecture
//!
//! ```text
//! ViewportTracker → FeedController → PrefetchScheduler → FeedGateway → ResponseCache
//!                         ↑                                    │
//!                         └──────────── FeedEvent ─────────────┘
//! ```
//!
//! - [`cache`]: generic time-to-live response cache
//! - [`api`]: the network boundary (`FeedApi` trait and its reqwest implementation)
//! - [`feed`]: gateway, prefetch scheduling, session controller, hydration and
//!   viewport tracking
//! - [`config`]: `~/.config/flick/config.toml`
//! - [`util`]: terminal text helpers and URL checks

/// Network boundary for the remote feed service.
///
/// - [`FeedApi`](api::FeedApi): async trait implemented by transports
/// - [`HttpFeedApi`](api::HttpFeedApi): reqwest-based implementation
pub mod api;

/// Time-to-live cache for network responses.
pub mod cache;

/// Configuration file parsing.
pub mod config;

/// Progressive feed delivery engine.
pub mod feed;

/// Text and URL helpers shared by the terminal front end.
pub mod util;
