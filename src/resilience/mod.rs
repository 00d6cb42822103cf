//! # Resilience Patterns
//!
//! Rate limiting for the external AI grading dependency. The grading provider
//! enforces a rolling per-minute call quota; exceeding it turns into hard
//! rejections, so the queue core meters every outbound call through the
//! sliding-window limiter defined here.

pub mod rate_limiter;

pub use rate_limiter::{RateLimiterStatus, SlidingWindowRateLimiter};
