//! Middleware module - cross-cutting request handling

pub mod rate_limit;

pub use rate_limit::RateLimitLayer;
