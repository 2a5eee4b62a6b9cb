//! Infrastructure Layer
//!
//! Cross-cutting concerns shared by the geocoding adapters and service.

pub mod rate_limiter;
pub mod result_cache;
pub mod retry;
pub mod shutdown;

pub use rate_limiter::{RateLimitConfig, RateLimitResult, RateLimiter};
pub use result_cache::{CacheConfig, CacheKey, ResultCache};
pub use retry::RetryPolicy;
pub use shutdown::shutdown_signal;
