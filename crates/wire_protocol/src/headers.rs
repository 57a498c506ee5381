//! Response header names describing the caller's quota window.

pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
/// RFC 3339 timestamp at which the current window closes.
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";
/// Whole seconds until the window closes, rounded up.
pub const RETRY_AFTER: &str = "retry-after";
/// Marks the body as a line-framed data stream.
pub const DATA_STREAM: &str = "x-vercel-ai-data-stream";
pub const DATA_STREAM_VERSION: &str = "v1";
