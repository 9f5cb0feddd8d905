/// Data models for publication-service
///
/// - `capability`: normalised actor permissions
/// - `post`: posts, their lifecycle status and moderation report
/// - `notification`: per-recipient notification records
/// - `comment`: comments and replies on posts
pub mod capability;
pub mod comment;
pub mod notification;
pub mod post;

pub use capability::*;
pub use comment::*;
pub use notification::*;
pub use post::*;

use serde::Deserialize;

/// Pagination query parameters shared by listing endpoints
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl PageRequest {
    pub const MAX_LIMIT: i64 = 100;

    pub fn new(page: i64, limit: i64) -> Self {
        Self { page, limit }.normalized()
    }

    /// Highest page whose offset still fits in an `i64` at any limit
    pub const MAX_PAGE: i64 = i64::MAX / Self::MAX_LIMIT;

    /// Clamp to 1 <= page <= MAX_PAGE and 1 <= limit <= MAX_LIMIT
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.clamp(1, Self::MAX_PAGE),
            limit: self.limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.limit.max(0))
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(default_page(), default_limit())
    }
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}
