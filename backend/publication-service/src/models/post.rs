use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of a post
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Pending,
    Published,
    Rejected,
    Archived,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Pending => "pending",
            PostStatus::Published => "published",
            PostStatus::Rejected => "rejected",
            PostStatus::Archived => "archived",
        }
    }

    pub const ALL: [PostStatus; 5] = [
        PostStatus::Draft,
        PostStatus::Pending,
        PostStatus::Published,
        PostStatus::Rejected,
        PostStatus::Archived,
    ];
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "pending" => Ok(PostStatus::Pending),
            "published" => Ok(PostStatus::Published),
            "rejected" => Ok(PostStatus::Rejected),
            "archived" => Ok(PostStatus::Archived),
            other => Err(format!("unknown post status '{}'", other)),
        }
    }
}

/// Violation severity reported by the moderation oracles.
///
/// Declaration order is the total order used everywhere (`max`, queue
/// sorting); `rank()` is the integer persisted alongside the label so the
/// store can sort natively. `Unknown` marks a verdict that could not be
/// obtained and sits just above `None`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Unknown => "unknown",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn rank(&self) -> i16 {
        *self as i16
    }

    pub fn from_rank(rank: i16) -> Option<Self> {
        match rank {
            0 => Some(Severity::None),
            1 => Some(Severity::Unknown),
            2 => Some(Severity::Low),
            3 => Some(Severity::Medium),
            4 => Some(Severity::High),
            5 => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "safe" => Ok(Severity::None),
            "unknown" => Ok(Severity::Unknown),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Moderation report stored on every post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ViolationReport {
    pub has_violations: bool,
    pub severity: Severity,
    pub violations: Vec<String>,
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl ViolationReport {
    /// Report for content that was not analysed (admin bypass)
    pub fn skipped() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CoAuthorRole {
    Editor,
    Contributor,
    Reviewer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoAuthor {
    pub user_id: Uuid,
    pub role: CoAuthorRole,
    #[serde(default)]
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub status: PostStatus,
    pub co_authors: Vec<CoAuthor>,
    pub violation_report: ViolationReport,
    pub moderated_by: Option<Uuid>,
    pub moderated_at: Option<DateTime<Utc>>,
    pub moderation_notes: Option<String>,
    pub likes: BTreeSet<Uuid>,
    pub dislikes: BTreeSet<Uuid>,
    pub views: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn is_author(&self, user_id: Uuid) -> bool {
        self.author_id == user_id
    }

    pub fn co_author(&self, user_id: Uuid) -> Option<&CoAuthor> {
        self.co_authors.iter().find(|c| c.user_id == user_id)
    }

    /// Accepted editor co-authors share the author's editing rights
    pub fn is_editor(&self, user_id: Uuid) -> bool {
        self.co_author(user_id)
            .map(|c| c.role == CoAuthorRole::Editor && c.accepted)
            .unwrap_or(false)
    }

    /// Author or any listed co-author
    pub fn is_contributor(&self, user_id: Uuid) -> bool {
        self.is_author(user_id) || self.co_author(user_id).is_some()
    }

    pub fn engagement(&self) -> EngagementCounts {
        EngagementCounts {
            likes: self.likes.len() as i64,
            dislikes: self.dislikes.len() as i64,
            views: self.views,
        }
    }
}

/// Everything needed to persist a new post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Uuid,
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub co_authors: Vec<CoAuthor>,
    pub status: PostStatus,
    pub violation_report: ViolationReport,
    pub stamp: StatusStamp,
}

/// Content-field changes; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub co_authors: Option<Vec<CoAuthor>>,
    pub moderation_notes: Option<String>,
    pub violation_report: Option<ViolationReport>,
    /// Apply only if the stored `updated_at` still equals this value
    pub unmodified_since: Option<DateTime<Utc>>,
}

impl PostChanges {
    pub fn touches_content(&self) -> bool {
        self.title.is_some()
            || self.content.is_some()
            || self.category.is_some()
            || self.co_authors.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.touches_content()
            && self.moderation_notes.is_none()
            && self.violation_report.is_none()
    }
}

/// Moderation bookkeeping applied together with a status change. `None`
/// fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusStamp {
    pub moderated_by: Option<Uuid>,
    pub moderated_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub moderation_notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
    Like,
    Dislike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOp {
    Add(Reaction),
    Remove(Reaction),
}

/// Result of an atomic reaction update
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ReactionOutcome {
    /// Whether the stored sets changed at all
    pub changed: bool,
    pub liked: bool,
    pub disliked: bool,
    pub likes: i64,
    pub dislikes: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngagementCounts {
    pub likes: i64,
    pub dislikes: i64,
    pub views: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_total_order() {
        assert!(Severity::None < Severity::Unknown);
        assert!(Severity::Unknown < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::Low.max(Severity::High), Severity::High);
    }

    #[test]
    fn test_severity_rank_matches_order() {
        for rank in 0..=5 {
            let severity = Severity::from_rank(rank).unwrap();
            assert_eq!(severity.rank(), rank);
        }
        assert!(Severity::from_rank(9).is_none());
        assert!(Severity::Critical.rank() > Severity::High.rank());
    }

    #[test]
    fn test_status_parse() {
        for status in PostStatus::ALL {
            assert_eq!(status.as_str().parse::<PostStatus>().unwrap(), status);
        }
        assert!("deleted".parse::<PostStatus>().is_err());
    }

    #[test]
    fn test_editor_requires_acceptance() {
        let editor = Uuid::new_v4();
        let now = Utc::now();
        let mut post = Post {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            title: "t".into(),
            content: "c".into(),
            category: None,
            status: PostStatus::Draft,
            co_authors: vec![CoAuthor {
                user_id: editor,
                role: CoAuthorRole::Editor,
                accepted: false,
            }],
            violation_report: ViolationReport::default(),
            moderated_by: None,
            moderated_at: None,
            moderation_notes: None,
            likes: BTreeSet::new(),
            dislikes: BTreeSet::new(),
            views: 0,
            published_at: None,
            created_at: now,
            updated_at: now,
        };

        assert!(!post.is_editor(editor));
        assert!(post.is_contributor(editor));

        post.co_authors[0].accepted = true;
        assert!(post.is_editor(editor));
    }
}
