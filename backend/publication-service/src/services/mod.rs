/// Business logic layer
///
/// Dependencies point one way: the post lifecycle consumes the moderation
/// gate and the dispatcher, the dispatcher consumes the stores and the
/// delivery layer, delivery consumes the connection manager.
pub mod accounts;
pub mod comments;
pub mod delivery;
pub mod dispatcher;
pub mod engagement;
pub mod follows;
pub mod notifications;
pub mod posts;

pub use accounts::{AccountEvent, AccountEventOutcome, AccountService};
pub use comments::{CommentService, CreateCommentRequest, UpdateCommentRequest};
pub use delivery::NotificationDelivery;
pub use dispatcher::{CollaborationEvent, NotificationDispatcher};
pub use engagement::{EngagementService, ViewOutcome};
pub use follows::FollowService;
pub use notifications::{NotificationQuery, NotificationService};
pub use posts::{CoAuthorInvite, CreatePostRequest, PostService, UpdatePostRequest};
