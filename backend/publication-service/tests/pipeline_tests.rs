mod common;

use common::{post_request, register, BrokenFanOut, Fixture, RacingPosts, ScriptedOracle};
use futures::future::join_all;
use publication_service::db::Storage;
use publication_service::error::AppError;
use publication_service::models::{
    Actor, Capability, CoAuthorRole, NotificationType, PageRequest, PostStatus, Severity,
};
use publication_service::moderation::{ModerationOracle, RuleBasedOracle};
use publication_service::services::{
    AccountEvent, CoAuthorInvite, CreateCommentRequest, UpdatePostRequest,
};
use publication_service::websocket::{join_post_room, OutboundFrame};
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn test_approved_post_carries_moderation_stamp() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let pending = f.pending_post().await;
    assert_eq!(pending.status, PostStatus::Pending);
    assert!(pending.moderated_by.is_none());
    assert!(pending.published_at.is_none());

    let published = f
        .state
        .posts
        .approve(&f.moderator, pending.id, Some("looks good".into()))
        .await
        .unwrap();

    assert_eq!(published.status, PostStatus::Published);
    assert_eq!(published.moderated_by, Some(f.moderator.user_id));
    assert!(published.moderated_at.is_some());
    assert!(published.published_at.is_some());
    assert_eq!(published.moderation_notes.as_deref(), Some("looks good"));
}

#[tokio::test]
async fn test_rejected_post_records_moderator() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let pending = f.pending_post().await;

    let rejected = f
        .state
        .posts
        .reject(&f.moderator, pending.id, Some("off topic".into()))
        .await
        .unwrap();

    assert_eq!(rejected.status, PostStatus::Rejected);
    assert_eq!(rejected.moderated_by, Some(f.moderator.user_id));
    assert!(rejected.published_at.is_none());
    assert_eq!(f.count_of(&f.author, NotificationType::PostRejected).await, 1);
}

#[tokio::test]
async fn test_author_cannot_approve_own_post() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let pending = f.pending_post().await;

    let result = f.state.posts.approve(&f.author, pending.id, None).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn test_admin_bypass_publishes_immediately() {
    // the oracle would hold this post; the bypass never consults it
    let f = Fixture::new(ScriptedOracle::flagging(Severity::High)).await;
    let mut req = post_request("Orientation week schedule", Some(PostStatus::Published));
    req.skip_moderation = true;

    let post = f.state.posts.create_post(&f.admin, req).await.unwrap();

    assert_eq!(post.status, PostStatus::Published);
    assert_eq!(post.moderated_by, Some(f.admin.user_id));
    assert!(post.published_at.is_some());
    assert_eq!(post.violation_report.severity, Severity::None);
}

#[tokio::test]
async fn test_skip_moderation_ignored_for_authors() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let mut req = post_request("Library hours", Some(PostStatus::Published));
    req.skip_moderation = true;

    let post = f.state.posts.create_post(&f.author, req).await.unwrap();
    assert_eq!(post.status, PostStatus::Pending);
    assert!(post.published_at.is_none());
}

#[tokio::test]
async fn test_reader_cannot_create_posts() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let result = f
        .state
        .posts
        .create_post(&f.reader, post_request("Hello", None))
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn test_critical_content_is_never_stored() {
    let f = Fixture::new(ScriptedOracle::flagging(Severity::Critical)).await;

    let result = f
        .state
        .posts
        .create_post(&f.author, post_request("Threat", None))
        .await;
    assert!(matches!(result, Err(AppError::ContentViolation(_))));

    let queue = f
        .state
        .posts
        .moderation_queue(&f.moderator, PageRequest::default())
        .await
        .unwrap();
    assert!(queue.is_empty());
    let published = f
        .state
        .posts
        .list_published(PageRequest::default(), None)
        .await
        .unwrap();
    assert!(published.is_empty());

    assert_eq!(f.count_of(&f.moderator, NotificationType::ViolationAlert).await, 1);
    assert_eq!(f.count_of(&f.admin, NotificationType::ViolationAlert).await, 1);
    assert_eq!(f.count_of(&f.moderator, NotificationType::PendingReview).await, 0);
}

#[tokio::test]
async fn test_flagged_content_is_held_whatever_was_requested() {
    for severity in [Severity::Low, Severity::Medium, Severity::High] {
        let f = Fixture::new(ScriptedOracle::flagging(severity)).await;

        let post = f
            .state
            .posts
            .create_post(&f.author, post_request("Rant", Some(PostStatus::Published)))
            .await
            .unwrap();

        assert_eq!(post.status, PostStatus::Pending, "severity {}", severity);
        assert_eq!(post.violation_report.severity, severity);
        assert!(post.violation_report.has_violations);
        assert!(post.moderated_by.is_none());

        let alerts = f.count_of(&f.moderator, NotificationType::ViolationAlert).await;
        let expected = if severity == Severity::High { 1 } else { 0 };
        assert_eq!(alerts, expected, "severity {}", severity);
    }
}

#[tokio::test]
async fn test_flagged_draft_still_goes_to_review() {
    let f = Fixture::new(ScriptedOracle::flagging(Severity::Low)).await;
    let post = f
        .state
        .posts
        .create_post(&f.author, post_request("Draft", Some(PostStatus::Draft)))
        .await
        .unwrap();
    assert_eq!(post.status, PostStatus::Pending);
}

#[tokio::test]
async fn test_clean_draft_stays_draft() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let post = f
        .state
        .posts
        .create_post(&f.author, post_request("Draft", Some(PostStatus::Draft)))
        .await
        .unwrap();

    assert_eq!(post.status, PostStatus::Draft);
    assert_eq!(f.count_of(&f.moderator, NotificationType::PendingReview).await, 0);
}

#[tokio::test]
async fn test_oracle_failure_routes_to_review() {
    let f = Fixture::new(ScriptedOracle::failing()).await;
    let post = f
        .state
        .posts
        .create_post(&f.author, post_request("Club fair", Some(PostStatus::Published)))
        .await
        .unwrap();

    assert_eq!(post.status, PostStatus::Pending);
    assert_eq!(post.violation_report.severity, Severity::Unknown);
}

#[tokio::test]
async fn test_submission_notifies_each_staff_member_once() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let post = f.pending_post().await;

    assert_eq!(f.count_of(&f.moderator, NotificationType::PendingReview).await, 1);
    assert_eq!(f.count_of(&f.admin, NotificationType::PendingReview).await, 1);
    assert_eq!(f.count_of(&f.author, NotificationType::PendingReview).await, 0);

    // back to draft and submitted again while the first notice is unread
    f.state
        .posts
        .change_status(&f.author, post.id, PostStatus::Draft, false, None)
        .await
        .unwrap();
    f.state
        .posts
        .change_status(&f.author, post.id, PostStatus::Pending, false, None)
        .await
        .unwrap();

    assert_eq!(f.count_of(&f.moderator, NotificationType::PendingReview).await, 1);
    assert_eq!(f.count_of(&f.admin, NotificationType::PendingReview).await, 1);
}

#[tokio::test]
async fn test_inactive_staff_is_not_notified() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let retired = register(&f.state, "Ret", [Capability::Moderator]).await;
    f.state
        .accounts
        .handle(AccountEvent::Deactivated {
            user_id: retired.user_id,
        })
        .await
        .unwrap();

    f.pending_post().await;
    assert_eq!(f.count_of(&retired, NotificationType::PendingReview).await, 0);
    assert_eq!(f.count_of(&f.moderator, NotificationType::PendingReview).await, 1);
}

#[tokio::test]
async fn test_publication_fans_out_to_author_and_followers() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let first = register(&f.state, "Fol", [Capability::Reader]).await;
    let second = register(&f.state, "Low", [Capability::Reader]).await;
    for follower in [&first, &second] {
        assert!(f.state.follows.follow(follower, f.author.user_id).await.unwrap());
    }

    f.published_post().await;

    assert_eq!(f.count_of(&f.author, NotificationType::PostApproved).await, 1);
    assert_eq!(f.count_of(&f.author, NotificationType::PostPublished).await, 0);
    assert_eq!(f.count_of(&first, NotificationType::PostPublished).await, 1);
    assert_eq!(f.count_of(&second, NotificationType::PostPublished).await, 1);
    assert_eq!(f.count_of(&f.reader, NotificationType::PostPublished).await, 0);
}

#[tokio::test]
async fn test_end_to_end_unread_counts_and_push() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let mut followers = Vec::new();
    for name in ["One", "Two", "Three"] {
        let follower = register(&f.state, name, [Capability::Reader]).await;
        f.state.follows.follow(&follower, f.author.user_id).await.unwrap();
        followers.push(follower);
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    f.state
        .connections
        .register(Uuid::new_v4(), &followers[0], tx)
        .await;

    let post = f.pending_post().await;

    let recipients: Vec<Uuid> = std::iter::once(f.author.user_id)
        .chain(followers.iter().map(|u| u.user_id))
        .collect();
    let mut before = Vec::new();
    for id in &recipients {
        before.push(f.unread(*id).await);
    }

    f.state.posts.approve(&f.moderator, post.id, None).await.unwrap();

    for (id, count) in recipients.iter().zip(before) {
        assert_eq!(f.unread(*id).await, count + 1, "recipient {}", id);
    }

    let mut frames = Vec::new();
    while let Ok(raw) = rx.try_recv() {
        frames.push(serde_json::from_str::<OutboundFrame>(&raw).unwrap());
    }
    let notification = frames
        .iter()
        .find(|frame| frame.event == "notification:new")
        .expect("notification pushed");
    assert_eq!(notification.payload["type"], "post_published");
    let count = frames
        .iter()
        .find(|frame| frame.event == "notification:count")
        .expect("count pushed");
    assert_eq!(count.payload["count"], 1);
    assert!(frames.iter().any(|frame| frame.event == "post:new"));
}

#[tokio::test]
async fn test_concurrent_moderation_has_one_winner() {
    let racing = Arc::new(RacingPosts::new());
    let storage = Storage {
        posts: racing.clone(),
        ..Storage::in_memory()
    };
    let f = Fixture::with_storage(storage, ScriptedOracle::clean()).await;
    let post = f.pending_post().await;

    racing.arm();
    let (approved, rejected) = tokio::join!(
        f.state.posts.approve(&f.moderator, post.id, None),
        f.state.posts.reject(&f.admin, post.id, None),
    );
    racing.disarm();

    let stored = f.state.storage.posts.get(post.id).await.unwrap().unwrap();
    match (approved, rejected) {
        (Ok(winner), Err(AppError::Conflict(_))) => {
            assert_eq!(winner.status, PostStatus::Published);
            assert_eq!(stored.status, PostStatus::Published);
        }
        (Err(AppError::Conflict(_)), Ok(winner)) => {
            assert_eq!(winner.status, PostStatus::Rejected);
            assert_eq!(stored.status, PostStatus::Rejected);
        }
        (a, r) => panic!("expected exactly one winner, got {:?} / {:?}", a, r),
    }
}

#[tokio::test]
async fn test_fan_out_failure_keeps_transition() {
    let storage = Storage {
        notifications: Arc::new(BrokenFanOut::default()),
        ..Storage::in_memory()
    };
    let f = Fixture::with_storage(storage, ScriptedOracle::clean()).await;
    let pending = f.pending_post().await;

    let published = f
        .state
        .posts
        .approve(&f.moderator, pending.id, None)
        .await
        .unwrap();
    assert_eq!(published.status, PostStatus::Published);

    let stored = f.state.storage.posts.get(pending.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Published);

    let report = f
        .state
        .dispatcher
        .post_published(&published, f.moderator.user_id)
        .await;
    assert!(report.is_partial());
    assert!(report.failed.iter().any(|(id, _)| *id == f.author.user_id));
    assert_eq!(report.created_count(), 0);
}

#[tokio::test]
async fn test_repeated_like_notifies_once() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let post = f.published_post().await;

    let first = f.state.engagement.like(&f.reader, post.id).await.unwrap();
    let second = f.state.engagement.like(&f.reader, post.id).await.unwrap();

    assert!(first.changed);
    assert!(!second.changed);
    assert_eq!(second.likes, 1);
    assert_eq!(f.count_of(&f.author, NotificationType::Like).await, 1);
}

#[tokio::test]
async fn test_like_and_dislike_are_exclusive() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let post = f.published_post().await;

    f.state.engagement.like(&f.reader, post.id).await.unwrap();
    let outcome = f.state.engagement.dislike(&f.reader, post.id).await.unwrap();
    assert!(!outcome.liked);
    assert!(outcome.disliked);
    assert_eq!((outcome.likes, outcome.dislikes), (0, 1));

    let stored = f.state.storage.posts.get(post.id).await.unwrap().unwrap();
    assert!(stored.likes.is_disjoint(&stored.dislikes));

    let cleared = f.state.engagement.undislike(&f.reader, post.id).await.unwrap();
    assert!(cleared.changed);
    let noop = f.state.engagement.unlike(&f.reader, post.id).await.unwrap();
    assert!(!noop.changed);
}

#[tokio::test]
async fn test_reactions_require_published_post() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let post = f.pending_post().await;

    let result = f.state.engagement.like(&f.reader, post.id).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_concurrent_views_with_one_token_count_once() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let post = f.published_post().await;

    let views = (0..16).map(|_| {
        f.state
            .engagement
            .record_view(post.id, Some(&f.reader), "viewer-token", true)
    });
    let outcomes = join_all(views).await;

    let counted = outcomes
        .iter()
        .filter(|o| o.as_ref().map(|o| o.counted).unwrap_or(false))
        .count();
    assert_eq!(counted, 1);
    assert_eq!(f.state.engagement.counts(post.id).await.unwrap().views, 1);

    let other = f
        .state
        .engagement
        .record_view(post.id, None, "another-token", true)
        .await
        .unwrap();
    assert!(other.counted);
    assert_eq!(other.views, 2);
}

#[tokio::test]
async fn test_author_and_untracked_views_do_not_count() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let post = f.published_post().await;

    let own = f
        .state
        .engagement
        .record_view(post.id, Some(&f.author), "author-token", true)
        .await
        .unwrap();
    let untracked = f
        .state
        .engagement
        .record_view(post.id, None, "anon-token", false)
        .await
        .unwrap();

    assert!(!own.counted);
    assert!(!untracked.counted);
    assert_eq!(f.state.engagement.counts(post.id).await.unwrap().views, 0);
}

#[tokio::test]
async fn test_comment_and_reply_notifications() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let post = f.published_post().await;

    let comment = f
        .state
        .comments
        .create(
            &f.reader,
            post.id,
            CreateCommentRequest {
                content: "Thanks, this helped".into(),
                parent_id: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(f.count_of(&f.author, NotificationType::Comment).await, 1);

    f.state
        .comments
        .create(
            &f.author,
            post.id,
            CreateCommentRequest {
                content: "Glad to hear it".into(),
                parent_id: Some(comment.id),
            },
        )
        .await
        .unwrap();
    assert_eq!(f.count_of(&f.reader, NotificationType::Reply).await, 1);
    // the author replying on their own post is not a new comment for them
    assert_eq!(f.count_of(&f.author, NotificationType::Comment).await, 1);

    let listed = f
        .state
        .comments
        .list_for_post(None, post.id)
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn test_follow_rules() {
    let f = Fixture::new(ScriptedOracle::clean()).await;

    let self_follow = f.state.follows.follow(&f.author, f.author.user_id).await;
    assert!(matches!(self_follow, Err(AppError::Validation(_))));

    assert!(f.state.follows.follow(&f.reader, f.author.user_id).await.unwrap());
    assert!(!f.state.follows.follow(&f.reader, f.author.user_id).await.unwrap());
    assert_eq!(f.count_of(&f.author, NotificationType::Follow).await, 1);
    assert!(f
        .state
        .follows
        .is_following(&f.reader, f.author.user_id)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_deleting_published_post_removes_comments() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let post = f.published_post().await;
    f.state
        .comments
        .create(
            &f.reader,
            post.id,
            CreateCommentRequest {
                content: "First".into(),
                parent_id: None,
            },
        )
        .await
        .unwrap();

    f.state.posts.delete_post(&f.author, post.id).await.unwrap();

    assert!(f.state.storage.posts.get(post.id).await.unwrap().is_none());
    assert!(f
        .state
        .storage
        .comments
        .list_for_post(post.id)
        .await
        .unwrap()
        .is_empty());
    let read = f.state.posts.get_post(None, post.id).await;
    assert!(matches!(read, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_registration_workflow_notifies_admins() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let newcomer = Uuid::new_v4();

    f.state
        .accounts
        .handle(AccountEvent::Registered {
            user_id: newcomer,
            display_name: "Newt".into(),
            roles: vec!["author".into()],
        })
        .await
        .unwrap();
    assert_eq!(
        common::count_of(&f.state, f.admin.user_id, NotificationType::NewUser).await,
        1
    );
    assert_eq!(f.count_of(&f.moderator, NotificationType::NewUser).await, 0);

    f.state
        .accounts
        .handle(AccountEvent::Approved { user_id: newcomer })
        .await
        .unwrap();
    assert_eq!(
        common::count_of(&f.state, newcomer, NotificationType::AccountApproved).await,
        1
    );
    assert_eq!(
        common::count_of(&f.state, newcomer, NotificationType::Welcome).await,
        1
    );
    let user = f.state.storage.users.get(newcomer).await.unwrap().unwrap();
    assert!(user.active);
}

fn editor_invite(user: &Actor) -> CoAuthorInvite {
    CoAuthorInvite {
        user_id: user.user_id,
        role: CoAuthorRole::Editor,
    }
}

fn racing_storage() -> (Arc<RacingPosts>, Storage) {
    let racing = Arc::new(RacingPosts::new());
    let storage = Storage {
        posts: racing.clone(),
        ..Storage::in_memory()
    };
    (racing, storage)
}

#[tokio::test]
async fn test_concurrent_invite_answers_are_all_kept() {
    let (racing, storage) = racing_storage();
    let f = Fixture::with_storage(storage, ScriptedOracle::clean()).await;
    let first = register(&f.state, "Edi", [Capability::Author]).await;
    let second = register(&f.state, "Tor", [Capability::Author]).await;
    let mut req = post_request("Joint lab report", Some(PostStatus::Draft));
    req.co_authors = vec![editor_invite(&first), editor_invite(&second)];
    let post = f.state.posts.create_post(&f.author, req).await.unwrap();

    racing.arm();
    let (a, b) = tokio::join!(
        f.state.posts.respond_to_invite(&first, post.id, true),
        f.state.posts.respond_to_invite(&second, post.id, true),
    );
    racing.disarm();
    a.unwrap();
    b.unwrap();

    let stored = f.state.storage.posts.get(post.id).await.unwrap().unwrap();
    assert_eq!(stored.co_authors.len(), 2);
    assert!(stored.co_authors.iter().all(|c| c.accepted));
    assert_eq!(
        f.count_of(&f.author, NotificationType::CollaborationAccepted).await,
        2
    );
}

#[tokio::test]
async fn test_co_author_edit_never_reverts_an_accepted_invite() {
    let (racing, storage) = racing_storage();
    let f = Fixture::with_storage(storage, ScriptedOracle::clean()).await;
    let first = register(&f.state, "Edi", [Capability::Author]).await;
    let second = register(&f.state, "Tor", [Capability::Author]).await;
    let mut req = post_request("Joint lab report", Some(PostStatus::Draft));
    req.co_authors = vec![editor_invite(&first)];
    let post = f.state.posts.create_post(&f.author, req).await.unwrap();

    let edit = UpdatePostRequest {
        co_authors: Some(vec![editor_invite(&first), editor_invite(&second)]),
        ..Default::default()
    };
    racing.arm();
    let (edited, answered) = tokio::join!(
        f.state.posts.update_post(&f.author, post.id, edit),
        f.state.posts.respond_to_invite(&first, post.id, true),
    );
    racing.disarm();
    answered.unwrap();

    let stored = f.state.storage.posts.get(post.id).await.unwrap().unwrap();
    assert_eq!(stored.co_author(first.user_id).map(|c| c.accepted), Some(true));
    match edited {
        Ok(_) => assert!(stored.co_author(second.user_id).is_some()),
        Err(AppError::Conflict(_)) => assert!(stored.co_author(second.user_id).is_none()),
        Err(e) => panic!("unexpected edit outcome: {:?}", e),
    }
}

#[tokio::test]
async fn test_answered_invite_cannot_be_answered_again() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let editor = register(&f.state, "Edi", [Capability::Author]).await;
    let mut req = post_request("Joint lab report", Some(PostStatus::Draft));
    req.co_authors = vec![editor_invite(&editor)];
    let post = f.state.posts.create_post(&f.author, req).await.unwrap();

    let declined = f
        .state
        .posts
        .respond_to_invite(&editor, post.id, false)
        .await
        .unwrap();
    assert!(declined.co_authors.is_empty());

    let again = f.state.posts.respond_to_invite(&editor, post.id, true).await;
    assert!(matches!(again, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_flagged_edit_leaves_published_before_content_is_written() {
    let (racing, storage) = racing_storage();
    let oracle: Arc<dyn ModerationOracle> =
        Arc::new(RuleBasedOracle::with_words([("cheating", Severity::Medium)]));
    let f = Fixture::with_storage(storage, oracle).await;
    let post = f.published_post().await;
    // cached public copy
    f.state.posts.get_post(None, post.id).await.unwrap();

    let edit = UpdatePostRequest {
        content: Some("Cheating on the midterm is easy from the back row.".to_string()),
        ..Default::default()
    };
    let edited = f
        .state
        .posts
        .update_post(&f.author, post.id, edit)
        .await
        .unwrap();

    assert_eq!(edited.status, PostStatus::Pending);
    assert!(edited.content.starts_with("Cheating"));
    assert_eq!(edited.violation_report.severity, Severity::Medium);
    assert_eq!(racing.statuses_at_write(), vec![PostStatus::Pending]);
    assert!(matches!(
        f.state.posts.get_post(None, post.id).await,
        Err(AppError::NotFound(_))
    ));
    let queue = f
        .state
        .posts
        .moderation_queue(&f.moderator, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn test_post_rooms_follow_post_visibility() {
    let f = Fixture::new(ScriptedOracle::clean()).await;
    let draft = f
        .state
        .posts
        .create_post(&f.author, post_request("Half-finished", Some(PostStatus::Draft)))
        .await
        .unwrap();

    let mut sessions = Vec::new();
    for user in [&f.reader, &f.author] {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        let connection_id = Uuid::new_v4();
        f.state.connections.register(connection_id, user, tx).await;
        sessions.push((connection_id, rx));
    }
    let (reader_session, author_session) = (sessions[0].0, sessions[1].0);

    let refused = join_post_room(
        &f.state.connections,
        &f.state.posts,
        reader_session,
        &f.reader,
        draft.id,
    )
    .await;
    assert!(matches!(refused, Err(AppError::NotFound(_))));
    let missing = join_post_room(
        &f.state.connections,
        &f.state.posts,
        reader_session,
        &f.reader,
        Uuid::new_v4(),
    )
    .await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
    assert_eq!(f.state.connections.viewers_of(draft.id).await, 0);

    let joined = join_post_room(
        &f.state.connections,
        &f.state.posts,
        author_session,
        &f.author,
        draft.id,
    )
    .await
    .unwrap();
    assert!(joined);
    assert_eq!(f.state.connections.viewers_of(draft.id).await, 1);

    let published = f.published_post().await;
    assert!(join_post_room(
        &f.state.connections,
        &f.state.posts,
        reader_session,
        &f.reader,
        published.id,
    )
    .await
    .unwrap());
}

#[tokio::test]
async fn test_self_moderated_posts_still_notify_the_author() {
    let f = Fixture::new(ScriptedOracle::clean()).await;

    let approved = f
        .state
        .posts
        .create_post(&f.admin, post_request("Office hours", None))
        .await
        .unwrap();
    assert_eq!(approved.status, PostStatus::Pending);
    f.state.posts.approve(&f.admin, approved.id, None).await.unwrap();
    assert_eq!(f.count_of(&f.admin, NotificationType::PostApproved).await, 1);

    let rejected = f
        .state
        .posts
        .create_post(&f.admin, post_request("Room change", None))
        .await
        .unwrap();
    f.state
        .posts
        .reject(&f.admin, rejected.id, Some("duplicate".into()))
        .await
        .unwrap();
    assert_eq!(f.count_of(&f.admin, NotificationType::PostRejected).await, 1);
}
