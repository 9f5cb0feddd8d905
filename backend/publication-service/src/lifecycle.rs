/// Post lifecycle rules
///
/// Pure decision functions: who may move a post between which states, and
/// which fields an actor may touch. The services apply the decisions through
/// the repository's conditional update.
use crate::error::AppError;
use crate::models::{Actor, Post, PostStatus, Severity};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("not permitted to move a post from {from} to {to}")]
    NotPermitted { from: PostStatus, to: PostStatus },

    #[error("{0}")]
    Guard(String),

    /// The stored status no longer matches what the decision was based on
    #[error("post status changed concurrently, reload and retry")]
    Stale,
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::NotPermitted { .. } | TransitionError::Guard(_) => {
                AppError::Forbidden(err.to_string())
            }
            TransitionError::Stale => AppError::Conflict(err.to_string()),
        }
    }
}

/// Which fields an actor may change on a post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditScope {
    /// Title, content, category, co-authors and status
    Full,
    /// Status and moderation notes only
    ModerationOnly,
    None,
}

/// Author or accepted editor co-author
pub fn is_owner(post: &Post, actor: &Actor) -> bool {
    post.is_author(actor.user_id) || post.is_editor(actor.user_id)
}

pub fn edit_scope(post: &Post, actor: &Actor) -> EditScope {
    if !actor.active {
        return EditScope::None;
    }
    if is_owner(post, actor) || actor.is_admin() {
        EditScope::Full
    } else if actor.is_moderator() {
        EditScope::ModerationOnly
    } else {
        EditScope::None
    }
}

/// Whether the actor may delete the post (comments go with it)
pub fn can_delete(post: &Post, actor: &Actor) -> bool {
    actor.active && (post.is_author(actor.user_id) || actor.is_staff())
}

/// Whether a post in its current state is visible to the actor
pub fn can_view(post: &Post, actor: Option<&Actor>) -> bool {
    if post.status == PostStatus::Published {
        return true;
    }
    match actor {
        Some(actor) => post.is_contributor(actor.user_id) || actor.is_staff(),
        None => false,
    }
}

/// Check the transition table.
///
/// | from            | to        | actor                      | guard                 |
/// |-----------------|-----------|----------------------------|-----------------------|
/// | draft           | pending   | author / accepted editor   |                       |
/// | pending         | published | moderator / admin          | severity != critical  |
/// | draft / pending | published | admin with override        | none                  |
/// | pending         | rejected  | moderator / admin          |                       |
/// | published       | rejected  | moderator / admin          |                       |
/// | any             | archived  | admin                      |                       |
/// | any             | draft     | author / accepted editor   |                       |
///
/// `from == to` is accepted whenever the actor could reach `to` at all; the
/// caller treats it as a no-op.
pub fn authorize(
    post: &Post,
    actor: &Actor,
    to: PostStatus,
    override_moderation: bool,
) -> Result<(), TransitionError> {
    let from = post.status;
    let denied = TransitionError::NotPermitted { from, to };

    if !actor.active {
        return Err(denied);
    }

    let owner = is_owner(post, actor);
    let staff = actor.is_staff();

    match to {
        PostStatus::Draft => {
            if owner {
                Ok(())
            } else {
                Err(denied)
            }
        }
        PostStatus::Pending => match from {
            PostStatus::Draft | PostStatus::Pending if owner => Ok(()),
            _ => Err(denied),
        },
        PostStatus::Published => match from {
            PostStatus::Draft | PostStatus::Pending if actor.is_admin() && override_moderation => {
                Ok(())
            }
            PostStatus::Pending if staff => {
                if post.violation_report.severity == Severity::Critical {
                    Err(TransitionError::Guard(
                        "critical violations must be resolved before publishing".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
            PostStatus::Published if staff => Ok(()),
            _ => Err(denied),
        },
        PostStatus::Rejected => match from {
            PostStatus::Pending | PostStatus::Published | PostStatus::Rejected if staff => Ok(()),
            _ => Err(denied),
        },
        PostStatus::Archived => {
            if actor.is_admin() {
                Ok(())
            } else {
                Err(denied)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Capability, CoAuthor, CoAuthorRole, ViolationReport};
    use chrono::Utc;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn post(status: PostStatus) -> Post {
        let now = Utc::now();
        Post {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            title: "Dorm cooking".into(),
            content: "Rice cooker recipes".into(),
            category: None,
            status,
            co_authors: vec![],
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
        }
    }

    fn author_of(post: &Post) -> Actor {
        Actor::new(post.author_id, [Capability::Author])
    }

    fn moderator() -> Actor {
        Actor::new(Uuid::new_v4(), [Capability::Moderator])
    }

    fn admin() -> Actor {
        Actor::new(Uuid::new_v4(), [Capability::Admin])
    }

    #[test]
    fn test_author_submits_draft() {
        let p = post(PostStatus::Draft);
        assert!(authorize(&p, &author_of(&p), PostStatus::Pending, false).is_ok());
        assert!(authorize(&p, &moderator(), PostStatus::Pending, false).is_err());
    }

    #[test]
    fn test_author_cannot_publish() {
        let p = post(PostStatus::Pending);
        assert_eq!(
            authorize(&p, &author_of(&p), PostStatus::Published, false),
            Err(TransitionError::NotPermitted {
                from: PostStatus::Pending,
                to: PostStatus::Published
            })
        );
    }

    #[test]
    fn test_staff_publish_pending() {
        let p = post(PostStatus::Pending);
        assert!(authorize(&p, &moderator(), PostStatus::Published, false).is_ok());
        assert!(authorize(&p, &admin(), PostStatus::Published, false).is_ok());
    }

    #[test]
    fn test_critical_guard_blocks_publish() {
        let mut p = post(PostStatus::Pending);
        p.violation_report.severity = Severity::Critical;

        assert!(matches!(
            authorize(&p, &moderator(), PostStatus::Published, false),
            Err(TransitionError::Guard(_))
        ));
        // the admin override bypasses moderation
        assert!(authorize(&p, &admin(), PostStatus::Published, true).is_ok());
    }

    #[test]
    fn test_draft_publish_needs_admin_override() {
        let p = post(PostStatus::Draft);
        assert!(authorize(&p, &admin(), PostStatus::Published, false).is_err());
        assert!(authorize(&p, &admin(), PostStatus::Published, true).is_ok());
        assert!(authorize(&p, &moderator(), PostStatus::Published, true).is_err());
    }

    #[test]
    fn test_reject_paths() {
        for from in [PostStatus::Pending, PostStatus::Published] {
            let p = post(from);
            assert!(authorize(&p, &moderator(), PostStatus::Rejected, false).is_ok());
        }
        let p = post(PostStatus::Draft);
        assert!(authorize(&p, &moderator(), PostStatus::Rejected, false).is_err());
    }

    #[test]
    fn test_only_admin_archives() {
        for from in PostStatus::ALL {
            let p = post(from);
            assert!(authorize(&p, &admin(), PostStatus::Archived, false).is_ok());
            assert!(authorize(&p, &moderator(), PostStatus::Archived, false).is_err());
            assert!(authorize(&p, &author_of(&p), PostStatus::Archived, false).is_err());
        }
    }

    #[test]
    fn test_author_reworks_from_any_state() {
        for from in PostStatus::ALL {
            let p = post(from);
            assert!(authorize(&p, &author_of(&p), PostStatus::Draft, false).is_ok());
        }
    }

    #[test]
    fn test_editor_scope_requires_acceptance() {
        let mut p = post(PostStatus::Draft);
        let editor = Actor::new(Uuid::new_v4(), [Capability::Author]);
        p.co_authors.push(CoAuthor {
            user_id: editor.user_id,
            role: CoAuthorRole::Editor,
            accepted: false,
        });
        assert_eq!(edit_scope(&p, &editor), EditScope::None);

        p.co_authors[0].accepted = true;
        assert_eq!(edit_scope(&p, &editor), EditScope::Full);
        assert!(authorize(&p, &editor, PostStatus::Pending, false).is_ok());
    }

    #[test]
    fn test_contributor_cannot_edit() {
        let mut p = post(PostStatus::Draft);
        let contributor = Actor::new(Uuid::new_v4(), [Capability::Author]);
        p.co_authors.push(CoAuthor {
            user_id: contributor.user_id,
            role: CoAuthorRole::Contributor,
            accepted: true,
        });
        assert_eq!(edit_scope(&p, &contributor), EditScope::None);
        assert!(authorize(&p, &contributor, PostStatus::Pending, false).is_err());
    }

    #[test]
    fn test_moderator_scope() {
        let p = post(PostStatus::Pending);
        assert_eq!(edit_scope(&p, &moderator()), EditScope::ModerationOnly);
        assert_eq!(edit_scope(&p, &admin()), EditScope::Full);
    }

    #[test]
    fn test_inactive_actor_is_denied() {
        let p = post(PostStatus::Pending);
        let inactive = moderator().with_active(false);
        assert!(authorize(&p, &inactive, PostStatus::Rejected, false).is_err());
        assert_eq!(edit_scope(&p, &inactive), EditScope::None);
    }

    #[test]
    fn test_visibility() {
        let p = post(PostStatus::Pending);
        assert!(!can_view(&p, None));
        assert!(can_view(&p, Some(&author_of(&p))));
        assert!(can_view(&p, Some(&moderator())));
        assert!(can_view(&post(PostStatus::Published), None));
    }

    #[test]
    fn test_stale_maps_to_conflict() {
        let err: AppError = TransitionError::Stale.into();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
