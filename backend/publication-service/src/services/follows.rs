use super::dispatcher::NotificationDispatcher;
use crate::db::FollowRepository;
use crate::error::{AppError, Result};
use crate::models::Actor;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Follow edges between users. Only a newly created edge notifies.
pub struct FollowService {
    follows: Arc<dyn FollowRepository>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl FollowService {
    pub fn new(follows: Arc<dyn FollowRepository>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self {
            follows,
            dispatcher,
        }
    }

    pub async fn follow(&self, actor: &Actor, followee_id: Uuid) -> Result<bool> {
        if !actor.active {
            return Err(AppError::Forbidden("account is not active".to_string()));
        }
        if actor.user_id == followee_id {
            return Err(AppError::Validation("cannot follow yourself".to_string()));
        }

        let created = self.follows.follow(actor.user_id, followee_id).await?;
        if created {
            info!(follower = %actor.user_id, followee = %followee_id, "follow created");
            self.dispatcher.followed(actor.user_id, followee_id).await;
        }
        Ok(created)
    }

    pub async fn unfollow(&self, actor: &Actor, followee_id: Uuid) -> Result<bool> {
        self.follows.unfollow(actor.user_id, followee_id).await
    }

    pub async fn is_following(&self, actor: &Actor, followee_id: Uuid) -> Result<bool> {
        self.follows.is_following(actor.user_id, followee_id).await
    }

    pub async fn followers_of(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.follows.followers_of(user_id).await
    }
}
