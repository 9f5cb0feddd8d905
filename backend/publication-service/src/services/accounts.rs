use super::dispatcher::NotificationDispatcher;
use crate::db::UserDirectory;
use crate::error::{AppError, Result};
use crate::models::{Capability, FanOutReport, UserRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Account lifecycle events pushed by the registration workflow
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AccountEvent {
    Registered {
        user_id: Uuid,
        display_name: String,
        #[serde(default)]
        roles: Vec<String>,
    },
    AuthorRequested {
        user_id: Uuid,
    },
    Approved {
        user_id: Uuid,
    },
    Rejected {
        user_id: Uuid,
        reason: Option<String>,
    },
    RolesChanged {
        user_id: Uuid,
        roles: Vec<String>,
    },
    Deactivated {
        user_id: Uuid,
    },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct AccountEventOutcome {
    pub notified: usize,
    pub failed: usize,
}

impl From<&FanOutReport> for AccountEventOutcome {
    fn from(report: &FanOutReport) -> Self {
        Self {
            notified: report.created_count(),
            failed: report.failed.len(),
        }
    }
}

/// Keeps the user directory in step with the account workflow and raises
/// the matching notices.
pub struct AccountService {
    users: Arc<dyn UserDirectory>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserDirectory>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { users, dispatcher }
    }

    async fn load(&self, user_id: Uuid) -> Result<UserRecord> {
        self.users
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
    }

    pub async fn handle(&self, event: AccountEvent) -> Result<AccountEventOutcome> {
        let report = match event {
            AccountEvent::Registered {
                user_id,
                display_name,
                roles,
            } => {
                let mut user = UserRecord::new(
                    user_id,
                    display_name.clone(),
                    roles.iter().filter_map(|r| Capability::from_role(r)),
                );
                user.active = false;
                self.users.register(user).await?;
                info!(user_id = %user_id, "user registered, awaiting approval");
                self.dispatcher.user_registered(user_id, &display_name).await
            }
            AccountEvent::AuthorRequested { user_id } => {
                let user = self.load(user_id).await?;
                self.dispatcher
                    .author_requested(user_id, &user.display_name)
                    .await
            }
            AccountEvent::Approved { user_id } => {
                let mut user = self.load(user_id).await?;
                user.active = true;
                let display_name = user.display_name.clone();
                self.users.register(user).await?;

                let mut report = self.dispatcher.account_decision(user_id, true, None).await;
                report.merge(self.dispatcher.welcome(user_id, &display_name).await);
                report
            }
            AccountEvent::Rejected { user_id, reason } => {
                let mut user = self.load(user_id).await?;
                user.active = false;
                self.users.register(user).await?;
                self.dispatcher
                    .account_decision(user_id, false, reason.as_deref())
                    .await
            }
            AccountEvent::RolesChanged { user_id, roles } => {
                let mut user = self.load(user_id).await?;
                user.capabilities = roles
                    .iter()
                    .filter_map(|r| Capability::from_role(r))
                    .collect();
                self.users.register(user).await?;
                FanOutReport::default()
            }
            AccountEvent::Deactivated { user_id } => {
                let mut user = self.load(user_id).await?;
                user.active = false;
                self.users.register(user).await?;
                FanOutReport::default()
            }
        };

        Ok(AccountEventOutcome::from(&report))
    }
}
