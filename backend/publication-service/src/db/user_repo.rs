use super::UserDirectory;
use crate::error::Result;
use crate::models::{Capability, UserRecord};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Read model of platform users. Account management lives elsewhere; this
/// table only mirrors what recipient resolution needs.
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn capability_names(capabilities: &[Capability]) -> Vec<&'static str> {
    capabilities.iter().map(Capability::as_str).collect()
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserRecord>> {
        let row = sqlx::query(
            "SELECT id, display_name, capabilities, is_active FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let names: Vec<String> = row.try_get("capabilities")?;
        Ok(Some(UserRecord {
            id: row.try_get("id")?,
            display_name: row.try_get("display_name")?,
            capabilities: names.iter().filter_map(|n| Capability::from_role(n)).collect(),
            active: row.try_get("is_active")?,
        }))
    }

    async fn register(&self, user: UserRecord) -> Result<()> {
        let mut capabilities: Vec<Capability> = user.capabilities.iter().copied().collect();
        capabilities.sort();

        sqlx::query(
            r#"
            INSERT INTO users (id, display_name, capabilities, is_active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                capabilities = EXCLUDED.capabilities,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(user.id)
        .bind(&user.display_name)
        .bind(capability_names(&capabilities))
        .bind(user.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn active_with_capabilities(&self, capabilities: &[Capability]) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM users
            WHERE is_active = TRUE AND capabilities && $1::text[]
            ORDER BY id
            "#,
        )
        .bind(capability_names(capabilities))
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}
