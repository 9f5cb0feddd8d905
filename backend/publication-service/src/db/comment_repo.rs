use super::CommentRepository;
use crate::error::Result;
use crate::models::{Comment, NewComment};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

fn comment_from_row(row: &PgRow) -> Result<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        author_id: row.try_get("author_id")?,
        parent_id: row.try_get("parent_id")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct PgCommentRepository {
    pool: PgPool,
}

impl PgCommentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommentRepository for PgCommentRepository {
    async fn create(&self, comment: NewComment) -> Result<Comment> {
        let row = sqlx::query(
            r#"
            INSERT INTO comments (id, post_id, author_id, parent_id, content)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, post_id, author_id, parent_id, content, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(comment.post_id)
        .bind(comment.author_id)
        .bind(comment.parent_id)
        .bind(&comment.content)
        .fetch_one(&self.pool)
        .await?;

        comment_from_row(&row)
    }

    async fn get(&self, comment_id: Uuid) -> Result<Option<Comment>> {
        let row = sqlx::query(
            r#"
            SELECT id, post_id, author_id, parent_id, content, created_at, updated_at
            FROM comments
            WHERE id = $1
            "#,
        )
        .bind(comment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(comment_from_row).transpose()
    }

    async fn update(&self, comment_id: Uuid, content: &str) -> Result<Option<Comment>> {
        let row = sqlx::query(
            r#"
            UPDATE comments SET content = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, post_id, author_id, parent_id, content, created_at, updated_at
            "#,
        )
        .bind(comment_id)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(comment_from_row).transpose()
    }

    async fn delete(&self, comment_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(comment_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_for_post(&self, post_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM comments WHERE post_id = $1")
            .bind(post_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, author_id, parent_id, content, created_at, updated_at
            FROM comments
            WHERE post_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(comment_from_row).collect()
    }
}
