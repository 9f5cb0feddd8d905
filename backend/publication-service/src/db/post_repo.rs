use super::PostRepository;
use crate::error::{AppError, Result};
use crate::models::{
    CategoryCount, CoAuthor, NewPost, PageRequest, Post, PostChanges, PostStatus, Reaction,
    ReactionOp, ReactionOutcome, StatusStamp, ViolationReport,
};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Columns selected for a full `Post`, with the reaction sets folded in.
/// Expects the posts relation to be aliased `p`.
const POST_COLUMNS: &str = r#"
    p.id, p.author_id, p.title, p.content, p.category, p.status, p.co_authors,
    p.has_violations, p.severity, p.violations, p.analyzed_at,
    p.moderated_by, p.moderated_at, p.moderation_notes,
    p.views, p.published_at, p.created_at, p.updated_at,
    ARRAY(SELECT l.user_id FROM post_likes l WHERE l.post_id = p.id) AS likes,
    ARRAY(SELECT d.user_id FROM post_dislikes d WHERE d.post_id = p.id) AS dislikes
"#;

/// Wrap a data-modifying statement that `RETURNING *` so the caller gets the
/// full post shape back in the same round trip.
fn returning_post(statement: &str) -> String {
    format!(
        "WITH target AS ({}) SELECT {} FROM target p",
        statement, POST_COLUMNS
    )
}

fn post_from_row(row: &PgRow) -> Result<Post> {
    let status: String = row.try_get("status")?;
    let severity: String = row.try_get("severity")?;
    let co_authors: Json<Vec<CoAuthor>> = row.try_get("co_authors")?;
    let likes: Vec<Uuid> = row.try_get("likes")?;
    let dislikes: Vec<Uuid> = row.try_get("dislikes")?;

    Ok(Post {
        id: row.try_get("id")?,
        author_id: row.try_get("author_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        category: row.try_get("category")?,
        status: status.parse().map_err(AppError::Database)?,
        co_authors: co_authors.0,
        violation_report: ViolationReport {
            has_violations: row.try_get("has_violations")?,
            severity: severity.parse().map_err(AppError::Database)?,
            violations: row.try_get("violations")?,
            analyzed_at: row.try_get("analyzed_at")?,
        },
        moderated_by: row.try_get("moderated_by")?,
        moderated_at: row.try_get("moderated_at")?,
        moderation_notes: row.try_get("moderation_notes")?,
        likes: likes.into_iter().collect(),
        dislikes: dislikes.into_iter().collect(),
        views: row.try_get("views")?,
        published_at: row.try_get("published_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct PgPostRepository {
    pool: PgPool,
}

impl PgPostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostRepository for PgPostRepository {
    async fn insert(&self, post: NewPost) -> Result<Post> {
        let sql = returning_post(
            r#"
            INSERT INTO posts (
                id, author_id, title, content, category, status, co_authors,
                has_violations, severity, severity_rank, violations, analyzed_at,
                moderated_by, moderated_at, moderation_notes, published_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
        );

        let report = &post.violation_report;
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(post.author_id)
            .bind(&post.title)
            .bind(&post.content)
            .bind(&post.category)
            .bind(post.status.as_str())
            .bind(Json(&post.co_authors))
            .bind(report.has_violations)
            .bind(report.severity.as_str())
            .bind(report.severity.rank())
            .bind(&report.violations)
            .bind(report.analyzed_at)
            .bind(post.stamp.moderated_by)
            .bind(post.stamp.moderated_at)
            .bind(&post.stamp.moderation_notes)
            .bind(post.stamp.published_at)
            .fetch_one(&self.pool)
            .await?;

        post_from_row(&row)
    }

    async fn get(&self, post_id: Uuid) -> Result<Option<Post>> {
        let sql = format!("SELECT {} FROM posts p WHERE p.id = $1", POST_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(post_from_row).transpose()
    }

    async fn update_content(&self, post_id: Uuid, changes: &PostChanges) -> Result<Option<Post>> {
        let sql = returning_post(
            r#"
            UPDATE posts SET
                title = COALESCE($2, title),
                content = COALESCE($3, content),
                category = COALESCE($4, category),
                co_authors = COALESCE($5, co_authors),
                moderation_notes = COALESCE($6, moderation_notes),
                has_violations = COALESCE($7, has_violations),
                severity = COALESCE($8, severity),
                severity_rank = COALESCE($9, severity_rank),
                violations = COALESCE($10, violations),
                analyzed_at = CASE WHEN $7 IS NULL THEN analyzed_at ELSE $11 END,
                updated_at = NOW()
            WHERE id = $1 AND ($12::timestamptz IS NULL OR updated_at = $12)
            RETURNING *
            "#,
        );

        let report = changes.violation_report.as_ref();
        let row = sqlx::query(&sql)
            .bind(post_id)
            .bind(&changes.title)
            .bind(&changes.content)
            .bind(&changes.category)
            .bind(changes.co_authors.as_ref().map(Json))
            .bind(&changes.moderation_notes)
            .bind(report.map(|r| r.has_violations))
            .bind(report.map(|r| r.severity.as_str()))
            .bind(report.map(|r| r.severity.rank()))
            .bind(report.map(|r| r.violations.clone()))
            .bind(report.and_then(|r| r.analyzed_at))
            .bind(changes.unmodified_since)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(post_from_row).transpose()
    }

    async fn answer_invite(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        accept: bool,
    ) -> Result<Option<Post>> {
        // rewrites only the invitee's element; concurrent answers by other
        // invitees re-evaluate against the latest row version
        let sql = returning_post(
            r#"
            UPDATE posts SET
                co_authors = (
                    SELECT COALESCE(
                        jsonb_agg(
                            CASE WHEN a.e->>'user_id' = $2::text
                                THEN jsonb_set(a.e, '{accepted}', 'true'::jsonb)
                                ELSE a.e
                            END
                            ORDER BY a.ord
                        ),
                        '[]'::jsonb
                    )
                    FROM jsonb_array_elements(posts.co_authors) WITH ORDINALITY AS a(e, ord)
                    WHERE $3 OR a.e->>'user_id' <> $2::text
                ),
                updated_at = NOW()
            WHERE id = $1
              AND co_authors @> jsonb_build_array(
                  jsonb_build_object('user_id', $2::text, 'accepted', false)
              )
            RETURNING *
            "#,
        );

        let row = sqlx::query(&sql)
            .bind(post_id)
            .bind(user_id)
            .bind(accept)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(post_from_row).transpose()
    }

    async fn transition(
        &self,
        post_id: Uuid,
        expected: &[PostStatus],
        to: PostStatus,
        stamp: &StatusStamp,
    ) -> Result<Option<Post>> {
        let sql = returning_post(
            r#"
            UPDATE posts SET
                status = $3,
                moderated_by = COALESCE($4, moderated_by),
                moderated_at = COALESCE($5, moderated_at),
                published_at = COALESCE($6, published_at),
                moderation_notes = COALESCE($7, moderation_notes),
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($2)
            RETURNING *
            "#,
        );

        let expected: Vec<&str> = expected.iter().map(PostStatus::as_str).collect();
        let row = sqlx::query(&sql)
            .bind(post_id)
            .bind(&expected)
            .bind(to.as_str())
            .bind(stamp.moderated_by)
            .bind(stamp.moderated_at)
            .bind(stamp.published_at)
            .bind(&stamp.moderation_notes)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(post_from_row).transpose()
    }

    async fn delete(&self, post_id: Uuid) -> Result<bool> {
        // comments, likes and dislikes cascade
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(post_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn react(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        op: ReactionOp,
    ) -> Result<Option<ReactionOutcome>> {
        let mut tx = self.pool.begin().await?;

        // serialises reactions on the same post
        let locked = sqlx::query("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(None);
        }

        let (table, opposite) = match op {
            ReactionOp::Add(Reaction::Like) | ReactionOp::Remove(Reaction::Like) => {
                ("post_likes", "post_dislikes")
            }
            ReactionOp::Add(Reaction::Dislike) | ReactionOp::Remove(Reaction::Dislike) => {
                ("post_dislikes", "post_likes")
            }
        };

        let changed = match op {
            ReactionOp::Add(_) => {
                sqlx::query(&format!(
                    "DELETE FROM {} WHERE post_id = $1 AND user_id = $2",
                    opposite
                ))
                .bind(post_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

                sqlx::query(&format!(
                    "INSERT INTO {} (post_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
                    table
                ))
                .bind(post_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?
                .rows_affected()
                    > 0
            }
            ReactionOp::Remove(_) => {
                sqlx::query(&format!(
                    "DELETE FROM {} WHERE post_id = $1 AND user_id = $2",
                    table
                ))
                .bind(post_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?
                .rows_affected()
                    > 0
            }
        };

        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM post_likes WHERE post_id = $1) AS likes,
                (SELECT COUNT(*) FROM post_dislikes WHERE post_id = $1) AS dislikes,
                EXISTS(SELECT 1 FROM post_likes WHERE post_id = $1 AND user_id = $2) AS liked,
                EXISTS(SELECT 1 FROM post_dislikes WHERE post_id = $1 AND user_id = $2) AS disliked
            "#,
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(ReactionOutcome {
            changed,
            liked: row.try_get("liked")?,
            disliked: row.try_get("disliked")?,
            likes: row.try_get("likes")?,
            dislikes: row.try_get("dislikes")?,
        }))
    }

    async fn increment_views(&self, post_id: Uuid) -> Result<Option<i64>> {
        let views = sqlx::query_scalar::<_, i64>(
            "UPDATE posts SET views = views + 1 WHERE id = $1 RETURNING views",
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(views)
    }

    async fn list_published(
        &self,
        page: PageRequest,
        category: Option<&str>,
    ) -> Result<Vec<Post>> {
        let page = page.normalized();
        let sql = format!(
            r#"
            SELECT {} FROM posts p
            WHERE p.status = 'published' AND ($1::text IS NULL OR p.category = $1)
            ORDER BY p.published_at DESC, p.id DESC
            LIMIT $2 OFFSET $3
            "#,
            POST_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(category)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(post_from_row).collect()
    }

    async fn category_counts(&self) -> Result<Vec<CategoryCount>> {
        let rows = sqlx::query(
            r#"
            SELECT category, COUNT(*) AS count
            FROM posts
            WHERE status = 'published' AND category IS NOT NULL
            GROUP BY category
            ORDER BY count DESC, category ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CategoryCount {
                    category: row.try_get("category")?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    async fn moderation_queue(&self, page: PageRequest) -> Result<Vec<Post>> {
        let page = page.normalized();
        let sql = format!(
            r#"
            SELECT {} FROM posts p
            WHERE p.status = 'pending'
            ORDER BY p.severity_rank DESC, p.created_at ASC
            LIMIT $1 OFFSET $2
            "#,
            POST_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(post_from_row).collect()
    }
}
