use chrono::Utc;

use super::schema::Database;
use super::types::{
    is_unique_violation, to_millis, DatabaseError, InsertPostError, NewPost, Post, PostRow,
};

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert one ingested item.
    ///
    /// A URL that is already stored (by any feed) yields
    /// `InsertPostError::DuplicateUrl` and leaves the table unchanged.
    pub async fn create_post(&self, post: &NewPost) -> Result<Post, InsertPostError> {
        let now = to_millis(Utc::now());
        let row: PostRow = sqlx::query_as(
            r#"
                INSERT INTO posts (feed_id, title, description, url, published_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                RETURNING id, feed_id, title, description, url, published_at, created_at, updated_at
            "#,
        )
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.description)
        .bind(&post.url)
        .bind(post.published_at.map(to_millis))
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                InsertPostError::DuplicateUrl(post.url.clone())
            } else {
                InsertPostError::Other(DatabaseError::from_sqlx(e))
            }
        })?;

        Ok(row.into_post())
    }

    /// Newest posts from feeds `user_id` follows.
    ///
    /// Posts without a publish date sort by the time they were ingested.
    pub async fn posts_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<Post>, DatabaseError> {
        let rows: Vec<PostRow> = sqlx::query_as(
            r#"
                SELECT
                    p.id, p.feed_id, p.title, p.description, p.url,
                    p.published_at, p.created_at, p.updated_at
                FROM posts p
                JOIN feed_follows ff ON ff.feed_id = p.feed_id
                WHERE ff.user_id = ?
                ORDER BY COALESCE(p.published_at, p.created_at) DESC, p.id DESC
                LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(rows.into_iter().map(PostRow::into_post).collect())
    }
}
