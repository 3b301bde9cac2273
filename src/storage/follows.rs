use chrono::Utc;

use super::schema::Database;
use super::types::{is_unique_violation, to_millis, DatabaseError, FeedFollow, FeedFollowRow};

const FOLLOW_SELECT: &str = r#"
    SELECT
        ff.id, ff.user_id, ff.feed_id, ff.created_at, ff.updated_at,
        u.name AS user_name, f.name AS feed_name
    FROM feed_follows ff
    JOIN users u ON u.id = ff.user_id
    JOIN feeds f ON f.id = ff.feed_id
"#;

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Subscribe `user_id` to `feed_id`, returning the follow with user and
    /// feed names filled in.
    pub async fn create_feed_follow(
        &self,
        user_id: i64,
        feed_id: i64,
    ) -> Result<FeedFollow, DatabaseError> {
        let now = to_millis(Utc::now());
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO feed_follows (user_id, feed_id, created_at, updated_at)
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DatabaseError::AlreadyExists(format!("follow of feed id {feed_id}"))
            } else {
                DatabaseError::from_sqlx(e)
            }
        })?;

        let row: FeedFollowRow = sqlx::query_as(&format!("{FOLLOW_SELECT} WHERE ff.id = ?"))
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(row.into_follow())
    }

    /// Follows of one user, in the order they were created.
    pub async fn list_follows_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<FeedFollow>, DatabaseError> {
        let rows: Vec<FeedFollowRow> = sqlx::query_as(&format!(
            "{FOLLOW_SELECT} WHERE ff.user_id = ? ORDER BY ff.created_at, ff.id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(rows.into_iter().map(FeedFollowRow::into_follow).collect())
    }

    /// Unsubscribe `user_id` from the feed at `feed_url`.
    /// `NotFound` if the user was not following it.
    pub async fn delete_feed_follow(
        &self,
        user_id: i64,
        feed_url: &str,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM feed_follows
             WHERE user_id = ? AND feed_id = (SELECT id FROM feeds WHERE url = ?)",
        )
        .bind(user_id)
        .bind(feed_url)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("follow of {feed_url}")));
        }
        Ok(())
    }
}
