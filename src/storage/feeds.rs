use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{
    is_unique_violation, to_millis, DatabaseError, Feed, FeedOwnerRow, FeedRow, FeedWithOwner,
};

const FEED_COLUMNS: &str = "id, name, url, user_id, created_at, updated_at, last_fetched_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Add a feed owned by `user_id`. Feed URLs are unique across all users.
    pub async fn create_feed(
        &self,
        name: &str,
        url: &str,
        user_id: i64,
    ) -> Result<Feed, DatabaseError> {
        let now = to_millis(Utc::now());
        let row: FeedRow = sqlx::query_as(&format!(
            "INSERT INTO feeds (name, url, user_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?) RETURNING {FEED_COLUMNS}"
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DatabaseError::AlreadyExists(format!("feed {url}"))
            } else {
                DatabaseError::from_sqlx(e)
            }
        })?;

        Ok(row.into_feed())
    }

    /// All feeds with the name of the user who added them, oldest first.
    pub async fn list_feeds_with_owner(&self) -> Result<Vec<FeedWithOwner>, DatabaseError> {
        let rows: Vec<FeedOwnerRow> = sqlx::query_as(
            r#"
                SELECT
                    f.id, f.name, f.url, f.user_id, f.created_at, f.updated_at,
                    f.last_fetched_at, u.name AS owner_name
                FROM feeds f
                JOIN users u ON u.id = f.user_id
                ORDER BY f.created_at, f.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(rows
            .into_iter()
            .map(|row| FeedWithOwner {
                feed: row.feed.into_feed(),
                owner_name: row.owner_name,
            })
            .collect())
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Feed, DatabaseError> {
        let row: Option<FeedRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"))
                .bind(url)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;

        row.map(FeedRow::into_feed)
            .ok_or_else(|| DatabaseError::NotFound(format!("feed {url}")))
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// The stalest feed: never-fetched feeds first, then oldest
    /// `last_fetched_at`, ties broken by id.
    pub async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedRow> = sqlx::query_as(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds
             ORDER BY last_fetched_at IS NOT NULL, last_fetched_at, id
             LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(FeedRow::into_feed))
    }

    /// Claim a feed for this round by stamping `last_fetched_at`.
    ///
    /// The stored value never decreases: a timestamp older than the current
    /// one leaves it unchanged. Returns `NotFound` if the feed is gone.
    pub async fn mark_feed_fetched(
        &self,
        feed_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let at = to_millis(at);
        let result = sqlx::query(
            "UPDATE feeds
             SET last_fetched_at = MAX(COALESCE(last_fetched_at, 0), ?1),
                 updated_at = MAX(updated_at, ?1)
             WHERE id = ?2",
        )
        .bind(at)
        .bind(feed_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("feed id {feed_id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError};
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    async fn test_db() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("kahya").await.unwrap();
        (db, user.id)
    }

    #[tokio::test]
    async fn test_create_feed() {
        let (db, user_id) = test_db().await;
        let feed = db
            .create_feed("Hacker News", "https://news.ycombinator.com/rss", user_id)
            .await
            .unwrap();

        assert_eq!(feed.name, "Hacker News");
        assert_eq!(feed.user_id, user_id);
        assert_eq!(feed.last_fetched_at, None);
        assert_eq!(
            db.get_feed_by_url("https://news.ycombinator.com/rss")
                .await
                .unwrap(),
            feed
        );
    }

    #[tokio::test]
    async fn test_duplicate_feed_url_rejected() {
        let (db, user_id) = test_db().await;
        let other = db.create_user("holgith").await.unwrap();
        db.create_feed("A", "https://a.example/rss", user_id)
            .await
            .unwrap();
        let err = db
            .create_feed("B", "https://a.example/rss", other.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::AlreadyExists(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_create_feed_unknown_user() {
        let (db, _) = test_db().await;
        assert!(db.create_feed("A", "https://a.example/rss", 999).await.is_err());
    }

    #[tokio::test]
    async fn test_list_feeds_with_owner() {
        let (db, user_id) = test_db().await;
        let other = db.create_user("holgith").await.unwrap();
        db.create_feed("First", "https://a.example/rss", user_id)
            .await
            .unwrap();
        db.create_feed("Second", "https://b.example/rss", other.id)
            .await
            .unwrap();

        let listed: Vec<(String, String)> = db
            .list_feeds_with_owner()
            .await
            .unwrap()
            .into_iter()
            .map(|f| (f.feed.name, f.owner_name))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("First".to_string(), "kahya".to_string()),
                ("Second".to_string(), "holgith".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_next_feed_empty() {
        let (db, _) = test_db().await;
        assert_eq!(db.next_feed_to_fetch().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_next_feed_order_nulls_then_oldest() {
        let (db, user_id) = test_db().await;
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t2 = t1 + Duration::hours(1);

        let late = db.create_feed("late", "https://late.example/rss", user_id).await.unwrap();
        let early = db.create_feed("early", "https://early.example/rss", user_id).await.unwrap();
        let never = db.create_feed("never", "https://never.example/rss", user_id).await.unwrap();
        db.mark_feed_fetched(late.id, t2).await.unwrap();
        db.mark_feed_fetched(early.id, t1).await.unwrap();

        let first = db.next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(first.id, never.id);

        db.mark_feed_fetched(never.id, t2 + Duration::hours(1)).await.unwrap();
        assert_eq!(db.next_feed_to_fetch().await.unwrap().unwrap().id, early.id);

        db.mark_feed_fetched(early.id, t2 + Duration::hours(2)).await.unwrap();
        assert_eq!(db.next_feed_to_fetch().await.unwrap().unwrap().id, late.id);
    }

    #[tokio::test]
    async fn test_next_feed_ties_broken_by_id() {
        let (db, user_id) = test_db().await;
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let a = db.create_feed("a", "https://a.example/rss", user_id).await.unwrap();
        let b = db.create_feed("b", "https://b.example/rss", user_id).await.unwrap();
        db.mark_feed_fetched(b.id, at).await.unwrap();
        db.mark_feed_fetched(a.id, at).await.unwrap();

        assert_eq!(db.next_feed_to_fetch().await.unwrap().unwrap().id, a.id);
    }

    #[tokio::test]
    async fn test_mark_feed_fetched_is_monotonic() {
        let (db, user_id) = test_db().await;
        let feed = db.create_feed("a", "https://a.example/rss", user_id).await.unwrap();
        let later = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let earlier = later - Duration::days(1);

        db.mark_feed_fetched(feed.id, later).await.unwrap();
        db.mark_feed_fetched(feed.id, earlier).await.unwrap();

        let stored = db.get_feed_by_url(&feed.url).await.unwrap();
        assert_eq!(stored.last_fetched_at, Some(later));
        assert!(stored.updated_at >= feed.updated_at);
    }

    #[tokio::test]
    async fn test_mark_missing_feed() {
        let (db, _) = test_db().await;
        let err = db.mark_feed_fetched(42, Utc::now()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }
}
