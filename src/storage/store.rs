use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{DatabaseError, Feed, InsertPostError, NewPost, Post};

/// The slice of the store the ingestion scheduler depends on.
///
/// Kept narrow so the scheduler can be driven against a fake in tests and
/// never sees driver-specific errors: duplicates arrive as
/// [`InsertPostError::DuplicateUrl`].
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// The feed with the oldest `last_fetched_at` (never-fetched first, ties by id).
    async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError>;

    /// Record that `feed_id` was claimed at `at`. Must not move the timestamp backwards.
    async fn mark_feed_fetched(&self, feed_id: i64, at: DateTime<Utc>)
        -> Result<(), DatabaseError>;

    async fn insert_post(&self, post: &NewPost) -> Result<Post, InsertPostError>;
}

#[async_trait]
impl FeedStore for Database {
    async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        Database::next_feed_to_fetch(self).await
    }

    async fn mark_feed_fetched(
        &self,
        feed_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        Database::mark_feed_fetched(self, feed_id, at).await
    }

    async fn insert_post(&self, post: &NewPost) -> Result<Post, InsertPostError> {
        self.create_post(post).await
    }
}
