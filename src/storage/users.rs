use chrono::Utc;

use super::schema::Database;
use super::types::{is_unique_violation, to_millis, DatabaseError, User, UserRow};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Register a new user. Names are unique.
    pub async fn create_user(&self, name: &str) -> Result<User, DatabaseError> {
        let now = to_millis(Utc::now());
        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (name, created_at, updated_at) VALUES (?, ?, ?)
             RETURNING id, name, created_at, updated_at",
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DatabaseError::AlreadyExists(format!("user {name:?}"))
            } else {
                DatabaseError::from_sqlx(e)
            }
        })?;

        Ok(row.into_user())
    }

    pub async fn get_user(&self, name: &str) -> Result<User, DatabaseError> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, name, created_at, updated_at FROM users WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;

        row.map(UserRow::into_user)
            .ok_or_else(|| DatabaseError::NotFound(format!("user {name:?}")))
    }

    /// All users ordered by name.
    pub async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        let rows: Vec<UserRow> =
            sqlx::query_as("SELECT id, name, created_at, updated_at FROM users ORDER BY name")
                .fetch_all(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;

        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }

    /// Delete every user. Feeds, follows and posts go with them through
    /// `ON DELETE CASCADE`. Returns the number of users removed.
    pub async fn delete_all_users(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM users")
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected())
    }
}
