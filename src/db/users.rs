// src/db/users.rs
// Local user rows keyed by the identity provider's uid

use sqlx::SqlitePool;
use uuid::Uuid;

use super::{from_millis, now_millis};
use crate::error::{AppError, Result};
use crate::models::{User, UserType};

type UserRow = (String, Option<String>, String, String, i64);

fn map_row((id, email, identity_uid, user_type, created_at): UserRow) -> User {
    User {
        id,
        email,
        identity_uid,
        user_type: UserType::parse(&user_type).unwrap_or(UserType::Regular),
        created_at: from_millis(created_at),
    }
}

pub async fn create_user(
    pool: &SqlitePool,
    identity_uid: &str,
    email: Option<&str>,
    user_type: UserType,
) -> Result<User> {
    let id = Uuid::new_v4().to_string();
    let created_at = now_millis();

    sqlx::query(
        r#"
        INSERT INTO users (id, email, identity_uid, user_type, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&id)
    .bind(email)
    .bind(identity_uid)
    .bind(user_type.as_str())
    .bind(created_at)
    .execute(pool)
    .await?;

    Ok(User {
        id,
        email: email.map(str::to_string),
        identity_uid: identity_uid.to_string(),
        user_type,
        created_at: from_millis(created_at),
    })
}

pub async fn get_user_by_id(pool: &SqlitePool, id: &str) -> Result<Option<User>> {
    let row: Option<UserRow> = sqlx::query_as(
        "SELECT id, email, identity_uid, user_type, created_at FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(map_row))
}

pub async fn get_user_by_identity_uid(pool: &SqlitePool, identity_uid: &str) -> Result<Option<User>> {
    let row: Option<UserRow> = sqlx::query_as(
        "SELECT id, email, identity_uid, user_type, created_at FROM users WHERE identity_uid = $1",
    )
    .bind(identity_uid)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(map_row))
}

/// Fetch the user for an identity uid, creating it on first sight.
///
/// The insert is a no-op when the uid already exists, so concurrent first
/// requests for the same caller converge on one row. A guest that later
/// links an email (same uid) is promoted to `regular`.
pub async fn ensure_user(
    pool: &SqlitePool,
    identity_uid: &str,
    email: Option<&str>,
    user_type: UserType,
) -> Result<User> {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, identity_uid, user_type, created_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT(identity_uid) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(email)
    .bind(identity_uid)
    .bind(user_type.as_str())
    .bind(now_millis())
    .execute(pool)
    .await?;

    let existing = get_user_by_identity_uid(pool, identity_uid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {identity_uid}")))?;

    if existing.user_type == UserType::Guest && user_type == UserType::Regular {
        sqlx::query("UPDATE users SET user_type = $1, email = $2 WHERE id = $3")
            .bind(UserType::Regular.as_str())
            .bind(email)
            .bind(&existing.id)
            .execute(pool)
            .await?;
        return Ok(User {
            user_type: UserType::Regular,
            email: email.map(str::to_string),
            ..existing
        });
    }

    Ok(existing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    #[tokio::test]
    async fn test_ensure_user_is_idempotent() {
        let pool = create_memory_pool().await.unwrap();
        let first = ensure_user(&pool, "uid-1", Some("a@b.co"), UserType::Regular)
            .await
            .unwrap();
        let second = ensure_user(&pool, "uid-1", Some("a@b.co"), UserType::Regular)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_guest_promoted_on_email_link() {
        let pool = create_memory_pool().await.unwrap();
        let guest = ensure_user(&pool, "uid-g", None, UserType::Guest).await.unwrap();
        assert_eq!(guest.user_type, UserType::Guest);

        let promoted = ensure_user(&pool, "uid-g", Some("g@b.co"), UserType::Regular)
            .await
            .unwrap();
        assert_eq!(promoted.id, guest.id);
        assert_eq!(promoted.user_type, UserType::Regular);

        let reloaded = get_user_by_id(&pool, &guest.id).await.unwrap().unwrap();
        assert_eq!(reloaded.email.as_deref(), Some("g@b.co"));
    }

    #[tokio::test]
    async fn test_concurrent_first_sight_creates_one_user() {
        let pool = create_memory_pool().await.unwrap();
        let (a, b) = tokio::join!(
            ensure_user(&pool, "uid-race", Some("r@b.co"), UserType::Regular),
            ensure_user(&pool, "uid-race", Some("r@b.co"), UserType::Regular),
        );
        assert_eq!(a.unwrap().id, b.unwrap().id);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE identity_uid = $1")
            .bind("uid-race")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let pool = create_memory_pool().await.unwrap();
        assert!(get_user_by_identity_uid(&pool, "nope").await.unwrap().is_none());
    }
}
