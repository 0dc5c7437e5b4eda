// src/db/messages.rs
// Message persistence; parts are stored as a JSON array

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::warn;

use super::from_millis;
use crate::error::Result;
use crate::models::{Message, MessagePart, Role};

type MessageRow = (String, String, String, String, i64);

fn map_row((id, chat_id, role, parts_json, created_at): MessageRow) -> Message {
    let parts: Vec<MessagePart> = serde_json::from_str(&parts_json).unwrap_or_else(|e| {
        warn!(message_id = %id, error = %e, "Unreadable message parts, returning empty");
        Vec::new()
    });
    Message {
        id,
        chat_id,
        role: Role::parse(&role).unwrap_or(Role::Assistant),
        parts,
        created_at: from_millis(created_at),
    }
}

pub async fn save_messages(pool: &SqlitePool, messages: &[Message]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for message in messages {
        sqlx::query(
            r#"
            INSERT INTO messages (id, chat_id, role, parts, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&message.id)
        .bind(&message.chat_id)
        .bind(message.role.as_str())
        .bind(serde_json::to_string(&message.parts)?)
        .bind(message.created_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn get_message_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Message>> {
    let row: Option<MessageRow> = sqlx::query_as(
        "SELECT id, chat_id, role, parts, created_at FROM messages WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(map_row))
}

/// All messages of a chat in chronological order
pub async fn get_messages_by_chat_id(pool: &SqlitePool, chat_id: &str) -> Result<Vec<Message>> {
    let rows: Vec<MessageRow> = sqlx::query_as(
        r#"
        SELECT id, chat_id, role, parts, created_at
        FROM messages
        WHERE chat_id = $1
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(map_row).collect())
}

/// Number of user-authored messages across all of a user's chats in the last `window_hours`
pub async fn get_message_count_by_user_id(
    pool: &SqlitePool,
    user_id: &str,
    window_hours: i64,
) -> Result<i64> {
    let since = (Utc::now() - Duration::hours(window_hours)).timestamp_millis();

    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(m.id)
        FROM messages m
        INNER JOIN chats c ON c.id = m.chat_id
        WHERE c.user_id = $1 AND m.role = 'user' AND m.created_at >= $2
        "#,
    )
    .bind(user_id)
    .bind(since)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Drop every message (and its votes) created at or after `timestamp`; used when a user edits a turn
pub async fn delete_messages_after(
    pool: &SqlitePool,
    chat_id: &str,
    timestamp: DateTime<Utc>,
) -> Result<u64> {
    let ts = timestamp.timestamp_millis();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        DELETE FROM votes
        WHERE chat_id = $1
          AND message_id IN (SELECT id FROM messages WHERE chat_id = $1 AND created_at >= $2)
        "#,
    )
    .bind(chat_id)
    .bind(ts)
    .execute(&mut *tx)
    .await?;

    let result = sqlx::query("DELETE FROM messages WHERE chat_id = $1 AND created_at >= $2")
        .bind(chat_id)
        .bind(ts)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{chats, create_memory_pool, users};
    use crate::models::{UserType, Visibility};

    fn message(id: &str, chat_id: &str, role: Role, text: &str, at: DateTime<Utc>) -> Message {
        Message {
            id: id.into(),
            chat_id: chat_id.into(),
            role,
            parts: vec![MessagePart::text(text)],
            created_at: at,
        }
    }

    async fn setup() -> (SqlitePool, String) {
        let pool = create_memory_pool().await.unwrap();
        let user = users::create_user(&pool, "uid", None, UserType::Guest).await.unwrap();
        chats::save_chat(&pool, "c1", &user.id, "t", Visibility::Private)
            .await
            .unwrap();
        (pool, user.id)
    }

    #[tokio::test]
    async fn test_save_and_load_in_order() {
        let (pool, _) = setup().await;
        let now = Utc::now();
        save_messages(
            &pool,
            &[
                message("m2", "c1", Role::Assistant, "answer", now),
                message("m1", "c1", Role::User, "question", now - Duration::seconds(1)),
            ],
        )
        .await
        .unwrap();

        let loaded = get_messages_by_chat_id(&pool, "c1").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "m1");
        assert_eq!(loaded[1].text_content(), "answer");
    }

    #[tokio::test]
    async fn test_count_only_recent_user_messages() {
        let (pool, user_id) = setup().await;
        let now = Utc::now();
        save_messages(
            &pool,
            &[
                message("m1", "c1", Role::User, "a", now),
                message("m2", "c1", Role::Assistant, "b", now),
                message("m3", "c1", Role::User, "c", now - Duration::hours(30)),
            ],
        )
        .await
        .unwrap();

        let count = get_message_count_by_user_id(&pool, &user_id, 24).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_delete_messages_after() {
        let (pool, _) = setup().await;
        let now = Utc::now();
        save_messages(
            &pool,
            &[
                message("m1", "c1", Role::User, "a", now - Duration::seconds(10)),
                message("m2", "c1", Role::Assistant, "b", now),
            ],
        )
        .await
        .unwrap();

        let removed = delete_messages_after(&pool, "c1", now).await.unwrap();
        assert_eq!(removed, 1);
        assert!(get_message_by_id(&pool, "m2").await.unwrap().is_none());
        assert!(get_message_by_id(&pool, "m1").await.unwrap().is_some());
    }
}
