// src/db/chats.rs
// Chat threads: create, read, paginate, delete

use serde::Serialize;
use sqlx::SqlitePool;

use super::{from_millis, now_millis};
use crate::error::{AppError, Result};
use crate::models::{Chat, Visibility};

type ChatRow = (String, String, String, String, i64);

fn map_row((id, user_id, title, visibility, created_at): ChatRow) -> Chat {
    Chat {
        id,
        user_id,
        title,
        visibility: Visibility::parse(&visibility).unwrap_or_default(),
        created_at: from_millis(created_at),
    }
}

/// One page of a user's chat history, newest first
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPage {
    pub chats: Vec<Chat>,
    pub has_more: bool,
}

pub async fn save_chat(
    pool: &SqlitePool,
    id: &str,
    user_id: &str,
    title: &str,
    visibility: Visibility,
) -> Result<Chat> {
    let created_at = now_millis();
    sqlx::query(
        r#"
        INSERT INTO chats (id, user_id, title, visibility, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(title)
    .bind(visibility.as_str())
    .bind(created_at)
    .execute(pool)
    .await?;

    Ok(Chat {
        id: id.to_string(),
        user_id: user_id.to_string(),
        title: title.to_string(),
        visibility,
        created_at: from_millis(created_at),
    })
}

pub async fn get_chat_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Chat>> {
    let row: Option<ChatRow> = sqlx::query_as(
        "SELECT id, user_id, title, visibility, created_at FROM chats WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(map_row))
}

/// Delete a chat together with its votes and messages in one transaction
pub async fn delete_chat_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Chat>> {
    let Some(chat) = get_chat_by_id(pool, id).await? else {
        return Ok(None);
    };

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM votes WHERE chat_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM messages WHERE chat_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chats WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(Some(chat))
}

pub async fn update_chat_visibility(
    pool: &SqlitePool,
    id: &str,
    visibility: Visibility,
) -> Result<()> {
    let result = sqlx::query("UPDATE chats SET visibility = $1 WHERE id = $2")
        .bind(visibility.as_str())
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("chat {id}")));
    }
    Ok(())
}

/// Page through a user's chats, newest first.
///
/// `starting_after` returns chats newer than the cursor chat, `ending_before`
/// chats older than it. Callers must not pass both.
pub async fn get_chats_by_user_id(
    pool: &SqlitePool,
    user_id: &str,
    limit: i64,
    starting_after: Option<&str>,
    ending_before: Option<&str>,
) -> Result<ChatPage> {
    let extended_limit = limit + 1;

    let rows: Vec<ChatRow> = match (starting_after, ending_before) {
        (Some(cursor), _) | (None, Some(cursor)) => {
            let cursor_chat = get_chat_by_id(pool, cursor)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("chat {cursor}")))?;
            let cursor_ms = cursor_chat.created_at.timestamp_millis();
            let comparison = if starting_after.is_some() { ">" } else { "<" };
            let sql = format!(
                r#"SELECT id, user_id, title, visibility, created_at
                   FROM chats
                   WHERE user_id = $1 AND created_at {comparison} $2
                   ORDER BY created_at DESC, rowid DESC
                   LIMIT $3"#
            );

            sqlx::query_as(&sql)
                .bind(user_id)
                .bind(cursor_ms)
                .bind(extended_limit)
                .fetch_all(pool)
                .await?
        }
        (None, None) => {
            sqlx::query_as(
                r#"SELECT id, user_id, title, visibility, created_at
                   FROM chats
                   WHERE user_id = $1
                   ORDER BY created_at DESC, rowid DESC
                   LIMIT $2"#,
            )
            .bind(user_id)
            .bind(extended_limit)
            .fetch_all(pool)
            .await?
        }
    };

    let has_more = rows.len() as i64 > limit;
    let chats = rows
        .into_iter()
        .take(limit.max(0) as usize)
        .map(map_row)
        .collect();

    Ok(ChatPage { chats, has_more })
}
