// src/db/votes.rs

use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::Vote;

/// Up- or down-vote a message; a second vote on the same message replaces the first
pub async fn vote_message(
    pool: &SqlitePool,
    chat_id: &str,
    message_id: &str,
    is_upvoted: bool,
) -> Result<Vote> {
    sqlx::query(
        r#"
        INSERT INTO votes (chat_id, message_id, is_upvoted)
        VALUES ($1, $2, $3)
        ON CONFLICT(chat_id, message_id) DO UPDATE SET is_upvoted = excluded.is_upvoted
        "#,
    )
    .bind(chat_id)
    .bind(message_id)
    .bind(is_upvoted)
    .execute(pool)
    .await?;

    Ok(Vote {
        chat_id: chat_id.to_string(),
        message_id: message_id.to_string(),
        is_upvoted,
    })
}

pub async fn get_votes_by_chat_id(pool: &SqlitePool, chat_id: &str) -> Result<Vec<Vote>> {
    let rows: Vec<(String, String, bool)> = sqlx::query_as(
        "SELECT chat_id, message_id, is_upvoted FROM votes WHERE chat_id = $1",
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(chat_id, message_id, is_upvoted)| Vote {
            chat_id,
            message_id,
            is_upvoted,
        })
        .collect())
}
