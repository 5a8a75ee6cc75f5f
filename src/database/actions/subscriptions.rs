use std::collections::HashSet;

use sqlx::{Pool, Postgres};

use crate::{
    error::{Error, HtmlError, QueryError},
    pagination::PageQuery,
    schema::{User, UserRow, Uuid},
};

use super::get_user;

/// Subscribes `user_id` to `author_id`. Self-subscription is refused before
/// anything is looked up.
pub async fn subscribe(
    user_id: Uuid,
    author_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<User, Error> {
    if user_id == author_id {
        return Err(HtmlError::InvalidRequest.new("You cannot subscribe to yourself"));
    }

    let author = get_user(author_id, pool).await?;

    let inserted = sqlx::query(
        "INSERT INTO subscriptions (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(author_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if inserted.rows_affected() == 0 {
        return Err(HtmlError::Conflict.new("You are already subscribed to this author"));
    }

    log::debug!("User {user_id} subscribed to {author_id}");
    Ok(author)
}

pub async fn unsubscribe(
    user_id: Uuid,
    author_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    get_user(author_id, pool).await?;

    let deleted = sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND author_id = $2")
        .bind(user_id)
        .bind(author_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    if deleted.rows_affected() == 0 {
        return Err(HtmlError::NotFound.new("You are not subscribed to this author"));
    }

    Ok(())
}

/// Authors the user follows, most recent subscription first.
pub async fn fetch_subscriptions(
    user_id: Uuid,
    query: PageQuery,
    pool: &Pool<Postgres>,
) -> Result<Vec<UserRow>, Error> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name, COUNT(*) OVER() AS count
        FROM subscriptions s
        INNER JOIN users u ON u.id = s.author_id
        WHERE s.user_id = $1
        ORDER BY s.id DESC
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(user_id)
    .bind(query.limit)
    .bind(query.offset())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn subscribed_among(
    user_id: Uuid,
    author_ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<HashSet<Uuid>, Error> {
    if author_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT author_id FROM subscriptions WHERE user_id = $1 AND author_id = ANY($2)",
    )
    .bind(user_id)
    .bind(author_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
