use std::collections::HashSet;

use sqlx::{Pool, Postgres};

use crate::{
    error::{Error, HtmlError, QueryError},
    schema::{Recipe, Uuid},
};

use super::get_recipe_or_404;

pub async fn add_favorite(
    recipe_id: Uuid,
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    let recipe = get_recipe_or_404(recipe_id, pool).await?;

    let inserted = sqlx::query(
        "INSERT INTO favorites (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if inserted.rows_affected() == 0 {
        return Err(HtmlError::Conflict.new("Recipe is already in favorites"));
    }

    Ok(recipe)
}

pub async fn remove_favorite(
    recipe_id: Uuid,
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    get_recipe_or_404(recipe_id, pool).await?;

    let deleted = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND recipe_id = $2")
        .bind(user_id)
        .bind(recipe_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    if deleted.rows_affected() == 0 {
        return Err(HtmlError::NotFound.new("Recipe is not in favorites"));
    }

    Ok(())
}

/// Which of `recipe_ids` the user has favorited.
pub async fn favorited_among(
    user_id: Uuid,
    recipe_ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<HashSet<Uuid>, Error> {
    if recipe_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT recipe_id FROM favorites WHERE user_id = $1 AND recipe_id = ANY($2)",
    )
    .bind(user_id)
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
