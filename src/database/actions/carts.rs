use std::collections::HashSet;

use sqlx::{Pool, Postgres};

use crate::{
    error::{Error, HtmlError, QueryError},
    schema::{Recipe, RecipePart, Uuid},
};

use super::get_recipe_or_404;

pub async fn add_to_cart(
    recipe_id: Uuid,
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    let recipe = get_recipe_or_404(recipe_id, pool).await?;

    let inserted = sqlx::query(
        "INSERT INTO shopping_carts (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if inserted.rows_affected() == 0 {
        return Err(HtmlError::Conflict.new("Recipe is already in the shopping cart"));
    }

    Ok(recipe)
}

pub async fn remove_from_cart(
    recipe_id: Uuid,
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    get_recipe_or_404(recipe_id, pool).await?;

    let deleted = sqlx::query("DELETE FROM shopping_carts WHERE user_id = $1 AND recipe_id = $2")
        .bind(user_id)
        .bind(recipe_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    if deleted.rows_affected() == 0 {
        return Err(HtmlError::NotFound.new("Recipe is not in the shopping cart"));
    }

    Ok(())
}

pub async fn in_cart_among(
    user_id: Uuid,
    recipe_ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<HashSet<Uuid>, Error> {
    if recipe_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT recipe_id FROM shopping_carts WHERE user_id = $1 AND recipe_id = ANY($2)",
    )
    .bind(user_id)
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Every ingredient line of every recipe in the user's cart.
pub async fn list_cart_parts(user_id: Uuid, pool: &Pool<Postgres>) -> Result<Vec<RecipePart>, Error> {
    let parts: Vec<RecipePart> = sqlx::query_as(
        "
        SELECT ri.recipe_id, ri.ingredient_id, i.name, i.measurement_unit, ri.amount
        FROM shopping_carts c
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE c.user_id = $1
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(parts)
}
