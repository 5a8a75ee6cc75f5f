use crate::{
    error::{Error, QueryError},
    form::ValidIngredient,
    schema::{Ingredient, Uuid},
};

use sqlx::{Pool, Postgres};

/// Escapes LIKE wildcards so a search term only ever matches literally.
fn like_prefix(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{escaped}%")
}

/// Lists the catalog, optionally narrowed to names starting with `search`
/// (case-insensitive).
pub async fn list_ingredients(
    search: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, Error> {
    let rows: Vec<Ingredient> = match search.filter(|s| !s.is_empty()) {
        Some(search) => sqlx::query_as(
            "SELECT * FROM ingredients WHERE LOWER(name) LIKE LOWER($1) ORDER BY name, id",
        )
        .bind(like_prefix(search))
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?,
        None => sqlx::query_as("SELECT * FROM ingredients ORDER BY name, id")
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?,
    };

    Ok(rows)
}

pub async fn get_ingredient(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Ingredient>, Error> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn create_ingredient(
    ingredient: ValidIngredient,
    pool: &Pool<Postgres>,
) -> Result<Ingredient, Error> {
    let row: Ingredient = sqlx::query_as(
        "INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) RETURNING *",
    )
    .bind(&ingredient.name)
    .bind(&ingredient.measurement_unit)
    .fetch_one(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_terms_match_literally() {
        assert_eq!(like_prefix("flo"), "flo%");
        assert_eq!(like_prefix("100%_"), "100\\%\\_%");
    }
}
