use std::collections::{HashMap, HashSet};

use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    error::{Error, HtmlError, QueryError, Validator},
    form::{QueryForm, ValidRecipe},
    pagination::PageQuery,
    schema::{Recipe, RecipeAggregate, RecipeCount, RecipePart, RecipeRow, Tag, Uuid},
};

use super::{get_users_by_ids, list_recipe_tags};

/// Listing filters read from the query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeFilter {
    pub author: Option<Uuid>,
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl RecipeFilter {
    pub fn from_form(form: &QueryForm) -> Result<Self, Error> {
        Ok(Self {
            author: form.get_number("author")?,
            tags: form
                .get_all("tags")
                .into_iter()
                .filter(|slug| !slug.is_empty())
                .map(str::to_string)
                .collect(),
            is_favorited: form.get_bool("is_favorited")?,
            is_in_shopping_cart: form.get_bool("is_in_shopping_cart")?,
        })
    }

    fn needs_viewer(&self) -> bool {
        self.is_favorited || self.is_in_shopping_cart
    }
}

/// Newest first. Viewer-relative filters match nothing for anonymous callers.
pub async fn fetch_recipes(
    filter: &RecipeFilter,
    viewer: Option<Uuid>,
    query: PageQuery,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeRow>, Error> {
    let viewer = match (viewer, filter.needs_viewer()) {
        (None, true) => return Ok(vec![]),
        (viewer, _) => viewer,
    };

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT r.*, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");

    if let Some(author) = filter.author {
        builder.push(" AND r.author_id = ").push_bind(author);
    }

    if !filter.tags.is_empty() {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id \
                 WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }

    if let Some(viewer) = viewer {
        if filter.is_favorited {
            builder
                .push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
                .push_bind(viewer)
                .push(")");
        }
        if filter.is_in_shopping_cart {
            builder
                .push(
                    " AND EXISTS (SELECT 1 FROM shopping_carts c WHERE c.recipe_id = r.id AND c.user_id = ",
                )
                .push_bind(viewer)
                .push(")");
        }
    }

    builder
        .push(" ORDER BY r.created_at DESC, r.id DESC LIMIT ")
        .push_bind(query.limit)
        .push(" OFFSET ")
        .push_bind(query.offset());

    let rows: Vec<RecipeRow> = builder
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn get_recipe(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Recipe>, Error> {
    let recipe: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(recipe)
}

pub async fn get_recipe_or_404(id: Uuid, pool: &Pool<Postgres>) -> Result<Recipe, Error> {
    get_recipe(id, pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No recipe exists with specified id"))
}

/// Fetches a recipe the session is allowed to change: its author or an admin.
pub async fn get_recipe_mut(
    id: Uuid,
    user: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    let recipe = get_recipe_or_404(id, pool).await?;

    user.authenticate_owner(
        recipe.author_id,
        ActionType::ManageOwnRecipes,
        ActionType::ManageAllRecipes,
    )
    .map_err(|_| HtmlError::Forbidden.new("You do not have permission to change this recipe"))?;

    Ok(recipe)
}

pub async fn list_recipe_parts(
    recipe_ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipePart>, Error> {
    if recipe_ids.is_empty() {
        return Ok(vec![]);
    }

    let parts: Vec<RecipePart> = sqlx::query_as(
        "
        SELECT ri.recipe_id, ri.ingredient_id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.recipe_id, ri.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(parts)
}

/// Loads ingredients, tags and authors for a batch of recipes in one query each.
pub async fn load_recipe_aggregates(
    recipes: Vec<Recipe>,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeAggregate>, Error> {
    let ids: Vec<Uuid> = recipes.iter().map(|r| r.id).collect();
    let mut author_ids: Vec<Uuid> = recipes.iter().map(|r| r.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let mut parts: HashMap<Uuid, Vec<RecipePart>> = HashMap::new();
    for part in list_recipe_parts(&ids, pool).await? {
        parts.entry(part.recipe_id).or_default().push(part);
    }

    let mut tags: HashMap<Uuid, Vec<Tag>> = HashMap::new();
    for tag in list_recipe_tags(&ids, pool).await? {
        tags.entry(tag.recipe_id).or_default().push(tag.into());
    }

    let authors = get_users_by_ids(&author_ids, pool).await?;

    recipes
        .into_iter()
        .map(|recipe| -> Result<RecipeAggregate, Error> {
            let author = authors.get(&recipe.author_id).cloned().ok_or_else(|| {
                log::error!("Recipe {} has no author {}", recipe.id, recipe.author_id);
                HtmlError::InternalServerError.default()
            })?;

            Ok(RecipeAggregate {
                author,
                tags: tags.remove(&recipe.id).unwrap_or_default(),
                ingredients: parts.remove(&recipe.id).unwrap_or_default(),
                recipe,
            })
        })
        .collect()
}

pub async fn load_recipe_aggregate(
    recipe: Recipe,
    pool: &Pool<Postgres>,
) -> Result<RecipeAggregate, Error> {
    load_recipe_aggregates(vec![recipe], pool)
        .await?
        .pop()
        .ok_or_else(|| HtmlError::InternalServerError.default())
}

/// Every referenced ingredient and tag must exist in the catalog.
async fn check_catalog_references(
    recipe: &ValidRecipe,
    tr: &mut PgConnection,
) -> Result<(), Error> {
    let ingredient_ids = recipe.ingredient_ids();
    let found: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1)")
        .bind(&ingredient_ids[..])
        .fetch_all(&mut *tr)
        .await
        .map_err(QueryError::from)?;
    let found: HashSet<Uuid> = found.into_iter().map(|(id,)| id).collect();

    let mut v = Validator::new();
    for id in ingredient_ids.iter().filter(|id| !found.contains(id)) {
        v.add("ingredients", &format!("Ingredient {id} does not exist"));
    }

    if !recipe.tags.is_empty() {
        let found: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1)")
            .bind(&recipe.tags[..])
            .fetch_all(&mut *tr)
            .await
            .map_err(QueryError::from)?;
        let found: HashSet<Uuid> = found.into_iter().map(|(id,)| id).collect();

        for id in recipe.tags.iter().filter(|id| !found.contains(id)) {
            v.add("tags", &format!("Tag {id} does not exist"));
        }
    }

    v.finish()
}

/// Replaces the ingredient and tag sets of a recipe wholesale.
async fn replace_recipe_links(
    recipe_id: Uuid,
    recipe: &ValidRecipe,
    tr: &mut PgConnection,
) -> Result<(), Error> {
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::from)?;
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::from)?;

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");
    builder.push_values(recipe.ingredients.iter(), |mut b, part| {
        b.push_bind(recipe_id)
            .push_bind(part.id)
            .push_bind(part.amount);
    });
    builder
        .build()
        .execute(&mut *tr)
        .await
        .map_err(QueryError::from)?;

    if !recipe.tags.is_empty() {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
        builder.push_values(recipe.tags.iter(), |mut b, tag| {
            b.push_bind(recipe_id).push_bind(*tag);
        });
        builder
            .build()
            .execute(&mut *tr)
            .await
            .map_err(QueryError::from)?;
    }

    Ok(())
}

/// Creates a recipe with its ingredient and tag links; all or nothing.
pub async fn create_recipe(
    author_id: Uuid,
    recipe: &ValidRecipe,
    image: &str,
    pool: &Pool<Postgres>,
) -> Result<Uuid, Error> {
    let mut tr = pool.begin().await.map_err(QueryError::from)?;

    check_catalog_references(recipe, &mut tr).await?;

    let (id,): (Uuid,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id;
    ",
    )
    .bind(author_id)
    .bind(&recipe.name)
    .bind(image)
    .bind(&recipe.text)
    .bind(recipe.cooking_time)
    .fetch_one(&mut *tr)
    .await
    .map_err(QueryError::from)?;

    replace_recipe_links(id, recipe, &mut tr).await?;

    tr.commit().await.map_err(QueryError::from)?;

    log::info!("User {author_id} created recipe {id}");
    Ok(id)
}

pub async fn update_recipe(
    id: Uuid,
    recipe: &ValidRecipe,
    image: &str,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let mut tr = pool.begin().await.map_err(QueryError::from)?;

    check_catalog_references(recipe, &mut tr).await?;

    let updated = sqlx::query(
        "UPDATE recipes SET name = $1, image = $2, text = $3, cooking_time = $4 WHERE id = $5",
    )
    .bind(&recipe.name)
    .bind(image)
    .bind(&recipe.text)
    .bind(recipe.cooking_time)
    .bind(id)
    .execute(&mut *tr)
    .await
    .map_err(QueryError::from)?;

    if updated.rows_affected() == 0 {
        return Err(HtmlError::NotFound.new("No recipe exists with specified id"));
    }

    replace_recipe_links(id, recipe, &mut tr).await?;

    tr.commit().await.map_err(QueryError::from)?;

    log::info!("Updated recipe {id}");
    Ok(())
}

/// Links, favorites and cart entries go with the recipe.
pub async fn delete_recipe(id: Uuid, pool: &Pool<Postgres>) -> Result<(), Error> {
    let deleted = sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    if deleted.rows_affected() == 0 {
        return Err(HtmlError::NotFound.new("No recipe exists with specified id"));
    }

    log::info!("Deleted recipe {id}");
    Ok(())
}

pub async fn count_recipes_by_authors(
    author_ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<HashMap<Uuid, i64>, Error> {
    if author_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<RecipeCount> = sqlx::query_as(
        "SELECT author_id, COUNT(*) AS count FROM recipes WHERE author_id = ANY($1) GROUP BY author_id",
    )
    .bind(author_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|r| (r.author_id, r.count)).collect())
}

/// Newest recipes of each author, at most `limit` per author when given.
pub async fn list_recipes_by_authors(
    author_ids: &[Uuid],
    limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<HashMap<Uuid, Vec<Recipe>>, Error> {
    if author_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let recipes: Vec<Recipe> = sqlx::query_as(
        "
        SELECT id, author_id, name, image, text, cooking_time, created_at
        FROM (
            SELECT r.*, ROW_NUMBER() OVER (PARTITION BY r.author_id ORDER BY r.created_at DESC, r.id DESC) AS position
            FROM recipes r
            WHERE r.author_id = ANY($1)
        ) ranked
        WHERE $2::BIGINT IS NULL OR position <= $2
        ORDER BY author_id, position
    ",
    )
    .bind(author_ids)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let mut grouped: HashMap<Uuid, Vec<Recipe>> = HashMap::new();
    for recipe in recipes {
        grouped.entry(recipe.author_id).or_default().push(recipe);
    }

    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_reads_repeated_tags() {
        let form =
            QueryForm::from_query("tags=breakfast&tags=lunch&author=3&is_favorited=1").unwrap();
        let filter = RecipeFilter::from_form(&form).unwrap();

        assert_eq!(filter.author, Some(3));
        assert_eq!(filter.tags, vec!["breakfast", "lunch"]);
        assert!(filter.is_favorited);
        assert!(!filter.is_in_shopping_cart);
        assert!(filter.needs_viewer());
    }

    #[test]
    fn filter_rejects_bad_author() {
        let form = QueryForm::from_query("author=me").unwrap();
        assert!(RecipeFilter::from_form(&form).is_err());
    }

    #[test]
    fn empty_filter() {
        let filter = RecipeFilter::from_form(&QueryForm::default()).unwrap();
        assert_eq!(filter, RecipeFilter::default());
        assert!(!filter.needs_viewer());
    }
}
