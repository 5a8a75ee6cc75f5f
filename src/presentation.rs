use std::collections::{HashMap, HashSet};

use serde::Serialize;
use sqlx::{Pool, Postgres};

use crate::{
    actions::{favorited_among, in_cart_among, subscribed_among},
    error::Error,
    jwt::SessionData,
    media::MediaStorage,
    schema::{Recipe, RecipeAggregate, RecipePart, Tag, UserRow, Uuid},
};

/// Join-row membership of the requesting viewer. Anonymous viewers get the
/// empty set for everything, so every flag reads `false`.
#[derive(Debug, Clone, Default)]
pub struct ViewerFlags {
    favorited: HashSet<Uuid>,
    in_cart: HashSet<Uuid>,
    subscribed: HashSet<Uuid>,
}

impl ViewerFlags {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub async fn load(
        viewer: Option<&SessionData>,
        recipe_ids: &[Uuid],
        author_ids: &[Uuid],
        pool: &Pool<Postgres>,
    ) -> Result<Self, Error> {
        let viewer = match viewer {
            Some(viewer) => viewer.user_id,
            None => return Ok(Self::anonymous()),
        };

        Ok(Self {
            favorited: favorited_among(viewer, recipe_ids, pool).await?,
            in_cart: in_cart_among(viewer, recipe_ids, pool).await?,
            subscribed: subscribed_among(viewer, author_ids, pool).await?,
        })
    }

    /// Flags for a page of recipes and their authors.
    pub async fn for_recipes(
        viewer: Option<&SessionData>,
        recipes: &[RecipeAggregate],
        pool: &Pool<Postgres>,
    ) -> Result<Self, Error> {
        let recipe_ids: Vec<Uuid> = recipes.iter().map(|r| r.recipe.id).collect();
        let author_ids: Vec<Uuid> = recipes.iter().map(|r| r.author.id).collect();
        Self::load(viewer, &recipe_ids, &author_ids, pool).await
    }

    pub async fn for_users(
        viewer: Option<&SessionData>,
        users: &[UserRow],
        pool: &Pool<Postgres>,
    ) -> Result<Self, Error> {
        let author_ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();
        Self::load(viewer, &[], &author_ids, pool).await
    }

    pub fn is_favorited(&self, recipe_id: Uuid) -> bool {
        self.favorited.contains(&recipe_id)
    }

    pub fn is_in_shopping_cart(&self, recipe_id: Uuid) -> bool {
        self.in_cart.contains(&recipe_id)
    }

    pub fn is_subscribed(&self, author_id: Uuid) -> bool {
        self.subscribed.contains(&author_id)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserView {
    pub email: String,
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

impl UserView {
    pub fn new(user: UserRow, flags: &ViewerFlags) -> Self {
        Self {
            is_subscribed: flags.is_subscribed(user.id),
            email: user.email,
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeIngredientView {
    pub id: Uuid,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

impl From<RecipePart> for RecipeIngredientView {
    fn from(value: RecipePart) -> Self {
        Self {
            id: value.ingredient_id,
            name: value.name,
            measurement_unit: value.measurement_unit,
            amount: value.amount,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeView {
    pub id: Uuid,
    pub tags: Vec<Tag>,
    pub author: UserView,
    pub ingredients: Vec<RecipeIngredientView>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

impl RecipeView {
    pub fn new(aggregate: RecipeAggregate, flags: &ViewerFlags, media: &MediaStorage) -> Self {
        let RecipeAggregate {
            recipe,
            author,
            tags,
            ingredients,
        } = aggregate;

        Self {
            id: recipe.id,
            tags,
            author: UserView::new(author, flags),
            ingredients: ingredients.into_iter().map(Into::into).collect(),
            is_favorited: flags.is_favorited(recipe.id),
            is_in_shopping_cart: flags.is_in_shopping_cart(recipe.id),
            name: recipe.name,
            image: media.url(&recipe.image),
            text: recipe.text,
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeShortView {
    pub id: Uuid,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl RecipeShortView {
    pub fn new(recipe: Recipe, media: &MediaStorage) -> Self {
        Self {
            id: recipe.id,
            image: media.url(&recipe.image),
            name: recipe.name,
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub user: UserView,
    pub recipes: Vec<RecipeShortView>,
    pub recipes_count: i64,
}

/// Builds subscription entries from authors plus their previewed recipes and counts.
pub fn subscription_views(
    authors: Vec<UserRow>,
    mut recipes: HashMap<Uuid, Vec<Recipe>>,
    counts: &HashMap<Uuid, i64>,
    flags: &ViewerFlags,
    media: &MediaStorage,
) -> Vec<SubscriptionView> {
    authors
        .into_iter()
        .map(|author| SubscriptionView {
            recipes: recipes
                .remove(&author.id)
                .unwrap_or_default()
                .into_iter()
                .map(|recipe| RecipeShortView::new(recipe, media))
                .collect(),
            recipes_count: counts.get(&author.id).copied().unwrap_or(0),
            user: UserView::new(author, flags),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sqlx::postgres::PgPoolOptions;

    use super::*;

    fn media() -> MediaStorage {
        MediaStorage::new("media".into(), String::from("/media/"))
    }

    fn author() -> UserRow {
        UserRow {
            id: 2,
            email: String::from("baker@example.com"),
            username: String::from("baker"),
            first_name: String::from("Bea"),
            last_name: String::from("Baker"),
            count: 1,
        }
    }

    fn recipe(id: Uuid) -> Recipe {
        Recipe {
            id,
            author_id: 2,
            name: String::from("Bread"),
            image: String::from("recipes/bread.png"),
            text: String::from("Knead."),
            cooking_time: 90,
            created_at: Utc::now(),
        }
    }

    fn aggregate() -> RecipeAggregate {
        RecipeAggregate {
            recipe: recipe(10),
            author: author(),
            tags: vec![Tag {
                id: 1,
                name: String::from("Breakfast"),
                color: String::from("#E26C2D"),
                slug: String::from("breakfast"),
            }],
            ingredients: vec![RecipePart {
                recipe_id: 10,
                ingredient_id: 4,
                name: String::from("flour"),
                measurement_unit: String::from("g"),
                amount: 500,
            }],
        }
    }

    #[test]
    fn anonymous_flags_are_false() {
        let view = RecipeView::new(aggregate(), &ViewerFlags::anonymous(), &media());

        assert!(!view.is_favorited);
        assert!(!view.is_in_shopping_cart);
        assert!(!view.author.is_subscribed);
        assert_eq!(view.image, "/media/recipes/bread.png");
        assert_eq!(view.ingredients[0].id, 4);
        assert_eq!(view.ingredients[0].amount, 500);
    }

    #[test]
    fn flags_follow_viewer_membership() {
        let flags = ViewerFlags {
            favorited: HashSet::from([10]),
            in_cart: HashSet::new(),
            subscribed: HashSet::from([2]),
        };
        let view = RecipeView::new(aggregate(), &flags, &media());

        assert!(view.is_favorited);
        assert!(!view.is_in_shopping_cart);
        assert!(view.author.is_subscribed);
    }

    #[tokio::test]
    async fn anonymous_viewer_skips_the_database() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://foodgram@localhost:1/foodgram")
            .unwrap();

        let flags = ViewerFlags::load(None, &[10], &[2], &pool).await.unwrap();
        assert!(!flags.is_favorited(10));
        assert!(!flags.is_subscribed(2));
    }

    #[test]
    fn subscription_flattens_user_fields() {
        let views = subscription_views(
            vec![author()],
            HashMap::from([(2, vec![recipe(10), recipe(11)])]),
            &HashMap::from([(2, 5)]),
            &ViewerFlags::anonymous(),
            &media(),
        );

        let json = serde_json::to_value(&views[0]).unwrap();
        assert_eq!(json["username"], "baker");
        assert_eq!(json["recipes_count"], 5);
        assert_eq!(json["recipes"].as_array().unwrap().len(), 2);
        assert_eq!(json["recipes"][0]["image"], "/media/recipes/bread.png");
    }
}
