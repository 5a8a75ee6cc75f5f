use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Uuid = i32;

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Eq, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

impl From<bool> for UserRole {
    fn from(is_superuser: bool) -> Self {
        if is_superuser {
            Self::Admin
        } else {
            Self::User
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub is_superuser: bool,
}

impl User {
    pub fn role(&self) -> UserRole {
        self.is_superuser.into()
    }
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,

    pub count: i64,
}

impl From<User> for UserRow {
    fn from(value: User) -> Self {
        Self {
            id: value.id,
            email: value.email,
            username: value.username,
            first_name: value.first_name,
            last_name: value.last_name,
            count: 1,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub slug: String,
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: Uuid,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct Recipe {
    pub id: Uuid,
    pub author_id: Uuid,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct RecipeRow {
    pub id: Uuid,
    pub author_id: Uuid,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
    pub created_at: DateTime<Utc>,

    pub count: i64,
}

impl From<RecipeRow> for Recipe {
    fn from(value: RecipeRow) -> Self {
        Self {
            id: value.id,
            author_id: value.author_id,
            name: value.name,
            image: value.image,
            text: value.text,
            cooking_time: value.cooking_time,
            created_at: value.created_at,
        }
    }
}

/// One ingredient line of a recipe, joined with the catalog entry.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize)]
pub struct RecipePart {
    pub recipe_id: Uuid,
    pub ingredient_id: Uuid,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize)]
pub struct LinkedRecipeTag {
    pub recipe_id: Uuid,
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl From<LinkedRecipeTag> for Tag {
    fn from(value: LinkedRecipeTag) -> Self {
        Self {
            id: value.id,
            name: value.name,
            color: value.color,
            slug: value.slug,
        }
    }
}

/// Ingredient totals summed over a user's cart.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

#[derive(sqlx::FromRow, Debug, Clone, Copy, PartialEq)]
pub struct RecipeCount {
    pub author_id: Uuid,
    pub count: i64,
}

/// A recipe with everything its representation needs, independent of who asks.
#[derive(Debug, Clone)]
pub struct RecipeAggregate {
    pub recipe: Recipe,
    pub author: UserRow,
    pub tags: Vec<Tag>,
    pub ingredients: Vec<RecipePart>,
}
