use std::sync::Arc;

use serde_json::json;
use sqlx::{Pool, Postgres};
use warp::{
    http::StatusCode,
    path::FullPath,
    reject::Rejection,
    reply::{self, Reply},
};

use crate::{
    actions::{self, RecipeFilter},
    cache::cache::{Cache, CacheKeyType},
    config::Config,
    constants::{
        RECIPE_COUNT_PER_PAGE, SHOPPING_LIST_FILENAME, SUBSCRIPTION_COUNT_PER_PAGE,
        USER_COUNT_PER_PAGE,
    },
    error::{Error, HtmlError},
    form::{
        IngredientForm, LoginForm, QueryForm, RecipeForm, RegisterForm, SetPasswordForm, TagForm,
    },
    jwt::SessionData,
    media::MediaStorage,
    pagination::{PageContext, PageQuery},
    permissions::ActionType,
    presentation::{
        subscription_views, RecipeShortView, RecipeView, SubscriptionView, UserView, ViewerFlags,
    },
    schema::{Recipe, User, UserRow, Uuid},
    shopping_list::ShoppingList,
};

/// Everything a handler needs, cloned into every request.
#[derive(Clone)]
pub struct Context {
    pub pool: Pool<Postgres>,
    pub cache: Cache,
    pub media: MediaStorage,
    pub config: Arc<Config>,
    pub secret: Arc<str>,
}

impl Context {
    pub fn new(pool: Pool<Postgres>, cache: Cache, config: Config) -> Self {
        Self {
            media: MediaStorage::new(config.media_root.clone(), config.media_url.clone()),
            secret: Arc::from(config.secret_key.as_str()),
            config: Arc::new(config),
            pool,
            cache,
        }
    }
}

fn no_content() -> reply::Response {
    StatusCode::NO_CONTENT.into_response()
}

fn created<T: serde::Serialize>(value: &T) -> reply::Response {
    reply::with_status(reply::json(value), StatusCode::CREATED).into_response()
}

async fn invalidate_catalog(ctx: &Context) {
    if let Err(e) = ctx.cache.invalidate_catalog().await {
        log::warn!("Failed to invalidate catalog cache: {e}");
    }
}

async fn render_recipe(
    recipe: Recipe,
    viewer: Option<&SessionData>,
    ctx: &Context,
) -> Result<RecipeView, Error> {
    let aggregate = actions::load_recipe_aggregate(recipe, &ctx.pool).await?;
    let flags = ViewerFlags::for_recipes(viewer, std::slice::from_ref(&aggregate), &ctx.pool).await?;
    Ok(RecipeView::new(aggregate, &flags, &ctx.media))
}

async fn render_users(
    users: Vec<UserRow>,
    viewer: Option<&SessionData>,
    ctx: &Context,
) -> Result<Vec<UserView>, Error> {
    let flags = ViewerFlags::for_users(viewer, &users, &ctx.pool).await?;
    Ok(users.into_iter().map(|u| UserView::new(u, &flags)).collect())
}

async fn render_subscriptions(
    authors: Vec<UserRow>,
    recipes_limit: Option<i64>,
    viewer: &SessionData,
    ctx: &Context,
) -> Result<Vec<SubscriptionView>, Error> {
    let ids: Vec<Uuid> = authors.iter().map(|a| a.id).collect();
    let recipes = actions::list_recipes_by_authors(&ids, recipes_limit, &ctx.pool).await?;
    let counts = actions::count_recipes_by_authors(&ids, &ctx.pool).await?;
    let flags = ViewerFlags::for_users(Some(viewer), &authors, &ctx.pool).await?;

    Ok(subscription_views(authors, recipes, &counts, &flags, &ctx.media))
}

/// Invalid or negative limits leave the preview uncapped.
fn recipes_limit(form: &QueryForm) -> Option<i64> {
    form.get_number::<i64>("recipes_limit")
        .ok()
        .flatten()
        .filter(|limit| *limit >= 0)
}

// Tags

pub async fn list_tags(ctx: Context) -> Result<impl Reply, Rejection> {
    let tags = ctx
        .cache
        .get_or(CacheKeyType::TagList.new("all"), || actions::list_tags(&ctx.pool))
        .await?;

    Ok(reply::json(&tags))
}

pub async fn get_tag(id: Uuid, ctx: Context) -> Result<impl Reply, Rejection> {
    let tag = actions::get_tag(id, &ctx.pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No tag exists with specified id"))?;

    Ok(reply::json(&tag))
}

pub async fn create_tag(
    session: SessionData,
    form: TagForm,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageCatalog)?;
    let tag = form.validate()?;

    let tag = actions::create_tag(tag, &ctx.pool).await?;
    invalidate_catalog(&ctx).await;

    log::info!("{} created tag {}", session.username, tag.slug);
    Ok(created(&tag))
}

// Ingredients

pub async fn list_ingredients(raw: String, ctx: Context) -> Result<impl Reply, Rejection> {
    let form = QueryForm::from_query(&raw)?;
    let search = form.get_str("name").map(str::to_lowercase);

    let key = CacheKeyType::IngredientList.new(search.as_deref().unwrap_or(""));
    let ingredients = ctx
        .cache
        .get_or(key, || actions::list_ingredients(search.as_deref(), &ctx.pool))
        .await?;

    Ok(reply::json(&ingredients))
}

pub async fn get_ingredient(id: Uuid, ctx: Context) -> Result<impl Reply, Rejection> {
    let ingredient = actions::get_ingredient(id, &ctx.pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No ingredient exists with specified id"))?;

    Ok(reply::json(&ingredient))
}

pub async fn create_ingredient(
    session: SessionData,
    form: IngredientForm,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageCatalog)?;
    let ingredient = form.validate()?;

    let ingredient = actions::create_ingredient(ingredient, &ctx.pool).await?;
    invalidate_catalog(&ctx).await;

    Ok(created(&ingredient))
}

// Recipes

pub async fn list_recipes(
    raw: String,
    path: FullPath,
    session: Option<SessionData>,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    let form = QueryForm::from_query(&raw)?;
    let query = PageQuery::from_form(&form, RECIPE_COUNT_PER_PAGE)?;
    let filter = RecipeFilter::from_form(&form)?;

    let rows = actions::fetch_recipes(
        &filter,
        session.as_ref().map(|s| s.user_id),
        query,
        &ctx.pool,
    )
    .await?;
    let total = actions::total_count(&rows);

    let recipes: Vec<Recipe> = rows.into_iter().map(Recipe::from).collect();
    let aggregates = actions::load_recipe_aggregates(recipes, &ctx.pool).await?;
    let flags = ViewerFlags::for_recipes(session.as_ref(), &aggregates, &ctx.pool).await?;
    let results: Vec<RecipeView> = aggregates
        .into_iter()
        .map(|aggregate| RecipeView::new(aggregate, &flags, &ctx.media))
        .collect();

    let page = PageContext::from_rows(results, total, query, path.as_str(), &form)?;
    Ok(reply::json(&page))
}

pub async fn get_recipe(
    id: Uuid,
    session: Option<SessionData>,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    let recipe = actions::get_recipe_or_404(id, &ctx.pool).await?;
    let view = render_recipe(recipe, session.as_ref(), &ctx).await?;

    Ok(reply::json(&view))
}

pub async fn create_recipe(
    session: SessionData,
    form: RecipeForm,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnRecipes)?;
    let recipe = form.validate(true)?;

    let image = recipe
        .image
        .as_deref()
        .ok_or_else(|| Error::field("image", "This field is required"))?;
    let image = ctx.media.save_image(image).await?;

    let id = match actions::create_recipe(session.user_id, &recipe, &image, &ctx.pool).await {
        Ok(id) => id,
        Err(e) => {
            ctx.media.delete(&image).await;
            return Err(e.into());
        }
    };

    let recipe = actions::get_recipe_or_404(id, &ctx.pool).await?;
    let view = render_recipe(recipe, Some(&session), &ctx).await?;
    Ok(created(&view))
}

pub async fn update_recipe(
    id: Uuid,
    session: SessionData,
    form: RecipeForm,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    let current = actions::get_recipe_mut(id, &session, &ctx.pool).await?;
    let recipe = form.validate(false)?;

    let replaced = match recipe.image.as_deref() {
        Some(data) if !ctx.media.is_url_of(data, &current.image) => {
            Some(ctx.media.save_image(data).await?)
        }
        _ => None,
    };
    let image = replaced.as_deref().unwrap_or(&current.image);

    if let Err(e) = actions::update_recipe(id, &recipe, image, &ctx.pool).await {
        if let Some(path) = &replaced {
            ctx.media.delete(path).await;
        }
        return Err(e.into());
    }
    if replaced.is_some() {
        ctx.media.delete(&current.image).await;
    }

    let recipe = actions::get_recipe_or_404(id, &ctx.pool).await?;
    let view = render_recipe(recipe, Some(&session), &ctx).await?;
    Ok(reply::json(&view))
}

pub async fn delete_recipe(
    id: Uuid,
    session: SessionData,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    let recipe = actions::get_recipe_mut(id, &session, &ctx.pool).await?;

    actions::delete_recipe(recipe.id, &ctx.pool).await?;
    ctx.media.delete(&recipe.image).await;

    Ok(no_content())
}

pub async fn add_favorite(
    id: Uuid,
    session: SessionData,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnFavorites)?;
    let recipe = actions::add_favorite(id, session.user_id, &ctx.pool).await?;

    Ok(created(&RecipeShortView::new(recipe, &ctx.media)))
}

pub async fn remove_favorite(
    id: Uuid,
    session: SessionData,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnFavorites)?;
    actions::remove_favorite(id, session.user_id, &ctx.pool).await?;

    Ok(no_content())
}

pub async fn add_to_cart(
    id: Uuid,
    session: SessionData,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnCart)?;
    let recipe = actions::add_to_cart(id, session.user_id, &ctx.pool).await?;

    Ok(created(&RecipeShortView::new(recipe, &ctx.media)))
}

pub async fn remove_from_cart(
    id: Uuid,
    session: SessionData,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnCart)?;
    actions::remove_from_cart(id, session.user_id, &ctx.pool).await?;

    Ok(no_content())
}

pub async fn download_shopping_cart(
    session: SessionData,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnCart)?;
    let parts = actions::list_cart_parts(session.user_id, &ctx.pool).await?;
    let list = ShoppingList::from_parts(parts);

    let reply = reply::with_header(
        String::from(list),
        "content-type",
        "text/plain; charset=utf-8",
    );
    Ok(reply::with_header(
        reply,
        "content-disposition",
        format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""),
    ))
}

// Users

pub async fn register(form: RegisterForm, ctx: Context) -> Result<impl Reply, Rejection> {
    let registration = form.validate()?;
    let user = actions::register_user(registration, &ctx.pool).await?;

    Ok(created(&UserView::new(user.into(), &ViewerFlags::anonymous())))
}

pub async fn list_users(
    raw: String,
    path: FullPath,
    session: Option<SessionData>,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    let form = QueryForm::from_query(&raw)?;
    let query = PageQuery::from_form(&form, USER_COUNT_PER_PAGE)?;

    let rows = actions::fetch_users(query, &ctx.pool).await?;
    let total = actions::total_count(&rows);
    let users = render_users(rows, session.as_ref(), &ctx).await?;

    let page = PageContext::from_rows(users, total, query, path.as_str(), &form)?;
    Ok(reply::json(&page))
}

async fn render_user(
    user: User,
    viewer: Option<&SessionData>,
    ctx: &Context,
) -> Result<UserView, Error> {
    render_users(vec![user.into()], viewer, ctx)
        .await?
        .pop()
        .ok_or_else(|| HtmlError::InternalServerError.default())
}

pub async fn get_user(
    id: Uuid,
    session: Option<SessionData>,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    let user = actions::get_user(id, &ctx.pool).await?;
    let view = render_user(user, session.as_ref(), &ctx).await?;

    Ok(reply::json(&view))
}

pub async fn me(session: SessionData, ctx: Context) -> Result<impl Reply, Rejection> {
    let user = actions::get_user(session.user_id, &ctx.pool).await?;
    let view = render_user(user, Some(&session), &ctx).await?;

    Ok(reply::json(&view))
}

pub async fn set_password(
    session: SessionData,
    form: SetPasswordForm,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    let (current, new) = form.validate()?;
    actions::set_password(session.user_id, &current, &new, &ctx.pool).await?;

    Ok(no_content())
}

pub async fn login(form: LoginForm, ctx: Context) -> Result<impl Reply, Rejection> {
    let (email, password) = form.validate()?;
    let token = actions::login_user(
        &email,
        &password,
        ctx.secret.as_bytes(),
        ctx.config.session_lifetime(),
        &ctx.pool,
    )
    .await?;

    Ok(reply::json(&json!({ "auth_token": token })))
}

/// Tokens are stateless; logging out only confirms the token was valid.
pub async fn logout(session: SessionData) -> Result<impl Reply, Rejection> {
    log::debug!("{} logged out", session.username);
    Ok(no_content())
}

// Subscriptions

pub async fn list_subscriptions(
    session: SessionData,
    raw: String,
    path: FullPath,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    let form = QueryForm::from_query(&raw)?;
    let query = PageQuery::from_form(&form, SUBSCRIPTION_COUNT_PER_PAGE)?;

    let rows = actions::fetch_subscriptions(session.user_id, query, &ctx.pool).await?;
    let total = actions::total_count(&rows);
    let views = render_subscriptions(rows, recipes_limit(&form), &session, &ctx).await?;

    let page = PageContext::from_rows(views, total, query, path.as_str(), &form)?;
    Ok(reply::json(&page))
}

pub async fn subscribe(
    id: Uuid,
    session: SessionData,
    raw: String,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    let form = QueryForm::from_query(&raw)?;

    let author = actions::subscribe(session.user_id, id, &ctx.pool).await?;
    let view = render_subscriptions(vec![author.into()], recipes_limit(&form), &session, &ctx)
        .await?
        .pop()
        .ok_or_else(|| HtmlError::InternalServerError.default())?;

    Ok(created(&view))
}

pub async fn unsubscribe(
    id: Uuid,
    session: SessionData,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    actions::unsubscribe(session.user_id, id, &ctx.pool).await?;

    Ok(no_content())
}
