use std::convert::Infallible;

use serde::de::DeserializeOwned;
use warp::{filters::BoxedFilter, reject::Rejection, Filter, Reply};

use crate::{
    middleware::{with_possible_session, with_session},
    schema::Uuid,
};

use super::{
    handlers::{self, Context},
    recovery::handle_rejection,
};

/// Recipe payloads carry base64 images.
const MAX_BODY_SIZE: u64 = 10 * 1024 * 1024;

fn with_context(ctx: Context) -> impl Filter<Extract = (Context,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

/// The raw query string, empty when the request has none.
fn raw_query() -> impl Filter<Extract = (String,), Error = Rejection> + Clone {
    warp::query::raw().or_else(|_| async { Ok::<(String,), Rejection>((String::new(),)) })
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
{
    warp::body::content_length_limit(MAX_BODY_SIZE).and(warp::body::json())
}

fn tags(ctx: &Context) -> BoxedFilter<(impl Reply,)> {
    let list = warp::path!("tags")
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(handlers::list_tags);

    let detail = warp::path!("tags" / Uuid)
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(handlers::get_tag);

    let create = warp::path!("tags")
        .and(warp::post())
        .and(with_session(ctx.secret.clone()))
        .and(json_body())
        .and(with_context(ctx.clone()))
        .and_then(handlers::create_tag);

    list.or(detail).or(create).boxed()
}

fn ingredients(ctx: &Context) -> BoxedFilter<(impl Reply,)> {
    let list = warp::path!("ingredients")
        .and(warp::get())
        .and(raw_query())
        .and(with_context(ctx.clone()))
        .and_then(handlers::list_ingredients);

    let detail = warp::path!("ingredients" / Uuid)
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(handlers::get_ingredient);

    let create = warp::path!("ingredients")
        .and(warp::post())
        .and(with_session(ctx.secret.clone()))
        .and(json_body())
        .and(with_context(ctx.clone()))
        .and_then(handlers::create_ingredient);

    list.or(detail).or(create).boxed()
}

fn recipes(ctx: &Context) -> BoxedFilter<(impl Reply,)> {
    let session = || with_session(ctx.secret.clone());
    let possible_session = || with_possible_session(ctx.secret.clone());
    let context = || with_context(ctx.clone());

    // must be tried before `recipes/{id}`
    let download = warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(session())
        .and(context())
        .and_then(handlers::download_shopping_cart);

    let list = warp::path!("recipes")
        .and(warp::get())
        .and(raw_query())
        .and(warp::path::full())
        .and(possible_session())
        .and(context())
        .and_then(handlers::list_recipes);

    let create = warp::path!("recipes")
        .and(warp::post())
        .and(session())
        .and(json_body())
        .and(context())
        .and_then(handlers::create_recipe);

    let detail = warp::path!("recipes" / Uuid)
        .and(warp::get())
        .and(possible_session())
        .and(context())
        .and_then(handlers::get_recipe);

    let update = warp::path!("recipes" / Uuid)
        .and(warp::patch())
        .and(session())
        .and(json_body())
        .and(context())
        .and_then(handlers::update_recipe);

    let delete = warp::path!("recipes" / Uuid)
        .and(warp::delete())
        .and(session())
        .and(context())
        .and_then(handlers::delete_recipe);

    let add_favorite = warp::path!("recipes" / Uuid / "favorite")
        .and(warp::post())
        .and(session())
        .and(context())
        .and_then(handlers::add_favorite);

    let remove_favorite = warp::path!("recipes" / Uuid / "favorite")
        .and(warp::delete())
        .and(session())
        .and(context())
        .and_then(handlers::remove_favorite);

    let add_to_cart = warp::path!("recipes" / Uuid / "shopping_cart")
        .and(warp::post())
        .and(session())
        .and(context())
        .and_then(handlers::add_to_cart);

    let remove_from_cart = warp::path!("recipes" / Uuid / "shopping_cart")
        .and(warp::delete())
        .and(session())
        .and(context())
        .and_then(handlers::remove_from_cart);

    download
        .or(list)
        .or(create)
        .or(detail)
        .or(update)
        .or(delete)
        .or(add_favorite)
        .or(remove_favorite)
        .or(add_to_cart)
        .or(remove_from_cart)
        .boxed()
}

fn users(ctx: &Context) -> BoxedFilter<(impl Reply,)> {
    let session = || with_session(ctx.secret.clone());
    let possible_session = || with_possible_session(ctx.secret.clone());
    let context = || with_context(ctx.clone());

    let me = warp::path!("users" / "me")
        .and(warp::get())
        .and(session())
        .and(context())
        .and_then(handlers::me);

    let set_password = warp::path!("users" / "set_password")
        .and(warp::post())
        .and(session())
        .and(json_body())
        .and(context())
        .and_then(handlers::set_password);

    let subscriptions = warp::path!("users" / "subscriptions")
        .and(warp::get())
        .and(session())
        .and(raw_query())
        .and(warp::path::full())
        .and(context())
        .and_then(handlers::list_subscriptions);

    let subscribe = warp::path!("users" / Uuid / "subscribe")
        .and(warp::post())
        .and(session())
        .and(raw_query())
        .and(context())
        .and_then(handlers::subscribe);

    let unsubscribe = warp::path!("users" / Uuid / "subscribe")
        .and(warp::delete())
        .and(session())
        .and(context())
        .and_then(handlers::unsubscribe);

    let list = warp::path!("users")
        .and(warp::get())
        .and(raw_query())
        .and(warp::path::full())
        .and(possible_session())
        .and(context())
        .and_then(handlers::list_users);

    let register = warp::path!("users")
        .and(warp::post())
        .and(json_body())
        .and(context())
        .and_then(handlers::register);

    let detail = warp::path!("users" / Uuid)
        .and(warp::get())
        .and(possible_session())
        .and(context())
        .and_then(handlers::get_user);

    me.or(set_password)
        .or(subscriptions)
        .or(subscribe)
        .or(unsubscribe)
        .or(list)
        .or(register)
        .or(detail)
        .boxed()
}

fn auth(ctx: &Context) -> BoxedFilter<(impl Reply,)> {
    let login = warp::path!("auth" / "token" / "login")
        .and(warp::post())
        .and(json_body())
        .and(with_context(ctx.clone()))
        .and_then(handlers::login);

    let logout = warp::path!("auth" / "token" / "logout")
        .and(warp::post())
        .and(with_session(ctx.secret.clone()))
        .and_then(handlers::logout);

    login.or(logout).boxed()
}

/// Serves stored images under the path part of the media URL.
fn media(ctx: &Context) -> BoxedFilter<(impl Reply,)> {
    let prefix = ctx
        .config
        .media_url
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(warp::any().boxed(), |filter, segment| {
            filter.and(warp::path(segment.to_string())).boxed()
        });

    prefix
        .and(warp::get())
        .and(warp::fs::dir(ctx.config.media_root.clone()))
        .boxed()
}

/// The whole API under `/api`, plus media files, with every rejection
/// rendered as JSON.
pub fn routes(ctx: Context) -> BoxedFilter<(impl Reply,)> {
    let api = warp::path("api").and(
        tags(&ctx)
            .or(ingredients(&ctx))
            .or(recipes(&ctx))
            .or(users(&ctx))
            .or(auth(&ctx)),
    );

    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["authorization", "content-type"])
        .allow_methods(vec!["GET", "POST", "PATCH", "DELETE"]);

    api.or(media(&ctx))
        .recover(handle_rejection)
        .with(cors)
        .with(warp::log("foodgram::api"))
        .boxed()
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use sqlx::postgres::PgPoolOptions;
    use warp::http::StatusCode;

    use super::*;
    use crate::{
        cache::cache::Cache,
        config::Config,
        jwt::generate_jwt_session,
        schema::User,
    };

    const SECRET: &str = "routes-secret";

    // Every request below is answered before the database is reached.
    fn context() -> Context {
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some(String::from("postgres://foodgram@localhost:1/foodgram")),
            "SECRET_KEY" => Some(String::from(SECRET)),
            _ => None,
        })
        .unwrap();
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();

        Context::new(pool, Cache::disabled(), config)
    }

    fn token(id: Uuid, is_superuser: bool) -> String {
        let user = User {
            id,
            email: format!("user{id}@example.com"),
            username: format!("user{id}"),
            first_name: String::new(),
            last_name: String::new(),
            password: String::new(),
            is_superuser,
        };
        let token =
            generate_jwt_session(&user, SECRET.as_bytes(), chrono::Duration::hours(1)).unwrap();
        format!("Token {token}")
    }

    fn body(res: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    fn recipe_payload(amount: i32) -> Value {
        json!({
            "ingredients": [{ "id": 1, "amount": amount }],
            "tags": [1],
            "image": "data:image/png;base64,iVBORw0KGgo=",
            "name": "Pancakes",
            "text": "Mix and fry.",
            "cooking_time": 20,
        })
    }

    #[tokio::test]
    async fn me_requires_authentication() {
        let res = warp::test::request()
            .method("GET")
            .path("/api/users/me")
            .reply(&routes(context()))
            .await;

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(body(&res)["detail"].is_string());
    }

    #[tokio::test]
    async fn huge_page_is_not_found() {
        let res = warp::test::request()
            .method("GET")
            .path("/api/users?page=9223372036854775807&limit=100")
            .reply(&routes(context()))
            .await;

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(&res)["detail"], "Invalid page");
    }

    #[tokio::test]
    async fn invalid_token_is_rejected() {
        let res = warp::test::request()
            .method("POST")
            .path("/api/auth/token/logout")
            .header("authorization", "Token forged")
            .reply(&routes(context()))
            .await;

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_with_valid_token() {
        let res = warp::test::request()
            .method("POST")
            .path("/api/auth/token/logout")
            .header("authorization", token(4, false))
            .reply(&routes(context()))
            .await;

        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn anonymous_recipe_writes_are_unauthorized() {
        let res = warp::test::request()
            .method("POST")
            .path("/api/recipes/")
            .json(&recipe_payload(1))
            .reply(&routes(context()))
            .await;

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        let res = warp::test::request()
            .method("POST")
            .path("/api/recipes")
            .header("authorization", token(4, false))
            .json(&recipe_payload(0))
            .reply(&routes(context()))
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body(&res)["ingredients"].is_array());
    }

    #[tokio::test]
    async fn repeated_ingredients_are_rejected() {
        let mut payload = recipe_payload(2);
        payload["ingredients"] = json!([{ "id": 1, "amount": 2 }, { "id": 1, "amount": 3 }]);

        let res = warp::test::request()
            .method("POST")
            .path("/api/recipes")
            .header("authorization", token(4, false))
            .json(&payload)
            .reply(&routes(context()))
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body(&res)["ingredients"].is_array());
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let res = warp::test::request()
            .method("POST")
            .path("/api/recipes")
            .header("authorization", token(4, false))
            .header("content-type", "application/json")
            .body("{not json")
            .reply(&routes(context()))
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn self_subscription_is_rejected() {
        let res = warp::test::request()
            .method("POST")
            .path("/api/users/5/subscribe")
            .header("authorization", token(5, false))
            .reply(&routes(context()))
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&res)["detail"], "You cannot subscribe to yourself");
    }

    #[tokio::test]
    async fn catalog_writes_need_admin() {
        let res = warp::test::request()
            .method("POST")
            .path("/api/tags")
            .header("authorization", token(4, false))
            .json(&json!({ "name": "Lunch", "color": "#49B64E", "slug": "lunch" }))
            .reply(&routes(context()))
            .await;

        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let res = warp::test::request()
            .method("GET")
            .path("/api/nothing/here")
            .reply(&routes(context()))
            .await;

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(&res)["detail"], "Not found");
    }

    #[tokio::test]
    async fn registration_is_validated_first() {
        let res = warp::test::request()
            .method("POST")
            .path("/api/users")
            .json(&json!({ "email": "nope", "username": "bad name!", "password": "123" }))
            .reply(&routes(context()))
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body(&res);
        assert!(body["email"].is_array());
        assert!(body["username"].is_array());
        assert!(body["first_name"].is_array());
    }
}
