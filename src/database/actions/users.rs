use std::collections::HashMap;

use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::generate_jwt_session,
    },
    error::{Error, HtmlError, QueryError, Validator},
    form::ValidRegistration,
    pagination::PageQuery,
    schema::{User, UserRow, Uuid},
};

use sqlx::{Pool, Postgres};

const USER_ROW_COLUMNS: &str =
    "u.id, u.email, u.username, u.first_name, u.last_name, COUNT(*) OVER() AS count";

pub async fn get_user_by_email(
    email: &str,
    pool: &Pool<Postgres>,
) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_user_by_id(user_id: Uuid, pool: &Pool<Postgres>) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_user(user_id: Uuid, pool: &Pool<Postgres>) -> Result<User, Error> {
    get_user_by_id(user_id, pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No user exists with specified id"))
}

pub async fn get_users_by_ids(
    ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<HashMap<Uuid, UserRow>, Error> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<UserRow> = sqlx::query_as(&format!(
        "SELECT {USER_ROW_COLUMNS} FROM users u WHERE u.id = ANY($1)"
    ))
    .bind(ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|row| (row.id, row)).collect())
}

pub async fn fetch_users(
    query: PageQuery,
    pool: &Pool<Postgres>,
) -> Result<Vec<UserRow>, Error> {
    let rows: Vec<UserRow> = sqlx::query_as(&format!(
        "SELECT {USER_ROW_COLUMNS} FROM users u ORDER BY u.id DESC LIMIT $1 OFFSET $2"
    ))
    .bind(query.limit)
    .bind(query.offset())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

/// Creates a user; the password is hashed before it reaches the database.
pub async fn register_user(
    registration: ValidRegistration,
    pool: &Pool<Postgres>,
) -> Result<User, Error> {
    let taken: Vec<(String, String)> = sqlx::query_as(
        "SELECT email, username FROM users WHERE LOWER(email) = LOWER($1) OR username = $2",
    )
    .bind(&registration.email)
    .bind(&registration.username)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let mut v = Validator::new();
    for (email, username) in taken.iter() {
        if email.eq_ignore_ascii_case(&registration.email) {
            v.add("email", "A user with that email already exists");
        }
        if username == &registration.username {
            v.add("username", "A user with that username already exists");
        }
    }
    v.finish()?;

    let password = hash_password(&registration.password).map_err(|e| {
        log::error!("Failed to hash password: {e}");
        HtmlError::InternalServerError.default()
    })?;

    // a concurrent registration still trips the unique constraints
    let user: User = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *;
    ",
    )
    .bind(&registration.email)
    .bind(&registration.username)
    .bind(&registration.first_name)
    .bind(&registration.last_name)
    .bind(password)
    .fetch_one(pool)
    .await
    .map_err(QueryError::from)?;

    log::info!("Registered user {} ({})", user.username, user.id);
    Ok(user)
}

pub async fn login_user(
    email: &str,
    password: &str,
    secret: &[u8],
    lifetime: chrono::Duration,
    pool: &Pool<Postgres>,
) -> Result<String, Error> {
    let invalid = || HtmlError::InvalidRequest.new("Unable to log in with provided credentials");

    let user = get_user_by_email(email, pool).await?.ok_or_else(invalid)?;

    let authenticated = verify_password(password, &user.password).map_err(|e| {
        log::error!("Stored password hash for user {} is malformed: {e}", user.id);
        invalid()
    })?;
    if !authenticated {
        return Err(invalid());
    }

    generate_jwt_session(&user, secret, lifetime)
}

pub async fn set_password(
    user_id: Uuid,
    current_password: &str,
    new_password: &str,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let user = get_user(user_id, pool).await?;

    let matches = verify_password(current_password, &user.password).unwrap_or(false);
    if !matches {
        return Err(Error::field("current_password", "Invalid password"));
    }

    let password = hash_password(new_password).map_err(|e| {
        log::error!("Failed to hash password: {e}");
        HtmlError::InternalServerError.default()
    })?;

    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(password)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}
