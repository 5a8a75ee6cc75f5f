use std::sync::Arc;

use warp::{reject::Rejection, Filter};

use super::jwt::{verify_jwt_session, SessionData};
use crate::error::HtmlError;

const TOKEN_SCHEMES: &[&str] = &["Token ", "Bearer "];

/// Strips the auth scheme from an `Authorization` header value.
pub fn parse_authorization(header: &str) -> Option<&str> {
    TOKEN_SCHEMES
        .iter()
        .find_map(|scheme| header.strip_prefix(scheme))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn authorize(header: Option<String>, secret: &[u8]) -> Result<Option<SessionData>, Rejection> {
    let header = match header {
        Some(header) => header,
        None => return Ok(None),
    };

    let token = parse_authorization(&header)
        .ok_or_else(|| HtmlError::Unauthorized.new("Invalid token header"))?;
    let session = verify_jwt_session(token, secret)?;

    Ok(Some(session.into()))
}

/// Requires a valid session token.
pub fn with_session(
    secret: Arc<str>,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let secret = secret.clone();
        async move {
            authorize(header, secret.as_bytes())?.ok_or_else(|| {
                Rejection::from(
                    HtmlError::Unauthorized.new("Authentication credentials were not provided"),
                )
            })
        }
    })
}

/// Anonymous callers pass through as `None`; a malformed or expired token
/// is still rejected.
pub fn with_possible_session(
    secret: Arc<str>,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let secret = secret.clone();
        async move { authorize(header, secret.as_bytes()) }
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{authentication::jwt::generate_jwt_session, schema::User};

    const SECRET: &str = "middleware-secret";

    fn token() -> String {
        let user = User {
            id: 3,
            email: String::from("chef@example.com"),
            username: String::from("chef"),
            first_name: String::new(),
            last_name: String::new(),
            password: String::new(),
            is_superuser: false,
        };
        generate_jwt_session(&user, SECRET.as_bytes(), chrono::Duration::hours(1)).unwrap()
    }

    #[rstest]
    #[case("Token abc", Some("abc"))]
    #[case("Bearer abc", Some("abc"))]
    #[case("Basic abc", None)]
    #[case("Token ", None)]
    #[case("abc", None)]
    fn authorization_schemes(#[case] header: &str, #[case] expected: Option<&str>) {
        assert_eq!(parse_authorization(header), expected);
    }

    #[tokio::test]
    async fn session_from_header() {
        let filter = with_session(Arc::from(SECRET));
        let session = warp::test::request()
            .header("authorization", format!("Token {}", token()))
            .filter(&filter)
            .await
            .unwrap();

        assert_eq!(session.user_id, 3);
        assert_eq!(session.username, "chef");
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let filter = with_session(Arc::from(SECRET));
        assert!(warp::test::request().filter(&filter).await.is_err());
    }

    #[tokio::test]
    async fn anonymous_session_is_none() {
        let filter = with_possible_session(Arc::from(SECRET));
        let session = warp::test::request().filter(&filter).await.unwrap();
        assert!(session.is_none());

        let bad = warp::test::request()
            .header("authorization", "Token not-a-jwt")
            .filter(&filter)
            .await;
        assert!(bad.is_err());
    }
}
