use std::convert::Infallible;

use serde_json::{json, Value};
use warp::{
    body::BodyDeserializeError,
    http::StatusCode,
    reject::{
        InvalidQuery, MethodNotAllowed, MissingHeader, PayloadTooLarge, Rejection,
        UnsupportedMediaType,
    },
    Reply,
};

use crate::error::Error;

fn detail(message: &str) -> Value {
    json!({ "detail": message })
}

/// Maps a rejection to its status and JSON body. Field errors are returned
/// keyed by field, every other error as `{"detail": ...}`.
pub fn rejection_body(err: &Rejection) -> (StatusCode, Value) {
    if let Some(e) = err.find::<Error>() {
        let body = match &e.fields {
            Some(fields) => json!(fields),
            None => detail(&e.info),
        };
        return (e.status(), body);
    }

    if err.is_not_found() {
        (StatusCode::NOT_FOUND, detail("Not found"))
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, detail(&e.to_string()))
    } else if err.find::<InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, detail("Malformed query string"))
    } else if let Some(e) = err.find::<MissingHeader>() {
        (StatusCode::BAD_REQUEST, detail(&e.to_string()))
    } else if err.find::<UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            detail("Unsupported media type"),
        )
    } else if err.find::<PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, detail("Request body is too large"))
    } else if err.find::<MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, detail("Method not allowed"))
    } else {
        log::error!("Unhandled rejection: {err:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            detail("Internal server error"),
        )
    }
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, body) = rejection_body(&err);
    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HtmlError;

    #[test]
    fn field_errors_are_keyed_by_field() {
        let rejection: Rejection = Error::field("ingredients", "Amount must be at least 1").into();
        let (status, body) = rejection_body(&rejection);

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ingredients"][0], "Amount must be at least 1");
    }

    #[test]
    fn other_errors_carry_detail() {
        let rejection: Rejection = HtmlError::Forbidden.new("Not yours").into();
        let (status, body) = rejection_body(&rejection);

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({ "detail": "Not yours" }));
    }

    #[test]
    fn unmatched_routes_are_not_found() {
        let (status, body) = rejection_body(&warp::reject::not_found());

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Not found");
    }
}
