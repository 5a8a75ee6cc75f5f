use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use serde::Serialize;
use warp::{http::StatusCode, reject};

/// Field name -> messages, serialized as-is into 400 responses.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HtmlError {
    InvalidRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    InternalServerError,
}

impl HtmlError {
    pub fn status(&self) -> StatusCode {
        match self {
            HtmlError::InvalidRequest => StatusCode::BAD_REQUEST,
            HtmlError::Unauthorized => StatusCode::UNAUTHORIZED,
            HtmlError::Forbidden => StatusCode::FORBIDDEN,
            HtmlError::NotFound => StatusCode::NOT_FOUND,
            // clients of this API expect duplicate joins as a plain 400
            HtmlError::Conflict => StatusCode::BAD_REQUEST,
            HtmlError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn new(self, info: &str) -> Error {
        Error {
            kind: self,
            info: info.to_string(),
            fields: None,
        }
    }

    pub fn default(self) -> Error {
        let info = match self {
            HtmlError::InvalidRequest => "Invalid request",
            HtmlError::Unauthorized => "Authentication credentials were not provided",
            HtmlError::Forbidden => "You don't have permission to perform this action",
            HtmlError::NotFound => "Not found",
            HtmlError::Conflict => "Already exists",
            HtmlError::InternalServerError => "Internal server error",
        };

        self.new(info)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{kind:?}: {info}")]
pub struct Error {
    pub kind: HtmlError,
    pub info: String,
    pub fields: Option<FieldErrors>,
}

impl Error {
    pub fn validation(fields: FieldErrors) -> Self {
        Self {
            kind: HtmlError::InvalidRequest,
            info: String::from("Validation failed"),
            fields: Some(fields),
        }
    }

    pub fn field(field: &str, message: &str) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.to_string(), vec![message.to_string()]);
        Self::validation(fields)
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }
}

impl reject::Reject for Error {}

/// Collects field-scoped messages so a payload reports every problem at once.
#[derive(Debug, Default)]
pub struct Validator {
    fields: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn check(&mut self, condition: bool, field: &str, message: &str) {
        if !condition {
            self.add(field, message);
        }
    }

    pub fn finish(self) -> Result<(), Error> {
        if self.fields.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(self.fields))
        }
    }
}

pub struct QueryError {
    kind: HtmlError,
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self {
            kind: HtmlError::InternalServerError,
            info,
        }
    }
}

const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => Self {
                kind: HtmlError::NotFound,
                info: String::from("Not found"),
            },
            sqlx::Error::Database(e) => {
                if e.code().as_deref() == Some(UNIQUE_VIOLATION) {
                    Self {
                        kind: HtmlError::Conflict,
                        info: String::from("Already exists"),
                    }
                } else {
                    Self::new(format!("{e}"))
                }
            }
            sqlx::Error::PoolTimedOut => Self::new(String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(String::from("Pool closed")),
            e => Self::new(format!("{e}")),
        }
    }
}

impl From<QueryError> for Error {
    fn from(value: QueryError) -> Self {
        if value.kind == HtmlError::InternalServerError {
            log::error!("Query failed: {}", value.info);
            return HtmlError::InternalServerError.default();
        }
        value.kind.new(&value.info)
    }
}

impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        QueryError::from(value).into()
    }
}

pub struct CacheError {
    info: String,
}

impl From<redis::RedisError> for CacheError {
    fn from(value: redis::RedisError) -> Self {
        Self {
            info: format!("{:?} - {:?}", value.code(), value.detail()),
        }
    }
}

impl CacheError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<CacheError> for Error {
    fn from(value: CacheError) -> Self {
        log::error!("Cache failed: {}", value.info);
        HtmlError::InternalServerError.default()
    }
}

#[derive(Debug)]
pub struct TypeError {
    info: String,
}

impl TypeError {
    pub fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
        }
    }
}

impl From<TypeError> for Error {
    fn from(value: TypeError) -> Self {
        HtmlError::InvalidRequest.new(&value.info)
    }
}

impl Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.info)
    }
}

impl std::error::Error for TypeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(HtmlError::InvalidRequest, StatusCode::BAD_REQUEST)]
    #[case(HtmlError::Unauthorized, StatusCode::UNAUTHORIZED)]
    #[case(HtmlError::Forbidden, StatusCode::FORBIDDEN)]
    #[case(HtmlError::NotFound, StatusCode::NOT_FOUND)]
    #[case(HtmlError::Conflict, StatusCode::BAD_REQUEST)]
    #[case(HtmlError::InternalServerError, StatusCode::INTERNAL_SERVER_ERROR)]
    fn kinds_map_to_status(#[case] kind: HtmlError, #[case] status: StatusCode) {
        assert_eq!(kind.new("x").status(), status);
    }

    #[test]
    fn validator_collects_every_field() {
        let mut v = Validator::new();
        v.check(false, "cooking_time", "too small");
        v.check(true, "name", "unused");
        v.add("ingredients", "first");
        v.add("ingredients", "second");

        let err = v.finish().unwrap_err();
        let fields = err.fields.unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["ingredients"], vec!["first", "second"]);
        assert!(!fields.contains_key("name"));
    }

    #[test]
    fn empty_validator_passes() {
        assert!(Validator::new().finish().is_ok());
    }

    #[test]
    fn row_not_found_becomes_not_found() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind, HtmlError::NotFound);
    }

    #[test]
    fn internal_errors_hide_details() {
        let err: Error = QueryError::new(String::from("password=hunter2")).into();
        assert_eq!(err.kind, HtmlError::InternalServerError);
        assert!(!err.info.contains("hunter2"));
    }
}
