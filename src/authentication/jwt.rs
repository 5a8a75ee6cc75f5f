use chrono::Duration;
use chrono::Utc;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::database::schema::{User, UserRole, Uuid};
use crate::error::{Error, HtmlError};

use super::permissions::ActionType;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Uuid,
    pub username: String,
    pub role: UserRole,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Uuid, username: String, role: UserRole, lifetime: Duration) -> Self {
        let now = Utc::now();
        let iat = now.timestamp();
        let exp = (now + lifetime).timestamp();

        Self {
            user_id: id,
            username,
            role,
            iat,
            exp,
        }
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionData {
    pub user_id: Uuid,
    pub username: String,
    pub role: UserRole,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), Error> {
        if !action.authenticate(self) {
            return Err(HtmlError::Forbidden.default());
        }
        Ok(())
    }

    /// Owners may always act on their own rows, `other` actions need the role.
    pub fn authenticate_owner(
        &self,
        owner_id: Uuid,
        own: ActionType,
        other: ActionType,
    ) -> Result<(), Error> {
        self.authenticate(own)?;
        if owner_id == self.user_id {
            return Ok(());
        }
        self.authenticate(other)
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            username: value.username,
            user_id: value.user_id,
            role: value.role,
        }
    }
}

fn signing_key(secret: &[u8]) -> Result<Hmac<Sha256>, Error> {
    Hmac::new_from_slice(secret).map_err(|_| {
        log::error!("Invalid session signing key");
        HtmlError::InternalServerError.default()
    })
}

pub fn generate_jwt_session(user: &User, secret: &[u8], lifetime: Duration) -> Result<String, Error> {
    let key = signing_key(secret)?;
    let claims = JwtSessionData::new(user.id, user.username.to_owned(), user.role(), lifetime);

    claims.sign_with_key(&key).map_err(|e| {
        log::error!("Failed to sign session: {e}");
        HtmlError::InternalServerError.default()
    })
}

pub fn verify_jwt_session(token: &str, secret: &[u8]) -> Result<JwtSessionData, Error> {
    let key = signing_key(secret)?;

    let session: JwtSessionData = token
        .verify_with_key(&key)
        .map_err(|_| HtmlError::Unauthorized.new("Invalid token"))?;

    if session.exp < Utc::now().timestamp() {
        return Err(HtmlError::Unauthorized.new("Token expired"));
    }

    Ok(session)
}
