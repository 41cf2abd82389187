use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::dto::auth_dto::TokenResponse;
use crate::error::{Error, Result};
use crate::models::user::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub uid: i64,
    pub role: String,
    pub token_type: TokenKind,
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case("admin")
    }
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, access_minutes: i64, refresh_days: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl: Duration::minutes(access_minutes),
            refresh_ttl: Duration::days(refresh_days),
        }
    }

    pub fn issue(&self, user: &User, kind: TokenKind) -> Result<String> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user.username.clone(),
            uid: user.id,
            role: user.role().to_string(),
            token_type: kind,
            exp: (Utc::now() + ttl).timestamp().max(0) as usize,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn issue_pair(&self, user: &User) -> Result<TokenResponse> {
        Ok(TokenResponse {
            access_token: self.issue(user, TokenKind::Access)?,
            refresh_token: self.issue(user, TokenKind::Refresh)?,
            token_type: "bearer".to_string(),
        })
    }

    /// Decodes and checks expiry; a token of the other kind is rejected.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        if data.claims.token_type != expected {
            return Err(Error::Unauthorized("Invalid token type".to_string()));
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 7,
            username: "alice".into(),
            email: "alice@example.com".into(),
            hashed_password: String::new(),
            is_active: true,
            is_admin: false,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn pair_round_trips_with_kinds() {
        let keys = JwtKeys::new("secret", 30, 7);
        let pair = keys.issue_pair(&user()).unwrap();
        assert_eq!(pair.token_type, "bearer");

        let access = keys.verify(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(access.uid, 7);
        assert_eq!(access.sub, "alice");
        assert_eq!(access.role, "user");

        let refresh = keys.verify(&pair.refresh_token, TokenKind::Refresh).unwrap();
        assert_eq!(refresh.token_type, TokenKind::Refresh);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let keys = JwtKeys::new("secret", 30, 7);
        let refresh = keys.issue(&user(), TokenKind::Refresh).unwrap();
        let err = keys.verify(&refresh, TokenKind::Access).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = JwtKeys::new("secret", -5, 7);
        let access = keys.issue(&user(), TokenKind::Access).unwrap();
        assert!(matches!(
            keys.verify(&access, TokenKind::Access),
            Err(Error::Jwt(_))
        ));
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let ours = JwtKeys::new("secret", 30, 7);
        let theirs = JwtKeys::new("other", 30, 7);
        let access = theirs.issue(&user(), TokenKind::Access).unwrap();
        assert!(ours.verify(&access, TokenKind::Access).is_err());
    }
}
