use sqlx::PgPool;

use crate::dto::auth_dto::{RegisterPayload, TokenResponse};
use crate::error::{Error, Result};
use crate::models::user::User;
use crate::utils::crypto::{hash_password, verify_password};
use crate::utils::token::{JwtKeys, TokenKind};

const USER_COLUMNS: &str =
    "id, username, email, hashed_password, is_active, is_admin, created_at, updated_at";

#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    jwt: JwtKeys,
}

impl AuthService {
    pub fn new(pool: PgPool, jwt: JwtKeys) -> Self {
        Self { pool, jwt }
    }

    pub async fn register(&self, payload: RegisterPayload) -> Result<User> {
        let username_taken = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE username = $1")
            .bind(&payload.username)
            .fetch_optional(&self.pool)
            .await?;
        if username_taken.is_some() {
            return Err(Error::BadRequest("Username already registered".to_string()));
        }

        let email_taken = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = $1")
            .bind(&payload.email)
            .fetch_optional(&self.pool)
            .await?;
        if email_taken.is_some() {
            return Err(Error::BadRequest("Email already registered".to_string()));
        }

        let hashed = hash_password(&payload.password)?;
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, hashed_password) VALUES ($1, $2, $3) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&payload.username)
        .bind(&payload.email)
        .bind(hashed)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id = user.id, "registered user {}", user.username);
        Ok(user)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenResponse> {
        let user = self.find_by_username(username).await?;
        let Some(user) = user.filter(|u| verify_password(password, &u.hashed_password)) else {
            tracing::info!("failed login for {}", username);
            return Err(Error::Unauthorized(
                "Incorrect username or password".to_string(),
            ));
        };
        if !user.is_active {
            return Err(Error::BadRequest("Inactive user".to_string()));
        }
        self.jwt.issue_pair(&user)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        let claims = self
            .jwt
            .verify(refresh_token, TokenKind::Refresh)
            .map_err(|_| Error::Unauthorized("Invalid refresh token".to_string()))?;

        let user = self
            .find_by_username(&claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| Error::Unauthorized("User not found or inactive".to_string()))?;

        self.jwt.issue_pair(&user)
    }

    pub async fn get_active_user(&self, id: i64) -> Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::Unauthorized("Could not validate credentials".to_string()))?;

        if !user.is_active {
            return Err(Error::BadRequest("Inactive user".to_string()));
        }
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}
