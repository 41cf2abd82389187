use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_days: i64,
    pub dify_api_url: String,
    pub dify_api_key: String,
    pub tts_api_url: Option<String>,
    pub uploads_dir: String,
    pub max_upload_bytes: usize,
    pub api_rps: u32,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            jwt_secret: get_env("JWT_SECRET")?,
            access_token_expire_minutes: get_env_parse_or("ACCESS_TOKEN_EXPIRE_MINUTES", 30)?,
            refresh_token_expire_days: get_env_parse_or("REFRESH_TOKEN_EXPIRE_DAYS", 7)?,
            dify_api_url: parse_url(
                "DIFY_API_URL",
                &env::var("DIFY_API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            )?,
            dify_api_key: env::var("DIFY_API_KEY").unwrap_or_default(),
            tts_api_url: env::var("TTS_API_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| parse_url("TTS_API_URL", &v))
                .transpose()?,
            uploads_dir: env::var("UPLOADS_DIR").unwrap_or_else(|_| "uploads".to_string()),
            max_upload_bytes: get_env_parse_or("MAX_UPLOAD_BYTES", 50 * 1024 * 1024)?,
            api_rps: get_env_parse_or("API_RPS", 100)?,
        })
    }

    /// Settings for tests and embedding; only the three required values are taken.
    pub fn with_defaults(server_address: &str, database_url: &str, jwt_secret: &str) -> Self {
        Self {
            server_address: server_address.to_string(),
            database_url: database_url.to_string(),
            jwt_secret: jwt_secret.to_string(),
            access_token_expire_minutes: 30,
            refresh_token_expire_days: 7,
            dify_api_url: "http://localhost:8080".to_string(),
            dify_api_key: String::new(),
            tts_api_url: None,
            uploads_dir: "uploads".to_string(),
            max_upload_bytes: 50 * 1024 * 1024,
            api_rps: 100,
        }
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

/// Upstream base URLs are stored without a trailing slash.
fn parse_url(name: &str, raw: &str) -> Result<String> {
    let parsed = Url::parse(raw.trim())
        .map_err(|e| Error::Config(format!("Invalid URL in {}: {}", name, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::Config(format!("{} must be an http(s) URL", name)));
    }
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
