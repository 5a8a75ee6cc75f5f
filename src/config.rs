use std::{env, fmt::Display, net::IpAddr, path::PathBuf, str::FromStr};

use crate::error::{Error, HtmlError};

const DEFAULT_SECRET: &str = "secret";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub secret_key: String,
    pub host: IpAddr,
    pub port: u16,
    pub media_root: PathBuf,
    pub media_url: String,
    pub session_hours: i64,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `load` reads the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| HtmlError::InternalServerError.new("DATABASE_URL is not set"))?;

        let redis_url = lookup("REDIS_URL").filter(|url| !url.is_empty());
        if redis_url.is_none() {
            log::info!("REDIS_URL not set, catalog caching disabled");
        }

        let secret_key = lookup("SECRET_KEY").unwrap_or_else(|| {
            log::warn!("SECRET_KEY not set, using an insecure default");
            DEFAULT_SECRET.to_string()
        });

        let mut media_url: String = try_load(&lookup, "MEDIA_URL", "/media/")?;
        if !media_url.ends_with('/') {
            media_url.push('/');
        }

        Ok(Self {
            database_url,
            redis_url,
            secret_key,
            host: try_load(&lookup, "HOST", "0.0.0.0")?,
            port: try_load(&lookup, "PORT", "8000")?,
            media_root: try_load(&lookup, "MEDIA_ROOT", "media")?,
            media_url,
            session_hours: try_load(&lookup, "SESSION_HOURS", "24")?,
        })
    }

    pub fn session_lifetime(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_hours)
    }
}

fn try_load<F, T>(lookup: &F, key: &str, default: &str) -> Result<T, Error>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            log::info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            log::warn!("Invalid {key} value: {e}");
            HtmlError::InternalServerError.new(&format!("Invalid {key} value"))
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_fill_the_gaps() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://db/food")])).unwrap();

        assert_eq!(config.port, 8000);
        assert_eq!(config.media_url, "/media/");
        assert_eq!(config.media_root, PathBuf::from("media"));
        assert_eq!(config.session_hours, 24);
        assert_eq!(config.secret_key, DEFAULT_SECRET);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn database_url_is_required() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn malformed_port_is_an_error() {
        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/food"),
            ("PORT", "eighty"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn media_url_gets_a_trailing_slash() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/food"),
            ("MEDIA_URL", "https://cdn.example.com/media"),
            ("REDIS_URL", "redis://cache"),
        ]))
        .unwrap();

        assert_eq!(config.media_url, "https://cdn.example.com/media/");
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache"));
    }
}
