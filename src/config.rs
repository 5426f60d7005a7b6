use std::{env, time::Duration};

use chrono::{FixedOffset, Local};
use url::Url;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SQLITE_URL: &str = "sqlite://./data/spa.db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    Rest {
        project_url: Url,
        api_key: String,
        timeout: Option<Duration>,
    },
    Sqlite {
        database_url: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub backend: StoreBackend,
    pub admin_user: String,
    pub admin_password: String,
    pub display_offset: FixedOffset,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let port = match get("PORT") {
            Some(value) => value.parse().map_err(|err: std::num::ParseIntError| {
                ConfigError::Invalid {
                    key: "PORT",
                    value,
                    reason: err.to_string(),
                }
            })?,
            None => DEFAULT_PORT,
        };

        let backend = match get("STORE_BACKEND").as_deref().unwrap_or("rest") {
            "rest" => {
                let raw_url = get("SUPABASE_URL").ok_or(ConfigError::Missing("SUPABASE_URL"))?;
                let project_url =
                    Url::parse(&normalize_url(&raw_url)).map_err(|err| ConfigError::Invalid {
                        key: "SUPABASE_URL",
                        value: raw_url.clone(),
                        reason: err.to_string(),
                    })?;
                let api_key =
                    get("SUPABASE_ANON_KEY").ok_or(ConfigError::Missing("SUPABASE_ANON_KEY"))?;
                let timeout = match get("REMOTE_TIMEOUT_SECS") {
                    Some(value) => Some(Duration::from_secs(value.parse().map_err(
                        |err: std::num::ParseIntError| ConfigError::Invalid {
                            key: "REMOTE_TIMEOUT_SECS",
                            value,
                            reason: err.to_string(),
                        },
                    )?)),
                    None => None,
                };
                StoreBackend::Rest {
                    project_url,
                    api_key,
                    timeout,
                }
            }
            "sqlite" => StoreBackend::Sqlite {
                database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_SQLITE_URL.to_string()),
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: "STORE_BACKEND",
                    value: other.to_string(),
                    reason: "expected 'rest' or 'sqlite'".to_string(),
                })
            }
        };

        let admin_user = get("ADMIN_USER").unwrap_or_else(|| "admin".to_string());
        let admin_password = get("ADMIN_PASSWORD").ok_or(ConfigError::Missing("ADMIN_PASSWORD"))?;

        let display_offset = match get("DISPLAY_UTC_OFFSET") {
            Some(value) => parse_offset(&value).ok_or_else(|| ConfigError::Invalid {
                key: "DISPLAY_UTC_OFFSET",
                value,
                reason: "expected +HH:MM or -HH:MM".to_string(),
            })?,
            None => *Local::now().offset(),
        };

        Ok(Self {
            port,
            backend,
            admin_user,
            admin_password,
            display_offset,
        })
    }
}

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// Parses `+07:00`, `-05:30` or `Z`.
pub fn parse_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value == "UTC" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = if let Some(rest) = value.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = value.strip_prefix('-') {
        (-1, rest)
    } else {
        return None;
    };
    let (hours, minutes) = rest.split_once(':')?;
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn rest_backend_needs_url_and_key() {
        let err = config(&[("ADMIN_PASSWORD", "pw")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SUPABASE_URL")));

        let err = config(&[("ADMIN_PASSWORD", "pw"), ("SUPABASE_URL", "demo.supabase.co")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SUPABASE_ANON_KEY")));

        let cfg = config(&[
            ("ADMIN_PASSWORD", "pw"),
            ("SUPABASE_URL", "demo.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("REMOTE_TIMEOUT_SECS", "15"),
        ])
        .unwrap();
        match cfg.backend {
            StoreBackend::Rest {
                project_url,
                timeout,
                ..
            } => {
                assert_eq!(project_url.as_str(), "https://demo.supabase.co/");
                assert_eq!(timeout, Some(Duration::from_secs(15)));
            }
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[test]
    fn admin_password_has_no_fallback() {
        let err = config(&[("STORE_BACKEND", "sqlite")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ADMIN_PASSWORD")));
    }

    #[test]
    fn sqlite_backend_defaults() {
        let cfg = config(&[
            ("STORE_BACKEND", "sqlite"),
            ("ADMIN_PASSWORD", "pw"),
            ("DISPLAY_UTC_OFFSET", "+07:00"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.admin_user, "admin");
        assert_eq!(cfg.display_offset.local_minus_utc(), 7 * 3600);
        assert_eq!(
            cfg.backend,
            StoreBackend::Sqlite {
                database_url: DEFAULT_SQLITE_URL.to_string()
            }
        );
    }

    #[test]
    fn bad_values_are_reported() {
        assert!(matches!(
            config(&[("STORE_BACKEND", "mongo"), ("ADMIN_PASSWORD", "pw")]),
            Err(ConfigError::Invalid { key: "STORE_BACKEND", .. })
        ));
        assert!(matches!(
            config(&[("STORE_BACKEND", "sqlite"), ("ADMIN_PASSWORD", "pw"), ("PORT", "http")]),
            Err(ConfigError::Invalid { key: "PORT", .. })
        ));
    }

    #[test]
    fn offsets_parse() {
        assert_eq!(parse_offset("-05:30").unwrap().local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert_eq!(parse_offset("Z").unwrap().local_minus_utc(), 0);
        assert!(parse_offset("07:00").is_none());
        assert!(parse_offset("+7").is_none());
        assert!(parse_offset("+24:00").is_none());
    }
}
