use std::{collections::HashMap, env, fs, path::Path, time::Duration};

use crate::{
    errors::Error, poller::PollerConfig, rate_limit::RateLimitConfig, source::FetchLimits, Result,
};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_USER_AGENT: &str = "ghrelay";
const MAX_PER_PAGE: u32 = 100;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Typed configuration for the relay, sourced from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_chat_id: i64,

    // GitHub
    pub github_username: String,
    pub github_token: Option<String>,
    pub github_api_base: String,
    pub github_user_agent: String,
    pub http_timeout: Duration,

    // Polling
    pub poll_interval: Duration,
    pub fetch_per_page: u32,
    pub fetch_max_events: usize,

    // Outbound pacing
    pub send_rate_tokens: u32,
    pub send_rate_interval: Duration,
    pub send_rate_burst: u32,
    pub default_retry_after: Duration,
    pub max_throttle_retries: u32,

    // Logging
    pub log_format: LogFormat,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (env, map, ...).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        // Required
        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;
        let telegram_chat_id = get("TELEGRAM_CHAT_ID")
            .ok_or_else(|| {
                Error::Config("TELEGRAM_CHAT_ID environment variable is required".to_string())
            })?
            .trim()
            .parse::<i64>()
            .map_err(|e| Error::Config(format!("TELEGRAM_CHAT_ID must be an integer: {e}")))?;
        let github_username = get("GITHUB_USERNAME").ok_or_else(|| {
            Error::Config("GITHUB_USERNAME environment variable is required".to_string())
        })?;
        let github_username = github_username.trim().to_string();

        // Optional GitHub settings
        let github_token = get("GITHUB_TOKEN").map(|t| t.trim().to_string());
        let github_api_base = get("GITHUB_API_BASE")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let github_user_agent =
            get("GITHUB_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let http_timeout = Duration::from_secs(parse_num(&get, "HTTP_TIMEOUT_SECS")?.unwrap_or(20));

        // Polling
        let poll_interval =
            Duration::from_secs(parse_num(&get, "POLL_INTERVAL_SECS")?.unwrap_or(300));
        if poll_interval.is_zero() {
            return Err(Error::Config("POLL_INTERVAL_SECS must be > 0".to_string()));
        }
        let fetch_per_page = parse_num::<u32>(&get, "FETCH_PER_PAGE")?
            .unwrap_or(MAX_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);
        let fetch_max_events = parse_num::<usize>(&get, "FETCH_MAX_EVENTS")?
            .unwrap_or(300)
            .max(1);

        // Outbound pacing
        let send_rate_tokens = parse_num::<u32>(&get, "SEND_RATE_TOKENS")?.unwrap_or(1);
        let send_rate_interval =
            Duration::from_millis(parse_num(&get, "SEND_RATE_INTERVAL_MS")?.unwrap_or(3000));
        if send_rate_tokens == 0 || send_rate_interval.is_zero() {
            return Err(Error::Config(
                "SEND_RATE_TOKENS and SEND_RATE_INTERVAL_MS must be > 0".to_string(),
            ));
        }
        let send_rate_burst = parse_num::<u32>(&get, "SEND_RATE_BURST")?
            .unwrap_or(1)
            .max(1);
        let default_retry_after =
            Duration::from_secs(parse_num(&get, "DEFAULT_RETRY_AFTER_SECS")?.unwrap_or(60));
        let max_throttle_retries = parse_num::<u32>(&get, "MAX_THROTTLE_RETRIES")?
            .unwrap_or(3)
            .max(1);

        let log_format = match get("LOG_FORMAT").map(|s| s.trim().to_lowercase()) {
            None => LogFormat::Pretty,
            Some(s) if s == "pretty" || s == "text" => LogFormat::Pretty,
            Some(s) if s == "json" => LogFormat::Json,
            Some(other) => {
                return Err(Error::Config(format!(
                    "LOG_FORMAT must be `pretty` or `json`, got `{other}`"
                )))
            }
        };

        Ok(Self {
            telegram_bot_token,
            telegram_chat_id,
            github_username,
            github_token,
            github_api_base,
            github_user_agent,
            http_timeout,
            poll_interval,
            fetch_per_page,
            fetch_max_events,
            send_rate_tokens,
            send_rate_interval,
            send_rate_burst,
            default_retry_after,
            max_throttle_retries,
            log_format,
        })
    }

    pub fn fetch_limits(&self) -> FetchLimits {
        FetchLimits::new(self.fetch_per_page, self.fetch_max_events)
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            tokens_per_interval: self.send_rate_tokens,
            interval: self.send_rate_interval,
            burst: self.send_rate_burst,
        }
    }

    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            poll_interval: self.poll_interval,
            limits: self.fetch_limits(),
            max_throttle_retries: self.max_throttle_retries,
        }
    }

    /// Lookup helper for tests and tooling that want to feed a plain map.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|k| map.get(k).cloned())
    }
}

fn parse_num<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{key}: invalid value `{raw}`: {e}"))),
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
