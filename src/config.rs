use std::str::FromStr;
use std::time::Duration;

use tracing::Level;

use crate::social::narrator::Locale;
use crate::{Error, Result};

pub const DEFAULT_SCRIPTURE_API: &str = "https://api.alquran.cloud/v1";

/// Process configuration, read from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub scripture_api_base: String,
    pub narrator: NarratorConfig,
    /// How many activity entries a group view shows.
    pub feed_limit: usize,
    /// Create the demo circle on startup.
    pub seed_demo: bool,
    pub log_level: Level,
    pub log_json: bool,
}

#[derive(Clone, Debug)]
pub struct NarratorConfig {
    pub locale: Locale,
    pub reply_delay: Duration,
    /// Lowercase substrings that make the narrator answer a chat message.
    pub triggers: Vec<String>,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            locale: Locale::Somali,
            reply_delay: Duration::from_millis(1500),
            triggers: ["dua", "duca", "ameen", "aamiin", "alhamdulillah", "subhanallah", "ramadan"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://halaqa.db?mode=rwc".to_owned(),
            bind_addr: "0.0.0.0:8080".to_owned(),
            scripture_api_base: DEFAULT_SCRIPTURE_API.to_owned(),
            narrator: NarratorConfig::default(),
            feed_limit: 50,
            seed_demo: false,
            log_level: Level::INFO,
            log_json: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = get("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(addr) = get("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(base) = get("SCRIPTURE_API_BASE") {
            config.scripture_api_base = base.trim_end_matches('/').to_owned();
        }
        if let Some(locale) = get("NARRATOR_LOCALE") {
            config.narrator.locale = locale.parse()?;
        }
        if let Some(ms) = get("NARRATOR_REPLY_DELAY_MS") {
            config.narrator.reply_delay = Duration::from_millis(parse("NARRATOR_REPLY_DELAY_MS", &ms)?);
        }
        if let Some(triggers) = get("NARRATOR_TRIGGERS") {
            config.narrator.triggers = triggers
                .split(',')
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if let Some(limit) = get("FEED_LIMIT") {
            config.feed_limit = parse("FEED_LIMIT", &limit)?;
        }
        if let Some(seed) = get("SEED_DEMO") {
            config.seed_demo = parse("SEED_DEMO", &seed)?;
        }
        if let Some(level) = get("LOG_LEVEL") {
            config.log_level = parse("LOG_LEVEL", &level)?;
        }
        if let Some(json) = get("LOG_JSON") {
            config.log_json = parse("LOG_JSON", &json)?;
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::invalid(format!("{key}={value}")))
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
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.feed_limit, 50);
        assert_eq!(config.narrator.locale, Locale::Somali);
        assert_eq!(config.scripture_api_base, DEFAULT_SCRIPTURE_API);
        assert!(!config.seed_demo);
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("NARRATOR_LOCALE", "en"),
            ("NARRATOR_REPLY_DELAY_MS", "10"),
            ("NARRATOR_TRIGGERS", " Dua, ,Ameen "),
            ("FEED_LIMIT", "5"),
            ("SEED_DEMO", "true"),
            ("SCRIPTURE_API_BASE", "http://localhost:9000/"),
        ]))
        .unwrap();
        assert_eq!(config.narrator.locale, Locale::English);
        assert_eq!(config.narrator.reply_delay, Duration::from_millis(10));
        assert_eq!(config.narrator.triggers, vec!["dua", "ameen"]);
        assert_eq!(config.feed_limit, 5);
        assert!(config.seed_demo);
        assert_eq!(config.scripture_api_base, "http://localhost:9000");
    }

    #[test]
    fn rejects_garbage() {
        let err = Config::from_lookup(lookup(&[("FEED_LIMIT", "lots")])).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
