use std::fs;
use std::path::Path;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Context, Result};

/// The operator's own hotel, matched by name plus known aliases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnProperty {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl OwnProperty {
    /// Case-insensitive match against the canonical name or any alias.
    pub fn matches(&self, candidate: &str) -> bool {
        let candidate = candidate.trim().to_lowercase();
        if candidate.is_empty() {
            return false;
        }
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .any(|known| known.trim().to_lowercase() == candidate)
    }
}

/// Target collection window: every calendar day of `months` consecutive
/// months starting at the first of `start_month`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateWindow {
    pub start_year: i32,
    pub start_month: u32,
    pub months: u32,
}

impl DateWindow {
    pub fn dates(&self) -> Result<Vec<NaiveDate>> {
        let start = NaiveDate::from_ymd_opt(self.start_year, self.start_month, 1)
            .ok_or_else(|| {
                AppError::message(format!(
                    "Invalid window start {}-{:02}",
                    self.start_year, self.start_month
                ))
            })?;
        let end = start
            .checked_add_months(Months::new(self.months))
            .ok_or_else(|| AppError::message("Window end overflows the calendar"))?;

        let mut dates = Vec::new();
        let mut day = start;
        while day < end {
            dates.push(day);
            day = day.succ_opt().ok_or_else(|| {
                AppError::message("Window end overflows the calendar")
            })?;
        }
        Ok(dates)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Pricing endpoint; one GET per (date, page) pair.
    pub base_url: String,
    /// Free account-status endpoint reporting plan limit / used / remaining.
    pub status_url: String,
    /// May contain `${VAR}` placeholders expanded from the environment so the
    /// key never has to live in the config file itself.
    pub api_key: String,
    pub currency: String,
    pub adults: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub own_property: OwnProperty,
    /// Exact names of the head-to-head competitor set.
    #[serde(default)]
    pub direct_competitors: Vec<String>,
    /// Substring fragments marking monitored competitors for highlighting.
    #[serde(default)]
    pub competitor_fragments: Vec<String>,
    pub window: DateWindow,
    pub provider: ProviderSettings,
    /// Where the snapshot store lives on disk.
    #[serde(default = "default_store_path")]
    pub store_path: String,
}

fn default_store_path() -> String {
    "rate_snapshots.json".to_string()
}

impl Config {
    pub fn builtin() -> Self {
        Config {
            own_property: OwnProperty {
                name: "Riviera Motel".to_string(),
                aliases: vec!["The Riviera".to_string(), "Riviera Motel & Suites".to_string()],
            },
            direct_competitors: vec![
                "Ocean Vista Hotel".to_string(),
                "Harbor Lights Inn".to_string(),
            ],
            competitor_fragments: vec![
                "Beachside".to_string(),
                "Palm Court".to_string(),
                "Seabreeze".to_string(),
            ],
            window: DateWindow {
                start_year: 2026,
                start_month: 6,
                months: 3,
            },
            provider: ProviderSettings {
                base_url: "https://pricing.example.com/v1/hotel-rates".to_string(),
                status_url: "https://pricing.example.com/v1/account".to_string(),
                api_key: "${HOTEL_RATES_API_KEY}".to_string(),
                currency: "USD".to_string(),
                adults: 2,
                timeout_secs: 15,
            },
            store_path: default_store_path(),
        }
    }

    /// Load from a JSON file. A missing file is an error; callers that want
    /// the builtin fallback for the default path use [`Config::load_or_default`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AppError::message(format!(
                "Config file {:?} does not exist",
                path
            )));
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(config)
    }

    /// Load the default config file when present, otherwise fall back to the
    /// builtin defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("No config file at {:?}; using builtin defaults", path);
            return Ok(Self::builtin());
        }
        Self::load(path)
    }

    pub fn resolved_api_key(&self) -> Result<String> {
        expand_env_vars(&self.provider.api_key)
    }
}

/// Expand `${VAR}` placeholders from the environment.
pub fn expand_env_vars(value: &str) -> Result<String> {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut name = String::new();
            let mut closed = false;
            while let Some(&next) = chars.peek() {
                chars.next();
                if next == '}' {
                    closed = true;
                    break;
                }
                name.push(next);
            }

            if name.is_empty() {
                return Err(AppError::message(
                    "Encountered empty environment placeholder",
                ));
            }
            if !closed {
                return Err(AppError::message(
                    "Unterminated environment placeholder",
                ));
            }

            let value = std::env::var(&name).with_context(|| {
                format!("Environment variable {} required by config is not set", name)
            })?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_expands_to_every_day_of_the_months() {
        let window = DateWindow {
            start_year: 2026,
            start_month: 6,
            months: 2,
        };
        let dates = window.dates().unwrap();

        // June and July 2026: 30 + 31 days.
        assert_eq!(dates.len(), 61);
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2026, 6, 1).unwrap());
        assert_eq!(*dates.last().unwrap(), NaiveDate::from_ymd_opt(2026, 7, 31).unwrap());
    }

    #[test]
    fn own_property_matches_aliases_case_insensitively() {
        let own = OwnProperty {
            name: "Riviera Motel".to_string(),
            aliases: vec!["The Riviera".to_string()],
        };

        assert!(own.matches("riviera motel"));
        assert!(own.matches("THE RIVIERA"));
        assert!(!own.matches("Riviera Grande"));
        assert!(!own.matches(""));
    }

    #[test]
    fn expands_environment_placeholders() {
        std::env::set_var("HOTEL_RATES_TEST_KEY", "secret");
        let expanded = expand_env_vars("key=${HOTEL_RATES_TEST_KEY}").unwrap();
        assert_eq!(expanded, "key=secret");

        assert!(expand_env_vars("${").is_err());
        assert!(expand_env_vars("${}").is_err());
    }

    #[test]
    fn load_rejects_a_missing_path() {
        let err = Config::load("no/such/config.json").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn load_or_default_falls_back_when_the_default_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("config.json")).unwrap();
        assert_eq!(config.own_property.name, Config::builtin().own_property.name);
    }

    #[test]
    fn load_or_default_reads_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::builtin();
        config.own_property.name = "Harborline Suites".to_string();
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        let loaded = Config::load_or_default(&path).unwrap();
        assert_eq!(loaded.own_property.name, "Harborline Suites");
    }
}
