use std::path::{Path, PathBuf};
use std::{env, fs};

use anyhow::{Context, Result};
use chrono::Weekday;
use log::{debug, info};
use serde::Deserialize;

use crate::period::{Calendar, OvertimeCycle};

const APP_NAME: &str = "effreport";

/// 設定ファイルの内容。全ての項目は省略できる。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// スナップショットの取得元(ファイルパスまたはURL)。
    pub source: Option<String>,
    pub api_token: Option<String>,
    /// リクエストを行うユーザー名。
    pub username: Option<String>,
    pub first_weekday: String,
    /// 日付入力の書式。
    pub date_format: String,
    pub overtime: Option<OvertimeCycle>,
    /// アクセスできない場合のリダイレクト先。
    pub login_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: None,
            api_token: None,
            username: None,
            first_weekday: "monday".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            overtime: None,
            login_url: "/accounts/login/".to_string(),
        }
    }
}

impl Config {
    /// 設定ファイルを読み込み、環境変数で上書きした設定を返す。
    ///
    /// 設定ファイルは`<config_dir>/effreport/config.json`。存在しない場合は既定値を使う。
    /// `EFF_SOURCE`、`EFF_API_TOKEN`、`EFF_USER`が設定されていればそれぞれを上書きする。
    pub fn load() -> Result<Self> {
        let mut config = match default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let body = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        info!("Config loaded from {}", path.display());
        Ok(config)
    }

    fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(source) = lookup("EFF_SOURCE") {
            self.source = Some(source);
        }
        if let Some(token) = lookup("EFF_API_TOKEN") {
            self.api_token = Some(token);
        }
        if let Some(username) = lookup("EFF_USER") {
            self.username = Some(username);
        }
    }

    /// 設定から`Calendar`を作る。
    pub fn calendar(&self) -> Result<Calendar> {
        let first_weekday = self
            .first_weekday
            .parse::<Weekday>()
            .map_err(|_| anyhow::anyhow!("Invalid first_weekday: {}", self.first_weekday))?;
        Ok(Calendar::new(first_weekday, self.overtime))
    }
}

fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.json"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{Datelike, NaiveDate, Weekday};
    use rstest::rstest;

    use super::Config;
    use crate::period::OvertimeCycle;

    #[test]
    fn test_parse_partial_config() {
        let config: Config = serde_json::from_str(
            r#"{"source": "https://eff.example.com/snapshot", "overtime": {"anchor": "2024-01-21", "length_days": 28}}"#,
        )
        .unwrap();

        assert_eq!(config.source.as_deref(), Some("https://eff.example.com/snapshot"));
        assert_eq!(config.date_format, "%Y-%m-%d");
        assert_eq!(
            config.overtime,
            Some(OvertimeCycle {
                anchor: NaiveDate::from_ymd_opt(2024, 1, 21).unwrap(),
                length_days: 28,
            })
        );
    }

    #[test]
    fn test_apply_env() {
        let vars = HashMap::from([("EFF_USER", "alice"), ("EFF_API_TOKEN", "secret")]);
        let mut config = Config {
            source: Some("snapshot.json".to_string()),
            ..Default::default()
        };

        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.username.as_deref(), Some("alice"));
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.source.as_deref(), Some("snapshot.json"));
    }

    #[rstest]
    #[case::default("monday", Some(Weekday::Mon))]
    #[case::sunday("sunday", Some(Weekday::Sun))]
    #[case::invalid("someday", None)]
    fn test_calendar(#[case] first: &str, #[case] expected: Option<Weekday>) {
        let config = Config {
            first_weekday: first.to_string(),
            ..Default::default()
        };

        let result = config.calendar();

        match expected {
            Some(weekday) => {
                let day = NaiveDate::from_ymd_opt(2024, 3, 13).unwrap();
                assert_eq!(result.unwrap().week(day).start.weekday(), weekday);
            }
            None => assert!(result.is_err()),
        }
    }
}
