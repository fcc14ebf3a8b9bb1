use anyhow::{Context, Result};
use log::info;
use reqwest::{header::CONTENT_TYPE, Client};

use crate::repository::Snapshot;

/// スナップショットの取得元。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// ローカルのJSONファイル。
    File(String),
    /// 永続化層が公開しているHTTPエンドポイント。
    Http { url: String, api_token: Option<String> },
}

impl Source {
    /// `http://`または`https://`で始まる場合はHTTP、それ以外はファイルパスとして扱う。
    pub fn parse(location: &str, api_token: Option<String>) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            Source::Http {
                url: location.to_string(),
                api_token,
            }
        } else {
            Source::File(location.to_string())
        }
    }

    /// スナップショットを読み込み、不変条件を満たさないデータを取り除いて返す。
    pub async fn load(&self) -> Result<Snapshot> {
        let snapshot = match self {
            Source::File(path) => {
                let body = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read snapshot file: {}", path))?;
                serde_json::from_str::<Snapshot>(&body)
                    .with_context(|| format!("Failed to parse snapshot file: {}", path))?
            }
            Source::Http { url, api_token } => fetch(url, api_token.as_deref()).await?,
        };
        info!("Snapshot loaded from {:?}", self);

        Ok(snapshot.sanitize())
    }
}

/// HTTPでスナップショットを取得する。トークンがある場合はBasic認証を付ける。
async fn fetch(url: &str, api_token: Option<&str>) -> Result<Snapshot> {
    let mut request = Client::new()
        .get(url)
        .header(CONTENT_TYPE, "application/json");
    if let Some(token) = api_token {
        request = request.basic_auth(token, Some("api_token"));
    }

    let snapshot = request
        .send()
        .await
        .with_context(|| format!("Failed to send request to {}", url))?
        .error_for_status()
        .context("Request returned an error status")?
        .json::<Snapshot>()
        .await
        .context("Failed to deserialize response")?;

    Ok(snapshot)
}
