//! NewsAPI article provider (`/v2/everything`).
//!
//! One request per day window, newest-first, a single page of up to
//! `page_size` articles. The provider reports its own total separately, so
//! callers can see when a window held more than one page.

use super::http::HttpShim;
use crate::config::NewsSettings;
use crate::data::{Article, ArticlePage, ArticleProvider, ProviderError};
use crate::domain::DateRange;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

const EVERYTHING_URL: &str = "https://newsapi.org/v2/everything";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EverythingResponse {
    status: String,
    #[serde(default)]
    total_results: u64,
    #[serde(default)]
    articles: Vec<RawArticle>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArticle {
    source: Option<RawSource>,
    author: Option<String>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: DateTime<Utc>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

pub struct NewsApiProvider {
    http: HttpShim,
    api_key: Option<String>,
    language: String,
    page_size: u32,
}

impl NewsApiProvider {
    pub fn new(http: HttpShim, settings: &NewsSettings) -> Self {
        Self {
            http,
            api_key: settings.api_key.clone(),
            language: settings.language.clone(),
            page_size: settings.page_size,
        }
    }
}

/// Map a NewsAPI error code to a provider error.
fn error_for_code(code: &str, message: &str) -> ProviderError {
    match code {
        "apiKeyMissing" | "apiKeyInvalid" | "apiKeyDisabled" | "apiKeyExhausted" => {
            ProviderError::AuthenticationRequired(format!("{code}: {message}"))
        }
        "rateLimited" => ProviderError::RateLimited {
            retry_after_secs: 60 * 60,
        },
        "parameterInvalid" | "parametersMissing" | "maximumResultsReached" => {
            ProviderError::Unsupported(format!("{code}: {message}"))
        }
        _ => ProviderError::Other(format!("{code}: {message}")),
    }
}

fn client_error(status: StatusCode, body: &str) -> ProviderError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            code: Some(code),
            message,
        }) => error_for_code(&code, message.as_deref().unwrap_or_default()),
        _ => ProviderError::Other(format!("HTTP {status} from NewsAPI")),
    }
}

fn parse_everything(body: &str) -> Result<ArticlePage, ProviderError> {
    let resp: EverythingResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::ResponseFormatChanged(format!("everything response: {e}")))?;

    if resp.status != "ok" {
        let code = resp.code.unwrap_or_else(|| "unknown".into());
        return Err(error_for_code(&code, resp.message.as_deref().unwrap_or_default()));
    }

    let articles = resp
        .articles
        .into_iter()
        // Removed articles come back without a URL.
        .filter_map(|a| {
            Some(Article {
                url: a.url?,
                published_at: a.published_at,
                author: a.author,
                title: a.title,
                description: a.description,
                content: a.content,
                source: a.source.and_then(|s| s.name),
            })
        })
        .collect();

    Ok(ArticlePage {
        articles,
        total_results: resp.total_results,
    })
}

impl ArticleProvider for NewsApiProvider {
    fn name(&self) -> &str {
        "newsapi"
    }

    fn fetch_articles(&self, query: &str, window: DateRange) -> Result<ArticlePage, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::AuthenticationRequired(
                "no NewsAPI key configured (set NEWSAPI_API_KEY)".into(),
            ));
        };

        let from = format!("{}T00:00:00", window.from_date().format("%Y-%m-%d"));
        let to = format!("{}T23:59:59", window.to_date().format("%Y-%m-%d"));
        let page_size = self.page_size.to_string();

        let body = self.http.get_text_with(
            "newsapi everything",
            |client| {
                client
                    .get(EVERYTHING_URL)
                    .header("X-Api-Key", api_key)
                    .query(&[
                        ("q", query),
                        ("from", from.as_str()),
                        ("to", to.as_str()),
                        ("language", self.language.as_str()),
                        ("sortBy", "publishedAt"),
                        ("pageSize", page_size.as_str()),
                    ])
            },
            client_error,
        )?;
        parse_everything(&body)
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some() && self.http.is_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_articles_and_total() {
        let body = r#"{
          "status": "ok",
          "totalResults": 250,
          "articles": [
            {"source": {"id": null, "name": "CoinDesk"}, "author": "A. Writer",
             "title": "Bitcoin climbs", "description": "Up\nagain", "url": "https://x/1",
             "urlToImage": null, "publishedAt": "2024-01-01T12:30:00Z", "content": null},
            {"source": {"id": null, "name": "[Removed]"}, "author": null, "title": "[Removed]",
             "description": null, "url": null, "publishedAt": "2024-01-01T10:00:00Z", "content": null}
          ]
        }"#;
        let page = parse_everything(body).unwrap();
        assert_eq!(page.total_results, 250);
        assert_eq!(page.articles.len(), 1);
        let a = &page.articles[0];
        assert_eq!(a.source.as_deref(), Some("CoinDesk"));
        assert_eq!(a.description.as_deref(), Some("Up\nagain"));
        assert_eq!(a.content, None);
        assert_eq!(a.published_at.to_rfc3339(), "2024-01-01T12:30:00+00:00");
    }

    #[test]
    fn error_status_maps_codes() {
        let err = parse_everything(
            r#"{"status":"error","code":"apiKeyInvalid","message":"Your API key is invalid"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationRequired(_)));

        let err = client_error(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"status":"error","code":"rateLimited","message":"slow down"}"#,
        );
        assert!(matches!(err, ProviderError::RateLimited { .. }));

        let err = client_error(StatusCode::BAD_REQUEST, "not json");
        assert!(matches!(err, ProviderError::Other(_)));
    }

    #[test]
    fn missing_key_fails_without_network() {
        let http = HttpShim::new(
            &crate::config::HttpSettings::default(),
            HttpShim::breaker_from(&crate::config::HttpSettings::default()),
        )
        .unwrap();
        let provider = NewsApiProvider::new(http, &NewsSettings::default());
        assert!(!provider.is_available());
        let day = DateRange::day(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let err = provider.fetch_articles("Bitcoin", day).unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationRequired(_)));
    }
}
