//! XTracker REST client. Every endpoint wraps its payload in
//! `{success, data}`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::XTRACKER_API_URL;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackedUser {
    pub id: String,
    pub handle: String,
    pub name: String,
    pub platform_id: String,
    pub avatar_url: String,
    pub bio: String,
    pub verified: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "_count")]
    count: Option<PostCount>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PostCount {
    posts: i64,
}

impl TrackedUser {
    pub fn post_count(&self) -> i64 {
        self.count.as_ref().map(|c| c.posts).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub user_id: String,
    /// Platform post id, used for permalink construction.
    pub platform_id: String,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
    pub imported_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn tweet_url(&self, handle: &str) -> String {
        format!("https://x.com/{handle}/status/{}", self.platform_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Tracking {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub market_link: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DailyMetric {
    pub id: String,
    pub user_id: String,
    pub date: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub metric_type: String,
    pub data: MetricData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricData {
    pub count: i64,
    pub cumulative: i64,
    pub tracking_id: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: T,
}

pub struct XtrackerClient {
    http: reqwest::Client,
    base_url: String,
}

impl XtrackerClient {
    pub fn new(base_url: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| XTRACKER_API_URL.to_string()),
        })
    }

    pub async fn get_users(&self) -> Result<Vec<TrackedUser>> {
        self.get(&format!("{}/users", self.base_url)).await
    }

    pub async fn get_user(&self, handle: &str) -> Result<TrackedUser> {
        self.get(&format!("{}/users/{handle}", self.base_url)).await
    }

    pub async fn get_posts(&self, handle: &str, limit: usize) -> Result<Vec<Post>> {
        let mut url = format!("{}/users/{handle}/posts", self.base_url);
        if limit > 0 {
            url = format!("{url}?limit={limit}");
        }
        self.get(&url).await
    }

    /// Posts for a user newer than `since`.
    pub async fn get_recent_posts(
        &self,
        handle: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        let posts = self.get_posts(handle, limit).await?;
        Ok(posts
            .into_iter()
            .filter(|p| p.created_at.map(|t| t > since).unwrap_or(false))
            .collect())
    }

    pub async fn get_active_trackings(&self) -> Result<Vec<Tracking>> {
        self.get(&format!("{}/trackings?activeOnly=true", self.base_url))
            .await
    }

    pub async fn get_metrics(
        &self,
        user_id: &str,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Vec<DailyMetric>> {
        let url = format!(
            "{}/metrics/{user_id}?type=daily&startDate={}&endDate={}",
            self.base_url,
            start_date.format("%Y-%m-%d"),
            end_date.format("%Y-%m-%d"),
        );
        self.get(&url).await
    }

    pub async fn health_check(&self) -> Result<()> {
        let users = self.get_users().await?;
        info!(tracked_users = users.len(), "XTracker API health check passed");
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url, "XTracker API request");

        let resp = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .header("User-Agent", "marketwire/0.1")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope<T> = resp.json().await?;
        if !envelope.success {
            return Err(AppError::Api {
                status: status.as_u16(),
                body: "API returned success=false".to_string(),
            });
        }
        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_decodes_nested_post_count() {
        let raw = r#"{
            "success": true,
            "data": [{
                "id": "u1",
                "handle": "whale",
                "name": "Whale Watcher",
                "platformId": "12345",
                "verified": true,
                "_count": {"posts": 42}
            }]
        }"#;
        let env: Envelope<Vec<TrackedUser>> = serde_json::from_str(raw).unwrap();
        assert!(env.success);
        assert_eq!(env.data[0].post_count(), 42);
        assert!(env.data[0].verified);
    }

    #[test]
    fn tweet_url_uses_handle_and_platform_id() {
        let post = Post {
            platform_id: "1800000000000000000".to_string(),
            ..Default::default()
        };
        assert_eq!(
            post.tweet_url("whale"),
            "https://x.com/whale/status/1800000000000000000"
        );
    }
}
