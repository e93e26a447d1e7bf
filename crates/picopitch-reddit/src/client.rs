//! Application-only OAuth client for the Reddit API.

use std::sync::LazyLock;
use std::time::Duration;

use picopitch_core::{NewLead, RedditCredentials};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::RedditError;
use crate::listing::{CommentsResponse, Listing, PostData};
use crate::rate_limit::retry_with_backoff;

pub const AUTH_BASE_URL: &str = "https://www.reddit.com";
pub const API_BASE_URL: &str = "https://oauth.reddit.com";

/// Reddit caps listing pages at 100 items.
const MAX_PAGE_SIZE: u32 = 100;

static SUBREDDIT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{2,21}$").expect("valid subreddit regex"));

/// Strips an optional `r/` or `/r/` prefix and validates the remainder.
///
/// # Errors
///
/// Returns [`RedditError::InvalidSubreddit`] for names Reddit would reject.
pub fn normalize_subreddit(name: &str) -> Result<String, RedditError> {
    let trimmed = name.trim();
    let bare = trimmed
        .strip_prefix("/r/")
        .or_else(|| trimmed.strip_prefix("r/"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');
    if SUBREDDIT_NAME.is_match(bare) {
        Ok(bare.to_string())
    } else {
        Err(RedditError::InvalidSubreddit {
            name: name.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Authenticated Reddit API client.
///
/// 429 responses and network failures are retried with exponential backoff
/// up to `max_retries` additional attempts.
pub struct RedditClient {
    client: Client,
    token: String,
    api_base: String,
    max_retries: u32,
    backoff_base_secs: u64,
}

impl RedditClient {
    /// Exchanges client credentials for a bearer token against reddit.com.
    ///
    /// # Errors
    ///
    /// Returns [`RedditError::Auth`] if Reddit rejects the credentials, or
    /// [`RedditError::Http`] on network failure.
    pub async fn connect(credentials: &RedditCredentials) -> Result<Self, RedditError> {
        Self::connect_with_base_urls(credentials, AUTH_BASE_URL, API_BASE_URL).await
    }

    /// [`RedditClient::connect`] against arbitrary hosts, for tests.
    ///
    /// # Errors
    ///
    /// Same as [`RedditClient::connect`].
    pub async fn connect_with_base_urls(
        credentials: &RedditCredentials,
        auth_base: &str,
        api_base: &str,
    ) -> Result<Self, RedditError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(credentials.user_agent.as_str())
            .build()?;

        let response = client
            .post(format!(
                "{}/api/v1/access_token",
                auth_base.trim_end_matches('/')
            ))
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RedditError::Auth {
                status: response.status().as_u16(),
            });
        }
        let body = response.text().await?;
        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|source| RedditError::Deserialize {
                context: "access token".to_string(),
                source,
            })?;
        tracing::debug!("reddit access token acquired");

        Ok(Self {
            client,
            token: token.access_token,
            api_base: api_base.trim_end_matches('/').to_string(),
            max_retries: 3,
            backoff_base_secs: 2,
        })
    }

    #[must_use]
    pub fn with_retry_policy(mut self, max_retries: u32, backoff_base_secs: u64) -> Self {
        self.max_retries = max_retries;
        self.backoff_base_secs = backoff_base_secs;
        self
    }

    /// Up to `limit` of the newest posts in `subreddit`, following the
    /// `after` cursor across pages.
    ///
    /// # Errors
    ///
    /// Returns [`RedditError`] if any page request fails after retries.
    pub async fn fetch_new_posts(
        &self,
        subreddit: &str,
        limit: u32,
    ) -> Result<Vec<NewLead>, RedditError> {
        let url = format!("{}/r/{subreddit}/new", self.api_base);
        let mut leads = Vec::new();
        let mut after: Option<String> = None;
        let mut remaining = limit;

        while remaining > 0 {
            let mut params = vec![
                ("limit", remaining.min(MAX_PAGE_SIZE).to_string()),
                ("raw_json", "1".to_string()),
            ];
            if let Some(cursor) = &after {
                params.push(("after", cursor.clone()));
            }

            let listing: Listing<PostData> = self.get_json(&url, &params).await?;
            let page_len = listing.data.children.len();
            leads.extend(
                listing
                    .data
                    .children
                    .into_iter()
                    .filter(|thing| thing.kind == "t3")
                    .filter_map(|thing| thing.data.into_lead(subreddit)),
            );

            remaining = remaining.saturating_sub(u32::try_from(page_len).unwrap_or(u32::MAX));
            after = listing.data.after;
            if page_len == 0 || after.is_none() {
                break;
            }
        }

        Ok(leads)
    }

    /// Up to `limit` top-level comments on a post, by Reddit's "top" order.
    /// `post_id` is the bare id or the `t3_` fullname.
    ///
    /// # Errors
    ///
    /// Returns [`RedditError`] if the request fails after retries.
    pub async fn fetch_comments(
        &self,
        subreddit: &str,
        post_id: &str,
        limit: u32,
    ) -> Result<Vec<NewLead>, RedditError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let id = post_id.strip_prefix("t3_").unwrap_or(post_id);
        let url = format!("{}/comments/{id}", self.api_base);
        let params = [
            ("limit", limit.to_string()),
            ("depth", "1".to_string()),
            ("sort", "top".to_string()),
            ("raw_json", "1".to_string()),
        ];

        let (_, comments): CommentsResponse = self.get_json(&url, &params).await?;
        Ok(comments
            .data
            .children
            .into_iter()
            .filter(|thing| thing.kind == "t1")
            .filter_map(|thing| thing.data.into_lead(subreddit))
            .take(limit as usize)
            .collect())
    }

    /// New posts in `subreddit` plus up to `comments_per_post` comments on
    /// each. A post whose comments cannot be fetched is kept without them.
    ///
    /// # Errors
    ///
    /// Returns [`RedditError`] if the subreddit name is invalid or the post
    /// listing cannot be fetched.
    pub async fn scrape_subreddit(
        &self,
        subreddit: &str,
        post_limit: u32,
        comments_per_post: u32,
    ) -> Result<Vec<NewLead>, RedditError> {
        let subreddit = normalize_subreddit(subreddit)?;
        let posts = self.fetch_new_posts(&subreddit, post_limit).await?;
        let mut leads = Vec::with_capacity(posts.len());

        for post in posts {
            let comments = match self
                .fetch_comments(&subreddit, &post.external_id, comments_per_post)
                .await
            {
                Ok(comments) => comments,
                Err(e) => {
                    tracing::warn!(
                        subreddit = %subreddit,
                        post = %post.external_id,
                        error = %e,
                        "failed to fetch comments; keeping post only"
                    );
                    Vec::new()
                }
            };
            leads.push(post);
            leads.extend(comments);
        }

        tracing::info!(subreddit = %subreddit, leads = leads.len(), "subreddit scraped");
        Ok(leads)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, RedditError> {
        retry_with_backoff(self.max_retries, self.backoff_base_secs, || async move {
            let response = self
                .client
                .get(url)
                .bearer_auth(&self.token)
                .query(params)
                .send()
                .await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.trim().parse::<u64>().ok())
                    .unwrap_or(0);
                return Err(RedditError::RateLimited { retry_after_secs });
            }
            if !status.is_success() {
                return Err(RedditError::UnexpectedStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            let body = response.text().await?;
            serde_json::from_str::<T>(&body).map_err(|source| RedditError::Deserialize {
                context: url.to_string(),
                source,
            })
        })
        .await
    }
}
