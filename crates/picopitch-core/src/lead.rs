use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix joined with a Reddit permalink to form an absolute source URL.
pub const REDDIT_BASE_URL: &str = "https://reddit.com";

/// A scraped post or comment, ready for idempotent ingestion keyed on
/// `external_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLead {
    pub external_id: String,
    pub subreddit: Option<String>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub body_text: String,
    pub permalink: Option<String>,
    pub url: Option<String>,
    pub is_comment: bool,
    pub parent_external_id: Option<String>,
    pub score: i32,
    pub posted_at: Option<DateTime<Utc>>,
}

/// `https://reddit.com{permalink}` for a non-blank permalink.
#[must_use]
pub fn source_url(permalink: Option<&str>) -> Option<String> {
    permalink
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("{REDDIT_BASE_URL}{p}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_url_prefixes_permalink() {
        assert_eq!(
            source_url(Some("/r/freelance/comments/abc/x/")).as_deref(),
            Some("https://reddit.com/r/freelance/comments/abc/x/")
        );
    }

    #[test]
    fn blank_permalink_has_no_source_url() {
        assert_eq!(source_url(Some("  ")), None);
        assert_eq!(source_url(None), None);
    }
}
