//! Reddit listing payloads and their conversion into leads.

use chrono::{DateTime, Utc};
use picopitch_core::{source_url, NewLead};
use serde::Deserialize;

/// Bodies Reddit substitutes for deleted or moderated content.
const TOMBSTONES: [&str; 2] = ["[deleted]", "[removed]"];

#[derive(Debug, Deserialize)]
pub struct Listing<T> {
    pub data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
pub struct ListingData<T> {
    pub children: Vec<Thing<T>>,
    #[serde(default)]
    pub after: Option<String>,
}

/// A listing child. `kind` is `t3` for posts, `t1` for comments and `more`
/// for collapsed comment stubs.
#[derive(Debug, Deserialize)]
pub struct Thing<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PostData {
    pub id: String,
    pub name: String,
    pub title: Option<String>,
    pub selftext: Option<String>,
    pub author: Option<String>,
    pub permalink: Option<String>,
    pub url: Option<String>,
    pub score: i64,
    pub created_utc: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommentData {
    pub id: String,
    pub name: String,
    pub body: Option<String>,
    pub author: Option<String>,
    pub permalink: Option<String>,
    pub parent_id: Option<String>,
    pub score: i64,
    pub created_utc: Option<f64>,
}

/// `/comments/{id}` answers with the post listing followed by the comment
/// listing.
pub type CommentsResponse = (Listing<PostData>, Listing<CommentData>);

fn live_text(text: Option<&str>) -> Option<&str> {
    text.map(str::trim)
        .filter(|t| !t.is_empty() && !TOMBSTONES.contains(t))
}

fn fullname(name: &str, prefix: &str, id: &str) -> Option<String> {
    if !name.is_empty() {
        Some(name.to_string())
    } else if !id.is_empty() {
        Some(format!("{prefix}_{id}"))
    } else {
        None
    }
}

fn posted_at(created_utc: Option<f64>) -> Option<DateTime<Utc>> {
    #[allow(clippy::cast_possible_truncation)]
    created_utc.and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
}

fn clamp_score(score: i64) -> i32 {
    i32::try_from(score).unwrap_or(if score < 0 { i32::MIN } else { i32::MAX })
}

impl PostData {
    /// A lead for this post. Link posts keep an empty body; a deleted body
    /// is blanked. `None` when the post has no usable id.
    #[must_use]
    pub fn into_lead(self, subreddit: &str) -> Option<NewLead> {
        let external_id = fullname(&self.name, "t3", &self.id)?;
        Some(NewLead {
            external_id,
            subreddit: Some(subreddit.to_string()),
            author: live_text(self.author.as_deref()).map(str::to_string),
            title: self.title.map(|t| t.trim().to_string()),
            body_text: live_text(self.selftext.as_deref())
                .unwrap_or_default()
                .to_string(),
            url: self.url.or_else(|| source_url(self.permalink.as_deref())),
            permalink: self.permalink,
            is_comment: false,
            parent_external_id: None,
            score: clamp_score(self.score),
            posted_at: posted_at(self.created_utc),
        })
    }
}

impl CommentData {
    /// A lead for this comment, or `None` when it was deleted, removed or
    /// left blank.
    #[must_use]
    pub fn into_lead(self, subreddit: &str) -> Option<NewLead> {
        let body = live_text(self.body.as_deref())?.to_string();
        let external_id = fullname(&self.name, "t1", &self.id)?;
        Some(NewLead {
            external_id,
            subreddit: Some(subreddit.to_string()),
            author: live_text(self.author.as_deref()).map(str::to_string),
            title: None,
            body_text: body,
            url: source_url(self.permalink.as_deref()),
            permalink: self.permalink,
            is_comment: true,
            parent_external_id: self.parent_id,
            score: clamp_score(self.score),
            posted_at: posted_at(self.created_utc),
        })
    }
}
