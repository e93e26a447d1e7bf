//! Reddit scraping for the lead pipeline.
//!
//! [`RedditClient`] authenticates with application-only OAuth and turns new
//! posts and their top comments into [`picopitch_core::NewLead`]s keyed on
//! the Reddit fullname (`t3_…` / `t1_…`).

pub mod client;
pub mod error;
pub mod listing;

mod rate_limit;

pub use client::{normalize_subreddit, RedditClient, API_BASE_URL, AUTH_BASE_URL};
pub use error::RedditError;
