//! Core types used throughout the collector.
//!
//! This module defines item identities, the records produced for each
//! captured item, their content metadata, and the per-run collection mapping.

use crate::page::PageError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Origin used when building canonical item URLs
pub const CANONICAL_ORIGIN: &str = "https://twitter.com";

/// Maximum preview length, in characters
pub const PREVIEW_CHARS: usize = 500;

/// Canonical deduplication key for a feed item.
///
/// Always of the form `https://twitter.com/<handle>/status/<id>`, so two
/// nodes carrying the same permalink map to the same identity regardless of
/// which host or path variant the anchor used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemIdentity(String);

impl ItemIdentity {
    /// Build the canonical identity from a parsed handle and numeric id
    pub fn from_parts(handle: &str, status_id: &str) -> Self {
        Self(format!("{}/{}/status/{}", CANONICAL_ORIGIN, handle, status_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trailing numeric id of the permalink
    pub fn status_id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ItemIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which of the two item shapes a record was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Plain text item, optionally with media and a quoted item
    Tweet,
    /// Composite item with a cover image, title and description
    Article,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Tweet => "tweet",
            ContentType::Article => "article",
        }
    }
}

/// Another item embedded inside a tweet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotedContent {
    /// Handle of the quoted author, without the leading `/`
    pub author: Option<String>,
    pub text: String,
}

/// Metadata for plain text items
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TweetMetadata {
    /// Number of photo containers, including ones without a resolvable source
    pub image_count: usize,
    pub image_urls: Vec<String>,
    pub has_video: bool,
    pub quote: Option<QuotedContent>,
    /// A "show more" affordance was still present when the item was captured
    pub has_show_more: bool,
}

/// Metadata for composite items
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
}

/// Content metadata: exactly one shape applies per item.
///
/// On the wire this is the flat `extra_data` object the remote store
/// expects, with the fields of the other shape left at null/false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ExtraData", try_from = "ExtraData")]
pub enum ContentMetadata {
    Tweet(TweetMetadata),
    Article(ArticleMetadata),
}

impl ContentMetadata {
    pub fn content_type(&self) -> ContentType {
        match self {
            ContentMetadata::Tweet(_) => ContentType::Tweet,
            ContentMetadata::Article(_) => ContentType::Article,
        }
    }
}

/// Flat wire form of [`ContentMetadata`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraData {
    pub content_type: String,
    #[serde(default)]
    pub has_images: bool,
    #[serde(default)]
    pub image_count: usize,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub has_video: bool,
    #[serde(default)]
    pub has_quote: bool,
    #[serde(default)]
    pub quoted_author: Option<String>,
    #[serde(default)]
    pub quoted_text: Option<String>,
    #[serde(default)]
    pub has_show_more: bool,
    #[serde(default)]
    pub article_title: Option<String>,
    #[serde(default)]
    pub article_description: Option<String>,
    #[serde(default)]
    pub article_cover_url: Option<String>,
}

impl From<ContentMetadata> for ExtraData {
    fn from(metadata: ContentMetadata) -> Self {
        match metadata {
            ContentMetadata::Tweet(tweet) => {
                let (has_quote, quoted_author, quoted_text) = match tweet.quote {
                    Some(quote) => (true, quote.author, Some(quote.text)),
                    None => (false, None, None),
                };
                Self {
                    content_type: ContentType::Tweet.as_str().to_string(),
                    has_images: tweet.image_count > 0,
                    image_count: tweet.image_count,
                    image_urls: tweet.image_urls,
                    has_video: tweet.has_video,
                    has_quote,
                    quoted_author,
                    quoted_text,
                    has_show_more: tweet.has_show_more,
                    ..Self::default()
                }
            }
            ContentMetadata::Article(article) => Self {
                content_type: ContentType::Article.as_str().to_string(),
                article_title: article.title,
                article_description: article.description,
                article_cover_url: article.cover_url,
                ..Self::default()
            },
        }
    }
}

impl TryFrom<ExtraData> for ContentMetadata {
    type Error = ExtraDataError;

    fn try_from(extra: ExtraData) -> Result<Self, Self::Error> {
        match extra.content_type.as_str() {
            "tweet" => {
                let quote = if extra.has_quote {
                    Some(QuotedContent {
                        author: extra.quoted_author,
                        text: extra.quoted_text.unwrap_or_default(),
                    })
                } else {
                    None
                };
                Ok(ContentMetadata::Tweet(TweetMetadata {
                    image_count: extra.image_count,
                    image_urls: extra.image_urls,
                    has_video: extra.has_video,
                    quote,
                    has_show_more: extra.has_show_more,
                }))
            }
            "article" => Ok(ContentMetadata::Article(ArticleMetadata {
                title: extra.article_title,
                description: extra.article_description,
                cover_url: extra.article_cover_url,
            })),
            other => Err(ExtraDataError::UnknownContentType(other.to_string())),
        }
    }
}

/// A captured feed item, as sent to the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedItem {
    pub url: ItemIdentity,
    pub preview_text: Option<String>,
    pub full_content: Option<String>,
    /// Reserved; threads are never expanded
    pub thread_content: Option<String>,
    pub extra_data: ContentMetadata,
}

/// Identity → item mapping owned by a single collection run.
///
/// Insertion is first-write-wins and the first-insertion order is kept for
/// the final batch and for per-cycle diagnostics.
#[derive(Debug, Default)]
pub struct Collection {
    items: HashMap<ItemIdentity, CollectedItem>,
    order: Vec<ItemIdentity>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, identity: &ItemIdentity) -> bool {
        self.items.contains_key(identity)
    }

    pub fn get(&self, identity: &ItemIdentity) -> Option<&CollectedItem> {
        self.items.get(identity)
    }

    /// Insert an item unless its identity is already present.
    ///
    /// Returns `true` if the item was inserted.
    pub fn insert(&mut self, item: CollectedItem) -> bool {
        if self.items.contains_key(&item.url) {
            return false;
        }
        self.order.push(item.url.clone());
        self.items.insert(item.url.clone(), item);
        true
    }

    /// Identities in first-insertion order
    pub fn identities(&self) -> impl Iterator<Item = &ItemIdentity> {
        self.order.iter()
    }

    /// Consume the mapping, returning at most `limit` items in first-inserted order
    pub fn into_batch(self, limit: usize) -> Vec<CollectedItem> {
        let Collection { mut items, order } = self;
        order
            .into_iter()
            .take(limit)
            .filter_map(|identity| items.remove(&identity))
            .collect()
    }
}

/// Errors decoding wire metadata
#[derive(Debug, thiserror::Error)]
pub enum ExtraDataError {
    #[error("Unknown content_type: {0}")]
    UnknownContentType(String),
}

/// Errors that abort a collection run
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("Page error: {0}")]
    Page(#[from] PageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tweet_item(handle: &str, id: &str, text: &str) -> CollectedItem {
        CollectedItem {
            url: ItemIdentity::from_parts(handle, id),
            preview_text: Some(text.to_string()),
            full_content: Some(text.to_string()),
            thread_content: None,
            extra_data: ContentMetadata::Tweet(TweetMetadata::default()),
        }
    }

    #[test]
    fn test_identity_from_parts() {
        let identity = ItemIdentity::from_parts("alice", "123");
        assert_eq!(identity.as_str(), "https://twitter.com/alice/status/123");
        assert_eq!(identity.status_id(), "123");
        assert_eq!(identity.to_string(), identity.as_str());
    }

    #[test]
    fn test_content_type_as_str() {
        assert_eq!(ContentType::Tweet.as_str(), "tweet");
        assert_eq!(ContentType::Article.as_str(), "article");
    }

    #[test]
    fn test_tweet_metadata_wire_form() {
        let metadata = ContentMetadata::Tweet(TweetMetadata {
            image_count: 2,
            image_urls: vec!["https://pbs.example/a.jpg".to_string()],
            has_video: true,
            quote: Some(QuotedContent {
                author: Some("bob".to_string()),
                text: "quoted".to_string(),
            }),
            has_show_more: false,
        });

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["content_type"], "tweet");
        assert_eq!(json["has_images"], true);
        assert_eq!(json["image_count"], 2);
        assert_eq!(json["has_quote"], true);
        assert_eq!(json["quoted_author"], "bob");
        assert!(json["article_title"].is_null());
        assert!(json["article_cover_url"].is_null());
    }

    #[test]
    fn test_article_metadata_leaves_tweet_fields_default() {
        let metadata = ContentMetadata::Article(ArticleMetadata {
            title: Some("Title".to_string()),
            description: None,
            cover_url: Some("https://pbs.example/cover.jpg".to_string()),
        });

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["content_type"], "article");
        assert_eq!(json["article_title"], "Title");
        assert_eq!(json["has_images"], false);
        assert_eq!(json["image_count"], 0);
        assert_eq!(json["has_video"], false);
        assert_eq!(json["has_quote"], false);
        assert!(json["quoted_text"].is_null());
        assert_eq!(json["image_urls"], serde_json::json!([]));
    }

    #[test]
    fn test_metadata_decode_ignores_foreign_fields() {
        let json = serde_json::json!({
            "content_type": "article",
            "has_video": true,
            "article_title": "Long read"
        });

        let metadata: ContentMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(
            metadata,
            ContentMetadata::Article(ArticleMetadata {
                title: Some("Long read".to_string()),
                ..ArticleMetadata::default()
            })
        );
    }

    #[test]
    fn test_metadata_decode_rejects_unknown_type() {
        let json = serde_json::json!({ "content_type": "thread" });
        let result: Result<ContentMetadata, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_collection_first_write_wins() {
        let mut collection = Collection::new();
        assert!(collection.insert(tweet_item("alice", "1", "first")));
        assert!(!collection.insert(tweet_item("alice", "1", "second")));

        assert_eq!(collection.len(), 1);
        let stored = collection
            .get(&ItemIdentity::from_parts("alice", "1"))
            .unwrap();
        assert_eq!(stored.full_content.as_deref(), Some("first"));
    }

    #[test]
    fn test_collection_batch_keeps_insertion_order() {
        let mut collection = Collection::new();
        for id in ["30", "10", "20"] {
            collection.insert(tweet_item("alice", id, id));
        }

        let batch = collection.into_batch(2);
        let ids: Vec<_> = batch.iter().map(|item| item.url.status_id()).collect();
        assert_eq!(ids, vec!["30", "10"]);
    }

    #[test]
    fn test_collection_batch_smaller_than_limit() {
        let mut collection = Collection::new();
        collection.insert(tweet_item("alice", "1", "only"));

        assert_eq!(collection.into_batch(50).len(), 1);
    }

    #[test]
    fn test_collected_item_serializes_thread_content_null() {
        let json = serde_json::to_value(tweet_item("alice", "1", "hi")).unwrap();
        assert_eq!(json["url"], "https://twitter.com/alice/status/1");
        assert!(json["thread_content"].is_null());
        assert_eq!(json["extra_data"]["content_type"], "tweet");
    }
}
