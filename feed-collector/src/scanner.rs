//! Visible-item scanning.
//!
//! [`identify`] is the one place that decides whether a rendered item is
//! capturable and under which identity. The scan path uses the decision
//! alone; the diagnostic path wraps the same decision with evidence through
//! [`inspect`], so both modes always agree on what would be captured.

use crate::extract::{extract, inner_text, truncate_chars};
use crate::selectors::{first, matching, NON_ITEM_VIEWS, PERMALINK, RESERVED_HANDLE, SELECTORS};
use crate::types::{CollectedItem, Collection, ItemIdentity};
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

/// Length of the text preview carried in diagnostics
const EVIDENCE_PREVIEW_CHARS: usize = 200;

/// Alternative links recorded for items without an identity anchor
const MAX_ALTERNATIVE_LINKS: usize = 5;

/// Why a rendered item is not captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    /// No anchor pointing at a status permalink
    NoIdentityAnchor,
    /// The anchor does not have the `/<handle>/status/<id>` shape
    PatternMismatch,
    /// The handle is the reserved internal one
    ReservedHandle,
    /// The anchor targets an analytics or reshare-listing view
    NonItemView,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoIdentityAnchor => "NO_IDENTITY_ANCHOR",
            SkipReason::PatternMismatch => "PATTERN_MISMATCH",
            SkipReason::ReservedHandle => "RESERVED_HANDLE",
            SkipReason::NonItemView => "NON_ITEM_VIEW",
        }
    }
}

/// Parsed permalink of a capturable item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permalink {
    pub identity: ItemIdentity,
    pub handle: String,
    pub status_id: String,
    pub href: String,
}

/// Outcome of classifying one rendered item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureDecision {
    Capture(Permalink),
    Skip(SkipReason),
}

impl CaptureDecision {
    pub fn would_capture(&self) -> bool {
        matches!(self, CaptureDecision::Capture(_))
    }
}

/// Decide whether an item is capturable
pub fn identify(item: ElementRef<'_>) -> CaptureDecision {
    match status_link_href(item) {
        Some(href) => classify_href(href),
        None => CaptureDecision::Skip(SkipReason::NoIdentityAnchor),
    }
}

/// Decide from the identity anchor's `href` alone
pub fn classify_href(href: &str) -> CaptureDecision {
    let Some(caps) = PERMALINK.captures(href) else {
        return CaptureDecision::Skip(SkipReason::PatternMismatch);
    };
    let handle = &caps[1];
    let status_id = &caps[2];

    if handle == RESERVED_HANDLE {
        return CaptureDecision::Skip(SkipReason::ReservedHandle);
    }
    if NON_ITEM_VIEWS.iter().any(|view| href.contains(view)) {
        return CaptureDecision::Skip(SkipReason::NonItemView);
    }

    CaptureDecision::Capture(Permalink {
        identity: ItemIdentity::from_parts(handle, status_id),
        handle: handle.to_string(),
        status_id: status_id.to_string(),
        href: href.to_string(),
    })
}

fn status_link_href(item: ElementRef<'_>) -> Option<&str> {
    first(item, &SELECTORS.status_link).and_then(|link| link.value().attr("href"))
}

/// All item candidates in the document, in document order
pub fn candidates(document: &Html) -> impl Iterator<Item = ElementRef<'_>> {
    document.select(&SELECTORS.item)
}

/// Counters for one scan pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub candidates: usize,
    pub inserted: usize,
    pub already_collected: usize,
    pub skipped: usize,
}

/// Capture every new item in `document` into `collection`.
///
/// Safe to call on every cycle: items are keyed by their derived identity,
/// so re-rendered or remounted nodes are never inserted twice.
pub fn scan(document: &Html, collection: &mut Collection) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();

    for (index, item) in candidates(document).enumerate() {
        outcome.candidates += 1;

        let link = match identify(item) {
            CaptureDecision::Capture(link) => link,
            CaptureDecision::Skip(reason) => {
                debug!(
                    "Item {}: skipped ({}) {}",
                    index,
                    reason.as_str(),
                    status_link_href(item).unwrap_or("no-href")
                );
                outcome.skipped += 1;
                continue;
            }
        };

        if collection.contains(&link.identity) {
            trace!("Item {}: already collected {}", index, link.identity);
            outcome.already_collected += 1;
            continue;
        }

        let content = extract(item);
        debug!(
            "Item {}: collected {} {} ({} chars)",
            index,
            content.extra_data.content_type().as_str(),
            link.identity,
            content.full_content.as_ref().map_or(0, |text| text.len())
        );

        collection.insert(CollectedItem {
            url: link.identity,
            preview_text: content.preview_text,
            full_content: content.full_content,
            thread_content: None,
            extra_data: content.extra_data,
        });
        outcome.inserted += 1;
    }

    outcome
}

/// Capture decision plus the evidence behind it, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    pub index: usize,
    pub would_capture: bool,
    pub skip_reason: Option<SkipReason>,

    pub has_status_link: bool,
    pub status_link_href: Option<String>,
    pub extracted_url: Option<ItemIdentity>,
    pub extracted_username: Option<String>,

    pub has_article_cover: bool,
    pub has_tweet_text: bool,
    pub has_video: bool,
    pub has_images: bool,
    pub image_count: usize,

    pub data_test_ids: Vec<String>,
    pub all_hrefs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternative_links: Vec<String>,
    pub text_preview: Option<String>,

    pub tag_name: String,
    #[serde(rename = "outerHTMLLength")]
    pub outer_html_length: usize,
    pub fingerprint: String,
}

impl Inspection {
    /// The link to report for a skipped item
    pub fn reported_href(&self) -> &str {
        self.status_link_href
            .as_deref()
            .or_else(|| self.all_hrefs.first().map(String::as_str))
            .unwrap_or("no-href")
    }
}

/// Classify an item and gather evidence about it
pub fn inspect(item: ElementRef<'_>, index: usize) -> Inspection {
    let decision = identify(item);
    let status_link_href = status_link_href(item).map(str::to_string);

    let extracted_username = status_link_href
        .as_deref()
        .and_then(|href| PERMALINK.captures(href))
        .map(|caps| caps[1].to_string());

    let (would_capture, skip_reason, extracted_url) = match decision {
        CaptureDecision::Capture(link) => (true, None, Some(link.identity)),
        CaptureDecision::Skip(reason) => (false, Some(reason), None),
    };

    let alternative_links = if status_link_href.is_none() {
        matching(item, &SELECTORS.path_link)
            .filter_map(|link| link.value().attr("href"))
            .take(MAX_ALTERNATIVE_LINKS)
            .map(str::to_string)
            .collect()
    } else {
        Vec::new()
    };

    let image_count = matching(item, &SELECTORS.photo).count();
    let has_article_cover = first(item, &SELECTORS.article_cover).is_some();
    let tweet_text = first(item, &SELECTORS.tweet_text);

    let text_preview = match tweet_text {
        Some(text) => Some(truncate_chars(&inner_text(text), EVIDENCE_PREVIEW_CHARS)),
        None if has_article_cover => first(item, &SELECTORS.article_content)
            .and_then(|container| first(container, &SELECTORS.auto_dir_text))
            .map(|title| truncate_chars(&inner_text(title), EVIDENCE_PREVIEW_CHARS)),
        None => None,
    };

    let outer_html = item.html();

    Inspection {
        index,
        would_capture,
        skip_reason,
        has_status_link: status_link_href.is_some(),
        status_link_href,
        extracted_url,
        extracted_username,
        has_article_cover,
        has_tweet_text: tweet_text.is_some(),
        has_video: first(item, &SELECTORS.video).is_some(),
        has_images: image_count > 0,
        image_count,
        data_test_ids: unique_attrs(item, &SELECTORS.any_test_id, "data-testid"),
        all_hrefs: unique_attrs(item, &SELECTORS.any_link, "href"),
        alternative_links,
        text_preview,
        tag_name: item.value().name().to_uppercase(),
        outer_html_length: outer_html.len(),
        fingerprint: short_hash(&outer_html),
    }
}

/// Distinct non-empty values of `attr` across matching descendants, first-seen order
fn unique_attrs(item: ElementRef<'_>, selector: &scraper::Selector, attr: &str) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    for value in matching(item, selector).filter_map(|el| el.value().attr(attr)) {
        if !value.is_empty() && !values.iter().any(|seen| seen == value) {
            values.push(value.to_string());
        }
    }
    values
}

/// First 12 hex chars of the SHA-256 of `content`
fn short_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = hasher.finalize();
    hash.iter().take(6).map(|byte| format!("{:02x}", byte)).collect()
}
