//! Content extraction for a single rendered feed item.
//!
//! Extraction is a pure function of one `<article>` node. It never fails:
//! when nothing readable is found the text fields are left empty.

use crate::selectors::{first, matching, SELECTORS};
use crate::types::{
    ArticleMetadata, ContentMetadata, QuotedContent, TweetMetadata, PREVIEW_CHARS,
};
use scraper::node::Node;
use scraper::ElementRef;

/// Minimum length of a fallback text span for composite items
const FALLBACK_MIN_CHARS: usize = 20;

/// Text and metadata read from one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    pub preview_text: Option<String>,
    pub full_content: Option<String>,
    pub extra_data: ContentMetadata,
}

/// Classify an item and extract its record
pub fn extract(item: ElementRef<'_>) -> ExtractedContent {
    match first(item, &SELECTORS.article_cover) {
        Some(cover) => extract_article(item, cover),
        None => extract_tweet(item),
    }
}

fn extract_article(item: ElementRef<'_>, cover: ElementRef<'_>) -> ExtractedContent {
    let cover_url = first(cover, &SELECTORS.img)
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string);

    let mut title = None;
    let mut description = None;
    let mut preview_text = None;
    let mut full_content = None;

    if let Some(container) = first(item, &SELECTORS.article_content) {
        let mut blocks = matching(container, &SELECTORS.auto_dir_text);

        if let Some(block) = blocks.next() {
            let text = inner_text(block);
            preview_text = Some(text.clone());
            full_content = Some(text.clone());
            title = Some(text);
        }
        if let Some(block) = blocks.next() {
            let text = inner_text(block);
            full_content = Some(format!(
                "{}\n\n{}",
                title.as_deref().unwrap_or_default(),
                text
            ));
            description = Some(text);
        }
    }

    if full_content.as_deref().map_or(true, str::is_empty) {
        let fallback = matching(item, &SELECTORS.prominent_span)
            .map(inner_text)
            .find(|text| text.chars().count() > FALLBACK_MIN_CHARS && !text.starts_with('@'));

        if let Some(text) = fallback {
            preview_text = Some(truncate_chars(&text, PREVIEW_CHARS));
            full_content = Some(text);
        }
    }

    ExtractedContent {
        preview_text,
        full_content,
        extra_data: ContentMetadata::Article(ArticleMetadata {
            title,
            description,
            cover_url,
        }),
    }
}

fn extract_tweet(item: ElementRef<'_>) -> ExtractedContent {
    let has_show_more = first(item, &SELECTORS.show_more).is_some();

    // The first text block is the item's own unless it sits inside the quoted item
    let texts: Vec<ElementRef<'_>> = matching(item, &SELECTORS.tweet_text).collect();
    let own_text = match texts.first() {
        Some(block) if !inside_quote(*block, item) => Some(*block),
        Some(_) => texts.get(1).copied(),
        None => None,
    };

    let full_content = own_text.map(inner_text);
    let preview_text = full_content
        .as_deref()
        .map(|text| truncate_chars(text, PREVIEW_CHARS));

    let quote = first(item, &SELECTORS.quote_container).and_then(|section| {
        let text = first(section, &SELECTORS.tweet_text)?;
        let author = first(section, &SELECTORS.user_name)
            .and_then(|name| first(name, &SELECTORS.root_relative_link))
            .and_then(|link| link.value().attr("href"))
            .map(|href| href.strip_prefix('/').unwrap_or(href).to_string());

        Some(QuotedContent {
            author,
            text: inner_text(text),
        })
    });

    let photos: Vec<ElementRef<'_>> = matching(item, &SELECTORS.photo).collect();
    let image_urls = photos
        .iter()
        .filter_map(|photo| first(*photo, &SELECTORS.img))
        .filter_map(|img| img.value().attr("src"))
        .filter(|src| !src.is_empty())
        .map(str::to_string)
        .collect();

    let has_video = first(item, &SELECTORS.video).is_some();

    ExtractedContent {
        preview_text,
        full_content,
        extra_data: ContentMetadata::Tweet(TweetMetadata {
            image_count: photos.len(),
            image_urls,
            has_video,
            quote,
            has_show_more,
        }),
    }
}

/// Whether `node` lies inside a quoted-item container below `root`
fn inside_quote(node: ElementRef<'_>, root: ElementRef<'_>) -> bool {
    let root_id = root.id();
    node.ancestors()
        .take_while(|ancestor| ancestor.id() != root_id)
        .filter_map(ElementRef::wrap)
        .any(|el| el.value().attr("role") == Some("link") && el.value().attr("tabindex") == Some("0"))
}

/// Rendered text of an element: text nodes in order, `<br>` as a line break.
///
/// Runs of spaces collapse to one and whitespace-only nodes between elements
/// count as a single space. Line breaks inside a text node, or a node made
/// only of line breaks, are kept, as the feed renders item text with
/// preserved line breaks.
pub(crate) fn inner_text(element: ElementRef<'_>) -> String {
    let mut text = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Text(piece) => push_text(&mut text, piece),
            Node::Element(el) if el.name() == "br" => push_break(&mut text),
            _ => {}
        }
    }
    text.trim().to_string()
}

fn push_text(out: &mut String, piece: &str) {
    // A bare newline node is a line break in item text, not indentation
    if !piece.is_empty() && piece.chars().all(|c| c == '\n') {
        piece.chars().for_each(|_| push_break(out));
        return;
    }
    if piece.trim().is_empty() {
        if !piece.is_empty() {
            push_space(out);
        }
        return;
    }

    let mut pending_space = false;
    for ch in piece.chars() {
        if ch == '\n' {
            push_break(out);
            pending_space = false;
        } else if ch.is_whitespace() {
            pending_space = true;
        } else {
            if pending_space {
                push_space(out);
                pending_space = false;
            }
            out.push(ch);
        }
    }
    if pending_space {
        push_space(out);
    }
}

fn push_space(out: &mut String) {
    if !out.is_empty() && !out.ends_with(|c: char| c == ' ' || c == '\n') {
        out.push(' ');
    }
}

fn push_break(out: &mut String) {
    while out.ends_with(' ') {
        out.pop();
    }
    out.push('\n');
}

/// First `max_chars` characters of `text`
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
