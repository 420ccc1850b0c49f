//! DOM markers of the bookmarks timeline.
//!
//! The source application renders every item as an `<article>` tagged with
//! test identifiers. The two class fragments used for composite items are
//! generated class names and are the first thing to check when extraction
//! of articles starts returning empty content.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Selector};

pub const ITEM: &str = r#"article[data-testid="tweet"]"#;
pub const STATUS_LINK: &str = r#"a[href*="/status/"]"#;
pub const SHOW_MORE: &str = r#"[data-testid="tweet-text-show-more-link"]"#;
pub const ARTICLE_COVER: &str = r#"[data-testid="article-cover-image"]"#;
pub const TWEET_TEXT: &str = r#"[data-testid="tweetText"]"#;
pub const QUOTE_CONTAINER: &str = r#"[role="link"][tabindex="0"]"#;
pub const USER_NAME: &str = r#"[data-testid="User-Name"]"#;
pub const ROOT_RELATIVE_LINK: &str = r#"a[href^="/"]"#;
pub const PHOTO: &str = r#"[data-testid="tweetPhoto"]"#;
pub const VIDEO: &str = r#"[data-testid="videoPlayer"]"#;
pub const ARTICLE_CONTENT: &str = r#"[class*="r-xyw6el"]"#;
pub const AUTO_DIR_TEXT: &str = r#"div[dir="auto"]"#;
pub const PROMINENT_SPAN: &str = r#"span[class*="r-bcqeeo"]"#;

/// Handle reserved for internal links (`/i/...`)
pub const RESERVED_HANDLE: &str = "i";

/// Path fragments of views that are about an item rather than the item itself
pub const NON_ITEM_VIEWS: &[&str] = &["/analytics", "/retweets"];

/// Compiled selectors, built once
pub(crate) struct Selectors {
    pub item: Selector,
    pub status_link: Selector,
    pub show_more: Selector,
    pub article_cover: Selector,
    pub tweet_text: Selector,
    pub quote_container: Selector,
    pub user_name: Selector,
    pub root_relative_link: Selector,
    pub photo: Selector,
    pub video: Selector,
    pub article_content: Selector,
    pub auto_dir_text: Selector,
    pub prominent_span: Selector,
    pub img: Selector,
    pub any_test_id: Selector,
    pub any_link: Selector,
    pub path_link: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            item: Selector::parse(ITEM).expect("item selector"),
            status_link: Selector::parse(STATUS_LINK).expect("status link selector"),
            show_more: Selector::parse(SHOW_MORE).expect("show more selector"),
            article_cover: Selector::parse(ARTICLE_COVER).expect("article cover selector"),
            tweet_text: Selector::parse(TWEET_TEXT).expect("tweet text selector"),
            quote_container: Selector::parse(QUOTE_CONTAINER).expect("quote selector"),
            user_name: Selector::parse(USER_NAME).expect("user name selector"),
            root_relative_link: Selector::parse(ROOT_RELATIVE_LINK).expect("link selector"),
            photo: Selector::parse(PHOTO).expect("photo selector"),
            video: Selector::parse(VIDEO).expect("video selector"),
            article_content: Selector::parse(ARTICLE_CONTENT).expect("article content selector"),
            auto_dir_text: Selector::parse(AUTO_DIR_TEXT).expect("auto dir selector"),
            prominent_span: Selector::parse(PROMINENT_SPAN).expect("span selector"),
            img: Selector::parse("img").expect("img selector"),
            any_test_id: Selector::parse("[data-testid]").expect("test id selector"),
            any_link: Selector::parse("a[href]").expect("href selector"),
            path_link: Selector::parse(r#"a[href*="/"]"#).expect("path link selector"),
        }
    }
}

lazy_static! {
    pub(crate) static ref SELECTORS: Selectors = Selectors::new();

    // Two-segment permalink: /<handle>/status/<numeric id>
    pub(crate) static ref PERMALINK: Regex = Regex::new(
        r"/([^/]+)/status/(\d+)"
    ).unwrap();
}

/// Descendants of `root` matching `selector`, in document order, excluding `root` itself
pub(crate) fn matching<'a, 'b>(
    root: ElementRef<'a>,
    selector: &'b Selector,
) -> impl Iterator<Item = ElementRef<'a>> + 'b
where
    'a: 'b,
{
    let root_id = root.id();
    root.select(selector).filter(move |el| el.id() != root_id)
}

/// First descendant of `root` matching `selector`
pub(crate) fn first<'a>(root: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    matching(root, selector).next()
}
