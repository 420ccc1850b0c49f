//! In-memory virtualized feed.
//!
//! Behaves like the host timeline as far as the collector can observe:
//! rows have a fixed height, only rows near the viewport are mounted, more
//! rows are loaded when the viewport reaches the end of what is loaded, and
//! clicking a "show more" affordance swaps in the item's expanded markup.
//! Used by the test suites and for dry runs without a browser.

use super::{FeedPage, NodeHandle, PageError};
use scraper::{ElementRef, Html, Selector};
use std::ops::Range;
use tracing::trace;

const DEFAULT_URL: &str = "https://x.com/i/bookmarks";
const DEFAULT_ROW_HEIGHT: u64 = 300;
const DEFAULT_VIEWPORT_HEIGHT: u64 = 900;
const DEFAULT_OVERSCAN_ROWS: u64 = 1;

/// One row of the simulated feed
#[derive(Debug, Clone)]
pub struct FeedEntry {
    markup: String,
    expanded: Option<String>,
    is_expanded: bool,
}

impl FeedEntry {
    /// Row with arbitrary inner markup
    pub fn raw(markup: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
            expanded: None,
            is_expanded: false,
        }
    }

    /// Plain text item at `/<handle>/status/<id>`
    pub fn tweet(handle: &str, id: &str, text: &str) -> Self {
        Self::raw(tweet_markup(handle, id, text, false))
    }

    /// Truncated item whose full text appears once "show more" is clicked
    pub fn truncated(handle: &str, id: &str, short: &str, full: &str) -> Self {
        Self {
            markup: tweet_markup(handle, id, short, true),
            expanded: Some(tweet_markup(handle, id, full, false)),
            is_expanded: false,
        }
    }

    /// Composite item with a cover, title and description
    pub fn article(handle: &str, id: &str, title: &str, description: &str) -> Self {
        Self::raw(format!(
            r#"<a href="/{handle}/status/{id}"><time>1h</time></a>
<div data-testid="article-cover-image"><img src="https://pbs.example/{id}/cover.jpg"></div>
<div class="css-175oi2r r-xyw6el"><div dir="auto">{title}</div><div dir="auto">{description}</div></div>"#
        ))
    }

    /// Row whose only link is `href`
    pub fn link(href: &str, text: &str) -> Self {
        Self::raw(format!(
            r#"<a href="{href}">link</a><div data-testid="tweetText">{text}</div>"#
        ))
    }

    fn current_markup(&self) -> &str {
        match (&self.expanded, self.is_expanded) {
            (Some(expanded), true) => expanded,
            _ => &self.markup,
        }
    }
}

fn tweet_markup(handle: &str, id: &str, text: &str, truncated: bool) -> String {
    let show_more = if truncated {
        r#"<button data-testid="tweet-text-show-more-link">Show more</button>"#
    } else {
        ""
    };
    format!(
        r#"<div data-testid="User-Name"><a href="/{handle}">@{handle}</a><a href="/{handle}/status/{id}"><time>1h</time></a></div>
<div data-testid="tweetText"><span>{text}</span></div>{show_more}
<a href="/{handle}/status/{id}/analytics">views</a>"#
    )
}

/// Virtualized, lazily loaded feed of [`FeedEntry`] rows
#[derive(Debug)]
pub struct VirtualFeed {
    url: String,
    entries: Vec<FeedEntry>,
    row_height: u64,
    viewport_height: u64,
    overscan_rows: u64,
    page_size: usize,
    loaded: usize,
    scroll_y: u64,
    failing_clicks: bool,
    clicks: usize,
}

impl VirtualFeed {
    /// Feed with every row loaded up front and default geometry
    pub fn new(entries: Vec<FeedEntry>) -> Self {
        let loaded = entries.len();
        Self {
            url: DEFAULT_URL.to_string(),
            entries,
            row_height: DEFAULT_ROW_HEIGHT,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            overscan_rows: DEFAULT_OVERSCAN_ROWS,
            page_size: loaded,
            loaded,
            scroll_y: 0,
            failing_clicks: false,
            clicks: 0,
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn with_geometry(mut self, row_height: u64, viewport_height: u64, overscan_rows: u64) -> Self {
        self.row_height = row_height.max(1);
        self.viewport_height = viewport_height;
        self.overscan_rows = overscan_rows;
        self
    }

    /// Load rows `page_size` at a time as the viewport reaches the end
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self.loaded = self.page_size.min(self.entries.len());
        self
    }

    /// Make every click fail, as a detached or obscured element would
    pub fn with_failing_clicks(mut self) -> Self {
        self.failing_clicks = true;
        self
    }

    /// Rows currently mounted
    pub fn mounted_range(&self) -> Range<usize> {
        let first_visible = self.scroll_y / self.row_height;
        let last_visible = (self.scroll_y + self.viewport_height).div_ceil(self.row_height);
        let start = first_visible.saturating_sub(self.overscan_rows) as usize;
        let end = ((last_visible + self.overscan_rows) as usize).min(self.loaded);
        start.min(end)..end
    }

    pub fn loaded(&self) -> usize {
        self.loaded
    }

    pub fn clicks(&self) -> usize {
        self.clicks
    }

    fn max_scroll(&self) -> u64 {
        (self.loaded as u64 * self.row_height).saturating_sub(self.viewport_height)
    }

    fn load_more_if_at_end(&mut self) {
        if self.loaded >= self.entries.len() {
            return;
        }
        let loaded_height = self.loaded as u64 * self.row_height;
        if self.scroll_y + self.viewport_height + self.row_height >= loaded_height {
            self.loaded = (self.loaded + self.page_size).min(self.entries.len());
            trace!("Simulated feed loaded {} rows", self.loaded);
        }
    }

    fn markup(&self) -> String {
        let range = self.mounted_range();
        let mut html = String::from("<html><head></head><body><main><div>");
        html.push_str(&format!(
            r#"<div style="height: {}px"></div>"#,
            range.start as u64 * self.row_height
        ));
        for row in range {
            html.push_str(&format!(
                r#"<article data-testid="tweet" data-row="{}">{}</article>"#,
                row,
                self.entries[row].current_markup()
            ));
        }
        html.push_str("</div></main></body></html>");
        html
    }
}

#[async_trait::async_trait]
impl FeedPage for VirtualFeed {
    async fn location(&mut self) -> Result<String, PageError> {
        Ok(self.url.clone())
    }

    async fn render(&mut self) -> Result<String, PageError> {
        Ok(self.markup())
    }

    async fn scroll_position(&mut self) -> Result<u64, PageError> {
        Ok(self.scroll_y)
    }

    async fn scroll_to(&mut self, y: u64) -> Result<(), PageError> {
        self.scroll_y = y.min(self.max_scroll());
        self.load_more_if_at_end();
        Ok(())
    }

    async fn scroll_extent(&mut self) -> Result<u64, PageError> {
        Ok(self.max_scroll())
    }

    async fn query_all(&mut self, selector: &str) -> Result<Vec<NodeHandle>, PageError> {
        let selector = Selector::parse(selector)
            .map_err(|e| PageError::Script(format!("invalid selector {}: {}", selector, e)))?;
        let document = Html::parse_document(&self.markup());

        let mut handles = Vec::new();
        for (ordinal, element) in document.select(&selector).enumerate() {
            let row = element
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find_map(|ancestor| ancestor.value().attr("data-row"));
            if let Some(row) = row {
                handles.push(NodeHandle(format!("{}:{}", row, ordinal)));
            }
        }
        Ok(handles)
    }

    async fn click(&mut self, node: &NodeHandle) -> Result<(), PageError> {
        if self.failing_clicks {
            return Err(PageError::Driver(format!("click on {} intercepted", node.as_str())));
        }

        let row: usize = node
            .as_str()
            .split(':')
            .next()
            .and_then(|row| row.parse().ok())
            .ok_or_else(|| PageError::StaleNode(node.as_str().to_string()))?;

        if !self.mounted_range().contains(&row) {
            return Err(PageError::StaleNode(node.as_str().to_string()));
        }

        self.clicks += 1;
        let entry = &mut self.entries[row];
        if entry.expanded.is_some() {
            entry.is_expanded = true;
        }
        Ok(())
    }
}
