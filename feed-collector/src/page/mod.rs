//! The host document the collector drives.
//!
//! A [`FeedPage`] is a live, externally mutated document: the host
//! application mounts and unmounts items between any two calls. Callers
//! re-render after every suspension instead of keeping node references
//! around; the only references that survive an await are [`NodeHandle`]s,
//! which may go stale and are checked on use.

pub mod chrome;
pub mod simulated;

pub use chrome::ChromePage;
pub use simulated::{FeedEntry, VirtualFeed};

/// Opaque reference to an element found by [`FeedPage::query_all`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub(crate) String);

impl NodeHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Errors raised by a page driver
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("Element is no longer mounted: {0}")]
    StaleNode(String),

    #[error("Script returned an unexpected value: {0}")]
    Script(String),

    #[error("Page unavailable: {0}")]
    Unavailable(String),
}

/// DOM-like document exposing the operations the collector needs
#[async_trait::async_trait]
pub trait FeedPage: Send {
    /// Address of the loaded document
    async fn location(&mut self) -> Result<String, PageError>;

    /// Serialized markup of everything currently mounted
    async fn render(&mut self) -> Result<String, PageError>;

    /// Current vertical scroll offset in pixels
    async fn scroll_position(&mut self) -> Result<u64, PageError>;

    /// Scroll to a vertical offset; drivers clamp to the valid range
    async fn scroll_to(&mut self, y: u64) -> Result<(), PageError>;

    /// Largest reachable vertical scroll offset
    async fn scroll_extent(&mut self) -> Result<u64, PageError>;

    /// Handles to every element currently matching `selector`, in document order
    async fn query_all(&mut self, selector: &str) -> Result<Vec<NodeHandle>, PageError>;

    /// Activate (click) an element
    async fn click(&mut self, node: &NodeHandle) -> Result<(), PageError>;
}
