//! Scroll-cycle controller.
//!
//! Drives the feed through `Init → Scanning ⇄ Advancing → Done`. Each
//! Scanning phase works on a fresh render of the page; nothing borrowed
//! from a snapshot survives into the next suspension.

use crate::expand::expand_truncated;
use crate::page::FeedPage;
use crate::scanner::{scan, ScanOutcome};
use crate::types::{CollectError, CollectedItem, Collection};
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// How far each Advancing phase scrolls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollStrategy {
    /// Advance by a fixed step smaller than the viewport, so every item is
    /// mounted during at least one scan
    Incremental { step_px: u64 },
    /// Jump straight to the current end of the page. Items the host
    /// virtualizes away in between are never scanned.
    JumpToEnd,
}

pub const DEFAULT_STEP_PX: u64 = 800;

/// Pacing and termination parameters of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollPolicy {
    pub strategy: ScrollStrategy,
    /// Wait after each scroll before expanding and scanning
    pub settle: Duration,
    /// Wait after each expansion click
    pub expand_pause: Duration,
    /// Wait before re-checking that the page is still at its end
    pub end_grace: Duration,
    /// Consecutive cycles without growth before giving up
    pub no_growth_limit: u32,
}

impl ScrollPolicy {
    pub fn incremental() -> Self {
        Self {
            strategy: ScrollStrategy::Incremental {
                step_px: DEFAULT_STEP_PX,
            },
            settle: Duration::from_millis(800),
            expand_pause: Duration::from_millis(300),
            end_grace: Duration::from_millis(1000),
            no_growth_limit: 5,
        }
    }

    pub fn jump_to_end() -> Self {
        Self {
            strategy: ScrollStrategy::JumpToEnd,
            settle: Duration::from_millis(1500),
            expand_pause: Duration::from_millis(300),
            end_grace: Duration::from_millis(1000),
            no_growth_limit: 3,
        }
    }

    /// Same policy with every wait removed
    pub fn without_pauses(mut self) -> Self {
        self.settle = Duration::ZERO;
        self.expand_pause = Duration::ZERO;
        self.end_grace = Duration::ZERO;
        self
    }
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self::incremental()
    }
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    BatchLimit,
    NoGrowth,
    EndOfFeed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CyclePhase {
    Init,
    Scanning,
    Advancing,
    Done(StopReason),
}

/// Hook invoked around every scan, used by the diagnostic mode.
///
/// Cycle numbers start at 1.
pub trait CycleObserver: Send {
    fn before_scan(&mut self, _cycle: u32, _document: &Html, _collection: &Collection) {}

    fn after_scan(&mut self, _cycle: u32, _outcome: &ScanOutcome, _collection: &Collection) {}
}

/// Observer that does nothing
pub struct NoopObserver;

impl CycleObserver for NoopObserver {}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct CollectionRun {
    /// Captured items in first-inserted order, at most the batch limit
    pub items: Vec<CollectedItem>,
    pub stop_reason: StopReason,
    /// Number of scans performed
    pub cycles: u32,
    /// Distinct items captured before truncation to the batch limit
    pub discovered: usize,
}

/// Runs the scroll/expand/scan loop over a page
pub struct ScrollCollector {
    policy: ScrollPolicy,
    batch_limit: usize,
}

impl ScrollCollector {
    pub fn new(policy: ScrollPolicy, batch_limit: usize) -> Self {
        Self {
            policy,
            batch_limit,
        }
    }

    /// Collect until a stop condition holds
    pub async fn run<P>(&self, page: &mut P) -> Result<CollectionRun, CollectError>
    where
        P: FeedPage + ?Sized,
    {
        self.run_observed(page, &mut NoopObserver).await
    }

    /// Collect, reporting every scan to `observer`
    pub async fn run_observed<P, O>(
        &self,
        page: &mut P,
        observer: &mut O,
    ) -> Result<CollectionRun, CollectError>
    where
        P: FeedPage + ?Sized,
        O: CycleObserver + ?Sized,
    {
        let mut collection = Collection::new();
        let mut cycles: u32 = 0;
        let mut idle_cycles: u32 = 0;
        let mut at_end = false;
        let mut phase = CyclePhase::Init;

        info!(
            "Starting collection: limit {}, strategy {:?}",
            self.batch_limit, self.policy.strategy
        );

        let stop_reason = loop {
            phase = match phase {
                CyclePhase::Init => {
                    expand_truncated(page, self.policy.expand_pause).await;
                    CyclePhase::Scanning
                }

                CyclePhase::Scanning => {
                    let markup = page.render().await?;
                    cycles += 1;
                    let outcome = scan_snapshot(cycles, &markup, &mut collection, observer);

                    debug!(
                        "Cycle {}: {} candidates, {} new, {} skipped, {} total",
                        cycles,
                        outcome.candidates,
                        outcome.inserted,
                        outcome.skipped,
                        collection.len()
                    );

                    if collection.len() >= self.batch_limit {
                        CyclePhase::Done(StopReason::BatchLimit)
                    } else if outcome.inserted > 0 {
                        idle_cycles = 0;
                        at_end = false;
                        CyclePhase::Advancing
                    } else {
                        idle_cycles += 1;
                        if at_end {
                            CyclePhase::Done(StopReason::EndOfFeed)
                        } else if idle_cycles >= self.policy.no_growth_limit {
                            CyclePhase::Done(StopReason::NoGrowth)
                        } else {
                            at_end = self.confirm_end(page).await?;
                            CyclePhase::Advancing
                        }
                    }
                }

                CyclePhase::Advancing => {
                    self.advance(page).await?;
                    if !self.policy.settle.is_zero() {
                        tokio::time::sleep(self.policy.settle).await;
                    }
                    expand_truncated(page, self.policy.expand_pause).await;
                    CyclePhase::Scanning
                }

                CyclePhase::Done(reason) => break reason,
            };
        };

        let discovered = collection.len();
        info!(
            "Collection finished after {} cycles ({:?}): {} items",
            cycles, stop_reason, discovered
        );

        Ok(CollectionRun {
            items: collection.into_batch(self.batch_limit),
            stop_reason,
            cycles,
            discovered,
        })
    }

    async fn advance<P>(&self, page: &mut P) -> Result<(), CollectError>
    where
        P: FeedPage + ?Sized,
    {
        let target = match self.policy.strategy {
            ScrollStrategy::Incremental { step_px } => {
                page.scroll_position().await?.saturating_add(step_px)
            }
            ScrollStrategy::JumpToEnd => page.scroll_extent().await?,
        };
        page.scroll_to(target).await?;
        Ok(())
    }

    /// The page is at its maximum extent, and still is after the grace wait
    async fn confirm_end<P>(&self, page: &mut P) -> Result<bool, CollectError>
    where
        P: FeedPage + ?Sized,
    {
        if page.scroll_position().await? < page.scroll_extent().await? {
            return Ok(false);
        }
        if !self.policy.end_grace.is_zero() {
            tokio::time::sleep(self.policy.end_grace).await;
        }
        let still_at_end = page.scroll_position().await? >= page.scroll_extent().await?;
        if still_at_end {
            debug!("Reached end of feed, allowing one more cycle");
        }
        Ok(still_at_end)
    }
}

/// Parse one render and run the observer and scanner over it.
///
/// Kept synchronous so the parsed document never lives across an await.
fn scan_snapshot<O>(
    cycle: u32,
    markup: &str,
    collection: &mut Collection,
    observer: &mut O,
) -> ScanOutcome
where
    O: CycleObserver + ?Sized,
{
    let document = Html::parse_document(markup);
    observer.before_scan(cycle, &document, collection);
    let outcome = scan(&document, collection);
    observer.after_scan(cycle, &outcome, collection);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{FeedEntry, VirtualFeed};

    fn numbered_feed(count: usize) -> Vec<FeedEntry> {
        (0..count)
            .map(|i| FeedEntry::tweet("alice", &(100 + i).to_string(), &format!("item {}", i)))
            .collect()
    }

    fn ids(run: &CollectionRun) -> Vec<&str> {
        run.items.iter().map(|item| item.url.status_id()).collect()
    }

    #[tokio::test]
    async fn test_batch_limit_keeps_discovery_order() {
        let mut feed = VirtualFeed::new(numbered_feed(5));
        let collector = ScrollCollector::new(ScrollPolicy::incremental().without_pauses(), 2);

        let run = collector.run(&mut feed).await.unwrap();
        assert_eq!(run.stop_reason, StopReason::BatchLimit);
        assert_eq!(ids(&run), vec!["100", "101"]);
        assert_eq!(run.cycles, 1);
    }

    #[tokio::test]
    async fn test_incremental_captures_whole_virtualized_feed() {
        let mut feed = VirtualFeed::new(numbered_feed(40));
        let collector = ScrollCollector::new(ScrollPolicy::incremental().without_pauses(), 100);

        let run = collector.run(&mut feed).await.unwrap();
        assert_eq!(run.items.len(), 40);
        assert_eq!(run.discovered, 40);
        assert_eq!(run.stop_reason, StopReason::EndOfFeed);

        let expected: Vec<String> = (100..140).map(|id| id.to_string()).collect();
        assert_eq!(ids(&run), expected);
    }

    #[tokio::test]
    async fn test_jump_to_end_skips_unmounted_rows() {
        let mut feed = VirtualFeed::new(numbered_feed(20));
        let collector = ScrollCollector::new(ScrollPolicy::jump_to_end().without_pauses(), 100);

        let run = collector.run(&mut feed).await.unwrap();
        assert!(run.items.len() < 20);
        assert!(!ids(&run).contains(&"110"));
    }

    #[tokio::test]
    async fn test_lazy_loaded_feed_is_fully_collected() {
        let mut feed = VirtualFeed::new(numbered_feed(30)).with_page_size(6);
        let collector = ScrollCollector::new(ScrollPolicy::incremental().without_pauses(), 100);

        let run = collector.run(&mut feed).await.unwrap();
        assert_eq!(run.items.len(), 30);
        assert_eq!(feed.loaded(), 30);
    }

    #[tokio::test]
    async fn test_empty_feed_terminates() {
        let mut feed = VirtualFeed::new(Vec::new());
        let collector = ScrollCollector::new(ScrollPolicy::incremental().without_pauses(), 50);

        let run = collector.run(&mut feed).await.unwrap();
        assert!(run.items.is_empty());
        assert_eq!(run.stop_reason, StopReason::EndOfFeed);
        assert_eq!(run.cycles, 2);
    }

    #[tokio::test]
    async fn test_no_growth_limit_bounds_cycles() {
        // Only skippable items, on a page long enough that the end is never
        // reached before the limit
        let entries: Vec<FeedEntry> = (0..100)
            .map(|i| FeedEntry::link(&format!("/i/status/{}", i), "internal"))
            .collect();
        let mut feed = VirtualFeed::new(entries);

        let mut policy = ScrollPolicy::incremental().without_pauses();
        policy.no_growth_limit = 3;
        let collector = ScrollCollector::new(policy, 50);

        let run = collector.run(&mut feed).await.unwrap();
        assert_eq!(run.stop_reason, StopReason::NoGrowth);
        assert_eq!(run.cycles, 3);
        assert!(run.items.is_empty());
    }

    #[tokio::test]
    async fn test_termination_within_limit_after_last_growth() {
        let mut entries = numbered_feed(3);
        entries.extend((0..60).map(|i| FeedEntry::link(&format!("/i/status/{}", i), "filler")));
        let mut feed = VirtualFeed::new(entries);

        let policy = ScrollPolicy::incremental().without_pauses();
        let limit = policy.no_growth_limit;
        let collector = ScrollCollector::new(policy, 50);

        let run = collector.run(&mut feed).await.unwrap();
        assert_eq!(run.items.len(), 3);
        // Growth only happens in the first cycle
        assert!(run.cycles <= 1 + limit);
    }

    #[tokio::test]
    async fn test_growth_resets_no_growth_counter() {
        // Long stretches of filler between real items: each stretch spans
        // fewer idle cycles than the limit, but together they exceed it
        let mut entries = Vec::new();
        for block in 0..3 {
            entries.push(FeedEntry::tweet("alice", &block.to_string(), "real"));
            entries.extend((0..8).map(|i| {
                FeedEntry::link(&format!("/i/status/{}{}", block, i), "filler")
            }));
        }
        let mut feed = VirtualFeed::new(entries);

        let mut policy = ScrollPolicy::incremental().without_pauses();
        policy.no_growth_limit = 4;
        let collector = ScrollCollector::new(policy, 50);

        let run = collector.run(&mut feed).await.unwrap();
        assert_eq!(ids(&run), vec!["0", "1", "2"]);
        assert_eq!(run.stop_reason, StopReason::EndOfFeed);
    }

    #[tokio::test]
    async fn test_truncated_items_are_expanded_before_capture() {
        let mut feed = VirtualFeed::new(vec![
            FeedEntry::truncated("bob", "1", "short…", "the whole text"),
            FeedEntry::tweet("bob", "2", "plain"),
        ]);
        let collector = ScrollCollector::new(ScrollPolicy::incremental().without_pauses(), 10);

        let run = collector.run(&mut feed).await.unwrap();
        assert_eq!(run.items[0].full_content.as_deref(), Some("the whole text"));
    }

    struct CountingObserver {
        before: Vec<u32>,
        after: Vec<u32>,
    }

    impl CycleObserver for CountingObserver {
        fn before_scan(&mut self, cycle: u32, _document: &Html, _collection: &Collection) {
            self.before.push(cycle);
        }

        fn after_scan(&mut self, cycle: u32, _outcome: &ScanOutcome, _collection: &Collection) {
            self.after.push(cycle);
        }
    }

    #[tokio::test]
    async fn test_observer_sees_every_cycle() {
        let mut feed = VirtualFeed::new(numbered_feed(10));
        let collector = ScrollCollector::new(ScrollPolicy::incremental().without_pauses(), 100);
        let mut observer = CountingObserver {
            before: Vec::new(),
            after: Vec::new(),
        };

        let run = collector.run_observed(&mut feed, &mut observer).await.unwrap();
        let expected: Vec<u32> = (1..=run.cycles).collect();
        assert_eq!(observer.before, expected);
        assert_eq!(observer.after, expected);
    }
}
