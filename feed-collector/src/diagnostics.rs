//! Diagnostics: the per-run reconciler and one-shot page snapshots.
//!
//! The [`Reconciler`] watches every scan of a run, records each capturable
//! item it sees in a [`DiagnosticLedger`], and at the end reports items that
//! were seen but never made it into the collection.

use crate::controller::{CollectionRun, CycleObserver};
use crate::page::{FeedPage, PageError};
use crate::scanner::{candidates, inspect, Inspection, ScanOutcome, SkipReason};
use crate::types::{Collection, ItemIdentity};
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Everything observed about one identity during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub first_seen_cycle: u32,
    pub seen_in_cycles: Vec<u32>,
    pub last_observed: Inspection,
}

/// Identity → observations, in first-seen order. Only ever grows.
#[derive(Debug, Default)]
pub struct DiagnosticLedger {
    entries: HashMap<ItemIdentity, LedgerEntry>,
    order: Vec<ItemIdentity>,
}

impl DiagnosticLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that `identity` was observed during `cycle`
    pub fn record(&mut self, identity: ItemIdentity, cycle: u32, inspection: Inspection) {
        match self.entries.get_mut(&identity) {
            Some(entry) => {
                if entry.seen_in_cycles.last() != Some(&cycle) {
                    entry.seen_in_cycles.push(cycle);
                }
                entry.last_observed = inspection;
            }
            None => {
                self.order.push(identity.clone());
                self.entries.insert(
                    identity,
                    LedgerEntry {
                        first_seen_cycle: cycle,
                        seen_in_cycles: vec![cycle],
                        last_observed: inspection,
                    },
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, identity: &ItemIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn get(&self, identity: &ItemIdentity) -> Option<&LedgerEntry> {
        self.entries.get(identity)
    }

    /// Entries in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (&ItemIdentity, &LedgerEntry)> {
        self.order
            .iter()
            .filter_map(|identity| self.entries.get(identity).map(|entry| (identity, entry)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub reason: SkipReason,
    pub href: String,
}

/// What one scan cycle saw and captured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleRecord {
    pub cycle: u32,
    pub timestamp: i64,
    #[serde(rename = "articlesInDOM")]
    pub articles_in_dom: usize,
    /// Collection size before this cycle's scan
    pub items_in_collection: usize,
    pub new_items_this_cycle: usize,
    pub skipped_this_cycle: Vec<SkippedItem>,
    /// Status ids captured in this cycle
    pub captured_this_cycle: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LostItem {
    pub url: ItemIdentity,
    pub seen_in_cycles: Vec<u32>,
    pub last_seen_data: Inspection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenItem {
    pub url: ItemIdentity,
    #[serde(flatten)]
    pub entry: LedgerEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub total_scroll_cycles: u32,
    pub unique_items_seen: usize,
    pub items_captured: usize,
    pub items_lost: usize,
    pub lost_items: Vec<LostItem>,
    /// Captured, but cut from the returned batch by the batch limit
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub beyond_batch_limit: Vec<ItemIdentity>,
}

/// Full diagnostic document for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub timestamp: i64,
    pub url: String,
    pub scroll_cycles: Vec<CycleRecord>,
    pub final_captured: Vec<ItemIdentity>,
    pub all_items_seen: Vec<SeenItem>,
    pub summary: ReconcileSummary,
}

/// [`CycleObserver`] building a [`ReconcileReport`]
#[derive(Debug)]
pub struct Reconciler {
    timestamp: i64,
    url: String,
    ledger: DiagnosticLedger,
    cycles: Vec<CycleRecord>,
    captured: Vec<ItemIdentity>,
    pending: Option<CycleRecord>,
}

impl Reconciler {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            timestamp: now_millis(),
            url: url.into(),
            ledger: DiagnosticLedger::new(),
            cycles: Vec::new(),
            captured: Vec::new(),
            pending: None,
        }
    }

    pub fn ledger(&self) -> &DiagnosticLedger {
        &self.ledger
    }

    pub fn cycles(&self) -> &[CycleRecord] {
        &self.cycles
    }

    /// Compare everything seen against what was captured and returned
    pub fn finish(self, run: &CollectionRun) -> ReconcileReport {
        let (lost_items, beyond_batch_limit) = self.lost_and_truncated(run);

        for lost in &lost_items {
            warn!("Seen but not captured: {} (cycles {:?})", lost.url, lost.seen_in_cycles);
        }

        let summary = ReconcileSummary {
            total_scroll_cycles: self.cycles.len() as u32,
            unique_items_seen: self.ledger.len(),
            items_captured: self.captured.len(),
            items_lost: lost_items.len(),
            lost_items,
            beyond_batch_limit,
        };

        info!(
            "Reconciled {} cycles: {} seen, {} captured, {} lost",
            summary.total_scroll_cycles,
            summary.unique_items_seen,
            summary.items_captured,
            summary.items_lost
        );

        let all_items_seen = self
            .ledger
            .iter()
            .map(|(identity, entry)| SeenItem {
                url: identity.clone(),
                entry: entry.clone(),
            })
            .collect();

        ReconcileReport {
            timestamp: self.timestamp,
            url: self.url,
            scroll_cycles: self.cycles,
            final_captured: self.captured,
            all_items_seen,
            summary,
        }
    }

    /// Items seen but never captured, and items captured but not returned
    fn lost_and_truncated(&self, run: &CollectionRun) -> (Vec<LostItem>, Vec<ItemIdentity>) {
        let captured: HashSet<&ItemIdentity> = self.captured.iter().collect();
        let returned: HashSet<&ItemIdentity> = run.items.iter().map(|item| &item.url).collect();

        let lost = self
            .ledger
            .iter()
            .filter(|(identity, _)| !captured.contains(identity))
            .map(|(identity, entry)| LostItem {
                url: identity.clone(),
                seen_in_cycles: entry.seen_in_cycles.clone(),
                last_seen_data: entry.last_observed.clone(),
            })
            .collect();

        let truncated = self
            .captured
            .iter()
            .filter(|identity| !returned.contains(identity))
            .cloned()
            .collect();

        (lost, truncated)
    }
}

impl CycleObserver for Reconciler {
    fn before_scan(&mut self, cycle: u32, document: &Html, collection: &Collection) {
        let mut record = CycleRecord {
            cycle,
            timestamp: now_millis(),
            articles_in_dom: 0,
            items_in_collection: collection.len(),
            new_items_this_cycle: 0,
            skipped_this_cycle: Vec::new(),
            captured_this_cycle: Vec::new(),
        };

        for (index, item) in candidates(document).enumerate() {
            record.articles_in_dom += 1;
            let inspection = inspect(item, index);

            match inspection.skip_reason {
                Some(reason) => record.skipped_this_cycle.push(SkippedItem {
                    reason,
                    href: inspection.reported_href().to_string(),
                }),
                None => {
                    if let Some(identity) = inspection.extracted_url.clone() {
                        self.ledger.record(identity, cycle, inspection);
                    }
                }
            }
        }

        self.pending = Some(record);
    }

    fn after_scan(&mut self, cycle: u32, outcome: &ScanOutcome, collection: &Collection) {
        let Some(mut record) = self.pending.take() else {
            return;
        };

        let new: Vec<ItemIdentity> = collection
            .identities()
            .skip(record.items_in_collection)
            .cloned()
            .collect();

        record.new_items_this_cycle = outcome.inserted;
        record.captured_this_cycle = new.iter().map(|id| id.status_id().to_string()).collect();
        self.captured.extend(new);

        debug!(
            "Cycle {}: {} in DOM, {} new, {} skipped, ledger {}",
            cycle,
            record.articles_in_dom,
            record.new_items_this_cycle,
            record.skipped_this_cycle.len(),
            self.ledger.len()
        );
        self.cycles.push(record);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub captured: usize,
    pub skipped: usize,
    pub skip_reasons: BTreeMap<SkipReason, usize>,
}

/// What the collector would do with the currently rendered page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSnapshot {
    pub timestamp: i64,
    pub url: String,
    pub total_articles_found: usize,
    pub items: Vec<Inspection>,
    pub summary: SnapshotSummary,
}

/// Inspect every item candidate of a parsed document
pub fn snapshot_document(document: &Html, url: &str) -> DebugSnapshot {
    let items: Vec<Inspection> = candidates(document)
        .enumerate()
        .map(|(index, item)| inspect(item, index))
        .collect();

    let mut summary = SnapshotSummary::default();
    for item in &items {
        match item.skip_reason {
            None => summary.captured += 1,
            Some(reason) => {
                summary.skipped += 1;
                *summary.skip_reasons.entry(reason).or_insert(0) += 1;
            }
        }
    }

    DebugSnapshot {
        timestamp: now_millis(),
        url: url.to_string(),
        total_articles_found: items.len(),
        items,
        summary,
    }
}

/// Render the page once and inspect it
pub async fn capture_snapshot<P>(page: &mut P) -> Result<DebugSnapshot, PageError>
where
    P: FeedPage + ?Sized,
{
    let url = page.location().await?;
    let markup = page.render().await?;
    let snapshot = snapshot_document(&Html::parse_document(&markup), &url);

    info!(
        "Snapshot of {}: {} items, {} capturable",
        snapshot.url, snapshot.total_articles_found, snapshot.summary.captured
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ScrollCollector, ScrollPolicy};
    use crate::page::{FeedEntry, VirtualFeed};

    fn numbered_feed(count: usize) -> Vec<FeedEntry> {
        (0..count)
            .map(|i| FeedEntry::tweet("alice", &(100 + i).to_string(), &format!("item {}", i)))
            .collect()
    }

    fn sample_inspection() -> Inspection {
        let html = Html::parse_document(
            r#"<article data-testid="tweet"><a href="/alice/status/1">x</a></article>"#,
        );
        let item = candidates(&html).next().unwrap();
        inspect(item, 0)
    }

    #[test]
    fn test_ledger_records_cycles_once_each() {
        let mut ledger = DiagnosticLedger::new();
        let identity = ItemIdentity::from_parts("alice", "1");

        ledger.record(identity.clone(), 1, sample_inspection());
        ledger.record(identity.clone(), 1, sample_inspection());
        ledger.record(identity.clone(), 3, sample_inspection());

        let entry = ledger.get(&identity).unwrap();
        assert_eq!(entry.first_seen_cycle, 1);
        assert_eq!(entry.seen_in_cycles, vec![1, 3]);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_ledger_iterates_in_first_seen_order() {
        let mut ledger = DiagnosticLedger::new();
        for id in ["9", "3", "7", "3"] {
            ledger.record(ItemIdentity::from_parts("alice", id), 1, sample_inspection());
        }
        let ids: Vec<&str> = ledger.iter().map(|(identity, _)| identity.status_id()).collect();
        assert_eq!(ids, vec!["9", "3", "7"]);
    }

    /// Checks at every cycle that the ledger covers the collection
    struct SupersetCheck {
        inner: Reconciler,
        ledger_sizes: Vec<usize>,
    }

    impl CycleObserver for SupersetCheck {
        fn before_scan(&mut self, cycle: u32, document: &Html, collection: &Collection) {
            self.inner.before_scan(cycle, document, collection);
        }

        fn after_scan(&mut self, cycle: u32, outcome: &ScanOutcome, collection: &Collection) {
            self.inner.after_scan(cycle, outcome, collection);
            for identity in collection.identities() {
                assert!(self.inner.ledger().contains(identity));
            }
            self.ledger_sizes.push(self.inner.ledger().len());
        }
    }

    #[tokio::test]
    async fn test_ledger_is_monotonic_superset_of_collection() {
        let mut feed = VirtualFeed::new(numbered_feed(25));
        let collector = ScrollCollector::new(ScrollPolicy::incremental().without_pauses(), 100);
        let mut check = SupersetCheck {
            inner: Reconciler::new("https://x.com/i/bookmarks"),
            ledger_sizes: Vec::new(),
        };

        collector.run_observed(&mut feed, &mut check).await.unwrap();

        assert!(check.ledger_sizes.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(check.ledger_sizes.last(), Some(&25));
    }

    #[tokio::test]
    async fn test_incremental_run_loses_nothing() {
        let mut feed = VirtualFeed::new(numbered_feed(30));
        let collector = ScrollCollector::new(ScrollPolicy::incremental().without_pauses(), 100);
        let mut reconciler = Reconciler::new("https://x.com/i/bookmarks");

        let run = collector.run_observed(&mut feed, &mut reconciler).await.unwrap();
        let report = reconciler.finish(&run);

        assert_eq!(report.summary.unique_items_seen, 30);
        assert_eq!(report.summary.items_captured, 30);
        assert_eq!(report.summary.items_lost, 0);
        assert_eq!(report.summary.total_scroll_cycles, run.cycles);
        assert_eq!(report.scroll_cycles[0].cycle, 1);
        assert_eq!(report.final_captured.len(), 30);
    }

    #[tokio::test]
    async fn test_batch_limit_reports_items_beyond_limit() {
        let mut feed = VirtualFeed::new(numbered_feed(10));
        let collector = ScrollCollector::new(ScrollPolicy::incremental().without_pauses(), 2);
        let mut reconciler = Reconciler::new("https://x.com/i/bookmarks");

        let run = collector.run_observed(&mut feed, &mut reconciler).await.unwrap();
        let report = reconciler.finish(&run);

        // The first render mounts four rows; all are captured, two are returned
        assert_eq!(report.summary.items_captured, 4);
        assert_eq!(report.summary.items_lost, 0);
        assert_eq!(report.summary.beyond_batch_limit.len(), 2);
        assert_eq!(report.scroll_cycles[0].captured_this_cycle, vec!["100", "101", "102", "103"]);
    }

    #[test]
    fn test_seen_but_uncollected_items_are_lost() {
        let html = Html::parse_document(
            r#"<main>
            <article data-testid="tweet"><a href="/alice/status/1">a</a></article>
            <article data-testid="tweet"><a href="/alice/status/2">b</a></article>
            <article data-testid="tweet"><a href="/i/status/3">c</a></article>
            </main>"#,
        );

        let mut reconciler = Reconciler::new("https://x.com/i/bookmarks");
        let collection = Collection::new();
        reconciler.before_scan(1, &html, &collection);
        // Scan never ran: nothing made it into the collection
        reconciler.after_scan(1, &ScanOutcome::default(), &collection);

        let run = CollectionRun {
            items: Vec::new(),
            stop_reason: crate::controller::StopReason::NoGrowth,
            cycles: 1,
            discovered: 0,
        };
        let report = reconciler.finish(&run);

        assert_eq!(report.summary.items_lost, 2);
        assert_eq!(report.summary.lost_items[0].url.status_id(), "1");
        assert_eq!(report.summary.lost_items[0].seen_in_cycles, vec![1]);
        assert_eq!(report.scroll_cycles[0].articles_in_dom, 3);
        assert_eq!(report.scroll_cycles[0].skipped_this_cycle.len(), 1);
        assert_eq!(
            report.scroll_cycles[0].skipped_this_cycle[0].reason,
            SkipReason::ReservedHandle
        );
    }

    #[tokio::test]
    async fn test_identical_runs_produce_identical_summaries() {
        async fn summary() -> ReconcileSummary {
            let mut feed = VirtualFeed::new(numbered_feed(20));
            let collector = ScrollCollector::new(ScrollPolicy::jump_to_end().without_pauses(), 100);
            let mut reconciler = Reconciler::new("https://x.com/i/bookmarks");
            let run = collector.run_observed(&mut feed, &mut reconciler).await.unwrap();
            reconciler.finish(&run).summary
        }

        assert_eq!(summary().await, summary().await);
    }

    #[test]
    fn test_report_wire_names() {
        let run = CollectionRun {
            items: Vec::new(),
            stop_reason: crate::controller::StopReason::EndOfFeed,
            cycles: 0,
            discovered: 0,
        };
        let report = Reconciler::new("https://x.com/i/bookmarks").finish(&run);
        let json = serde_json::to_value(&report).unwrap();

        assert!(json.get("scrollCycles").is_some());
        assert!(json.get("finalCaptured").is_some());
        assert!(json["summary"].get("totalScrollCycles").is_some());
        assert!(json["summary"].get("lostItems").is_some());
        assert!(json["summary"].get("beyondBatchLimit").is_none());
    }

    #[tokio::test]
    async fn test_capture_snapshot_counts_reasons() {
        let mut feed = VirtualFeed::new(vec![
            FeedEntry::tweet("alice", "1", "one"),
            FeedEntry::link("/i/status/2", "internal"),
            FeedEntry::link("/bob/status/3/analytics", "views"),
        ])
        .with_url("https://x.com/i/bookmarks/1700000000000000000");

        let snapshot = capture_snapshot(&mut feed).await.unwrap();
        assert_eq!(snapshot.url, "https://x.com/i/bookmarks/1700000000000000000");
        assert_eq!(snapshot.total_articles_found, 3);
        assert_eq!(snapshot.summary.captured, 1);
        assert_eq!(snapshot.summary.skipped, 2);
        assert_eq!(snapshot.summary.skip_reasons[&SkipReason::ReservedHandle], 1);
        assert_eq!(snapshot.summary.skip_reasons[&SkipReason::NonItemView], 1);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["summary"]["skipReasons"]["RESERVED_HANDLE"], 1);
        assert_eq!(json["totalArticlesFound"], 3);
    }
}
