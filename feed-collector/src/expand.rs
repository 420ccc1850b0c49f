//! Expansion of truncated items.
//!
//! Clicks every "show more" affordance that is currently mounted so the full
//! text is in the DOM before the next scan. A click that fails is logged and
//! skipped; expansion never aborts a cycle.

use crate::page::FeedPage;
use crate::selectors::SHOW_MORE;
use std::time::Duration;
use tracing::{debug, warn};

/// What one expansion pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpansionReport {
    pub found: usize,
    pub expanded: usize,
    pub failed: usize,
}

/// Activate every mounted "show more" affordance, pausing after each click
pub async fn expand_truncated<P>(page: &mut P, pause: Duration) -> ExpansionReport
where
    P: FeedPage + ?Sized,
{
    let mut report = ExpansionReport::default();

    let handles = match page.query_all(SHOW_MORE).await {
        Ok(handles) => handles,
        Err(e) => {
            warn!("Failed to look up show-more affordances: {}", e);
            return report;
        }
    };
    report.found = handles.len();

    for handle in &handles {
        match page.click(handle).await {
            Ok(()) => {
                report.expanded += 1;
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            }
            Err(e) => {
                report.failed += 1;
                warn!("Failed to click show more ({}): {}", handle.as_str(), e);
            }
        }
    }

    if report.found > 0 {
        debug!(
            "Expanded {}/{} truncated items ({} failed)",
            report.expanded, report.found, report.failed
        );
    }
    report
}
