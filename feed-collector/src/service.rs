//! Public entry points.
//!
//! Every operation answers with a [`Reply`]: exactly one success shape or an
//! error, never a Rust `Err`. Collaborator failures become error replies.

use crate::config::Config;
use crate::controller::{CollectionRun, ScrollCollector, ScrollPolicy};
use crate::diagnostics::{capture_snapshot, DebugSnapshot, ReconcileReport, ReconcileSummary, Reconciler};
use crate::messaging::{Action, HostRequest};
use crate::page::FeedPage;
use crate::sync::{BackendClient, IngestRequest, IngestSummary, SyncError};
use crate::types::{CollectError, CollectedItem};
use serde::{Serialize, Serializer};
use tracing::{error, info, warn};

/// Error text for a run that found nothing to send
pub const EMPTY_RUN_MESSAGE: &str = "No bookmarks found on this page";

/// Serializes as the literal `true`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Success;

impl Serialize for Success {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(true)
    }
}

/// Report attached to an error reply when one was produced before the failure
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PartialReport {
    Snapshot { snapshot: DebugSnapshot },
    Summary { summary: ReconcileSummary },
}

/// Result handed back across the message boundary
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Synced {
        success: Success,
        data: IngestSummary,
    },
    SnapshotSaved {
        success: Success,
        snapshot: DebugSnapshot,
        #[serde(rename = "savedAs")]
        saved_as: String,
    },
    Reconciled {
        success: Success,
        summary: ReconcileSummary,
        #[serde(rename = "scrollCycles")]
        scroll_cycles: usize,
        captured: usize,
        lost: usize,
    },
    Failed {
        error: String,
        #[serde(flatten)]
        partial: Option<PartialReport>,
    },
}

impl Reply {
    pub fn failed(error: impl Into<String>) -> Self {
        Reply::Failed {
            error: error.into(),
            partial: None,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Reply::Failed { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Reply::Failed { error, .. } => Some(error.as_str()),
            _ => None,
        }
    }
}

/// Reply of a sync run, plus the batch that was (or would have been) sent
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub reply: Reply,
    pub batch: Vec<CollectedItem>,
}

/// Reply of a diagnostic run, plus the full report when the run completed
#[derive(Debug, Clone)]
pub struct DiagnosticOutcome {
    pub reply: Reply,
    pub report: Option<ReconcileReport>,
}

/// Collector settings and the store client, shared by every operation
#[derive(Debug, Clone)]
pub struct FeedService {
    client: BackendClient,
    policy: ScrollPolicy,
    batch_limit: usize,
    platform: String,
}

impl FeedService {
    pub fn new(client: BackendClient, policy: ScrollPolicy, batch_limit: usize, platform: &str) -> Self {
        Self {
            client,
            policy,
            batch_limit,
            platform: platform.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        let client = BackendClient::new(&config.backend.url, config.backend.timeout())?;
        Ok(Self::new(
            client,
            config.collector.policy(),
            config.collector.batch_limit,
            &config.backend.platform,
        ))
    }

    fn collector(&self, batch_limit: Option<usize>) -> ScrollCollector {
        ScrollCollector::new(self.policy.clone(), batch_limit.unwrap_or(self.batch_limit))
    }

    /// Collect without forwarding anything
    pub async fn collect<P>(
        &self,
        page: &mut P,
        batch_limit: Option<usize>,
    ) -> Result<CollectionRun, CollectError>
    where
        P: FeedPage + ?Sized,
    {
        self.collector(batch_limit).run(page).await
    }

    /// Collect a batch and forward it to the store
    pub async fn scrape_and_sync<P>(
        &self,
        page: &mut P,
        batch_limit: Option<usize>,
        skip_duplicates: bool,
    ) -> SyncOutcome
    where
        P: FeedPage + ?Sized,
    {
        let run = match self.collect(page, batch_limit).await {
            Ok(run) => run,
            Err(e) => {
                error!("Collection failed: {}", e);
                return SyncOutcome {
                    reply: Reply::failed(e.to_string()),
                    batch: Vec::new(),
                };
            }
        };

        if run.items.is_empty() {
            warn!("{}", EMPTY_RUN_MESSAGE);
            return SyncOutcome {
                reply: Reply::failed(EMPTY_RUN_MESSAGE),
                batch: run.items,
            };
        }

        let request = IngestRequest {
            items: &run.items,
            platform: &self.platform,
            skip_duplicates,
        };

        let reply = match self.client.ingest(&request).await {
            Ok(data) => Reply::Synced {
                success: Success,
                data,
            },
            Err(e) => {
                error!("Failed to sync {} items: {}", run.items.len(), e);
                Reply::failed(format!("Failed to sync: {}", e))
            }
        };

        SyncOutcome {
            reply,
            batch: run.items,
        }
    }

    /// Inspect the current page once and store the result
    pub async fn debug_snapshot<P>(&self, page: &mut P) -> Reply
    where
        P: FeedPage + ?Sized,
    {
        let snapshot = match capture_snapshot(page).await {
            Ok(snapshot) => snapshot,
            Err(e) => return Reply::failed(e.to_string()),
        };

        match self.client.save_diagnostics(&snapshot).await {
            Ok(saved_as) => Reply::SnapshotSaved {
                success: Success,
                snapshot,
                saved_as,
            },
            Err(e) => {
                warn!("Failed to store snapshot: {}", e);
                Reply::Failed {
                    error: e.to_string(),
                    partial: Some(PartialReport::Snapshot { snapshot }),
                }
            }
        }
    }

    /// Run a full collection while reconciling seen against captured items,
    /// then store the report
    pub async fn debug_mode_sync<P>(&self, page: &mut P, batch_limit: Option<usize>) -> DiagnosticOutcome
    where
        P: FeedPage + ?Sized,
    {
        let url = match page.location().await {
            Ok(url) => url,
            Err(e) => {
                return DiagnosticOutcome {
                    reply: Reply::failed(e.to_string()),
                    report: None,
                }
            }
        };

        let mut reconciler = Reconciler::new(url);
        let run = match self.collector(batch_limit).run_observed(page, &mut reconciler).await {
            Ok(run) => run,
            Err(e) => {
                error!("Diagnostic collection failed: {}", e);
                return DiagnosticOutcome {
                    reply: Reply::failed(e.to_string()),
                    report: None,
                };
            }
        };

        let report = reconciler.finish(&run);
        info!(
            "Diagnostic run: {} cycles, {} captured, {} lost",
            report.scroll_cycles.len(),
            report.summary.items_captured,
            report.summary.items_lost
        );

        let reply = match self.client.save_diagnostics(&report).await {
            Ok(_) => Reply::Reconciled {
                success: Success,
                summary: report.summary.clone(),
                scroll_cycles: report.scroll_cycles.len(),
                captured: report.summary.items_captured,
                lost: report.summary.items_lost,
            },
            Err(e) => {
                warn!("Failed to store diagnostic report: {}", e);
                Reply::Failed {
                    error: e.to_string(),
                    partial: Some(PartialReport::Summary {
                        summary: report.summary.clone(),
                    }),
                }
            }
        };

        DiagnosticOutcome {
            reply,
            report: Some(report),
        }
    }

    /// Route a request from the message boundary
    pub async fn dispatch<P>(&self, page: &mut P, request: &HostRequest) -> Reply
    where
        P: FeedPage + ?Sized,
    {
        info!("Handling {:?}", request.action);
        match request.action {
            Action::ScrapeBookmarks => {
                self.scrape_and_sync(
                    page,
                    request.batch_limit,
                    request.skip_duplicates.unwrap_or(false),
                )
                .await
                .reply
            }
            Action::GenerateDebugSnapshot => self.debug_snapshot(page).await,
            Action::DebugModeSync => self.debug_mode_sync(page, request.batch_limit).await.reply,
        }
    }
}
