mod common;

use common::{numbered_feed, StubStore};
use feed_collector::messaging::decode_request;
use feed_collector::service::PartialReport;
use feed_collector::{BackendClient, FeedService, Reply, ScrollPolicy, VirtualFeed};
use std::time::Duration;

fn service_for(store: &StubStore, batch_limit: usize) -> FeedService {
    let client = BackendClient::new(&store.url, Duration::from_secs(5)).unwrap();
    FeedService::new(
        client,
        ScrollPolicy::incremental().without_pauses(),
        batch_limit,
        "twitter",
    )
}

#[tokio::test]
async fn test_scrape_and_sync_forwards_batch() {
    let store = StubStore::start(200).await;
    let service = service_for(&store, 50);
    let mut page = numbered_feed(12);

    let outcome = service.scrape_and_sync(&mut page, Some(5), true).await;

    match &outcome.reply {
        Reply::Synced { data, .. } => {
            assert_eq!(data.new_count, 5);
            assert_eq!(data.success, Some(true));
        }
        other => panic!("expected sync success, got {:?}", other),
    }
    assert_eq!(outcome.batch.len(), 5);

    let received = store.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].path, "/api/ingest");
    assert_eq!(received[0].body["platform"], "twitter");
    assert_eq!(received[0].body["skip_duplicates"], true);
    assert_eq!(
        received[0].body["items"][0]["url"],
        "https://twitter.com/alice/status/100"
    );

    let reply = serde_json::to_value(&outcome.reply).unwrap();
    assert_eq!(reply["success"], true);
    assert_eq!(reply["data"]["new_count"], 5);
}

#[tokio::test]
async fn test_server_error_is_reported_with_batch() {
    let store = StubStore::start(500).await;
    let service = service_for(&store, 50);
    let mut page = numbered_feed(3);

    let outcome = service.scrape_and_sync(&mut page, None, false).await;

    assert_eq!(outcome.reply.error(), Some("Failed to sync: Server error: 500"));
    assert_eq!(outcome.batch.len(), 3);
}

#[tokio::test]
async fn test_empty_page_sends_nothing() {
    let store = StubStore::start(200).await;
    let service = service_for(&store, 50);
    let mut page = VirtualFeed::new(Vec::new());

    let outcome = service.scrape_and_sync(&mut page, None, false).await;

    assert_eq!(outcome.reply.error(), Some(feed_collector::EMPTY_RUN_MESSAGE));
    assert!(store.received().is_empty());
}

#[tokio::test]
async fn test_debug_snapshot_is_stored() {
    let store = StubStore::start(200).await;
    let service = service_for(&store, 50);
    let mut page = numbered_feed(2);

    match service.debug_snapshot(&mut page).await {
        Reply::SnapshotSaved {
            snapshot, saved_as, ..
        } => {
            assert_eq!(saved_as, "debug_20240101_000000");
            assert_eq!(snapshot.total_articles_found, 2);
        }
        other => panic!("expected saved snapshot, got {:?}", other),
    }

    let received = store.received();
    assert_eq!(received[0].path, "/api/debug");
    assert_eq!(received[0].body["totalArticlesFound"], 2);
    assert_eq!(received[0].body["items"][0]["wouldCapture"], true);
}

#[tokio::test]
async fn test_debug_mode_sync_stores_report() {
    let store = StubStore::start(200).await;
    let service = service_for(&store, 50);
    let mut page = numbered_feed(15);

    let outcome = service.debug_mode_sync(&mut page, None).await;

    match &outcome.reply {
        Reply::Reconciled {
            captured,
            lost,
            scroll_cycles,
            ..
        } => {
            assert_eq!(*captured, 15);
            assert_eq!(*lost, 0);
            assert!(*scroll_cycles > 1);
        }
        other => panic!("expected reconciliation, got {:?}", other),
    }

    let received = store.received();
    assert_eq!(received[0].path, "/api/debug");
    assert_eq!(received[0].body["summary"]["itemsCaptured"], 15);
    assert_eq!(
        received[0].body["finalCaptured"].as_array().map(Vec::len),
        Some(15)
    );
    assert_eq!(received[0].body["scrollCycles"][0]["cycle"], 1);
}

#[tokio::test]
async fn test_debug_mode_failure_keeps_summary() {
    let store = StubStore::start(503).await;
    let service = service_for(&store, 50);
    let mut page = numbered_feed(4);

    let outcome = service.debug_mode_sync(&mut page, None).await;

    match outcome.reply {
        Reply::Failed {
            error,
            partial: Some(PartialReport::Summary { summary }),
        } => {
            assert_eq!(error, "Server error: 503");
            assert_eq!(summary.items_captured, 4);
        }
        other => panic!("expected failure with summary, got {:?}", other),
    }
}

#[tokio::test]
async fn test_dispatch_from_wire_request() {
    let store = StubStore::start(200).await;
    let service = service_for(&store, 50);
    let mut page = numbered_feed(8);

    let request =
        decode_request(br#"{"action":"scrapeBookmarks","batchLimit":3,"skipDuplicates":false}"#)
            .unwrap();
    let reply = service.dispatch(&mut page, &request).await;

    assert!(reply.is_success());
    let received = store.received();
    assert_eq!(received[0].body["items"].as_array().map(Vec::len), Some(3));
    assert_eq!(received[0].body["skip_duplicates"], false);
}
