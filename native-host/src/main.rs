//! Native Messaging Host - Feed collector for the browser extension
//!
//! Receives requests from the extension via stdin/stdout, runs them against
//! the feed tab of the user's browser and answers with a reply. Stdout
//! carries the protocol, so all logging goes to stderr.

use feed_collector::messaging::{decode_request, read_frame, write_reply};
use feed_collector::{ChromePage, Config, FeedService, HostRequest, MessagingError, Reply};
use std::io;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Read the next frame without blocking the runtime
async fn next_frame() -> Result<Option<Vec<u8>>, MessagingError> {
    tokio::task::spawn_blocking(|| read_frame(&mut io::stdin().lock()))
        .await
        .map_err(|e| MessagingError::Io(io::Error::new(io::ErrorKind::Other, e)))?
}

async fn handle(service: &FeedService, config: &Config, request: &HostRequest) -> Reply {
    let browser = &config.browser;
    let mut page =
        match ChromePage::attach(&browser.debugger_url, &browser.feed_url, &browser.feed_url_markers)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                warn!("Browser unavailable: {}", e);
                return Reply::failed(e.to_string());
            }
        };

    service.dispatch(&mut page, request).await
}

#[tokio::main]
async fn main() {
    let (config, config_source) = Config::read(Config::default_config_path());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(io::stderr)
        .init();

    info!("Native host started, store at {}", config.backend.url);
    config_source.log();

    let service = match FeedService::from_config(&config) {
        Ok(service) => service,
        Err(e) => {
            error!("Cannot create store client: {}", e);
            return;
        }
    };

    // Main message loop
    loop {
        let frame = match next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Connection closed");
                break;
            }
            Err(e) => {
                error!("Read error: {}", e);
                break;
            }
        };

        info!("Received {} bytes from extension", frame.len());

        let reply = match decode_request(&frame) {
            Ok(request) => handle(&service, &config, &request).await,
            Err(e) => {
                warn!("Rejected message: {}", e);
                Reply::failed(e.to_string())
            }
        };

        if let Err(e) = write_reply(&mut io::stdout().lock(), &reply) {
            error!("Failed to write response: {}", e);
            break;
        }
    }
}
