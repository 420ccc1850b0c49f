//! Live page driver over the Chrome DevTools protocol.
//!
//! Attaches to a browser started with `--remote-debugging-port` (the user's
//! signed-in profile) and drives the tab showing the feed. `headless_chrome`
//! is blocking, so every protocol call runs on the blocking pool.

use super::{FeedPage, NodeHandle, PageError};
use headless_chrome::{Browser, Tab};
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, info};

/// Attribute used to tag elements returned by `query_all`
const HANDLE_ATTR: &str = "data-feed-collector-handle";

/// A feed tab in a running Chrome instance
pub struct ChromePage {
    _browser: Browser,
    tab: Arc<Tab>,
    generation: u64,
}

impl ChromePage {
    /// Connect to the browser's DevTools websocket and attach to the first tab
    /// whose URL contains one of `markers`, opening `feed_url` if none does.
    pub async fn attach(
        debugger_url: &str,
        feed_url: &str,
        markers: &[String],
    ) -> Result<Self, PageError> {
        let websocket_url = resolve_websocket_url(debugger_url).await?;
        let feed_url = feed_url.to_string();
        let markers = markers.to_vec();

        tokio::task::spawn_blocking(move || Self::attach_blocking(&websocket_url, &feed_url, &markers))
            .await
            .map_err(driver_error)?
    }

    fn attach_blocking(
        debugger_url: &str,
        feed_url: &str,
        markers: &[String],
    ) -> Result<Self, PageError> {
        let browser = Browser::connect(debugger_url.to_string()).map_err(|e| {
            PageError::Unavailable(format!("cannot connect to {}: {}", debugger_url, e))
        })?;

        let existing = {
            let tabs = browser.get_tabs().lock().map_err(driver_error)?;
            tabs.iter()
                .find(|tab| {
                    let url = tab.get_url();
                    markers.iter().any(|marker| url.contains(marker.as_str()))
                })
                .cloned()
        };

        let tab = match existing {
            Some(tab) => {
                info!("Attached to feed tab: {}", tab.get_url());
                tab
            }
            None => {
                info!("No feed tab open, navigating to {}", feed_url);
                let tab = browser.new_tab().map_err(driver_error)?;
                tab.navigate_to(feed_url).map_err(driver_error)?;
                tab.wait_until_navigated().map_err(driver_error)?;
                tab
            }
        };

        Ok(Self {
            _browser: browser,
            tab,
            generation: 0,
        })
    }

    async fn evaluate(&self, expression: String) -> Result<Option<Value>, PageError> {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || {
            tab.evaluate(&expression, false)
                .map(|remote| remote.value)
                .map_err(driver_error)
        })
        .await
        .map_err(driver_error)?
    }

    async fn evaluate_number(&self, expression: String) -> Result<u64, PageError> {
        let value = self.evaluate(expression.clone()).await?;
        number_from(value.as_ref())
            .ok_or_else(|| PageError::Script(format!("{} returned {:?}", expression, value)))
    }
}

#[async_trait::async_trait]
impl FeedPage for ChromePage {
    async fn location(&mut self) -> Result<String, PageError> {
        Ok(self.tab.get_url())
    }

    async fn render(&mut self) -> Result<String, PageError> {
        match self
            .evaluate("document.documentElement.outerHTML".to_string())
            .await?
        {
            Some(Value::String(html)) => Ok(html),
            other => Err(PageError::Script(format!("outerHTML returned {:?}", other))),
        }
    }

    async fn scroll_position(&mut self) -> Result<u64, PageError> {
        self.evaluate_number("Math.round(window.scrollY)".to_string())
            .await
    }

    async fn scroll_to(&mut self, y: u64) -> Result<(), PageError> {
        self.evaluate(format!("window.scrollTo(0, {})", y)).await?;
        Ok(())
    }

    async fn scroll_extent(&mut self) -> Result<u64, PageError> {
        self.evaluate_number(
            "Math.max(0, Math.round(Math.max(document.body.scrollHeight, \
             document.documentElement.scrollHeight) - window.innerHeight))"
                .to_string(),
        )
        .await
    }

    async fn query_all(&mut self, selector: &str) -> Result<Vec<NodeHandle>, PageError> {
        self.generation += 1;
        let script = query_script(selector, self.generation);

        match self.evaluate(script).await? {
            Some(Value::String(encoded)) => {
                let handles: Vec<String> = serde_json::from_str(&encoded)
                    .map_err(|e| PageError::Script(e.to_string()))?;
                debug!("{} elements match {}", handles.len(), selector);
                Ok(handles.into_iter().map(NodeHandle).collect())
            }
            other => Err(PageError::Script(format!(
                "querySelectorAll({}) returned {:?}",
                selector, other
            ))),
        }
    }

    async fn click(&mut self, node: &NodeHandle) -> Result<(), PageError> {
        match self.evaluate(click_script(node)).await? {
            Some(Value::Bool(true)) => Ok(()),
            _ => Err(PageError::StaleNode(node.as_str().to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// Turn an `http://host:port` DevTools address into the browser's websocket URL
async fn resolve_websocket_url(debugger_url: &str) -> Result<String, PageError> {
    if debugger_url.starts_with("ws://") || debugger_url.starts_with("wss://") {
        return Ok(debugger_url.to_string());
    }

    let endpoint = version_endpoint(debugger_url);
    debug!("Resolving DevTools websocket from {}", endpoint);
    let unavailable =
        |e: reqwest::Error| PageError::Unavailable(format!("cannot reach {}: {}", endpoint, e));

    let info: VersionInfo = reqwest::get(&endpoint)
        .await
        .map_err(unavailable)?
        .json()
        .await
        .map_err(unavailable)?;
    Ok(info.web_socket_debugger_url)
}

fn version_endpoint(debugger_url: &str) -> String {
    format!("{}/json/version", debugger_url.trim_end_matches('/'))
}

/// Script tagging every match of `selector` and returning the tags as a JSON array
fn query_script(selector: &str, generation: u64) -> String {
    let selector = Value::String(selector.to_string());
    format!(
        r#"(() => {{
  const handles = [];
  document.querySelectorAll({selector}).forEach((el, i) => {{
    const handle = "{generation}:" + i;
    el.setAttribute("{HANDLE_ATTR}", handle);
    handles.push(handle);
  }});
  return JSON.stringify(handles);
}})()"#
    )
}

/// Script clicking a tagged element; evaluates to `false` if it is gone
fn click_script(node: &NodeHandle) -> String {
    let target = Value::String(format!(r#"[{}="{}"]"#, HANDLE_ATTR, node.as_str()));
    format!(
        r#"(() => {{
  const el = document.querySelector({target});
  if (!el || !el.isConnected) return false;
  el.click();
  return true;
}})()"#
    )
}

fn number_from(value: Option<&Value>) -> Option<u64> {
    value
        .and_then(Value::as_f64)
        .map(|n| if n.is_sign_negative() { 0 } else { n.round() as u64 })
}

fn driver_error(err: impl Display) -> PageError {
    PageError::Driver(err.to_string())
}
