// spider_chrome re-exports chromiumoxide API
use super::driver::{ControlQuery, PageDriver};
use super::scripts;
use crate::control::{ActivationMethod, Control};
use crate::error::{BrowserError, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::{browser, input, page};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub struct ChromeDriver {
    browser: Browser,
    temp_dir: Option<PathBuf>,
}

/// How to obtain a browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConnectionMode {
    /// Launch a local Chrome with an isolated temporary profile
    Sandboxed {
        #[serde(default)]
        chrome_path: Option<String>,
        #[serde(default)]
        no_sandbox: bool,
        #[serde(default)]
        headless: bool,
    },
    /// Connect to an existing Chrome on a debug port
    DebugPort { port: u16 },
}

impl Default for ConnectionMode {
    fn default() -> Self {
        ConnectionMode::Sandboxed {
            chrome_path: None,
            no_sandbox: false,
            headless: false,
        }
    }
}

const LAUNCH_HELP: &str = "Chrome not found. You can:\n\
     - Install Chrome: https://www.google.com/chrome/\n\
     - Ubuntu/Debian: sudo apt install chromium-browser\n\
     - Or set browser.chrome_path in the run config\n\
     - Linux sandbox issue? Set browser.no_sandbox";

fn page_error(e: impl std::fmt::Display) -> BrowserError {
    let message = e.to_string();
    // A cancelled oneshot means the CDP connection is gone
    if message.contains("oneshot canceled") {
        BrowserError::ConnectionFailed(
            "Browser connection lost. The browser may have been closed or crashed.".to_string(),
        )
    } else {
        BrowserError::Other(message)
    }
}

impl ChromeDriver {
    /// Launch headless Chrome with `--no-sandbox`, as CI needs
    pub async fn launch_headless(download_dir: Option<&Path>) -> Result<Self> {
        Self::new(
            ConnectionMode::Sandboxed {
                chrome_path: None,
                no_sandbox: true,
                headless: true,
            },
            download_dir,
        )
        .await
    }

    /// Create a driver and point browser downloads at `download_dir` when given
    pub async fn new(mode: ConnectionMode, download_dir: Option<&Path>) -> Result<Self> {
        let (browser, temp_dir) = match mode {
            ConnectionMode::Sandboxed {
                chrome_path,
                no_sandbox,
                headless,
            } => {
                // Nanosecond suffix keeps parallel launches on separate profiles
                let unique_id = chrono::Utc::now()
                    .timestamp_nanos_opt()
                    .unwrap_or_default();
                let temp_dir =
                    std::env::temp_dir().join(format!("tender-chrome-{}", unique_id));
                std::fs::create_dir_all(&temp_dir).map_err(|e| {
                    BrowserError::LaunchFailed(format!("Failed to create temp directory: {}", e))
                })?;

                let mut config = if headless {
                    BrowserConfig::builder()
                } else {
                    BrowserConfig::builder().with_head()
                };
                config = config.user_data_dir(&temp_dir);
                if no_sandbox {
                    config = config.arg("--no-sandbox");
                }
                if let Some(path) = chrome_path {
                    config = config.chrome_executable(path);
                }

                let config = config
                    .build()
                    .map_err(|e| BrowserError::LaunchFailed(format!("{}. \n\n{}", e, LAUNCH_HELP)))?;
                let (browser, mut handler) = Browser::launch(config)
                    .await
                    .map_err(|e| BrowserError::LaunchFailed(format!("{}. \n\n{}", e, LAUNCH_HELP)))?;

                tokio::spawn(async move { while (handler.next().await).is_some() {} });

                log::info!("🚀 Chrome launched (headless: {})", headless);
                (browser, Some(temp_dir))
            }
            ConnectionMode::DebugPort { port } => {
                let url = format!("http://localhost:{}", port);
                let (browser, mut handler) = Browser::connect(&url).await.map_err(|e| {
                    BrowserError::ConnectionFailed(format!(
                        "Failed to connect to Chrome on port {}. \
                         Make sure Chrome is running with --remote-debugging-port={}: {}",
                        port, port, e
                    ))
                })?;

                tokio::spawn(async move { while (handler.next().await).is_some() {} });

                log::info!("🔌 Connected to Chrome on port {}", port);
                (browser, None)
            }
        };

        let driver = Self { browser, temp_dir };
        if let Some(dir) = download_dir {
            driver.set_download_dir(dir).await?;
        }
        Ok(driver)
    }

    /// Sends downloads to `dir` without prompting
    async fn set_download_dir(&self, dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        let params: browser::SetDownloadBehaviorParams = serde_json::from_value(json!({
            "behavior": "allow",
            "downloadPath": dir.to_string_lossy(),
        }))
        .map_err(|e| BrowserError::Other(format!("Invalid download params: {}", e)))?;

        self.browser.execute(params).await.map_err(page_error)?;
        log::debug!("📥 Downloads go to {}", dir.display());
        Ok(())
    }

    /// Current page, skipping Chrome's own pages; creates one if none exist
    async fn active_page(&self) -> Result<chromiumoxide::page::Page> {
        let pages = self.browser.pages().await?;

        for page in pages.iter() {
            if let Ok(Some(url)) = page.url().await {
                if !url.starts_with("chrome://") {
                    return Ok(page.clone());
                }
            }
        }
        if let Some(page) = pages.last() {
            return Ok(page.clone());
        }

        self.browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Other(format!("Failed to create page: {}", e)))
    }

    /// Evaluates `script` on the active page
    async fn run_script(&self, script: &str) -> Result<Value> {
        let page = self.active_page().await?;
        let result = page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::ScriptFailed(e.to_string()))?;
        Ok(result.into_value().unwrap_or(Value::Null))
    }

    /// Runs an element script and unwraps its `{ok, value, error}` envelope
    async fn element_script(&self, reference: &str, body: &str) -> Result<Value> {
        let result = self
            .run_script(&scripts::with_element(reference, body))
            .await?;

        if result.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(result.get("value").cloned().unwrap_or(Value::Null));
        }
        let error = result
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown script failure");
        if error == "element not found" {
            Err(BrowserError::ElementNotFound(reference.to_string()))
        } else {
            Err(BrowserError::ScriptFailed(format!("{}: {}", reference, error)))
        }
    }

    /// Sends one raw input event. `mouse*` types go to the mouse domain, the rest to the keyboard.
    async fn dispatch(&self, params: Value) -> Result<()> {
        let page = self.active_page().await?;
        if params.get("type").and_then(Value::as_str).map(|t| t.starts_with("mouse")) == Some(true) {
            let params: input::DispatchMouseEventParams = serde_json::from_value(params)
                .map_err(|e| BrowserError::Other(format!("Invalid mouse event: {}", e)))?;
            page.execute(params).await.map_err(page_error)?;
        } else {
            let params: input::DispatchKeyEventParams = serde_json::from_value(params)
                .map_err(|e| BrowserError::Other(format!("Invalid key event: {}", e)))?;
            page.execute(params).await.map_err(page_error)?;
        }
        Ok(())
    }

    /// Scrolls the element into view and clicks the middle of its box
    async fn click_at_center(&self, reference: &str) -> Result<()> {
        let center = self
            .element_script(reference, scripts::SCROLL_AND_CENTER)
            .await?;
        let x = center.get("x").and_then(Value::as_f64).unwrap_or_default();
        let y = center.get("y").and_then(Value::as_f64).unwrap_or_default();

        self.dispatch(json!({"type": "mouseMoved", "x": x, "y": y})).await?;
        for kind in ["mousePressed", "mouseReleased"] {
            self.dispatch(json!({
                "type": kind, "x": x, "y": y, "button": "left", "clickCount": 1
            }))
            .await?;
        }
        Ok(())
    }

    /// Focuses the element and presses Enter on it
    async fn press_enter(&self, reference: &str) -> Result<()> {
        self.element_script(reference, scripts::FOCUS).await?;
        self.dispatch(json!({
            "type": "keyDown", "key": "Enter", "code": "Enter",
            "windowsVirtualKeyCode": 13, "text": "\r"
        }))
        .await?;
        self.dispatch(json!({
            "type": "keyUp", "key": "Enter", "code": "Enter", "windowsVirtualKeyCode": 13
        }))
        .await
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    /// Navigates and waits for `document.readyState` to reach complete
    async fn navigate(&self, url: &str, ready_timeout: Duration) -> Result<()> {
        let normalized_url = if !url.contains("://")
            && !url.starts_with("about:")
            && !url.starts_with("data:")
        {
            format!("https://{}", url)
        } else {
            url.to_string()
        };
        log::info!("🌐 Navigating to {}", normalized_url);

        let page = self.active_page().await?;
        let params = page::NavigateParams::builder()
            .url(&normalized_url)
            .build()
            .map_err(|e| {
                BrowserError::NavigationFailed(format!("Invalid URL {}: {}", normalized_url, e))
            })?;

        let response = page.execute(params).await.map_err(|e| match page_error(e) {
            BrowserError::Other(msg) => BrowserError::NavigationFailed(format!(
                "Failed to navigate to {}: {}",
                normalized_url, msg
            )),
            other => other,
        })?;

        if let Some(error_text) = &response.result.error_text {
            log::warn!("❌ Navigation error from browser: {}", error_text);
            return Err(BrowserError::NavigationFailed(format!(
                "Navigation error: {}",
                error_text
            )));
        }

        // Page.navigate returns once the response starts; poll until the document settles
        let started = Instant::now();
        loop {
            let state = self.run_script(scripts::READY_STATE).await.ok();
            if state.as_ref().and_then(Value::as_str) == Some("complete") {
                break;
            }
            if started.elapsed() >= ready_timeout {
                return Err(BrowserError::NavigationFailed(format!(
                    "{} not ready after {}s",
                    normalized_url,
                    ready_timeout.as_secs()
                )));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        log::debug!("✓ Page ready after {}ms", started.elapsed().as_millis());
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let page = self.active_page().await?;
        page.url()
            .await
            .map_err(page_error)?
            .ok_or(BrowserError::NoPage)
    }

    async fn page_content(&self) -> Result<String> {
        let page = self.active_page().await?;
        page.content().await.map_err(page_error)
    }

    async fn title(&self) -> Result<String> {
        let page = self.active_page().await?;
        Ok(page.get_title().await.map_err(page_error)?.unwrap_or_default())
    }

    /// PNG of the visible viewport
    async fn screenshot(&self) -> Result<Vec<u8>> {
        use base64::{engine::general_purpose, Engine as _};

        let page = self.active_page().await?;
        let params: page::CaptureScreenshotParams =
            serde_json::from_value(json!({"format": "png"}))
                .map_err(|e| BrowserError::Other(format!("Invalid screenshot params: {}", e)))?;
        let response = page.execute(params).await.map_err(page_error)?;

        general_purpose::STANDARD
            .decode(&response.data)
            .map_err(|e| BrowserError::Other(format!("Failed to decode screenshot: {}", e)))
    }

    async fn find_controls(&self, query: &ControlQuery) -> Result<Vec<Control>> {
        let value = self.run_script(&scripts::find_controls(query)).await?;
        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return Err(BrowserError::ScriptFailed(error.to_string()));
        }
        serde_json::from_value(value)
            .map_err(|e| BrowserError::ScriptFailed(format!("Unexpected control list: {}", e)))
    }

    /// One activation method; the executor decides the order
    async fn activate(&self, reference: &str, method: ActivationMethod) -> Result<()> {
        match method {
            ActivationMethod::Direct => self.click_at_center(reference).await,
            ActivationMethod::SyntheticEvents => self
                .element_script(reference, scripts::SYNTHETIC_EVENTS)
                .await
                .map(|_| ()),
            ActivationMethod::Programmatic => self
                .element_script(reference, scripts::PROGRAMMATIC_CLICK)
                .await
                .map(|_| ()),
            ActivationMethod::KeyboardEnter => self.press_enter(reference).await,
        }
    }

    async fn clear_and_type(&self, reference: &str, text: &str) -> Result<()> {
        self.element_script(reference, scripts::FOCUS_AND_CLEAR)
            .await?;

        let page = self.active_page().await?;
        let params: input::InsertTextParams = serde_json::from_value(json!({"text": text}))
            .map_err(|e| BrowserError::Other(format!("Invalid insertText params: {}", e)))?;
        page.execute(params).await.map_err(page_error)?;
        Ok(())
    }

    async fn set_value(&self, reference: &str, text: &str) -> Result<()> {
        self.element_script(reference, &scripts::set_value(text))
            .await
            .map(|_| ())
    }

    async fn read_value(&self, reference: &str) -> Result<String> {
        let value = self.element_script(reference, scripts::READ_VALUE).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn is_text_visible(&self, keywords: &[String]) -> Result<bool> {
        if keywords.is_empty() {
            return Ok(false);
        }
        let value = self.run_script(&scripts::text_visible(keywords)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.run_script(script).await
    }

    /// Check if browser is still responsive
    async fn is_alive(&self) -> bool {
        match self.browser.pages().await {
            Ok(pages) => match pages.first() {
                Some(page) => matches!(
                    tokio::time::timeout(Duration::from_secs(2), page.url()).await,
                    Ok(Ok(_))
                ),
                None => true,
            },
            Err(_) => false,
        }
    }

    /// Close the browser
    async fn shutdown(&self) -> Result<()> {
        self.browser
            .execute(browser::CloseParams::default())
            .await
            .map_err(page_error)?;
        log::info!("🛑 Browser closed");
        Ok(())
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        if let Some(temp_dir) = &self.temp_dir {
            if temp_dir.exists() {
                let _ = std::fs::remove_dir_all(temp_dir);
            }
        }
    }
}
