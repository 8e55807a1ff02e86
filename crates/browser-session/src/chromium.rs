//! chromiumoxide-backed implementation of the driver traits.
//!
//! Elements are addressed by tagging matched nodes with a
//! `data-wp-uid` attribute from injected scripts; an [`ElementId`]
//! carries the attribute selector, so every later operation re-finds
//! the node instead of holding a remote object across navigations.

use crate::config::SessionConfig;
use crate::driver::{BrowserOps, IdentityState, PageOps, TextScope};
use crate::errors::DriverError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use webpilot_core_types::{BoundingBox, ElementId, PageId, Size};
use which::which;

fn cdp_err(err: impl std::fmt::Display) -> DriverError {
    DriverError::Cdp(err.to_string())
}

/// Locate a Chrome/Chromium executable: explicit config, then the
/// `WEBPILOT_CHROME` env var, then well-known binary names on PATH.
pub fn find_chrome_executable(config: &SessionConfig) -> Option<PathBuf> {
    if let Some(path) = &config.executable {
        return Some(path.clone());
    }
    if let Ok(path) = std::env::var("WEBPILOT_CHROME") {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    for name in [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
        "chrome",
    ] {
        if let Ok(path) = which(name) {
            return Some(path);
        }
    }
    None
}

fn browser_config(config: &SessionConfig) -> Result<BrowserConfig, DriverError> {
    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_millis(config.nav_timeout_ms))
        .launch_timeout(Duration::from_secs(20))
        .window_size(config.window.width, config.window.height);

    if !config.headless {
        builder = builder.with_head();
    }

    if std::env::var("WEBPILOT_DISABLE_SANDBOX")
        .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
        .unwrap_or(false)
    {
        builder = builder.no_sandbox();
    }

    let mut args = vec![
        "--disable-background-networking",
        "--disable-background-timer-throttling",
        "--disable-breakpad",
        "--disable-client-side-phishing-detection",
        "--disable-component-update",
        "--disable-default-apps",
        "--disable-dev-shm-usage",
        "--disable-hang-monitor",
        "--disable-popup-blocking",
        "--disable-prompt-on-repost",
        "--disable-sync",
        "--disable-blink-features=AutomationControlled",
        "--metrics-recording-only",
        "--no-first-run",
        "--no-default-browser-check",
        "--password-store=basic",
        "--remote-allow-origins=*",
        "--use-mock-keychain",
    ];
    if config.headless {
        args.push("--hide-scrollbars");
        args.push("--mute-audio");
    }
    builder = builder.args(args);

    if let Some(executable) = find_chrome_executable(config) {
        builder = builder.chrome_executable(executable);
    }

    if let Some(dir) = &config.user_data_dir {
        std::fs::create_dir_all(dir).map_err(|err| {
            DriverError::Launch(format!("failed to ensure user-data-dir: {err}"))
        })?;
        builder = builder.user_data_dir(dir.clone());
    }

    builder
        .build()
        .map_err(|err| DriverError::Launch(format!("browser config error: {err}")))
}

/// Live Chromium process plus the event handler task that drives it.
pub struct ChromiumBrowser {
    browser: Mutex<Browser>,
    handler_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    alive: Arc<AtomicBool>,
}

impl ChromiumBrowser {
    /// Launch a fresh browser process.
    pub async fn launch(config: &SessionConfig) -> Result<Self, DriverError> {
        let browser_config = browser_config(config)?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|err| DriverError::Launch(err.to_string()))?;

        let alive = Arc::new(AtomicBool::new(true));
        let alive_flag = alive.clone();
        let handler_task = tokio::task::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            alive_flag.store(false, Ordering::SeqCst);
            debug!("browser event loop terminated");
        });

        Ok(Self {
            browser: Mutex::new(browser),
            handler_task: Mutex::new(Some(handler_task)),
            alive,
        })
    }
}

#[async_trait]
impl BrowserOps for ChromiumBrowser {
    async fn new_page(&self) -> Result<Arc<dyn PageOps>, DriverError> {
        let browser = self.browser.lock().await;
        let page = browser.new_page("about:blank").await.map_err(cdp_err)?;
        Ok(Arc::new(ChromiumPage::new(page)))
    }

    async fn pages(&self) -> Result<Vec<Arc<dyn PageOps>>, DriverError> {
        let browser = self.browser.lock().await;
        let pages = browser.pages().await.map_err(cdp_err)?;
        Ok(pages
            .into_iter()
            .map(|page| Arc::new(ChromiumPage::new(page)) as Arc<dyn PageOps>)
            .collect())
    }

    async fn close(&self) -> Result<(), DriverError> {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        {
            let mut browser = self.browser.lock().await;
            if let Err(err) = browser.close().await {
                warn!(error = %err, "browser close reported an error");
            }
            let _ = browser.wait().await;
        }
        if let Some(task) = self.handler_task.lock().await.take() {
            task.abort();
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// One tab of the Chromium process.
pub struct ChromiumPage {
    id: PageId,
    page: Page,
}

impl ChromiumPage {
    pub fn new(page: Page) -> Self {
        // Target ids are stable across wrapper instances, so two
        // handles to the same tab compare equal.
        let id = PageId(page.target_id().as_ref().to_string());
        Self { id, page }
    }

    async fn element(
        &self,
        el: &ElementId,
    ) -> Result<chromiumoxide::element::Element, DriverError> {
        self.page
            .find_element(el.0.as_str())
            .await
            .map_err(|err| DriverError::ElementGone(format!("{}: {err}", el.0)))
    }

    async fn call_element_fn<T: serde::de::DeserializeOwned>(
        &self,
        el: &ElementId,
        function: &str,
    ) -> Result<T, DriverError> {
        let element = self.element(el).await?;
        let ret = element
            .call_js_fn(function, false)
            .await
            .map_err(|err| DriverError::Script(err.to_string()))?;
        let value = ret
            .result
            .value
            .ok_or_else(|| DriverError::Script("element function returned no value".into()))?;
        serde_json::from_value(value).map_err(|err| DriverError::Script(err.to_string()))
    }

    async fn eval_uids(&self, expression: String) -> Result<Vec<ElementId>, DriverError> {
        let uids: Vec<String> = self
            .page
            .evaluate(expression)
            .await
            .map_err(|err| DriverError::Script(err.to_string()))?
            .into_value()
            .map_err(|err| DriverError::Script(err.to_string()))?;
        Ok(uids
            .into_iter()
            .map(|uid| ElementId(format!("[data-wp-uid=\"{uid}\"]")))
            .collect())
    }

    async fn dispatch_mouse(
        &self,
        params: Result<DispatchMouseEventParams, String>,
    ) -> Result<(), DriverError> {
        let params = params.map_err(DriverError::Cdp)?;
        self.page.execute(params).await.map_err(cdp_err)?;
        Ok(())
    }
}

#[async_trait]
impl PageOps for ChromiumPage {
    fn id(&self) -> PageId {
        self.id.clone()
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), DriverError> {
        let nav = async {
            self.page
                .goto(url)
                .await
                .map_err(|err| DriverError::Navigation(err.to_string()))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|err| DriverError::Navigation(err.to_string()))?;
            Ok::<_, DriverError>(())
        };
        tokio::time::timeout(timeout, nav)
            .await
            .map_err(|_| DriverError::Timeout(format!("navigation to {url}")))?
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let url = self.page.url().await.map_err(cdp_err)?;
        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn title(&self) -> Result<String, DriverError> {
        let title = self.page.get_title().await.map_err(cdp_err)?;
        Ok(title.unwrap_or_default())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .map_err(cdp_err)
    }

    async fn viewport_size(&self) -> Result<Size, DriverError> {
        let (width, height): (u32, u32) = self
            .page
            .evaluate("[window.innerWidth, window.innerHeight]")
            .await
            .map_err(|err| DriverError::Script(err.to_string()))?
            .into_value()
            .map_err(|err| DriverError::Script(err.to_string()))?;
        Ok(Size::new(width, height))
    }

    async fn query_selector(&self, selector: &str) -> Result<Vec<ElementId>, DriverError> {
        let expr = format!(
            r#"(function() {{
  const sel = {sel};
  const out = [];
  let nodes;
  try {{ nodes = document.querySelectorAll(sel); }} catch (e) {{ return out; }}
  for (const el of nodes) {{
    if (!el.hasAttribute('data-wp-uid')) {{
      el.setAttribute('data-wp-uid', 'w' + (window.__wpUid = (window.__wpUid || 0) + 1));
    }}
    out.push(el.getAttribute('data-wp-uid'));
  }}
  return out;
}})()"#,
            sel = js_string(selector)
        );
        self.eval_uids(expr).await
    }

    async fn query_role(
        &self,
        role: &str,
        name: Option<&str>,
    ) -> Result<Vec<ElementId>, DriverError> {
        let expr = format!(
            r#"(function() {{
  const role = {role};
  const name = {name};
  function implicitRole(el) {{
    if (el.hasAttribute('role')) return el.getAttribute('role').toLowerCase();
    const tag = el.tagName.toLowerCase();
    const type = (el.getAttribute('type') || '').toLowerCase();
    switch (tag) {{
      case 'a': return el.hasAttribute('href') ? 'link' : null;
      case 'button': return 'button';
      case 'select': return (el.multiple || el.size > 1) ? 'listbox' : 'combobox';
      case 'textarea': return 'textbox';
      case 'input':
        if (['button','submit','reset','image'].includes(type)) return 'button';
        if (type === 'checkbox') return 'checkbox';
        if (type === 'radio') return 'radio';
        if (type === 'range') return 'slider';
        if (type === 'search') return 'searchbox';
        if (type === 'hidden') return null;
        return 'textbox';
      case 'img': return 'img';
      case 'nav': return 'navigation';
      case 'form': return 'form';
      case 'h1': case 'h2': case 'h3': case 'h4': case 'h5': case 'h6': return 'heading';
      default: return null;
    }}
  }}
  function accessibleName(el) {{
    const aria = el.getAttribute('aria-label');
    if (aria) return aria;
    const refs = el.getAttribute('aria-labelledby');
    if (refs) {{
      const joined = refs.split(/\s+/)
        .map(id => {{ const n = document.getElementById(id); return n ? n.textContent : ''; }})
        .join(' ').trim();
      if (joined) return joined;
    }}
    if (el.labels && el.labels.length) {{
      const t = el.labels[0].textContent.trim();
      if (t) return t;
    }}
    const text = (el.textContent || '').trim();
    if (text) return text;
    return el.getAttribute('placeholder') || el.getAttribute('title')
      || el.getAttribute('alt') || el.value || '';
  }}
  const out = [];
  for (const el of document.querySelectorAll('*')) {{
    if (implicitRole(el) !== role) continue;
    if (name) {{
      const n = (accessibleName(el) || '').trim().toLowerCase();
      if (!n.includes(name)) continue;
    }}
    if (!el.hasAttribute('data-wp-uid')) {{
      el.setAttribute('data-wp-uid', 'w' + (window.__wpUid = (window.__wpUid || 0) + 1));
    }}
    out.push(el.getAttribute('data-wp-uid'));
  }}
  return out;
}})()"#,
            role = js_string(&role.to_lowercase()),
            name = name
                .map(|n| js_string(&n.to_lowercase()))
                .unwrap_or_else(|| "null".to_string()),
        );
        self.eval_uids(expr).await
    }

    async fn query_text(
        &self,
        text: &str,
        scope: TextScope,
        exact: bool,
    ) -> Result<Vec<ElementId>, DriverError> {
        let tags = scope.tags();
        let selector = if tags.is_empty() {
            "*".to_string()
        } else {
            tags.join(",")
        };
        let expr = format!(
            r#"(function() {{
  const needle = {needle};
  const exact = {exact};
  const out = [];
  for (const el of document.querySelectorAll({selector})) {{
    const text = (el.innerText || el.value || '').trim();
    if (!text || text.length > needle.length + 120) continue;
    const hit = exact
      ? text === needle
      : text.toLowerCase().includes(needle.toLowerCase());
    if (!hit) continue;
    if (!el.hasAttribute('data-wp-uid')) {{
      el.setAttribute('data-wp-uid', 'w' + (window.__wpUid = (window.__wpUid || 0) + 1));
    }}
    out.push(el.getAttribute('data-wp-uid'));
  }}
  return out;
}})()"#,
            needle = js_string(text),
            exact = exact,
            selector = js_string(&selector),
        );
        self.eval_uids(expr).await
    }

    async fn bounding_box(&self, el: &ElementId) -> Result<Option<BoundingBox>, DriverError> {
        let bbox: BoundingBox = self
            .call_element_fn(
                el,
                "function() { const r = this.getBoundingClientRect(); \
                 return {x: r.x, y: r.y, width: r.width, height: r.height}; }",
            )
            .await?;
        if bbox.is_empty() {
            Ok(None)
        } else {
            Ok(Some(bbox))
        }
    }

    async fn is_visible(&self, el: &ElementId) -> Result<bool, DriverError> {
        self.call_element_fn(
            el,
            "function() { \
               const s = window.getComputedStyle(this); \
               if (s.display === 'none' || s.visibility === 'hidden' || parseFloat(s.opacity) === 0) return false; \
               const r = this.getBoundingClientRect(); \
               return r.width > 0 && r.height > 0; }",
        )
        .await
    }

    async fn is_enabled(&self, el: &ElementId) -> Result<bool, DriverError> {
        self.call_element_fn(
            el,
            "function() { return !this.disabled && this.getAttribute('aria-disabled') !== 'true'; }",
        )
        .await
    }

    async fn attribute(
        &self,
        el: &ElementId,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let element = self.element(el).await?;
        element.attribute(name).await.map_err(cdp_err)
    }

    async fn tag_name(&self, el: &ElementId) -> Result<String, DriverError> {
        self.call_element_fn(el, "function() { return this.tagName.toLowerCase(); }")
            .await
    }

    async fn focus(&self, el: &ElementId) -> Result<(), DriverError> {
        let element = self.element(el).await?;
        element.focus().await.map_err(cdp_err)?;
        Ok(())
    }

    async fn click_element(&self, el: &ElementId) -> Result<(), DriverError> {
        let element = self.element(el).await?;
        element.click().await.map_err(cdp_err)?;
        Ok(())
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), DriverError> {
        self.dispatch_mouse(
            DispatchMouseEventParams::builder()
                .r#type(DispatchMouseEventType::MouseMoved)
                .x(x)
                .y(y)
                .build(),
        )
        .await
    }

    async fn mouse_click(&self, x: f64, y: f64) -> Result<(), DriverError> {
        self.dispatch_mouse(
            DispatchMouseEventParams::builder()
                .r#type(DispatchMouseEventType::MousePressed)
                .x(x)
                .y(y)
                .button(MouseButton::Left)
                .click_count(1)
                .build(),
        )
        .await?;
        self.dispatch_mouse(
            DispatchMouseEventParams::builder()
                .r#type(DispatchMouseEventType::MouseReleased)
                .x(x)
                .y(y)
                .button(MouseButton::Left)
                .click_count(1)
                .build(),
        )
        .await
    }

    async fn insert_text(&self, text: &str) -> Result<(), DriverError> {
        self.page
            .execute(InsertTextParams::new(text))
            .await
            .map_err(cdp_err)?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), DriverError> {
        let (code, vk, text) = key_definition(key);
        let down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(key)
            .code(code)
            .windows_virtual_key_code(vk)
            .native_virtual_key_code(vk)
            .text(text)
            .build()
            .map_err(DriverError::Cdp)?;
        self.page.execute(down).await.map_err(cdp_err)?;
        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(key)
            .code(code)
            .windows_virtual_key_code(vk)
            .native_virtual_key_code(vk)
            .build()
            .map_err(DriverError::Cdp)?;
        self.page.execute(up).await.map_err(cdp_err)?;
        Ok(())
    }

    async fn scroll_by(&self, dx: f64, dy: f64) -> Result<(), DriverError> {
        let size = self.viewport_size().await?;
        self.dispatch_mouse(
            DispatchMouseEventParams::builder()
                .r#type(DispatchMouseEventType::MouseWheel)
                .x(size.width as f64 / 2.0)
                .y(size.height as f64 / 2.0)
                .delta_x(dx)
                .delta_y(dy)
                .build(),
        )
        .await
    }

    async fn export_identity(&self) -> Result<IdentityState, DriverError> {
        let cookies = self.page.get_cookies().await.map_err(cdp_err)?;
        let cookies = serde_json::to_value(cookies)
            .map_err(|err| DriverError::Persistence(err.to_string()))?;
        Ok(IdentityState(json!({ "cookies": cookies })))
    }

    async fn import_identity(&self, state: &IdentityState) -> Result<(), DriverError> {
        let Some(raw) = state.0.get("cookies") else {
            return Ok(());
        };
        let params: Vec<CookieParam> = serde_json::from_value(raw.clone())
            .map_err(|err| DriverError::Persistence(format!("cookie blob invalid: {err}")))?;
        if params.is_empty() {
            return Ok(());
        }
        debug!(count = params.len(), "restoring cookies");
        self.page.set_cookies(params).await.map_err(cdp_err)?;
        Ok(())
    }

    async fn is_closed(&self) -> bool {
        self.page.url().await.is_err()
    }
}

/// Escape a Rust string as a JS string literal.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Key metadata for the common non-text keys; everything else is
/// dispatched with its own name and no virtual key code.
fn key_definition(key: &str) -> (&'static str, i64, &'static str) {
    match key {
        "Enter" => ("Enter", 13, "\r"),
        "Tab" => ("Tab", 9, ""),
        "Escape" => ("Escape", 27, ""),
        "Backspace" => ("Backspace", 8, ""),
        "Delete" => ("Delete", 46, ""),
        "ArrowDown" => ("ArrowDown", 40, ""),
        "ArrowUp" => ("ArrowUp", 38, ""),
        "ArrowLeft" => ("ArrowLeft", 37, ""),
        "ArrowRight" => ("ArrowRight", 39, ""),
        "PageDown" => ("PageDown", 34, ""),
        "PageUp" => ("PageUp", 33, ""),
        "Home" => ("Home", 36, ""),
        "End" => ("End", 35, ""),
        _ => ("", 0, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_string_escapes_quotes() {
        assert_eq!(js_string("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn key_definitions_cover_enter() {
        let (code, vk, text) = key_definition("Enter");
        assert_eq!(code, "Enter");
        assert_eq!(vk, 13);
        assert_eq!(text, "\r");
    }

    #[test]
    fn unknown_key_gets_no_vk() {
        let (_, vk, _) = key_definition("F13");
        assert_eq!(vk, 0);
    }
}
