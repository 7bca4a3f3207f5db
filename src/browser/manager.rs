//! Browser Session Manager — owns the lifecycle of the single shared
//! browser/profile/page.
//!
//! One persistent-profile browser serves every caller in the process. A
//! caller asking for a session gets the existing one back when a cheap
//! liveness probe passes; a dead session is closed and transparently
//! re-initialized. Creation itself is serialized behind a real mutex; the
//! 100 ms / 30 s poll-and-self-heal wait exists only as a defense against a
//! crashed or hung initializer, so a timed-out waiter may race a slow one —
//! initialization tolerates that by closing any stray handle before
//! launching.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::network::{
    ClearBrowserCookiesParams, CookieParam, SetCookiesParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::browser::launch::{build_session_config, find_chrome_executable};
use crate::browser::page::CdpPage;
use crate::error::WardenError;
use crate::session::cookie_store::CookieRecord;
use crate::session::inspector::{DOM_SETTLE_DELAY, NAVIGATION_TIMEOUT};

/// Poll interval while another caller's initialization is in flight.
pub const INIT_WAIT_POLL: Duration = Duration::from_millis(100);

/// Hard cap on waiting for an in-flight initialization before assuming the
/// initializer is stuck and proceeding anyway.
pub const INIT_WAIT_CAP: Duration = Duration::from_secs(30);

struct LiveSession {
    browser: Browser,
    page: Page,
    initialized_at: Instant,
    headless: bool,
    handler_task: tokio::task::JoinHandle<()>,
}

/// Caller-facing view of the shared session. The browser stays owned by the
/// manager; `Page` is cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    pub page: Page,
    pub initialized_at: Instant,
}

impl SessionHandle {
    /// Inspector-compatible view of the session's page.
    pub fn dom(&self) -> CdpPage {
        CdpPage::new(self.page.clone())
    }
}

pub struct SessionManager {
    exe: Option<String>,
    user_data_dir: PathBuf,
    headless_default: bool,
    inner: Mutex<Option<LiveSession>>,
    // Waiters poll this instead of blocking on `inner` so a hung initializer
    // can be detected and overridden.
    init_started: std::sync::Mutex<Option<Instant>>,
}

impl SessionManager {
    /// Browser discovery happens here; a missing binary only fails once a
    /// session is actually requested.
    pub fn new(user_data_dir: impl Into<PathBuf>, headless: bool) -> Self {
        Self {
            exe: find_chrome_executable(),
            user_data_dir: user_data_dir.into(),
            headless_default: headless,
            inner: Mutex::new(None),
            init_started: std::sync::Mutex::new(None),
        }
    }

    pub fn browser_available(&self) -> bool {
        self.exe.is_some()
    }

    /// Get the shared session, reusing the existing one when its liveness
    /// probe passes. Fails with [`WardenError::BrowserLaunch`] when the
    /// browser cannot start; retries belong to the caller.
    pub async fn session(&self) -> Result<SessionHandle, WardenError> {
        self.session_with_mode(self.headless_default).await
    }

    /// The single configurable replacement for per-purpose window scripts:
    /// make sure a *visible* session exists (relaunching a headless one if
    /// needed), navigate it to `url`, and optionally force it to the
    /// foreground.
    pub async fn ensure_visible_session(
        &self,
        url: &str,
        force_foreground: bool,
    ) -> Result<SessionHandle, WardenError> {
        let handle = self.session_with_mode(false).await?;
        navigate_and_settle(&handle.page, url).await?;
        if force_foreground {
            if let Err(e) = handle.page.bring_to_front().await {
                warn!("session: bring_to_front failed (window may be backgrounded): {}", e);
            }
        }
        Ok(handle)
    }

    async fn session_with_mode(&self, headless: bool) -> Result<SessionHandle, WardenError> {
        self.wait_for_inflight_init().await;

        let mut guard = self.inner.lock().await;

        if let Some(live) = guard.as_ref() {
            let mode_ok = live.headless == headless || headless;
            if mode_ok && probe(&live.page).await {
                return Ok(SessionHandle {
                    page: live.page.clone(),
                    initialized_at: live.initialized_at,
                });
            }
            if !mode_ok {
                info!("session: relaunching headed (current session is headless)");
            } else {
                warn!("session: liveness probe failed — session invalid, reinitializing");
            }
        }

        self.init_locked(&mut guard, headless).await
    }

    /// Bounded wait on another caller's initialization: poll at
    /// [`INIT_WAIT_POLL`] up to [`INIT_WAIT_CAP`], then force-clear the flag
    /// and proceed. Liveness over strict mutual exclusion.
    async fn wait_for_inflight_init(&self) {
        let started_waiting = Instant::now();
        loop {
            {
                let mut flag = self.init_started.lock().unwrap();
                match *flag {
                    None => return,
                    Some(_) if started_waiting.elapsed() >= INIT_WAIT_CAP => {
                        warn!(
                            "session: in-flight init exceeded {:?} — clearing flag and proceeding",
                            INIT_WAIT_CAP
                        );
                        *flag = None;
                        return;
                    }
                    Some(_) => {}
                }
            }
            tokio::time::sleep(INIT_WAIT_POLL).await;
        }
    }

    async fn init_locked(
        &self,
        guard: &mut Option<LiveSession>,
        headless: bool,
    ) -> Result<SessionHandle, WardenError> {
        *self.init_started.lock().unwrap() = Some(Instant::now());
        let result = self.launch(guard, headless).await;
        *self.init_started.lock().unwrap() = None;
        result
    }

    async fn launch(
        &self,
        guard: &mut Option<LiveSession>,
        headless: bool,
    ) -> Result<SessionHandle, WardenError> {
        // Idempotent against a raced double-init: any stray handle goes first.
        if let Some(old) = guard.take() {
            close_session(old).await;
        }

        let exe = self.exe.as_deref().ok_or_else(|| {
            WardenError::BrowserLaunch(
                "no Chrome/Chromium executable found; set CHROME_EXECUTABLE".into(),
            )
        })?;

        info!(
            "session: launching {} browser (profile {})",
            if headless { "headless" } else { "visible" },
            self.user_data_dir.display()
        );

        let config = build_session_config(exe, &self.user_data_dir, headless)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| WardenError::BrowserLaunch(format!("{}: {}", exe, e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("session: CDP handler error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| WardenError::BrowserLaunch(format!("failed to open page: {}", e)))?;

        let initialized_at = Instant::now();
        *guard = Some(LiveSession {
            browser,
            page: page.clone(),
            initialized_at,
            headless,
            handler_task,
        });

        Ok(SessionHandle {
            page,
            initialized_at,
        })
    }

    /// Peek at the current page without initializing anything. Used by status
    /// queries that want DOM corroboration only when it is already cheap.
    pub async fn current_page(&self) -> Option<Page> {
        self.inner.lock().await.as_ref().map(|l| l.page.clone())
    }

    /// Full-replace the live context's cookies: clear everything, then set
    /// the given batch — mirroring the cookie store's own save semantics.
    ///
    /// Returns the number of cookies actually set; individual records that
    /// cannot be sent over CDP are skipped, not fatal.
    pub async fn load_cookies(&self, cookies: &[CookieRecord]) -> Result<usize, WardenError> {
        let guard = self.inner.lock().await;
        let live = guard.as_ref().ok_or(WardenError::SessionNotReady)?;

        live.page
            .execute(ClearBrowserCookiesParams::default())
            .await
            .map_err(|e| WardenError::PageUnavailable(e.to_string()))?;

        let params = cookie_batch(cookies);
        let count = params.len();
        if count < cookies.len() {
            warn!(
                "session: {} of {} cookies were skipped (no domain or failed CDP conversion)",
                cookies.len() - count,
                cookies.len()
            );
        }
        if count > 0 {
            live.page
                .execute(SetCookiesParams::new(params))
                .await
                .map_err(|e| WardenError::PageUnavailable(e.to_string()))?;
        }
        info!("session: loaded {} cookies into live context", count);
        Ok(count)
    }

    /// Capture the live context's current cookies as store records.
    pub async fn session_cookies(&self) -> Result<Vec<CookieRecord>, WardenError> {
        let guard = self.inner.lock().await;
        let live = guard.as_ref().ok_or(WardenError::SessionNotReady)?;

        let raw = live
            .page
            .get_cookies()
            .await
            .map_err(|e| WardenError::PageUnavailable(e.to_string()))?;

        Ok(raw
            .iter()
            .filter_map(|c| {
                serde_json::to_value(c)
                    .ok()
                    .and_then(|v| CookieRecord::from_cdp_value(&v))
            })
            .collect())
    }

    /// Release the browser. Idempotent — closing an already-closed session is
    /// a no-op.
    pub async fn close(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(live) = guard.take() {
            close_session(live).await;
            info!("session: closed");
        }
    }
}

async fn close_session(mut live: LiveSession) {
    if let Err(e) = live.browser.close().await {
        warn!("session: browser close error (non-fatal): {}", e);
    }
    live.handler_task.abort();
}

/// Convert store records into a `Network.setCookies` batch. Records without
/// a domain are dropped up front: CDP requires a `domain` or `url` per
/// cookie, and a single offender fails the whole command — after the context
/// was already cleared.
fn cookie_batch(cookies: &[CookieRecord]) -> Vec<CookieParam> {
    cookies
        .iter()
        .filter(|c| {
            if c.domain.is_empty() {
                warn!("session: skipping cookie '{}' with no domain", c.name);
                return false;
            }
            true
        })
        .filter_map(|c| serde_json::from_value::<CookieParam>(c.to_cdp_value()).ok())
        .collect()
}

/// Cheap liveness probe: evaluate a constant. Any failure means the page or
/// its browser is gone.
async fn probe(page: &Page) -> bool {
    page.evaluate("1 + 1").await.is_ok()
}

/// Navigate with the standard budget, then give the DOM the settle delay the
/// inspector assumes before sampling.
pub async fn navigate_and_settle(page: &Page, url: &str) -> Result<(), WardenError> {
    tokio::time::timeout(NAVIGATION_TIMEOUT, page.goto(url))
        .await
        .map_err(|_| {
            WardenError::PageUnavailable(format!(
                "navigation to {} did not settle within {:?}",
                url, NAVIGATION_TIMEOUT
            ))
        })?
        .map_err(|e| WardenError::PageUnavailable(e.to_string()))?;
    tokio::time::sleep(DOM_SETTLE_DELAY).await;
    Ok(())
}
