//! Page-State Inspector — samples a live, already-navigated page into a
//! [`PageSnapshot`].
//!
//! Detection is a fixed rule set over a handful of DOM probes, not a generic
//! scraper. The inspector only needs the tiny [`PageDom`] capability (URL,
//! title, boolean JS evaluation); the chromiumoxide-backed implementation
//! lives in `browser::page`, and tests supply stubs.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::WardenError;

/// Navigation budget for callers that drive a `goto` before inspecting.
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between navigation settling and DOM sampling, so late-rendering
/// user chrome (avatar, menus) has a chance to appear.
pub const DOM_SETTLE_DELAY: Duration = Duration::from_secs(3);

// ─────────────────────────────────────────────────────────────────────────────
// Page capability
// ─────────────────────────────────────────────────────────────────────────────

/// Minimal read-only view of a live page. Any failure maps to
/// [`WardenError::PageUnavailable`].
#[async_trait]
pub trait PageDom: Send + Sync {
    async fn current_url(&self) -> Result<String, WardenError>;
    async fn title(&self) -> Result<String, WardenError>;
    /// Evaluate a JS expression expected to yield a boolean.
    async fn eval_bool(&self, js: &str) -> Result<bool, WardenError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Probes
// ─────────────────────────────────────────────────────────────────────────────

/// One named way of detecting logged-in user chrome. Strategies run in
/// priority order; the first probe that returns `true` wins.
pub struct DetectStrategy {
    pub name: &'static str,
    pub probe: &'static str,
}

/// Ordered user-element detection strategies, strongest selector first.
pub const USER_ELEMENT_STRATEGIES: &[DetectStrategy] = &[
    DetectStrategy {
        name: "avatar",
        probe: r#"!!document.querySelector('.user-avatar, img.avatar, [data-testid="user-avatar"]')"#,
    },
    DetectStrategy {
        name: "account_menu",
        probe: r#"!!document.querySelector('.account-menu, .user-menu, a[href*="/account"], a[href*="/profile"]')"#,
    },
    DetectStrategy {
        name: "username_label",
        probe: r#"!!document.querySelector('.username, .user-name, .header-username')"#,
    },
    DetectStrategy {
        name: "logout_link",
        probe: r#"!!document.querySelector('a[href*="logout"], a[href*="sign_out"]')"#,
    },
];

/// Explicit "please log in" markers — a login form or prompt text.
pub const LOGIN_PROMPT_PROBE: &str = r#"(() => {
  if (document.querySelector('form[action*="login"], form[action*="sign_in"], input[type="password"]')) return true;
  const t = ((document.body && document.body.innerText) || '').toLowerCase();
  return t.includes('please log in') || t.includes('please sign in') || t.includes('log in to continue');
})()"#;

const NAVIGATION_PROBE: &str =
    r#"!!document.querySelector('nav, header .menu, .global-nav, .site-header')"#;

const RESULTS_PROBE: &str = r#"!!document.querySelector('.search-results, .result-list, .content-grid, main article')"#;

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Ephemeral DOM sample. Recomputed on every inspection, never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub has_user_elements: bool,
    pub has_login_prompt: bool,
    pub has_navigation: bool,
    pub has_results_or_content: bool,
}

impl PageSnapshot {
    /// Legacy additive DOM score (+3 user elements, +2 navigation, +2
    /// results, -2 login prompt). Kept for log corroboration only — the
    /// unified resolver never adds this to the cookie score, because the two
    /// additive detectors disagreeing is exactly the inconsistency the
    /// resolver exists to remove.
    pub fn dom_score(&self) -> i32 {
        let mut s = 0;
        if self.has_user_elements {
            s += 3;
        }
        if self.has_navigation {
            s += 2;
        }
        if self.has_results_or_content {
            s += 2;
        }
        if self.has_login_prompt {
            s -= 2;
        }
        s
    }
}

/// Sample the DOM signals of an already-loaded page.
///
/// Fails with [`WardenError::PageUnavailable`] when the handle is closed or
/// evaluation is impossible; individual probe failures after the first
/// successful one degrade to `false` rather than aborting the snapshot.
pub async fn inspect(page: &dyn PageDom) -> Result<PageSnapshot, WardenError> {
    let url = page.current_url().await?;
    let title = page.title().await.unwrap_or_default();

    let mut has_user_elements = false;
    for strategy in USER_ELEMENT_STRATEGIES {
        match page.eval_bool(strategy.probe).await {
            Ok(true) => {
                debug!("inspector: user elements detected via '{}'", strategy.name);
                has_user_elements = true;
                break;
            }
            Ok(false) => {}
            Err(e) => warn!("inspector: probe '{}' failed: {}", strategy.name, e),
        }
    }

    let has_login_prompt = page.eval_bool(LOGIN_PROMPT_PROBE).await.unwrap_or(false);
    let has_navigation = page.eval_bool(NAVIGATION_PROBE).await.unwrap_or(false);
    let has_results_or_content = page.eval_bool(RESULTS_PROBE).await.unwrap_or(false);

    let snapshot = PageSnapshot {
        url,
        title,
        has_user_elements,
        has_login_prompt,
        has_navigation,
        has_results_or_content,
    };
    debug!(
        "inspector: {} — user={} prompt={} nav={} results={} (dom_score {})",
        snapshot.url,
        snapshot.has_user_elements,
        snapshot.has_login_prompt,
        snapshot.has_navigation,
        snapshot.has_results_or_content,
        snapshot.dom_score()
    );
    Ok(snapshot)
}
