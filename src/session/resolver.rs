//! Unified Login-Status Resolver — one authoritative verdict from the two
//! historically-divergent detectors (file-based cookie score, DOM-based page
//! score).
//!
//! The reconciled rule is deliberately small: the cookie score alone is
//! compared against a single threshold, and the page contributes exactly one
//! thing — a veto when an explicit login prompt is visible. Earlier designs
//! additively combined page weights into the score and the two numbers
//! drifted apart; do not reintroduce that.
//!
//! `resolve` is a status query, not a command: it is total. Any failure along
//! the way is folded into a negative verdict, because downstream batch logic
//! treats "can't determine" the same as "not logged in".

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::WardenError;
use crate::session::cookie_store::{min_cookie_expiry, CookieStore};
use crate::session::inspector::{self, PageDom, PageSnapshot};
use crate::session::scorer;

/// Minimum cookie score considered "logged in". Settled at 2 after iterating
/// from "any score > 0" (too loose) through "≥ 3" (too strict).
pub const DEFAULT_SCORE_THRESHOLD: u8 = 2;

/// How long a computed verdict may be served from the in-process memo before
/// being recomputed. Short on purpose — only collapses redundant
/// back-to-back checks, never masks a login-state change for long.
pub const VERDICT_MEMO_TTL: Duration = Duration::from_secs(5);

/// The resolver's final answer plus the evidence behind it. Ephemeral.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginVerdict {
    pub is_logged_in: bool,
    /// Final reconciled score. Equals `cookie_score` unless an error zeroed it.
    pub score: u8,
    pub cookie_score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<PageSnapshot>,
    pub cookie_count: usize,
    /// Earliest positive cookie expiry (unix seconds); `None` when all
    /// cookies are session-scoped.
    pub cookie_expires: Option<i64>,
    pub computed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoginVerdict {
    fn failed(kind: &WardenError) -> Self {
        Self {
            is_logged_in: false,
            score: 0,
            cookie_score: 0,
            page: None,
            cookie_count: 0,
            cookie_expires: None,
            computed_at: Utc::now(),
            error: Some(kind.to_string()),
        }
    }

    /// Project into the external status shape consumed by the UI layer:
    /// `{isLoggedIn, loginScore, cookieInfo: {count, expires}}`.
    pub fn to_status(&self) -> serde_json::Value {
        serde_json::json!({
            "isLoggedIn": self.is_logged_in,
            "loginScore": self.score,
            "cookieInfo": {
                "count": self.cookie_count,
                "expires": self.cookie_expires,
            },
        })
    }
}

pub struct LoginResolver {
    store: CookieStore,
    threshold: u8,
    memo: tokio::sync::Mutex<Option<(Instant, LoginVerdict)>>,
    memo_ttl: Duration,
}

impl LoginResolver {
    pub fn new(store: CookieStore, threshold: u8) -> Self {
        Self {
            store,
            threshold,
            memo: tokio::sync::Mutex::new(None),
            memo_ttl: VERDICT_MEMO_TTL,
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Compute the unified verdict.
    ///
    /// * Cookie file missing → scored as an empty set.
    /// * Disk failure → negative verdict carrying the error, never a panic
    ///   or propagated `Err`.
    /// * Page supplied but unavailable → verdict from cookies alone, with
    ///   the inspection failure noted.
    /// * Visible login prompt → veto: not logged in regardless of score.
    pub async fn resolve(&self, page: Option<&dyn PageDom>) -> LoginVerdict {
        // Serve the memo only for cookie-only queries; a caller that went to
        // the trouble of supplying a live page gets a fresh sample.
        if page.is_none() {
            let memo = self.memo.lock().await;
            if let Some((at, verdict)) = memo.as_ref() {
                if at.elapsed() < self.memo_ttl {
                    debug!("resolver: serving memoized verdict ({}s old)", at.elapsed().as_secs());
                    return verdict.clone();
                }
            }
        }

        let verdict = self.compute(page).await;
        *self.memo.lock().await = Some((Instant::now(), verdict.clone()));
        verdict
    }

    async fn compute(&self, page: Option<&dyn PageDom>) -> LoginVerdict {
        let cookies = match self.store.load_or_empty() {
            Ok(c) => c,
            Err(e) => {
                warn!("resolver: cookie load failed: {}", e);
                return LoginVerdict::failed(&e);
            }
        };

        let now = Utc::now().timestamp();
        let breakdown = scorer::score(&cookies, now);
        let cookie_score = breakdown.score;

        let mut inspect_error = None;
        let snapshot = match page {
            Some(p) => match inspector::inspect(p).await {
                Ok(s) => Some(s),
                Err(e) => {
                    // No page signal; the cookie score still yields a verdict.
                    warn!("resolver: page inspection failed, falling back to cookies: {}", e);
                    inspect_error = Some(e.to_string());
                    None
                }
            },
            None => None,
        };

        let vetoed = snapshot
            .as_ref()
            .map(|s| s.has_login_prompt)
            .unwrap_or(false);
        let is_logged_in = if vetoed {
            info!(
                "resolver: login prompt visible — veto (cookie score {} ignored)",
                cookie_score
            );
            false
        } else {
            cookie_score >= self.threshold
        };

        debug!(
            "resolver: verdict logged_in={} score={} threshold={} veto={}",
            is_logged_in, cookie_score, self.threshold, vetoed
        );

        LoginVerdict {
            is_logged_in,
            score: cookie_score,
            cookie_score,
            page: snapshot,
            cookie_count: cookies.len(),
            cookie_expires: min_cookie_expiry(&cookies),
            computed_at: Utc::now(),
            error: inspect_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::cookie_store::{CookieRecord, SameSite};
    use crate::session::inspector::tests::StubPage;

    fn cookie(name: &str, expires: i64) -> CookieRecord {
        CookieRecord {
            name: name.into(),
            value: "v".into(),
            domain: String::new(),
            path: "/".into(),
            expires,
            secure: false,
            http_only: false,
            same_site: SameSite::Lax,
        }
    }

    fn resolver_with(cookies: &[CookieRecord]) -> (tempfile::TempDir, LoginResolver) {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieStore::new(dir.path().join("cookies.json"));
        store.save(cookies).unwrap();
        (dir, LoginResolver::new(store, DEFAULT_SCORE_THRESHOLD))
    }

    #[tokio::test]
    async fn missing_file_yields_negative_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieStore::new(dir.path().join("absent.json"));
        let resolver = LoginResolver::new(store, DEFAULT_SCORE_THRESHOLD);
        let v = resolver.resolve(None).await;
        assert!(!v.is_logged_in);
        assert_eq!(v.score, 0);
        assert!(v.error.is_none(), "missing file is not an error");
    }

    #[tokio::test]
    async fn disk_failure_yields_negative_error_verdict() {
        // Point the store at a directory so the read itself fails — unlike a
        // missing file, this is a real I/O error and must surface in the
        // verdict, still without propagating an Err.
        let dir = tempfile::tempdir().unwrap();
        let store = CookieStore::new(dir.path());
        let resolver = LoginResolver::new(store, DEFAULT_SCORE_THRESHOLD);
        let v = resolver.resolve(None).await;
        assert!(!v.is_logged_in);
        assert_eq!(v.score, 0);
        assert_eq!(v.cookie_count, 0);
        assert!(v.error.is_some(), "disk failure must be carried in the verdict");
    }

    #[tokio::test]
    async fn site_session_cookie_logs_in() {
        let (_dir, resolver) = resolver_with(&[cookie("web_session", 0)]);
        let v = resolver.resolve(None).await;
        assert!(v.is_logged_in);
        assert_eq!(v.score, 6);
        assert_eq!(v.cookie_count, 1);
    }

    #[tokio::test]
    async fn threshold_edge_is_inclusive() {
        // Two plain live cookies: score 2 == threshold → logged in.
        let (_dir, resolver) = resolver_with(&[cookie("theme", 0), cookie("locale", 0)]);
        assert!(resolver.resolve(None).await.is_logged_in);

        // One plain live cookie: score 1 == threshold-1 → not logged in.
        let (_dir, resolver) = resolver_with(&[cookie("theme", 0)]);
        assert!(!resolver.resolve(None).await.is_logged_in);
    }

    #[tokio::test]
    async fn login_prompt_vetoes_even_a_full_score() {
        let set: Vec<CookieRecord> = vec![
            cookie("web_session", 0),
            cookie("remember_user_token", 0),
            cookie("auth_id", 0),
        ];
        let (_dir, resolver) = resolver_with(&set);
        let page = StubPage {
            login_prompt: true,
            ..Default::default()
        };
        let v = resolver.resolve(Some(&page)).await;
        assert_eq!(v.cookie_score, 10);
        assert!(!v.is_logged_in, "veto must override cookie score");
    }

    #[tokio::test]
    async fn unavailable_page_falls_back_to_cookies() {
        let (_dir, resolver) = resolver_with(&[cookie("web_session", 0)]);
        let page = StubPage {
            closed: true,
            ..Default::default()
        };
        let v = resolver.resolve(Some(&page)).await;
        assert!(v.is_logged_in, "cookies alone still decide");
        assert!(v.page.is_none());
        assert!(v.error.is_some());
    }

    #[tokio::test]
    async fn expired_cookies_do_not_log_in() {
        let now = Utc::now().timestamp();
        let (_dir, resolver) = resolver_with(&[cookie("web_session", now - 100)]);
        let v = resolver.resolve(None).await;
        assert!(!v.is_logged_in);
        assert_eq!(v.score, 0);
    }

    #[tokio::test]
    async fn memo_serves_repeat_cookie_only_queries() {
        let (_dir, resolver) = resolver_with(&[cookie("web_session", 0)]);
        let first = resolver.resolve(None).await;
        let second = resolver.resolve(None).await;
        assert_eq!(first.computed_at, second.computed_at, "second hit should be memoized");
    }

    #[tokio::test]
    async fn status_projection_shape() {
        let (_dir, resolver) = resolver_with(&[cookie("web_session", 2_000_000_000)]);
        let status = resolver.resolve(None).await.to_status();
        assert_eq!(status["isLoggedIn"], true);
        assert_eq!(status["cookieInfo"]["count"], 1);
        assert_eq!(status["cookieInfo"]["expires"], 2_000_000_000i64);
    }
}
