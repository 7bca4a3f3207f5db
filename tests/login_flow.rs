//! End-to-end exercises of the login-state pipeline against the public API:
//! ingest-style cookie persistence → scoring → unified verdict → gate.

use std::time::Duration;

use async_trait::async_trait;
use session_warden::{
    CookieRecord, CookieStore, LoginGate, LoginResolver, PageDom, WardenError,
    DEFAULT_SCORE_THRESHOLD,
};

/// Page stub driven by two knobs: logged-in chrome and a visible login form.
struct FakePage {
    user_elements: bool,
    login_prompt: bool,
}

#[async_trait]
impl PageDom for FakePage {
    async fn current_url(&self) -> Result<String, WardenError> {
        Ok("https://example.com/browse".into())
    }

    async fn title(&self) -> Result<String, WardenError> {
        Ok("Browse".into())
    }

    async fn eval_bool(&self, js: &str) -> Result<bool, WardenError> {
        if js.contains("password") {
            Ok(self.login_prompt)
        } else if js.contains("avatar")
            || js.contains("account-menu")
            || js.contains("username")
            || js.contains("logout")
        {
            Ok(self.user_elements)
        } else {
            Ok(true)
        }
    }
}

fn devtools_paste() -> Vec<CookieRecord> {
    // Minimal records the ingestion endpoint accepts: name/value only, the
    // rest defaulting permissively.
    serde_json::from_str(
        r#"[
            {"name": "web_session", "value": "abc123"},
            {"name": "locale", "value": "en"}
        ]"#,
    )
    .unwrap()
}

#[tokio::test]
async fn pasted_cookies_produce_a_logged_in_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let store = CookieStore::new(dir.path().join("cookies.json"));
    store.save(&devtools_paste()).unwrap();

    let resolver = LoginResolver::new(store, DEFAULT_SCORE_THRESHOLD);
    let verdict = resolver.resolve(None).await;

    // web_session: 1 + 2 (auth keyword) + 3 (site marker); locale: 1.
    assert_eq!(verdict.cookie_score, 7);
    assert!(verdict.is_logged_in);
    assert_eq!(verdict.cookie_count, 2);
}

#[tokio::test]
async fn live_login_prompt_overrules_stored_cookies() {
    let dir = tempfile::tempdir().unwrap();
    let store = CookieStore::new(dir.path().join("cookies.json"));
    store.save(&devtools_paste()).unwrap();

    let resolver = LoginResolver::new(store, DEFAULT_SCORE_THRESHOLD);
    let page = FakePage {
        user_elements: false,
        login_prompt: true,
    };
    let verdict = resolver.resolve(Some(&page)).await;

    assert!(!verdict.is_logged_in, "prompt veto beats a passing score");
    assert!(verdict.page.unwrap().has_login_prompt);
}

#[tokio::test]
async fn logged_in_page_corroborates_without_inflating_the_score() {
    let dir = tempfile::tempdir().unwrap();
    let store = CookieStore::new(dir.path().join("cookies.json"));
    store.save(&devtools_paste()).unwrap();

    let resolver = LoginResolver::new(store, DEFAULT_SCORE_THRESHOLD);
    let page = FakePage {
        user_elements: true,
        login_prompt: false,
    };
    let verdict = resolver.resolve(Some(&page)).await;

    assert!(verdict.is_logged_in);
    // Page signals never add to the reconciled score.
    assert_eq!(verdict.score, verdict.cookie_score);
}

#[tokio::test]
async fn negative_verdict_flows_into_a_single_gated_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let store = CookieStore::new(dir.path().join("cookies.json"));
    // Nothing persisted: verdict is negative, so callers race to reopen.
    let resolver = LoginResolver::new(store, DEFAULT_SCORE_THRESHOLD);
    assert!(!resolver.resolve(None).await.is_logged_in);

    let gate = LoginGate::with_windows(Duration::from_millis(50), Duration::from_secs(60));
    let winners: Vec<&str> = ["batch-1", "batch-2", "batch-3"]
        .into_iter()
        .filter(|id| gate.try_acquire(id))
        .collect();
    assert_eq!(winners, vec!["batch-1"]);

    gate.release("batch-1", true);
    // Still cooling down: the next batch task backs off instead of reopening.
    assert!(!gate.try_acquire("batch-2"));
}
