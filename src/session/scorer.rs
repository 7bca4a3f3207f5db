//! Cookie Scorer — pure mapping from a cookie set to a login confidence score.
//!
//! No I/O, no clock reads: callers pass `now` explicitly so the same set
//! always scores the same. The score feeds the unified resolver; the live
//! subset is reused by callers that want to inject only valid cookies.

use crate::session::cookie_store::CookieRecord;

/// Keywords whose presence in a cookie name suggests an auth credential.
pub const AUTH_KEYWORDS: &[&str] = &["session", "token", "user", "auth"];

/// Names the target site is known to use for its logged-in session markers.
pub const SITE_SESSION_MARKERS: &[&str] = &["web_session", "remember_user_token", "logged_in"];

/// Upper clamp for the confidence score.
pub const MAX_SCORE: u8 = 10;

/// Result of scoring: the clamped confidence and the live subset it was
/// computed from. Derived data — never persisted.
#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    pub score: u8,
    pub live: Vec<CookieRecord>,
}

fn name_matches(name: &str, keywords: &[&str]) -> bool {
    let lower = name.to_ascii_lowercase();
    keywords.iter().any(|k| lower.contains(k))
}

/// Score a cookie set at evaluation time `now` (unix seconds).
///
/// * base: one point per live cookie
/// * +2 per live cookie whose name contains an auth keyword
/// * +3 per live cookie whose name matches a site session marker
/// * clamped to [`MAX_SCORE`]
///
/// A cookie matching both keyword sets earns both bonuses. That
/// double-counting is preserved deliberately for compatibility with the
/// behavior downstream consumers were tuned against; see DESIGN.md before
/// changing it.
pub fn score(cookies: &[CookieRecord], now: i64) -> ScoreBreakdown {
    let live: Vec<CookieRecord> = cookies
        .iter()
        .filter(|c| c.is_live(now))
        .cloned()
        .collect();

    let base = live.len() as u32;
    let auth_bonus = 2 * live
        .iter()
        .filter(|c| name_matches(&c.name, AUTH_KEYWORDS))
        .count() as u32;
    let site_bonus = 3 * live
        .iter()
        .filter(|c| name_matches(&c.name, SITE_SESSION_MARKERS))
        .count() as u32;

    let score = (base + auth_bonus + site_bonus).min(MAX_SCORE as u32) as u8;
    ScoreBreakdown { score, live }
}
