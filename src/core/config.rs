use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// WardenConfig — file-based config loader (session-warden.json) with env-var
// fallback for every field
// ---------------------------------------------------------------------------

/// Top-level config loaded from `session-warden.json`. Every field is
/// optional; resolution is JSON field → env var → built-in default.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct WardenConfig {
    /// Path of the persisted cookie file.
    pub cookie_file: Option<String>,
    /// Directory for the persistent browser profile.
    pub user_data_dir: Option<String>,
    /// Page a reopened login window navigates to.
    pub login_url: Option<String>,
    /// Minimum cookie score considered logged in.
    pub score_threshold: Option<u8>,
    /// Whether the shared session launches headless by default.
    pub headless: Option<bool>,
    /// Seconds between allowed login-window reopen attempts.
    pub gate_cooldown_secs: Option<u64>,
    /// Seconds after which an unreleased reopen is considered crashed.
    pub gate_stale_secs: Option<u64>,
}

impl WardenConfig {
    /// Cookie file: JSON field → `SESSION_WARDEN_COOKIE_FILE` env var →
    /// `~/.session-warden/cookies.json`.
    pub fn resolve_cookie_file(&self) -> PathBuf {
        if let Some(p) = &self.cookie_file {
            if !p.trim().is_empty() {
                return PathBuf::from(p);
            }
        }
        if let Ok(p) = std::env::var("SESSION_WARDEN_COOKIE_FILE") {
            if !p.trim().is_empty() {
                return PathBuf::from(p);
            }
        }
        warden_home().join("cookies.json")
    }

    /// Browser profile dir: JSON field → `SESSION_WARDEN_PROFILE_DIR` →
    /// `~/.session-warden/browser-profile`.
    pub fn resolve_user_data_dir(&self) -> PathBuf {
        if let Some(p) = &self.user_data_dir {
            if !p.trim().is_empty() {
                return PathBuf::from(p);
            }
        }
        if let Ok(p) = std::env::var("SESSION_WARDEN_PROFILE_DIR") {
            if !p.trim().is_empty() {
                return PathBuf::from(p);
            }
        }
        warden_home().join("browser-profile")
    }

    /// Login URL: JSON field → `SESSION_WARDEN_LOGIN_URL` →
    /// `https://example.com/login` (a real deployment sets this).
    pub fn resolve_login_url(&self) -> String {
        if let Some(u) = &self.login_url {
            if !u.trim().is_empty() {
                return u.clone();
            }
        }
        std::env::var("SESSION_WARDEN_LOGIN_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "https://example.com/login".to_string())
    }

    /// Score threshold: JSON field → `SESSION_WARDEN_SCORE_THRESHOLD` →
    /// [`crate::session::resolver::DEFAULT_SCORE_THRESHOLD`].
    pub fn resolve_score_threshold(&self) -> u8 {
        if let Some(t) = self.score_threshold {
            return t;
        }
        std::env::var("SESSION_WARDEN_SCORE_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(crate::session::resolver::DEFAULT_SCORE_THRESHOLD)
    }

    /// Headless default: JSON field → `SESSION_WARDEN_HEADLESS` ("0"/"false"
    /// to disable) → `true`.
    pub fn resolve_headless(&self) -> bool {
        if let Some(b) = self.headless {
            return b;
        }
        match std::env::var("SESSION_WARDEN_HEADLESS") {
            Ok(v) => {
                let v = v.trim().to_ascii_lowercase();
                !matches!(v.as_str(), "0" | "false" | "no" | "off")
            }
            Err(_) => true,
        }
    }

    /// Gate cooldown: JSON field → `SESSION_WARDEN_GATE_COOLDOWN_SECS` →
    /// [`crate::gate::REOPEN_COOLDOWN`].
    pub fn resolve_gate_cooldown(&self) -> Duration {
        if let Some(s) = self.gate_cooldown_secs {
            return Duration::from_secs(s);
        }
        std::env::var("SESSION_WARDEN_GATE_COOLDOWN_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(crate::gate::REOPEN_COOLDOWN)
    }

    /// Gate staleness window: JSON field → `SESSION_WARDEN_GATE_STALE_SECS` →
    /// [`crate::gate::STALE_REOPEN_AFTER`].
    pub fn resolve_gate_stale(&self) -> Duration {
        if let Some(s) = self.gate_stale_secs {
            return Duration::from_secs(s);
        }
        std::env::var("SESSION_WARDEN_GATE_STALE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(crate::gate::STALE_REOPEN_AFTER)
    }
}

fn warden_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".session-warden")
}

/// Load `session-warden.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `SESSION_WARDEN_CONFIG` env var path
/// 2. `./session-warden.json` (process cwd)
/// 3. `../session-warden.json` (one level up)
///
/// Missing file → `WardenConfig::default()` (silent, all env fallbacks apply).
/// Parse error → log a warning, return defaults.
pub fn load_warden_config() -> WardenConfig {
    let candidates: Vec<PathBuf> = {
        let mut v = vec![
            PathBuf::from("session-warden.json"),
            PathBuf::from("../session-warden.json"),
        ];
        if let Ok(env_path) = std::env::var("SESSION_WARDEN_CONFIG") {
            v.insert(0, PathBuf::from(env_path));
        }
        v
    };

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<WardenConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("session-warden.json loaded from {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "session-warden.json parse error at {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    return WardenConfig::default();
                }
            },
            Err(_) => continue, // not found at this path — try next
        }
    }

    WardenConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_fields_win_over_defaults() {
        let cfg = WardenConfig {
            cookie_file: Some("/tmp/jar.json".into()),
            score_threshold: Some(4),
            headless: Some(false),
            gate_cooldown_secs: Some(1),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_cookie_file(), PathBuf::from("/tmp/jar.json"));
        assert_eq!(cfg.resolve_score_threshold(), 4);
        assert!(!cfg.resolve_headless());
        assert_eq!(cfg.resolve_gate_cooldown(), Duration::from_secs(1));
    }

    #[test]
    fn empty_config_resolves_defaults() {
        let cfg = WardenConfig::default();
        assert_eq!(
            cfg.resolve_score_threshold(),
            crate::session::resolver::DEFAULT_SCORE_THRESHOLD
        );
        assert_eq!(cfg.resolve_gate_stale(), crate::gate::STALE_REOPEN_AFTER);
        assert!(cfg
            .resolve_cookie_file()
            .to_string_lossy()
            .ends_with("cookies.json"));
    }
}
