//! Cookie persistence — the on-disk ground truth for "what credentials do we have."
//!
//! The store is a JSON array of [`CookieRecord`] at a configured path. Every
//! `save` replaces the entire set (no merge, no in-place patch) and every
//! `load` re-reads the file — an external browser flow may rewrite the
//! credentials out of band, so an in-memory cache would serve stale data.
//!
//! Writes are atomic (write-to-temp then rename) so a concurrent reader never
//! observes a partially-written file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::WardenError;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Cookie `SameSite` attribute. Defaults to `Lax` (the permissive browser
/// default) when the ingested JSON omits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

/// One persisted browser cookie.
///
/// Field names serialize in camelCase so files pasted from devtools or dumped
/// from CDP (`httpOnly`, `sameSite`) round-trip without renaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Unix seconds. `<= 0` means the cookie never expires (session-scoped).
    #[serde(default)]
    pub expires: i64,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub same_site: SameSite,
}

fn default_path() -> String {
    "/".to_string()
}

impl CookieRecord {
    /// A cookie is live when it never expires or its expiry is still in the
    /// future. Strictly greater: a cookie expiring exactly `now` is dead.
    pub fn is_live(&self, now: i64) -> bool {
        self.expires <= 0 || self.expires > now
    }

    /// Minimal validation applied at the ingestion boundary.
    pub fn validate(&self) -> Result<(), WardenError> {
        if self.name.trim().is_empty() {
            return Err(WardenError::InvalidCookie("empty name".into()));
        }
        if self.value.trim().is_empty() {
            return Err(WardenError::InvalidCookie(format!(
                "cookie '{}' has an empty value",
                self.name
            )));
        }
        Ok(())
    }

    /// Build a record from a raw CDP cookie object (`Network.getCookies`
    /// output serialized to JSON). CDP reports `expires` as an `f64` where
    /// `-1` marks a session cookie; both normalize to `0` here.
    ///
    /// Returns `None` for entries missing a name or value — a partially
    /// malformed dump never blocks the rest of the batch.
    pub fn from_cdp_value(v: &serde_json::Value) -> Option<Self> {
        let name = v.get("name")?.as_str()?.to_string();
        let value = v.get("value")?.as_str()?.to_string();
        if name.is_empty() || value.is_empty() {
            return None;
        }
        let expires = v
            .get("expires")
            .and_then(|e| e.as_f64())
            .filter(|e| *e > 0.0)
            .map(|e| e as i64)
            .unwrap_or(0);
        let same_site = match v.get("sameSite").and_then(|s| s.as_str()) {
            Some("Strict") => SameSite::Strict,
            Some("None") => SameSite::None,
            _ => SameSite::Lax,
        };
        Some(Self {
            name,
            value,
            domain: v
                .get("domain")
                .and_then(|d| d.as_str())
                .unwrap_or_default()
                .to_string(),
            path: v
                .get("path")
                .and_then(|p| p.as_str())
                .unwrap_or("/")
                .to_string(),
            expires,
            secure: v.get("secure").and_then(|s| s.as_bool()).unwrap_or(false),
            http_only: v.get("httpOnly").and_then(|s| s.as_bool()).unwrap_or(false),
            same_site,
        })
    }

    /// Project into the JSON shape CDP's `Network.setCookies` accepts.
    /// Session-scoped cookies (`expires <= 0`) omit the `expires` field.
    pub fn to_cdp_value(&self) -> serde_json::Value {
        let mut v = serde_json::json!({
            "name": self.name,
            "value": self.value,
            "path": self.path,
            "secure": self.secure,
            "httpOnly": self.http_only,
            "sameSite": self.same_site,
        });
        if !self.domain.is_empty() {
            v["domain"] = serde_json::Value::String(self.domain.clone());
        }
        if self.expires > 0 {
            v["expires"] = serde_json::json!(self.expires as f64);
        }
        v
    }
}

/// Minimum positive expiry across a cookie set, i.e. when the stored session
/// starts going stale. `None` when every cookie is session-scoped.
pub fn min_cookie_expiry(cookies: &[CookieRecord]) -> Option<i64> {
    cookies
        .iter()
        .map(|c| c.expires)
        .filter(|&e| e > 0)
        .min()
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// File-backed cookie store. Cheap to clone; holds only the path.
#[derive(Debug, Clone)]
pub struct CookieStore {
    path: PathBuf,
}

impl CookieStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full persisted set.
    ///
    /// A missing file is [`WardenError::CookieFileMissing`] so callers can
    /// distinguish "never logged in" from a disk failure. A file that exists
    /// but fails to parse is logged and treated as empty — a corrupt jar must
    /// degrade to "not authenticated", never to a crash.
    pub fn load(&self) -> Result<Vec<CookieRecord>, WardenError> {
        if !self.path.exists() {
            return Err(WardenError::CookieFileMissing(self.path.clone()));
        }
        let content = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str::<Vec<CookieRecord>>(&content) {
            Ok(cookies) => Ok(cookies),
            Err(e) => {
                warn!(
                    "cookie_store: failed to parse {}: {} — treating as empty",
                    self.path.display(),
                    e
                );
                Ok(Vec::new())
            }
        }
    }

    /// Like [`load`](Self::load) but maps a missing file to an empty set.
    pub fn load_or_empty(&self) -> Result<Vec<CookieRecord>, WardenError> {
        match self.load() {
            Ok(c) => Ok(c),
            Err(WardenError::CookieFileMissing(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Atomically replace the entire persisted set.
    pub fn save(&self, cookies: &[CookieRecord]) -> Result<(), WardenError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(cookies)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        // Atomic write via temp file + rename.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &self.path)?;

        info!(
            "cookie_store: saved {} cookies to {}",
            cookies.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Explicit clear — an empty full-file overwrite, same semantics as any
    /// other save.
    pub fn clear(&self) -> Result<(), WardenError> {
        self.save(&[])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(name: &str, value: &str, expires: i64) -> CookieRecord {
        CookieRecord {
            name: name.into(),
            value: value.into(),
            domain: ".example.com".into(),
            path: "/".into(),
            expires,
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieStore::new(dir.path().join("cookies.json"));
        let set = vec![cookie("web_session", "abc", 0), cookie("pref", "1", 2_000_000_000)];
        store.save(&set).unwrap();
        assert_eq!(store.load().unwrap(), set);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieStore::new(dir.path().join("absent.json"));
        assert!(matches!(
            store.load(),
            Err(WardenError::CookieFileMissing(_))
        ));
        assert!(store.load_or_empty().unwrap().is_empty());
    }

    #[test]
    fn save_replaces_whole_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieStore::new(dir.path().join("cookies.json"));
        store.save(&[cookie("a", "1", 0), cookie("b", "2", 0)]).unwrap();
        store.save(&[cookie("c", "3", 0)]).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "c");
    }

    #[test]
    fn clear_leaves_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieStore::new(dir.path().join("cookies.json"));
        store.save(&[cookie("a", "1", 0)]).unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = CookieStore::new(&path);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn optional_fields_default_permissive() {
        let parsed: Vec<CookieRecord> =
            serde_json::from_str(r#"[{"name":"sid","value":"x"}]"#).unwrap();
        let c = &parsed[0];
        assert_eq!(c.expires, 0);
        assert!(!c.secure);
        assert!(!c.http_only);
        assert_eq!(c.same_site, SameSite::Lax);
        assert_eq!(c.path, "/");
    }

    #[test]
    fn liveness_boundary_is_strict() {
        let now = 1_700_000_000;
        assert!(cookie("a", "1", 0).is_live(now));
        assert!(cookie("a", "1", -1).is_live(now));
        assert!(cookie("a", "1", now + 1).is_live(now));
        // Expiring exactly now is dead.
        assert!(!cookie("a", "1", now).is_live(now));
        assert!(!cookie("a", "1", now - 100).is_live(now));
    }

    #[test]
    fn cdp_round_trip_normalizes_session_expiry() {
        let raw = serde_json::json!({
            "name": "sid", "value": "v", "domain": ".example.com",
            "path": "/", "expires": -1.0, "secure": true,
            "httpOnly": true, "sameSite": "Strict"
        });
        let rec = CookieRecord::from_cdp_value(&raw).unwrap();
        assert_eq!(rec.expires, 0);
        assert_eq!(rec.same_site, SameSite::Strict);

        let out = rec.to_cdp_value();
        assert!(out.get("expires").is_none(), "session cookie omits expires");
        assert_eq!(out["sameSite"], "Strict");
    }

    #[test]
    fn min_expiry_skips_session_scoped() {
        let set = vec![
            cookie("a", "1", 0),
            cookie("b", "2", 1_900_000_000),
            cookie("c", "3", 1_800_000_000),
        ];
        assert_eq!(min_cookie_expiry(&set), Some(1_800_000_000));
        assert_eq!(min_cookie_expiry(&[cookie("a", "1", 0)]), None);
    }

    #[test]
    fn validate_rejects_empty_name_or_value() {
        assert!(cookie("", "v", 0).validate().is_err());
        assert!(cookie("n", "", 0).validate().is_err());
        assert!(cookie("n", "v", 0).validate().is_ok());
    }
}
