//! Error taxonomy shared across the crate.
//!
//! The split matters to callers: `CookieFileMissing` is recovered locally as an
//! empty cookie set, `PageUnavailable` degrades the resolver to cookies-only,
//! while `Io` and `BrowserLaunch` are fatal to the operation that hit them.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WardenError {
    /// The cookie file does not exist yet. Callers treat this as "no stored
    /// credentials", not as a failure.
    #[error("cookie file not found: {0}")]
    CookieFileMissing(PathBuf),

    /// Disk failure reading or writing the cookie file. Propagated — the
    /// calling operation cannot safely pretend the save happened.
    #[error("cookie store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// The page handle is closed, detached, or navigation never settled.
    #[error("page unavailable: {0}")]
    PageUnavailable(String),

    /// Browser process could not be launched (missing binary, port conflict).
    /// Fatal to the caller; retries belong above this layer.
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    /// A cookie operation was attempted against the live context without a
    /// live context. Caller error.
    #[error("no live browser session")]
    SessionNotReady,

    /// An ingested cookie failed minimal validation (empty name or value).
    #[error("invalid cookie: {0}")]
    InvalidCookie(String),
}
