//! Browser executable discovery and launch presets.
//!
//! The session manager launches one persistent-profile browser; the presets
//! here differ only in headless vs visible. Visible launches are what the
//! "ensure visible session" operation uses when a human has to complete a
//! login in the window.

use std::path::{Path, PathBuf};

use chromiumoxide::browser::BrowserConfig;

use crate::error::WardenError;

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan — finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "chrome",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

/// Build the launch config for the shared session.
///
/// The profile is persistent (`user_data_dir`) so cookies and local storage
/// survive process restarts — a login completed in a visible window is still
/// there the next time a headless session reuses the same profile.
pub fn build_session_config(
    exe: &str,
    user_data_dir: &PathBuf,
    headless: bool,
) -> Result<BrowserConfig, WardenError> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .user_data_dir(user_data_dir)
        .viewport(None)
        .arg("--no-sandbox") // often required in CI / restricted environments
        .arg("--disable-dev-shm-usage")
        .arg("--disable-background-networking")
        .arg("--disable-crash-reporter")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-blink-features=AutomationControlled");

    if !headless {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| WardenError::BrowserLaunch(format!("invalid browser config: {}", e)))
}
