pub mod browser;
pub mod core;
pub mod error;
pub mod gate;
pub mod session;

// --- Primary exports ---
pub use crate::core::config::{load_warden_config, WardenConfig};
pub use crate::core::AppState;
pub use error::WardenError;
pub use gate::LoginGate;

pub use browser::manager::{SessionHandle, SessionManager};
pub use browser::page::CdpPage;
pub use session::cookie_store::{CookieRecord, CookieStore, SameSite};
pub use session::inspector::{PageDom, PageSnapshot};
pub use session::resolver::{LoginResolver, LoginVerdict, DEFAULT_SCORE_THRESHOLD};
pub use session::scorer;
