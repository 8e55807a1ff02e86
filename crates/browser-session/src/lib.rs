//! Browser process lifecycle, identity persistence, and the generic
//! driver interface the rest of the engine is written against.

pub mod chromium;
pub mod config;
pub mod driver;
pub mod errors;
pub mod session;
pub mod testing;

pub use config::SessionConfig;
pub use driver::{BrowserOps, IdentityState, PageOps, TextScope};
pub use errors::DriverError;
pub use session::{BrowserLauncher, ChromiumLauncher, SessionHandle, SessionManager};
