//! Session lifecycle: launch arbitration, identity persistence, and
//! exactly-once teardown.
//!
//! A [`SessionManager`] owns at most one live browser. Concurrent
//! `acquire` calls never race a second process into existence: the
//! first caller to flip the launching flag performs the launch while
//! the rest poll until the shared browser appears.

use crate::chromium::ChromiumBrowser;
use crate::config::SessionConfig;
use crate::driver::{BrowserOps, IdentityState, PageOps};
use crate::errors::DriverError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Strategy for bringing up a browser process. Injected so the
/// arbitration logic can be exercised without Chrome.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, config: &SessionConfig) -> Result<Arc<dyn BrowserOps>, DriverError>;
}

/// Launches real Chromium processes.
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, config: &SessionConfig) -> Result<Arc<dyn BrowserOps>, DriverError> {
        let browser = ChromiumBrowser::launch(config).await?;
        Ok(Arc::new(browser))
    }
}

/// A borrowed view of the live session: the browser plus its focused
/// page. Focus follows the most recently opened live page, so popups
/// take over automatically.
#[derive(Clone)]
pub struct SessionHandle {
    pub browser: Arc<dyn BrowserOps>,
    pub page: Arc<dyn PageOps>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").finish_non_exhaustive()
    }
}

/// Owns the single browser instance and its persisted identity state.
pub struct SessionManager {
    config: SessionConfig,
    launcher: Arc<dyn BrowserLauncher>,
    browser: RwLock<Option<Arc<dyn BrowserOps>>>,
    launching: AtomicBool,
    closed: AtomicBool,
}

impl SessionManager {
    pub fn new(config: SessionConfig, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            config,
            launcher,
            browser: RwLock::new(None),
            launching: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Manager backed by real Chromium.
    pub fn with_chromium(config: SessionConfig) -> Self {
        Self::new(config, Arc::new(ChromiumLauncher))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get the live session, launching the browser if needed. When the
    /// previous process has died this relaunches transparently.
    pub async fn acquire(&self) -> Result<SessionHandle, DriverError> {
        loop {
            let current = self.browser.read().await.clone();
            if let Some(browser) = current {
                if browser.is_alive() {
                    let page = self.active_page(&browser).await?;
                    return Ok(SessionHandle { browser, page });
                }
                warn!("browser process is gone; relaunching");
                *self.browser.write().await = None;
            }

            if self
                .launching
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let result = self.launch_and_restore().await;
                self.launching.store(false, Ordering::SeqCst);
                result?;
            } else {
                // Someone else is launching; wait for them.
                tokio::time::sleep(self.config.launch_poll()).await;
            }
        }
    }

    /// Most recently opened page that is still live; opens a blank one
    /// if every tab has been closed.
    async fn active_page(
        &self,
        browser: &Arc<dyn BrowserOps>,
    ) -> Result<Arc<dyn PageOps>, DriverError> {
        let mut pages = browser.pages().await?;
        while let Some(page) = pages.pop() {
            if !page.is_closed().await {
                return Ok(page);
            }
        }
        browser.new_page().await
    }

    async fn launch_and_restore(&self) -> Result<(), DriverError> {
        info!("launching browser session");
        let browser = self.launcher.launch(&self.config).await?;
        let page = browser.new_page().await?;

        match self.load_state().await {
            Ok(Some(state)) => {
                if let Err(err) = page.import_identity(&state).await {
                    warn!(error = %err, "identity restore failed; continuing with a fresh context");
                } else {
                    info!(path = %self.config.state_path.display(), "identity state restored");
                }
            }
            Ok(None) => debug!("no persisted identity state found"),
            Err(err) => {
                warn!(error = %err, "identity state unreadable; continuing with a fresh context")
            }
        }

        *self.browser.write().await = Some(browser);
        Ok(())
    }

    async fn load_state(&self) -> Result<Option<IdentityState>, DriverError> {
        let path = &self.config.state_path;
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let state: IdentityState = serde_json::from_slice(&bytes)
                    .map_err(|err| DriverError::Persistence(err.to_string()))?;
                Ok(Some(state))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(DriverError::Persistence(err.to_string())),
        }
    }

    /// Export the focused page's identity state and write it through
    /// to disk. A no-op when no browser is up.
    pub async fn save(&self) -> Result<(), DriverError> {
        let Some(browser) = self.browser.read().await.clone() else {
            return Ok(());
        };
        if !browser.is_alive() {
            return Ok(());
        }
        let page = self.active_page(&browser).await?;
        let state = page.export_identity().await?;
        let bytes = serde_json::to_vec_pretty(&state)
            .map_err(|err| DriverError::Persistence(err.to_string()))?;
        if let Some(parent) = self.config.state_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| DriverError::Persistence(err.to_string()))?;
        }
        tokio::fs::write(&self.config.state_path, bytes)
            .await
            .map_err(|err| DriverError::Persistence(err.to_string()))?;
        debug!(path = %self.config.state_path.display(), "identity state saved");
        Ok(())
    }

    /// Save state and close the browser. Runs at most once; later
    /// calls return immediately.
    pub async fn cleanup(&self) -> Result<(), DriverError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(err) = self.save().await {
            warn!(error = %err, "failed to persist identity state during cleanup");
        }
        if let Some(browser) = self.browser.write().await.take() {
            browser.close().await?;
        }
        info!("browser session closed");
        Ok(())
    }

    /// Run cleanup when the process receives Ctrl-C, so identity state
    /// survives interactive aborts.
    pub fn spawn_signal_handler(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("termination signal received; saving session state");
                if let Err(err) = manager.cleanup().await {
                    warn!(error = %err, "cleanup after signal failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBrowser, MockPage};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct SeededLauncher {
        browser: parking_lot::Mutex<Option<Arc<MockBrowser>>>,
    }

    #[async_trait]
    impl BrowserLauncher for SeededLauncher {
        async fn launch(
            &self,
            _config: &SessionConfig,
        ) -> Result<Arc<dyn BrowserOps>, DriverError> {
            self.browser
                .lock()
                .take()
                .map(|b| b as Arc<dyn BrowserOps>)
                .ok_or_else(|| DriverError::Launch("browser already taken".into()))
        }
    }

    struct CountingLauncher {
        launches: AtomicUsize,
    }

    #[async_trait]
    impl BrowserLauncher for CountingLauncher {
        async fn launch(
            &self,
            _config: &SessionConfig,
        ) -> Result<Arc<dyn BrowserOps>, DriverError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            // Simulate slow process startup to widen the race window.
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Arc::new(MockBrowser::new()))
        }
    }

    struct FailingLauncher;

    #[async_trait]
    impl BrowserLauncher for FailingLauncher {
        async fn launch(
            &self,
            _config: &SessionConfig,
        ) -> Result<Arc<dyn BrowserOps>, DriverError> {
            Err(DriverError::Launch("no chrome".into()))
        }
    }

    fn test_config(dir: &tempfile::TempDir) -> SessionConfig {
        SessionConfig {
            state_path: dir.path().join("identity.json"),
            launch_poll_ms: 10,
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn concurrent_acquire_launches_once() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(CountingLauncher {
            launches: AtomicUsize::new(0),
        });
        let manager = Arc::new(SessionManager::new(test_config(&dir), launcher.clone()));

        let a = {
            let m = Arc::clone(&manager);
            tokio::spawn(async move { m.acquire().await })
        };
        let b = {
            let m = Arc::clone(&manager);
            tokio::spawn(async move { m.acquire().await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn acquire_reuses_live_browser() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(CountingLauncher {
            launches: AtomicUsize::new(0),
        });
        let manager = SessionManager::new(test_config(&dir), launcher.clone());

        manager.acquire().await.unwrap();
        manager.acquire().await.unwrap();
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn focus_follows_most_recently_opened_live_page() {
        let dir = tempfile::tempdir().unwrap();
        let browser = Arc::new(MockBrowser::new());
        let manager = SessionManager::new(
            test_config(&dir),
            Arc::new(SeededLauncher {
                browser: parking_lot::Mutex::new(Some(Arc::clone(&browser))),
            }),
        );

        let first = manager.acquire().await.unwrap().page;
        let popup = browser.push_page(MockPage::new());
        assert_eq!(manager.acquire().await.unwrap().page.id(), popup.id());

        // Closing the popup hands focus back to the previous tab.
        popup.close_page();
        assert_eq!(manager.acquire().await.unwrap().page.id(), first.id());
    }

    #[tokio::test]
    async fn launch_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(test_config(&dir), Arc::new(FailingLauncher));
        let err = manager.acquire().await.unwrap_err();
        assert!(matches!(err, DriverError::Launch(_)));
    }

    #[tokio::test]
    async fn cleanup_saves_state_and_closes_once() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(CountingLauncher {
            launches: AtomicUsize::new(0),
        });
        let config = test_config(&dir);
        let state_path = config.state_path.clone();
        let manager = SessionManager::new(config, launcher);

        let handle = manager.acquire().await.unwrap();
        assert!(handle.browser.is_alive());

        manager.cleanup().await.unwrap();
        assert!(!handle.browser.is_alive());
        assert!(state_path.exists());

        // Second cleanup is a no-op.
        manager.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_state_file_falls_back_to_fresh_context() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        tokio::fs::write(&config.state_path, b"not json")
            .await
            .unwrap();
        let launcher = Arc::new(CountingLauncher {
            launches: AtomicUsize::new(0),
        });
        let manager = SessionManager::new(config, launcher);
        // Still comes up; the unreadable blob is only a warning.
        manager.acquire().await.unwrap();
    }
}
