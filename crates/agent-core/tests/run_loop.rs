//! End-to-end loop test against the scripted driver: resolve, click,
//! type, and finish through the public API only.

use agent_core::{AgentConfig, AgentState, MockReasoningProvider, Orchestrator};
use async_trait::async_trait;
use browser_session::testing::{MockAction, MockBrowser, MockElement, MockPage};
use browser_session::{
    BrowserLauncher, BrowserOps, DriverError, SessionConfig, SessionManager,
};
use parking_lot::Mutex;
use std::sync::Arc;
use stealth::{Humanizer, HumanizerConfig};

struct FixedLauncher {
    browser: Mutex<Option<Arc<MockBrowser>>>,
}

#[async_trait]
impl BrowserLauncher for FixedLauncher {
    async fn launch(&self, _config: &SessionConfig) -> Result<Arc<dyn BrowserOps>, DriverError> {
        self.browser
            .lock()
            .take()
            .map(|b| b as Arc<dyn BrowserOps>)
            .ok_or_else(|| DriverError::Launch("browser already taken".into()))
    }
}

#[tokio::test]
async fn full_login_flow_against_scripted_page() {
    let dir = tempfile::tempdir().expect("tempdir");
    let page = MockPage::new().with_elements(vec![
        MockElement::new("w1", "input")
            .attr("id", "username")
            .attr("aria-label", "Username"),
        MockElement::new("w2", "button")
            .role("button")
            .name("Log in")
            .text("Log in")
            .attr("data-testid", "login-submit"),
    ]);
    let (browser, page) = MockBrowser::with_fixed_page(page);
    let session = Arc::new(SessionManager::new(
        SessionConfig {
            state_path: dir.path().join("identity.json"),
            launch_poll_ms: 5,
            ..SessionConfig::default()
        },
        Arc::new(FixedLauncher {
            browser: Mutex::new(Some(Arc::new(browser))),
        }),
    ));

    let provider = MockReasoningProvider::new()
        .reply(r#"{"action": "navigate", "url": "https://example.com/login", "reasoning": "open the login page"}"#)
        .reply(r##"{"action": "type", "target": {"selector": "#username"}, "text": "pat", "reasoning": "enter the username"}"##)
        .reply(r#"{"action": "click", "target": {"role": "button", "name": "Log in"}, "reasoning": "submit"}"#)
        .reply(r#"{"action": "finish", "summary": "logged in", "reasoning": "form submitted"}"#);

    let report = Orchestrator::new(
        session,
        Arc::new(provider),
        AgentConfig {
            max_steps: 10,
            step_delay_ms: 0,
            ..AgentConfig::default()
        },
    )
    .with_humanizer(Arc::new(Humanizer::new(HumanizerConfig::instant())))
    .run("log in as pat")
    .await;

    assert_eq!(report.state, AgentState::Completed);
    assert_eq!(report.steps_taken, 4);
    assert!(report.decisions.iter().all(|d| d.error.is_none()));

    let actions = page.actions();
    assert!(actions.contains(&MockAction::Navigate("https://example.com/login".into())));
    assert!(actions.contains(&MockAction::Focus("w1".into())));
    let typed: String = actions
        .iter()
        .filter_map(|a| match a {
            MockAction::InsertText(s) => Some(s.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(typed, "pat");
    // The click lands as a raw pointer gesture on the button.
    assert!(actions
        .iter()
        .any(|a| matches!(a, MockAction::MouseClick { .. })));
}
