//! Agentic orchestration: the perceive-decide-act loop, the reasoning
//! provider seam, and the Anthropic HTTP backend.

pub mod capture;
pub mod errors;
pub mod http;
pub mod orchestrator;
pub mod parse;
pub mod prompt;
pub mod provider;
pub mod types;

pub use errors::AgentError;
pub use http::{AnthropicConfig, AnthropicProvider};
pub use orchestrator::{write_report, AgentConfig, Orchestrator};
pub use provider::{
    MockReasoningProvider, QaBridge, ReasoningProvider, ReasoningRequest, VisionBridge,
};
pub use types::{AgentAction, AgentState, Decision, RunReport, TargetSpec};
