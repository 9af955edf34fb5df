//! Resilient agent invocation.
//!
//! An [`AgentClient`] walks an ordered list of [`Tier`]s and returns the first
//! JSON object any of them produces. Every tier gets exactly one attempt,
//! bounded by a per-call timeout. When all tiers fail the client answers with
//! the role's default object, so network and parse failures never escape.

pub mod backend;
pub mod prompts;
pub mod recover;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{CortexError, Result};
use crate::types::{CognitiveOutput, TranslatorOutput};
use backend::{ChatMessage, ChatRequest, CompletionBackend};
use prompts::{CognitiveRequest, TranslateRequest};

pub const DEFAULT_TRANSLATOR_AGENT: &str = "ag:ddacd900:20250823:untitled-agent:633c61ee";
pub const DEFAULT_COGNITIVE_AGENT: &str = "ag:ddacd900:20250823:untitled-agent:50c34ed9";
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Translator,
    Cognitive,
}

impl AgentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::Translator => "translator",
            AgentRole::Cognitive => "cognitive",
        }
    }

    /// Answer used when no tier produced a JSON object.
    pub fn default_reply(self) -> Value {
        match self {
            AgentRole::Translator => json!({
                "neural_inputs": [],
                "neurogenesis": [],
                "memory_flags": []
            }),
            AgentRole::Cognitive => json!({
                "user_text": "(error) couldn't generate response",
                "behavior_directives": {},
                "archive": []
            }),
        }
    }
}

/// Per-role invocation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleProfile {
    pub agent_id: String,
    pub fallback_model: String,
    pub system_instruction: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl RoleProfile {
    pub fn translator() -> Self {
        RoleProfile {
            agent_id: DEFAULT_TRANSLATOR_AGENT.to_string(),
            fallback_model: "mistral-medium-1".to_string(),
            system_instruction: "You are a TRANSLATOR. Return ONLY JSON as specified. No commentary."
                .to_string(),
            max_tokens: 300,
            temperature: 0.0,
        }
    }

    pub fn cognitive() -> Self {
        RoleProfile {
            agent_id: DEFAULT_COGNITIVE_AGENT.to_string(),
            fallback_model: "pixtral-large-1".to_string(),
            system_instruction: "You are a COGNITIVE agent. Return ONLY JSON as specified.".to_string(),
            max_tokens: 600,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfiles {
    pub translator: RoleProfile,
    pub cognitive: RoleProfile,
}

impl Default for AgentProfiles {
    fn default() -> Self {
        AgentProfiles {
            translator: RoleProfile::translator(),
            cognitive: RoleProfile::cognitive(),
        }
    }
}

impl AgentProfiles {
    pub fn get(&self, role: AgentRole) -> &RoleProfile {
        match role {
            AgentRole::Translator => &self.translator,
            AgentRole::Cognitive => &self.cognitive,
        }
    }

    /// One fallback model for both roles.
    pub fn with_fallback_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.translator.fallback_model = model.clone();
        self.cognitive.fallback_model = model;
        self
    }
}

/// One strategy in the fallback ladder.
#[async_trait]
pub trait Tier: Send + Sync {
    fn name(&self) -> &'static str;

    /// A JSON object on success. Any error moves the client to the next tier.
    async fn attempt(&self, role: AgentRole, profile: &RoleProfile, prompt: &str) -> Result<Value>;
}

/// Primary tier: the structured agent endpoint.
pub struct AgentTier {
    backend: Arc<dyn CompletionBackend>,
}

impl AgentTier {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        AgentTier { backend }
    }
}

/// Free-text payload of an agent response; the whole body when it has none.
fn agent_payload_text(response: &Value) -> String {
    response
        .pointer("/output/0/content")
        .and_then(Value::as_str)
        .or_else(|| response.pointer("/output/content").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| response.to_string())
}

#[async_trait]
impl Tier for AgentTier {
    fn name(&self) -> &'static str {
        "agent"
    }

    async fn attempt(&self, role: AgentRole, profile: &RoleProfile, prompt: &str) -> Result<Value> {
        let response = self
            .backend
            .invoke_agent(&profile.agent_id, prompt, role)
            .await?;
        recover::from_first_brace(&agent_payload_text(&response))
    }
}

/// Secondary tier: plain chat completion with a system instruction.
pub struct ChatTier {
    backend: Arc<dyn CompletionBackend>,
}

impl ChatTier {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        ChatTier { backend }
    }
}

#[async_trait]
impl Tier for ChatTier {
    fn name(&self) -> &'static str {
        "chat"
    }

    async fn attempt(&self, _role: AgentRole, profile: &RoleProfile, prompt: &str) -> Result<Value> {
        let request = ChatRequest {
            model: profile.fallback_model.clone(),
            messages: vec![
                ChatMessage::system(profile.system_instruction.clone()),
                ChatMessage::user(prompt),
            ],
            max_tokens: profile.max_tokens,
            temperature: profile.temperature,
        };
        let response = self.backend.chat_completion(&request).await?;
        let text = response
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or("{}");
        recover::direct_then_first_brace(text)
    }
}

/// Where an [`AgentReply`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Tier(&'static str),
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub value: Value,
    pub source: ReplySource,
}

impl AgentReply {
    pub fn is_default(&self) -> bool {
        self.source == ReplySource::Default
    }
}

pub struct AgentClient {
    tiers: Vec<Box<dyn Tier>>,
    profiles: AgentProfiles,
    call_timeout: Duration,
}

impl AgentClient {
    /// Standard ladder: agent tier, then chat tier, over one backend.
    pub fn new(backend: Arc<dyn CompletionBackend>, profiles: AgentProfiles) -> Self {
        Self::with_tiers(
            vec![
                Box::new(AgentTier::new(backend.clone())),
                Box::new(ChatTier::new(backend)),
            ],
            profiles,
        )
    }

    pub fn with_tiers(tiers: Vec<Box<dyn Tier>>, profiles: AgentProfiles) -> Self {
        AgentClient {
            tiers,
            profiles,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn profiles(&self) -> &AgentProfiles {
        &self.profiles
    }

    pub async fn invoke(&self, role: AgentRole, prompt: &str) -> AgentReply {
        let profile = self.profiles.get(role);

        for tier in &self.tiers {
            let outcome = tokio::time::timeout(self.call_timeout, tier.attempt(role, profile, prompt))
                .await
                .unwrap_or_else(|_| {
                    Err(CortexError::Network(format!(
                        "timed out after {}ms",
                        self.call_timeout.as_millis()
                    )))
                });

            match outcome {
                Ok(value) => {
                    debug!(role = role.as_str(), tier = tier.name(), "Agent tier answered");
                    return AgentReply {
                        value,
                        source: ReplySource::Tier(tier.name()),
                    };
                }
                Err(e) => {
                    warn!(role = role.as_str(), tier = tier.name(), error = %e, "Agent tier failed");
                }
            }
        }

        warn!(role = role.as_str(), "All agent tiers failed, using default reply");
        AgentReply {
            value: role.default_reply(),
            source: ReplySource::Default,
        }
    }

    pub async fn translate(&self, request: &TranslateRequest) -> (TranslatorOutput, AgentReply) {
        let reply = self.invoke(AgentRole::Translator, &request.prompt()).await;
        (TranslatorOutput::from_value(&reply.value), reply)
    }

    pub async fn interpret(&self, request: &CognitiveRequest) -> (CognitiveOutput, AgentReply) {
        let reply = self.invoke(AgentRole::Cognitive, &request.prompt()).await;
        (CognitiveOutput::from_value(&reply.value), reply)
    }
}
