use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{AssistantSettings, DEFAULT_MAX_ROUNDS};
use crate::context::SharedContext;
use crate::llm::{
    flatten_content, normalize_response, CanonicalResponse, ChatOptions, ChatProvider,
    CustomProviderClient, GatewayClient, ProviderError,
};
use crate::models::{now_iso, Message, Role, ToolInvocation, UsageRecord};
use crate::repo_tools::{repo_tool_schemas, ToolDispatcher};
use crate::workspace::{CommandRunner, FileStores, KvStore, WorkspaceError};

pub const HISTORY_KEY: &str = "ultimate_coder_history";
pub const USAGE_KEY: &str = "analytics:token_usage";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChatError {
    #[error("A turn is already in progress")]
    Busy,
    #[error("Message is empty")]
    EmptyInput,
    #[error("Exceeded the maximum of {0} model rounds in one turn")]
    MaxRoundsExceeded(usize),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub reply: Message,
    pub rounds: usize,
    pub tool_calls: usize,
    /// Absent when the turn ended in an error.
    pub usage: Option<UsageRecord>,
}

#[derive(Debug, Default)]
struct TurnProgress {
    rounds: usize,
    tool_calls: usize,
    tokens: u64,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives one conversation: sends the history to the model, runs the tools it
/// asks for one at a time, and settles each user turn with exactly one
/// assistant reply.
pub struct ChatOrchestrator {
    ctx: SharedContext,
    dispatcher: ToolDispatcher,
    gateway: Arc<dyn ChatProvider>,
    kv: Arc<dyn KvStore>,
    tools: Vec<Value>,
    max_rounds: usize,
    busy: AtomicBool,
}

impl ChatOrchestrator {
    pub fn new(
        ctx: SharedContext,
        dispatcher: ToolDispatcher,
        gateway: Arc<dyn ChatProvider>,
        kv: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            ctx,
            dispatcher,
            gateway,
            kv,
            tools: repo_tool_schemas(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            busy: AtomicBool::new(false),
        }
    }

    /// Wires the default gateway and dispatcher from stored settings.
    pub fn from_settings(
        settings: &AssistantSettings,
        ctx: SharedContext,
        files: FileStores,
        commands: Arc<dyn CommandRunner>,
        kv: Arc<dyn KvStore>,
    ) -> Result<Self, ProviderError> {
        // A missing key fails turns on the gateway only; custom providers carry their own.
        let api_key = settings.api_key().unwrap_or_else(|e| {
            warn!(error = %e, "gateway has no API key");
            String::new()
        });
        let gateway: Arc<dyn ChatProvider> = Arc::new(GatewayClient::new(settings.llm_config(), api_key)?);
        let dispatcher = ToolDispatcher::new(ctx.clone(), files, commands, kv.clone(), gateway.clone())
            .with_patch_mode(settings.patch_mode)
            .with_command_timeout(settings.command_timeout);
        Ok(Self::new(ctx, dispatcher, gateway, kv).with_max_rounds(settings.max_rounds))
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Runs one user turn to completion. Provider failures do not surface as
    /// `Err`; they settle the turn with an `"Error: ..."` reply.
    pub async fn submit(&self, text: &str) -> Result<TurnOutcome, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyInput);
        }
        let _busy = BusyGuard::acquire(&self.busy).ok_or(ChatError::Busy)?;
        let started = Instant::now();

        let (mut messages, model) = {
            let mut ctx = self.ctx.write().await;
            ctx.push_message(Message::user(text));
            let mut messages = Vec::with_capacity(ctx.history().len() + 1);
            messages.push(Message::system(ctx.system_prompt()));
            messages.extend(ctx.history().iter().cloned());
            (messages, ctx.model_id.clone())
        };

        let mut progress = TurnProgress::default();
        let result = self.run_turn(&mut messages, &model, &mut progress).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (reply, usage) = match result {
            Ok(content) => {
                let usage = UsageRecord {
                    date: now_iso(),
                    model_id: model.clone(),
                    tokens: progress.tokens,
                    duration_ms,
                };
                (Message::assistant(content), Some(usage))
            }
            Err(e) => {
                warn!(error = %e, rounds = progress.rounds, "turn failed");
                (Message::assistant(format!("Error: {}", e)), None)
            }
        };

        self.ctx.write().await.push_message(reply.clone());
        self.persist_history().await;
        if let Some(record) = &usage {
            self.record_usage(record).await;
        }

        info!(
            rounds = progress.rounds,
            tool_calls = progress.tool_calls,
            tokens = progress.tokens,
            duration_ms,
            "turn settled"
        );
        Ok(TurnOutcome {
            reply,
            rounds: progress.rounds,
            tool_calls: progress.tool_calls,
            usage,
        })
    }

    async fn run_turn(
        &self,
        messages: &mut Vec<Message>,
        model: &str,
        progress: &mut TurnProgress,
    ) -> Result<String, ChatError> {
        let provider = self.resolve_provider().await?;
        let mut current = self.round(provider.as_ref(), messages, model, progress).await?;

        while current.message.has_tool_calls() {
            let calls = std::mem::take(&mut current.message.tool_calls);
            let mut content = current.message.text();

            // Each invocation gets its own round trip, in the order the model emitted them.
            for call in calls {
                let output = self.dispatcher.dispatch(&call).await;
                progress.tool_calls += 1;

                let tool_message = Message::tool(call.id.clone(), output);
                self.append(messages, requesting_message(std::mem::take(&mut content), call)).await;
                self.append(messages, tool_message).await;

                current = self.round(provider.as_ref(), messages, model, progress).await?;
            }
        }

        Ok(current.message.text())
    }

    async fn round(
        &self,
        provider: &dyn ChatProvider,
        messages: &[Message],
        model: &str,
        progress: &mut TurnProgress,
    ) -> Result<CanonicalResponse, ChatError> {
        if progress.rounds >= self.max_rounds {
            return Err(ChatError::MaxRoundsExceeded(self.max_rounds));
        }
        progress.rounds += 1;

        let raw = self.call_model(provider, messages, model).await?;
        let response = normalize_response(&raw)?;
        if let Some(usage) = response.usage {
            progress.tokens += usage.total_tokens;
        }
        debug!(
            round = progress.rounds,
            tool_calls = response.message.tool_calls.len(),
            tokens = progress.tokens,
            "model round complete"
        );
        Ok(response)
    }

    // Offers the tool catalog first; models that reject tools get one retry without it.
    async fn call_model(
        &self,
        provider: &dyn ChatProvider,
        messages: &[Message],
        model: &str,
    ) -> Result<Value, ProviderError> {
        if !provider.accepts_tools() {
            let plain = ChatOptions { model: model.to_string(), tools: None };
            return provider.chat(messages, &plain).await;
        }
        let with_tools = ChatOptions { model: model.to_string(), tools: Some(self.tools.clone()) };
        match provider.chat(messages, &with_tools).await {
            Ok(raw) => Ok(raw),
            Err(e) => {
                warn!(error = %e, "provider call with tools failed, retrying without tools");
                let plain = ChatOptions { model: model.to_string(), tools: None };
                provider.chat(messages, &plain).await
            }
        }
    }

    async fn resolve_provider(&self) -> Result<Arc<dyn ChatProvider>, ProviderError> {
        let ctx = self.ctx.read().await;
        match ctx.active_provider()? {
            Some(custom) => Ok(Arc::new(CustomProviderClient::new(custom.clone())?)),
            None => Ok(self.gateway.clone()),
        }
    }

    async fn append(&self, messages: &mut Vec<Message>, message: Message) {
        self.ctx.write().await.push_message(message.clone());
        messages.push(message);
    }

    async fn persist_history(&self) {
        let history = self.ctx.read().await.history().to_vec();
        let value = match serde_json::to_value(&history) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "cannot serialize history");
                return;
            }
        };
        if let Err(e) = self.kv.set(HISTORY_KEY, value).await {
            warn!(error = %e, "failed to persist history");
        }
    }

    async fn record_usage(&self, record: &UsageRecord) {
        let result: Result<(), WorkspaceError> = async {
            let mut log = match self.kv.get(USAGE_KEY).await? {
                Some(Value::Array(entries)) => entries,
                _ => Vec::new(),
            };
            log.push(serde_json::to_value(record)?);
            self.kv.set(USAGE_KEY, Value::Array(log)).await
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, "failed to track usage");
        }
    }

    /// Replaces the in-memory conversation with the stored one. Returns the number of messages loaded.
    pub async fn restore_history(&self) -> Result<usize, WorkspaceError> {
        let stored = match self.kv.get(HISTORY_KEY).await? {
            Some(Value::Array(items)) => items,
            _ => return Ok(0),
        };
        let history: Vec<Message> = stored.iter().filter_map(stored_message).collect();
        let count = history.len();
        self.ctx.write().await.replace_history(history);
        Ok(count)
    }

    pub async fn usage_log(&self) -> Result<Vec<UsageRecord>, WorkspaceError> {
        match self.kv.get(USAGE_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }
}

fn requesting_message(content: String, call: ToolInvocation) -> Message {
    Message {
        role: Role::Assistant,
        content,
        tool_calls: vec![call],
        tool_call_id: None,
    }
}

// Stored entries may predate the current shape; content is flattened like a provider reply.
fn stored_message(item: &Value) -> Option<Message> {
    let role: Role = serde_json::from_value(item.get("role")?.clone()).ok()?;
    let content = flatten_content(item.get("content").unwrap_or(&Value::Null));
    let tool_calls = item
        .get("tool_calls")
        .and_then(|calls| serde_json::from_value::<Vec<ToolInvocation>>(calls.clone()).ok())
        .unwrap_or_default();
    let tool_call_id = item.get("tool_call_id").and_then(Value::as_str).map(str::to_string);
    Some(Message { role, content, tool_calls, tool_call_id })
}
