//! In-memory fakes for the provider and command collaborators.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::llm::{ChatOptions, ChatProvider, ProviderError};
use crate::models::{Message, ToolInvocation};
use crate::workspace::{CommandRunner, CommandStream, WorkspaceError};

pub fn invocation(id: &str, name: &str, raw_arguments: &str) -> ToolInvocation {
    ToolInvocation {
        id: id.to_string(),
        name: name.to_string(),
        raw_arguments: raw_arguments.to_string(),
    }
}

/// Replies with queued payloads in order and records every request.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<Value, ProviderError>>>,
    calls: Mutex<Vec<(Vec<Message>, ChatOptions)>>,
    reject_tools: bool,
    accepts_tools: bool,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<Value, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
            reject_tools: false,
            accepts_tools: true,
        }
    }

    /// Fails any request that offers tools, like a model without tool support.
    pub fn rejecting_tools(mut self) -> Self {
        self.reject_tools = true;
        self
    }

    /// Reports that tools never reach the model, like a custom endpoint.
    pub fn dropping_tools(mut self) -> Self {
        self.accepts_tools = false;
        self
    }

    pub fn calls(&self) -> Vec<(Vec<Message>, ChatOptions)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<Value, ProviderError> {
        self.calls.lock().unwrap().push((messages.to_vec(), options.clone()));
        if self.reject_tools && options.tools.is_some() {
            return Err(ProviderError::Api { status: 400, message: "tools not supported".into() });
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Response("script exhausted".into())))
    }

    fn accepts_tools(&self) -> bool {
        self.accepts_tools
    }
}

/// Emits a fixed output for every command.
pub struct FakeRunner {
    output: String,
    calls: Mutex<Vec<(String, Vec<String>, PathBuf)>>,
}

impl FakeRunner {
    pub fn new(output: &str) -> Self {
        Self { output: output.to_string(), calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, cmd: &str, args: &[String], cwd: &Path) -> Result<CommandStream, WorkspaceError> {
        self.calls.lock().unwrap().push((cmd.to_string(), args.to_vec(), cwd.to_path_buf()));
        let (tx, rx) = mpsc::channel(4);
        let (cancel_tx, _cancel_rx) = oneshot::channel();
        let _ = tx.send(self.output.clone()).await;
        Ok(CommandStream::new(rx, cancel_tx))
    }
}
