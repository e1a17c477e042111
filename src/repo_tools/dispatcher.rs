use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_COMMAND_TIMEOUT_SECS;
use crate::context::SharedContext;
use crate::llm::ChatProvider;
use crate::models::ToolInvocation;
use crate::patch::PatchMode;
use crate::repo_tools::fs::{apply_patch, create_file, delete_entry, list_files, read_file, write_file};
use crate::repo_tools::runner::run_command;
use crate::repo_tools::schemas::is_known_tool;
use crate::repo_tools::summary::{get_summary, summarize_file};
use crate::repo_tools::ToolError;
use crate::workspace::{CommandRunner, FileStore, FileStores, KvStore};

/// A parsed tool invocation. One variant per catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolRequest {
    ListFiles { dir: String },
    ReadFile { path: String },
    WriteFile { path: String, content: String },
    CreateFile { path: String },
    DeleteEntry { path: String },
    ApplyPatch { path: String, diff: String },
    RunCommand {
        cmd: String,
        #[serde(default)]
        args: Vec<String>,
    },
    SummarizeFile { path: String },
    GetSummary { path: String },
}

impl ToolRequest {
    pub fn parse(name: &str, raw_arguments: &str) -> Result<Self, ToolError> {
        if !is_known_tool(name) {
            return Err(ToolError::Argument(format!("Unknown tool: {}", name)));
        }
        let args: Value = if raw_arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(raw_arguments)
                .map_err(|e| ToolError::Argument(format!("Failed to parse tool args: {}", e)))?
        };
        serde_json::from_value(json!({ "name": name, "arguments": args }))
            .map_err(|e| ToolError::Argument(format!("Invalid arguments for {}: {}", name, e)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolRequest::ListFiles { .. } => "list_files",
            ToolRequest::ReadFile { .. } => "read_file",
            ToolRequest::WriteFile { .. } => "write_file",
            ToolRequest::CreateFile { .. } => "create_file",
            ToolRequest::DeleteEntry { .. } => "delete_entry",
            ToolRequest::ApplyPatch { .. } => "apply_patch",
            ToolRequest::RunCommand { .. } => "run_command",
            ToolRequest::SummarizeFile { .. } => "summarize_file",
            ToolRequest::GetSummary { .. } => "get_summary",
        }
    }
}

pub struct ToolDispatcher {
    ctx: SharedContext,
    files: FileStores,
    commands: Arc<dyn CommandRunner>,
    kv: Arc<dyn KvStore>,
    summarizer: Arc<dyn ChatProvider>,
    patch_mode: PatchMode,
    command_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(
        ctx: SharedContext,
        files: FileStores,
        commands: Arc<dyn CommandRunner>,
        kv: Arc<dyn KvStore>,
        summarizer: Arc<dyn ChatProvider>,
    ) -> Self {
        Self {
            ctx,
            files,
            commands,
            kv,
            summarizer,
            patch_mode: PatchMode::default(),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }

    pub fn with_patch_mode(mut self, mode: PatchMode) -> Self {
        self.patch_mode = mode;
        self
    }

    pub fn with_command_timeout(mut self, limit: Duration) -> Self {
        self.command_timeout = limit;
        self
    }

    /// Runs one invocation. Never fails: errors come back as `"Error: ..."` so
    /// the model can see them and the conversation can continue.
    pub async fn dispatch(&self, invocation: &ToolInvocation) -> String {
        let result = match ToolRequest::parse(&invocation.name, &invocation.raw_arguments) {
            Ok(request) => {
                debug!(tool = request.name(), id = %invocation.id, "dispatching");
                self.execute(request).await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(output) => {
                info!(tool = %invocation.name, id = %invocation.id, bytes = output.len(), "tool succeeded");
                output
            }
            Err(e) => {
                warn!(tool = %invocation.name, id = %invocation.id, error = %e, "tool failed");
                format!("Error: {}", e)
            }
        }
    }

    pub async fn execute(&self, request: ToolRequest) -> Result<String, ToolError> {
        match request {
            ToolRequest::ListFiles { dir } => {
                let items = list_files(self.file_store().await?.as_ref(), &dir).await?;
                {
                    let mut ctx = self.ctx.write().await;
                    if ctx.is_project_root(&dir) {
                        ctx.files = items.clone();
                    }
                }
                serde_json::to_string(&items).map_err(|e| ToolError::Execution(e.to_string()))
            }
            ToolRequest::ReadFile { path } => read_file(self.file_store().await?.as_ref(), &path).await,
            ToolRequest::WriteFile { path, content } => {
                write_file(self.file_store().await?.as_ref(), &path, &content).await?;
                Ok("OK".to_string())
            }
            ToolRequest::CreateFile { path } => {
                create_file(self.file_store().await?.as_ref(), &path).await?;
                Ok("Created".to_string())
            }
            ToolRequest::DeleteEntry { path } => {
                delete_entry(self.file_store().await?.as_ref(), &path).await?;
                Ok("Deleted".to_string())
            }
            ToolRequest::ApplyPatch { path, diff } => {
                apply_patch(self.file_store().await?.as_ref(), &path, &diff, self.patch_mode).await?;
                Ok("Patch applied".to_string())
            }
            ToolRequest::RunCommand { cmd, args } => {
                let cwd = self.project_root().await;
                run_command(self.commands.as_ref(), &cmd, &args, &cwd, self.command_timeout).await
            }
            ToolRequest::SummarizeFile { path } => {
                let model = self.ctx.read().await.model_id.clone();
                summarize_file(
                    self.file_store().await?.as_ref(),
                    self.summarizer.as_ref(),
                    self.kv.as_ref(),
                    &model,
                    &path,
                )
                .await
            }
            ToolRequest::GetSummary { path } => Ok(get_summary(self.kv.as_ref(), &path).await),
        }
    }

    async fn file_store(&self) -> Result<Arc<dyn FileStore>, ToolError> {
        let backend = self.ctx.read().await.backend;
        self.files.get(backend).map_err(|e| ToolError::Execution(e.to_string()))
    }

    async fn project_root(&self) -> PathBuf {
        self.ctx.read().await.project_root_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::IdeContext;
    use crate::llm::ProviderError;
    use crate::models::{FileEntry, Role};
    use crate::test_support::{invocation, FakeRunner, ScriptedProvider};
    use crate::workspace::{Backend, MemoryFileStore, MemoryKvStore};

    struct Harness {
        ctx: SharedContext,
        store: Arc<MemoryFileStore>,
        kv: Arc<MemoryKvStore>,
        runner: Arc<FakeRunner>,
        provider: Arc<ScriptedProvider>,
        dispatcher: ToolDispatcher,
    }

    async fn harness(files: &[(&str, &str)], replies: Vec<Result<Value, ProviderError>>) -> Harness {
        let ctx = IdeContext::default().shared();
        let store = Arc::new(MemoryFileStore::with_files(files.iter().copied()).await);
        let kv = Arc::new(MemoryKvStore::new());
        let runner = Arc::new(FakeRunner::new("build ok\n"));
        let provider = Arc::new(ScriptedProvider::new(replies));
        let dispatcher = ToolDispatcher::new(
            ctx.clone(),
            FileStores::new().with(Backend::Disk, store.clone()),
            runner.clone(),
            kv.clone(),
            provider.clone(),
        );
        Harness { ctx, store, kv, runner, provider, dispatcher }
    }

    #[test]
    fn test_parse_request_variants() {
        assert_eq!(
            ToolRequest::parse("apply_patch", r#"{"path":"a.rs","diff":"+x"}"#).unwrap(),
            ToolRequest::ApplyPatch { path: "a.rs".into(), diff: "+x".into() }
        );
        assert_eq!(
            ToolRequest::parse("run_command", r#"{"cmd":"ls"}"#).unwrap(),
            ToolRequest::RunCommand { cmd: "ls".into(), args: vec![] }
        );
        assert!(matches!(ToolRequest::parse("read_file", "{\"path\":"), Err(ToolError::Argument(_))));
        assert!(matches!(ToolRequest::parse("write_file", r#"{"path":"a"}"#), Err(ToolError::Argument(_))));
        assert!(matches!(ToolRequest::parse("list_files", ""), Err(ToolError::Argument(_))));
        assert_eq!(ToolRequest::parse("get_summary", r#"{"path":"p"}"#).unwrap().name(), "get_summary");
    }

    #[tokio::test]
    async fn test_read_missing_file_returns_error_string() {
        let h = harness(&[], vec![]).await;
        let out = h.dispatcher.dispatch(&invocation("1", "read_file", r#"{"path":"nope.txt"}"#)).await;
        assert!(out.starts_with("Error:"), "{}", out);
        assert!(out.contains("nope.txt"));
    }

    #[tokio::test]
    async fn test_argument_errors_do_not_escape() {
        let h = harness(&[], vec![]).await;
        let out = h.dispatcher.dispatch(&invocation("1", "write_file", r#"{"path":"a.txt"}"#)).await;
        assert!(out.starts_with("Error: Invalid tool arguments"), "{}", out);
        assert!(out.contains("content"));

        let out = h.dispatcher.dispatch(&invocation("2", "grep", "{}")).await;
        assert_eq!(out, "Error: Invalid tool arguments: Unknown tool: grep");
    }

    #[tokio::test]
    async fn test_file_tools() {
        let h = harness(&[("src/main.rs", "fn main() {}")], vec![]).await;
        let d = &h.dispatcher;

        assert_eq!(d.dispatch(&invocation("1", "write_file", r#"{"path":"a.txt","content":"hi"}"#)).await, "OK");
        assert_eq!(d.dispatch(&invocation("2", "read_file", r#"{"path":"a.txt"}"#)).await, "hi");
        assert_eq!(d.dispatch(&invocation("3", "create_file", r#"{"path":"b.txt"}"#)).await, "Created");
        assert_eq!(h.store.read("b.txt").await.unwrap(), "");
        assert_eq!(d.dispatch(&invocation("4", "delete_entry", r#"{"path":"src"}"#)).await, "Deleted");
        assert!(h.store.read("src/main.rs").await.is_err());
    }

    #[tokio::test]
    async fn test_list_files_refreshes_root_listing() {
        let h = harness(&[("src/lib.rs", ""), ("Cargo.toml", "")], vec![]).await;

        let out = h.dispatcher.dispatch(&invocation("1", "list_files", r#"{"dir":"./"}"#)).await;
        let listed: Vec<FileEntry> = serde_json::from_str(&out).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(out, r#"[{"path":"Cargo.toml","isDirectory":false},{"path":"src","isDirectory":true}]"#);
        assert_eq!(h.ctx.read().await.files, listed);

        h.dispatcher.dispatch(&invocation("2", "list_files", r#"{"dir":"src"}"#)).await;
        assert_eq!(h.ctx.read().await.files, listed);
    }

    #[tokio::test]
    async fn test_apply_patch_tool() {
        let h = harness(&[("a.txt", "a\nb\nc")], vec![]).await;
        let args = json!({ "path": "a.txt", "diff": "-a\n+x\n+y\n b\n c" }).to_string();
        assert_eq!(h.dispatcher.dispatch(&invocation("1", "apply_patch", &args)).await, "Patch applied");
        assert_eq!(h.store.read("a.txt").await.unwrap(), "x\ny\nb\nc");
    }

    #[tokio::test]
    async fn test_strict_patch_failure_leaves_file_alone() {
        let h = harness(&[("a.txt", "a\nb")], vec![]).await;
        let dispatcher = h.dispatcher.with_patch_mode(PatchMode::HunkAware);
        let args = json!({ "path": "a.txt", "diff": "@@ -1,1 +1,1 @@\n-zzz\n+x" }).to_string();
        let out = dispatcher.dispatch(&invocation("1", "apply_patch", &args)).await;
        assert!(out.starts_with("Error: "), "{}", out);
        assert_eq!(h.store.read("a.txt").await.unwrap(), "a\nb");
    }

    #[tokio::test]
    async fn test_run_command_uses_runner_and_project_root() {
        let h = harness(&[], vec![]).await;
        let out = h.dispatcher
            .dispatch(&invocation("1", "run_command", r#"{"cmd":"cargo","args":["build"]}"#))
            .await;
        assert_eq!(out, "build ok\n");
        let calls = h.runner.calls();
        assert_eq!(calls, vec![("cargo".to_string(), vec!["build".to_string()], PathBuf::from("./"))]);
    }

    #[tokio::test]
    async fn test_summaries() {
        let h = harness(
            &[("lib.rs", "pub fn add() {}")],
            vec![Ok(json!({ "message": { "role": "assistant", "content": "- adds things" } }))],
        )
        .await;

        assert_eq!(
            h.dispatcher.dispatch(&invocation("1", "get_summary", r#"{"path":"lib.rs"}"#)).await,
            "No summary"
        );
        assert_eq!(
            h.dispatcher.dispatch(&invocation("2", "summarize_file", r#"{"path":"lib.rs"}"#)).await,
            "- adds things"
        );
        assert_eq!(
            h.dispatcher.dispatch(&invocation("3", "get_summary", r#"{"path":"lib.rs"}"#)).await,
            "- adds things"
        );
        assert_eq!(h.kv.get("summary:lib.rs").await.unwrap(), Some(json!("- adds things")));

        let calls = h.provider.calls();
        assert_eq!(calls.len(), 1);
        let (messages, options) = &calls[0];
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.ends_with("pub fn add() {}"));
        assert!(options.tools.is_none());
    }
}
