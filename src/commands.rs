//! Entry points for the embedding IDE. Errors cross this boundary as strings.

use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::AssistantSettings;
use crate::context::{IdeContext, SharedContext};
use crate::models::*;
use crate::repo_tools::repo_tool_schemas;
use crate::workflows::chat::{ChatOrchestrator, TurnOutcome};
use crate::workspace::{FileStores, LocalCommandRunner, SqliteKvStore};

pub fn get_settings(db_path: &Path) -> Result<HashMap<String, String>, String> {
  let kv = SqliteKvStore::open(db_path).map_err(|e| e.to_string())?;
  kv.settings().map_err(|e| e.to_string())
}

/// Stored settings are read when an [`Assistant`] is opened.
pub fn set_setting(db_path: &Path, key: &str, value: &str) -> Result<(), String> {
  let kv = SqliteKvStore::open(db_path).map_err(|e| e.to_string())?;
  kv.set_setting(key, value).map_err(|e| e.to_string())
}

pub fn get_repo_tool_schemas() -> Vec<Value> {
  repo_tool_schemas()
}

/// One assistant session over a project, with its conversation restored from
/// the database.
pub struct Assistant {
  ctx: SharedContext,
  orchestrator: ChatOrchestrator,
}

impl Assistant {
  pub async fn open(db_path: &Path, project_root: &Path) -> Result<Self, String> {
    let kv = Arc::new(SqliteKvStore::open(db_path).map_err(|e| e.to_string())?);
    let settings = AssistantSettings::from_map(&kv.settings().map_err(|e| e.to_string())?);

    let ctx = IdeContext::from_settings(&settings, project_root.to_string_lossy()).shared();
    let files = FileStores::standard(project_root, settings.local_server_url.as_deref())
      .map_err(|e| e.to_string())?;
    let orchestrator = ChatOrchestrator::from_settings(
      &settings,
      ctx.clone(),
      files,
      Arc::new(LocalCommandRunner::new()),
      kv,
    ).map_err(|e| e.to_string())?;

    let restored = orchestrator.restore_history().await.map_err(|e| e.to_string())?;
    info!(restored, root = %project_root.display(), "assistant opened");
    Ok(Self { ctx, orchestrator })
  }

  pub async fn send_message(&self, text: &str) -> Result<TurnOutcome, String> {
    self.orchestrator.submit(text).await.map_err(|e| e.to_string())
  }

  pub async fn history(&self) -> Vec<Message> {
    self.ctx.read().await.history().to_vec()
  }

  pub async fn usage_log(&self) -> Result<Vec<UsageRecord>, String> {
    self.orchestrator.usage_log().await.map_err(|e| e.to_string())
  }

  pub async fn set_model(&self, model_id: &str) {
    self.ctx.write().await.model_id = model_id.to_string();
  }

  pub async fn list_personas(&self) -> Vec<Persona> {
    self.ctx.read().await.personas.clone()
  }

  pub async fn add_persona(&self, persona: Persona) {
    self.ctx.write().await.add_persona(persona);
  }

  pub async fn remove_persona(&self, persona_id: &str) {
    self.ctx.write().await.remove_persona(persona_id);
  }

  /// `None` returns to the default system prompt.
  pub async fn select_persona(&self, persona_id: Option<String>) -> Result<(), String> {
    let mut ctx = self.ctx.write().await;
    if let Some(id) = &persona_id {
      if !ctx.personas.iter().any(|p| &p.id == id) {
        return Err(format!("Persona not found: {}", id));
      }
    }
    ctx.persona_id = persona_id;
    Ok(())
  }

  pub async fn add_provider(&self, label: String, api_key: String, url: Option<String>) -> ProviderConfig {
    let provider = ProviderConfig { id: new_id(), label, api_key, url };
    self.ctx.write().await.add_provider(provider.clone());
    provider
  }

  /// `None` returns to the default gateway.
  pub async fn select_provider(&self, provider_id: Option<String>) -> Result<(), String> {
    let mut ctx = self.ctx.write().await;
    if let Some(id) = &provider_id {
      if !ctx.providers.iter().any(|p| &p.id == id) {
        return Err(format!("Provider not found: {}", id));
      }
    }
    ctx.provider_id = provider_id;
    Ok(())
  }
}
