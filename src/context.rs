use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::AssistantSettings;
use crate::llm::ProviderError;
use crate::models::{FileEntry, Message, Persona, ProviderConfig};
use crate::workspace::Backend;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI coding assistant. Use the provided tools to read, write, \
create, delete, and summarize files. Keep responses concise.";

pub type SharedContext = Arc<RwLock<IdeContext>>;

/// Everything the assistant needs to know about the IDE session. Handed to the
/// orchestrator and the tool dispatcher instead of living in a global.
#[derive(Debug, Clone)]
pub struct IdeContext {
    pub backend: Backend,
    pub project_root: String,
    pub model_id: String,
    pub personas: Vec<Persona>,
    pub persona_id: Option<String>,
    pub providers: Vec<ProviderConfig>,
    pub provider_id: Option<String>,
    /// Last listing of the project root, refreshed by the `list_files` tool.
    pub files: Vec<FileEntry>,
    history: Vec<Message>,
}

impl Default for IdeContext {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            project_root: "./".to_string(),
            model_id: crate::config::DEFAULT_MODEL.to_string(),
            personas: default_personas(),
            persona_id: None,
            providers: Vec::new(),
            provider_id: None,
            files: Vec::new(),
            history: Vec::new(),
        }
    }
}

impl IdeContext {
    pub fn from_settings(settings: &AssistantSettings, project_root: impl Into<String>) -> Self {
        Self {
            backend: settings.backend,
            project_root: project_root.into(),
            model_id: settings.model.clone(),
            ..Self::default()
        }
    }

    pub fn shared(self) -> SharedContext {
        Arc::new(RwLock::new(self))
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub(crate) fn push_message(&mut self, message: Message) {
        self.history.push(message);
    }

    /// Full-list replace, used when restoring a stored conversation.
    pub(crate) fn replace_history(&mut self, history: Vec<Message>) {
        self.history = history;
    }

    pub fn project_root_path(&self) -> PathBuf {
        PathBuf::from(&self.project_root)
    }

    pub fn is_project_root(&self, dir: &str) -> bool {
        fn trim(s: &str) -> &str {
            match s.trim_start_matches("./").trim_end_matches('/') {
                "." => "",
                rest => rest,
            }
        }
        // Store paths are relative to the store root, so an empty path is always the root.
        let dir = trim(dir);
        dir.is_empty() || dir == trim(&self.project_root)
    }

    pub fn active_persona(&self) -> Option<&Persona> {
        let id = self.persona_id.as_deref()?;
        self.personas.iter().find(|p| p.id == id)
    }

    pub fn system_prompt(&self) -> String {
        self.active_persona()
            .map(|p| p.system_prompt.clone())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
    }

    pub fn add_persona(&mut self, persona: Persona) {
        self.personas.push(persona);
    }

    pub fn remove_persona(&mut self, id: &str) {
        self.personas.retain(|p| p.id != id);
        if self.persona_id.as_deref() == Some(id) {
            self.persona_id = None;
        }
    }

    pub fn add_provider(&mut self, provider: ProviderConfig) {
        self.providers.push(provider);
    }

    /// The selected custom provider, `None` when the default gateway is in use.
    pub fn active_provider(&self) -> Result<Option<&ProviderConfig>, ProviderError> {
        match self.provider_id.as_deref() {
            None => Ok(None),
            Some(id) => self.providers
                .iter()
                .find(|p| p.id == id)
                .map(Some)
                .ok_or_else(|| ProviderError::ProviderNotFound(id.to_string())),
        }
    }
}

pub fn default_personas() -> Vec<Persona> {
    vec![
        Persona {
            id: "architect".into(),
            name: "Architect".into(),
            description: "High-level app designer who plans folder structure and components.".into(),
            persona: "Thinks in systems, loves clean architecture and type safety.".into(),
            system_prompt: "You are an expert software architect and senior React/Next.js engineer. \
                You design project structures, components, and stepwise implementation plans."
                .into(),
        },
        Persona {
            id: "pixelmancer".into(),
            name: "PixelMancer".into(),
            description: "Obsessed with aesthetic UI, motion, and micro-interactions.".into(),
            persona: "Design-focused, loves Tailwind, Framer Motion, and animated components.".into(),
            system_prompt: "You are a world-class UI engineer. You focus on layout, visual hierarchy, \
                animation, and accessibility. You use Tailwind and Framer Motion heavily."
                .into(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_follows_persona() {
        let mut ctx = IdeContext::default();
        assert_eq!(ctx.system_prompt(), DEFAULT_SYSTEM_PROMPT);

        ctx.persona_id = Some("architect".into());
        assert!(ctx.system_prompt().starts_with("You are an expert software architect"));

        ctx.remove_persona("architect");
        assert_eq!(ctx.persona_id, None);
        assert_eq!(ctx.system_prompt(), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_active_provider_lookup() {
        let mut ctx = IdeContext::default();
        assert_eq!(ctx.active_provider().unwrap(), None);

        ctx.provider_id = Some("mine".into());
        assert_eq!(ctx.active_provider().unwrap_err(), ProviderError::ProviderNotFound("mine".into()));

        ctx.add_provider(ProviderConfig {
            id: "mine".into(),
            label: "Mine".into(),
            api_key: "k".into(),
            url: Some("http://localhost:9999/chat".into()),
        });
        assert_eq!(ctx.active_provider().unwrap().map(|p| p.label.as_str()), Some("Mine"));
    }

    #[test]
    fn test_is_project_root() {
        let ctx = IdeContext::default();
        assert!(ctx.is_project_root("./"));
        assert!(ctx.is_project_root(""));
        assert!(ctx.is_project_root("."));
        assert!(!ctx.is_project_root("src"));
    }
}
