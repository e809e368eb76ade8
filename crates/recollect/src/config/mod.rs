use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RecollectError, Result};
use crate::memory::types::{MemoryMode, SourceTag};

/// Main configuration structure for Recollect
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Memory mode and identity of the memory owner
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Source limits and fallback thresholds for retrieval
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Merge cap and tag priorities
    #[serde(default)]
    pub merge: MergeConfig,
    /// Narrative composition settings
    #[serde(default)]
    pub narrative: NarrativeConfig,
    /// Commit visibility polling
    #[serde(default)]
    pub commit: CommitConfig,
    /// Memory backend connection
    #[serde(default)]
    pub backend: BackendConfig,
    /// Direct structured store used as the last retrieval fallback
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    /// Load configuration from an explicit path, or from the first default
    /// location that exists. Falls back to defaults when nothing is found.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".recollect").join("config.toml")),
            dirs::config_dir().map(|c| c.join("recollect").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RecollectError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RecollectError::Config(format!("Failed to parse config: {e}")))
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| RecollectError::Serialization(format!("Failed to render config: {e}")))
    }
}

/// Memory mode and owner identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Retrieval strategy: conscious, auto or combined
    #[serde(default)]
    pub mode: MemoryMode,
    /// User whose memories are read and written
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Optional assistant identity forwarded to ranked search
    #[serde(default)]
    pub assistant_id: Option<String>,
    /// Optional session identity forwarded to ranked search
    #[serde(default)]
    pub session_id: Option<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            mode: MemoryMode::default(),
            user_id: default_user_id(),
            assistant_id: None,
            session_id: None,
        }
    }
}

fn default_user_id() -> String {
    "default_user".to_string()
}

/// Limits and thresholds of the retrieval chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Records requested from the contextual-retrieval surface
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,
    /// Turns read when supplementing with conversation history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Essential records taken in combined mode
    #[serde(default = "default_essential_limit")]
    pub essential_limit: usize,
    /// Records requested from ranked search in combined mode
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// Dynamic records kept from auto-ingest or ranked search
    #[serde(default = "default_dynamic_limit")]
    pub dynamic_limit: usize,
    /// Raw items kept in combined mode before merging
    #[serde(default = "default_combined_raw_cap")]
    pub combined_raw_cap: usize,
    /// Below this many items, conversation history is consulted
    #[serde(default = "default_supplement_threshold")]
    pub supplement_threshold: usize,
    /// Minimum items; history turns are included unconditionally and the
    /// direct store is consulted while fewer are collected
    #[serde(default = "default_min_items")]
    pub min_items: usize,
    /// History supplementation stops once this many items are collected
    #[serde(default = "default_dialogue_stop")]
    pub dialogue_stop: usize,
    /// Items kept from the direct store
    #[serde(default = "default_direct_store_take")]
    pub direct_store_take: usize,
    /// Maximum characters of a memory's content
    #[serde(default = "default_content_max_chars")]
    pub content_max_chars: usize,
    /// Maximum characters of a dialogue line
    #[serde(default = "default_dialogue_max_chars")]
    pub dialogue_max_chars: usize,
    /// Time budget for each individual source call
    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,
    /// Scope passed to the ranked search surface
    #[serde(default = "default_search_scope")]
    pub search_scope: String,
}

impl RetrievalConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            context_limit: default_context_limit(),
            history_limit: default_history_limit(),
            essential_limit: default_essential_limit(),
            search_limit: default_search_limit(),
            dynamic_limit: default_dynamic_limit(),
            combined_raw_cap: default_combined_raw_cap(),
            supplement_threshold: default_supplement_threshold(),
            min_items: default_min_items(),
            dialogue_stop: default_dialogue_stop(),
            direct_store_take: default_direct_store_take(),
            content_max_chars: default_content_max_chars(),
            dialogue_max_chars: default_dialogue_max_chars(),
            source_timeout_ms: default_source_timeout_ms(),
            search_scope: default_search_scope(),
        }
    }
}

fn default_context_limit() -> usize {
    10
}

fn default_history_limit() -> usize {
    15
}

fn default_essential_limit() -> usize {
    5
}

fn default_search_limit() -> usize {
    5
}

fn default_dynamic_limit() -> usize {
    5
}

fn default_combined_raw_cap() -> usize {
    8
}

fn default_supplement_threshold() -> usize {
    4
}

fn default_min_items() -> usize {
    2
}

fn default_dialogue_stop() -> usize {
    8
}

fn default_direct_store_take() -> usize {
    3
}

fn default_content_max_chars() -> usize {
    200
}

fn default_dialogue_max_chars() -> usize {
    120
}

fn default_source_timeout_ms() -> u64 {
    10_000
}

fn default_search_scope() -> String {
    "all".to_string()
}

/// Merge cap and priority table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Maximum items surviving the merge
    #[serde(default = "default_merge_cap")]
    pub cap: usize,
    /// Priority per source tag, lower sorts first
    #[serde(default)]
    pub priorities: TagPriorities,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            cap: default_merge_cap(),
            priorities: TagPriorities::default(),
        }
    }
}

fn default_merge_cap() -> usize {
    6
}

/// Priority assigned to each source tag during the merge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagPriorities {
    #[serde(default = "default_essential_priority")]
    pub essential: u8,
    #[serde(default = "default_contextual_priority")]
    pub contextual: u8,
    #[serde(default = "default_dialogue_priority")]
    pub dialogue: u8,
    #[serde(default = "default_direct_store_priority")]
    pub direct_store: u8,
    #[serde(default = "default_conversational_priority")]
    pub conversational: u8,
    #[serde(default = "default_unknown_priority")]
    pub unknown: u8,
}

impl TagPriorities {
    pub fn priority(&self, tag: SourceTag) -> u8 {
        match tag {
            SourceTag::Essential => self.essential,
            SourceTag::Contextual => self.contextual,
            SourceTag::Dialogue => self.dialogue,
            SourceTag::DirectStore => self.direct_store,
            SourceTag::Conversational => self.conversational,
            SourceTag::Unknown => self.unknown,
        }
    }
}

impl Default for TagPriorities {
    fn default() -> Self {
        Self {
            essential: default_essential_priority(),
            contextual: default_contextual_priority(),
            dialogue: default_dialogue_priority(),
            direct_store: default_direct_store_priority(),
            conversational: default_conversational_priority(),
            unknown: default_unknown_priority(),
        }
    }
}

fn default_essential_priority() -> u8 {
    0
}

fn default_contextual_priority() -> u8 {
    1
}

fn default_dialogue_priority() -> u8 {
    2
}

fn default_direct_store_priority() -> u8 {
    3
}

fn default_conversational_priority() -> u8 {
    4
}

fn default_unknown_priority() -> u8 {
    5
}

/// Narrative composition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeConfig {
    /// Text returned when nothing is remembered
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    /// Items mentioned by name before "and some other things"
    #[serde(default = "default_narrative_max_items")]
    pub max_items: usize,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            placeholder: default_placeholder(),
            max_items: default_narrative_max_items(),
        }
    }
}

fn default_placeholder() -> String {
    "(no memories)".to_string()
}

fn default_narrative_max_items() -> usize {
    5
}

/// Commit visibility polling; one time-unit is one second
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitConfig {
    /// Head start given to the backend's indexing agent
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Pause between history reads
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Total polling budget
    #[serde(default = "default_poll_budget_ms")]
    pub poll_budget_ms: u64,
    /// Turns read per visibility check
    #[serde(default = "default_commit_history_limit")]
    pub history_limit: usize,
}

impl CommitConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_budget(&self) -> Duration {
        Duration::from_millis(self.poll_budget_ms)
    }
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_budget_ms: default_poll_budget_ms(),
            history_limit: default_commit_history_limit(),
        }
    }
}

fn default_settle_delay_ms() -> u64 {
    2_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_poll_budget_ms() -> u64 {
    15_000
}

fn default_commit_history_limit() -> usize {
    10
}

/// Memory backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the memory service
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding a bearer token, if the service needs one
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Whether the backend runs an asynchronous indexing agent
    #[serde(default)]
    pub indexing_agent: bool,
    /// Whether the ranked search surface is enabled
    #[serde(default)]
    pub search_enabled: bool,
    /// Whether the auto-ingest surface is enabled
    #[serde(default = "default_auto_ingest_enabled")]
    pub auto_ingest_enabled: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_backend_timeout_secs(),
            api_key_env: None,
            indexing_agent: false,
            search_enabled: false,
            auto_ingest_enabled: default_auto_ingest_enabled(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8765".to_string()
}

fn default_backend_timeout_secs() -> u64 {
    30
}

fn default_auto_ingest_enabled() -> bool {
    true
}

/// Direct store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Consult the direct store when other sources come up short
    #[serde(default = "default_store_enabled")]
    pub enabled: bool,
    /// Directory holding the LanceDB tables
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Rows taken from each record set before merging
    #[serde(default = "default_per_set_limit")]
    pub per_set_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: default_store_enabled(),
            data_dir: default_data_dir(),
            per_set_limit: default_per_set_limit(),
        }
    }
}

fn default_store_enabled() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".recollect").join("store"))
        .unwrap_or_else(|| PathBuf::from(".recollect/store"))
}

fn default_per_set_limit() -> usize {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.memory.mode, MemoryMode::Auto);
        assert_eq!(config.memory.user_id, "default_user");
        assert_eq!(config.retrieval.context_limit, 10);
        assert_eq!(config.retrieval.history_limit, 15);
        assert_eq!(config.retrieval.combined_raw_cap, 8);
        assert_eq!(config.retrieval.supplement_threshold, 4);
        assert_eq!(config.retrieval.min_items, 2);
        assert_eq!(config.retrieval.content_max_chars, 200);
        assert_eq!(config.retrieval.dialogue_max_chars, 120);
        assert_eq!(config.merge.cap, 6);
        assert_eq!(config.narrative.placeholder, "(no memories)");
        assert_eq!(config.commit.settle_delay(), Duration::from_secs(2));
        assert_eq!(config.commit.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.commit.poll_budget(), Duration::from_secs(15));
        assert!(!config.backend.indexing_agent);
        assert!(config.store.enabled);
    }

    #[test]
    fn test_rendered_config_parses_back() {
        let mut config = Config::default();
        config.memory.mode = MemoryMode::Combined;
        config.memory.session_id = Some("s-1".to_string());
        config.commit.poll_budget_ms = 9_000;

        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("mode = \"combined\""));

        let parsed = Config::from_toml(&rendered).unwrap();
        assert_eq!(parsed.memory.mode, MemoryMode::Combined);
        assert_eq!(parsed.memory.session_id.as_deref(), Some("s-1"));
        assert_eq!(parsed.memory.assistant_id, None);
        assert_eq!(parsed.commit.poll_budget_ms, 9_000);
        assert_eq!(parsed.store.data_dir, config.store.data_dir);
    }

    #[test]
    fn test_default_priorities() {
        let priorities = TagPriorities::default();
        assert_eq!(priorities.priority(SourceTag::Essential), 0);
        assert_eq!(priorities.priority(SourceTag::Contextual), 1);
        assert_eq!(priorities.priority(SourceTag::Dialogue), 2);
        assert_eq!(priorities.priority(SourceTag::DirectStore), 3);
        assert_eq!(priorities.priority(SourceTag::Conversational), 4);
        assert_eq!(priorities.priority(SourceTag::Unknown), 5);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
[memory]
mode = "combined"
user_id = "alice"

[merge]
cap = 4

[merge.priorities]
dialogue = 0

[commit]
poll_budget_ms = 500
"#;

        let config = Config::from_toml(toml_str).unwrap();
        assert_eq!(config.memory.mode, MemoryMode::Combined);
        assert_eq!(config.memory.user_id, "alice");
        assert_eq!(config.merge.cap, 4);
        assert_eq!(config.merge.priorities.dialogue, 0);
        assert_eq!(config.merge.priorities.essential, 0);
        assert_eq!(config.merge.priorities.unknown, 5);
        assert_eq!(config.commit.poll_budget_ms, 500);
        assert_eq!(config.commit.settle_delay_ms, 2_000);
        assert_eq!(config.retrieval.context_limit, 10);
    }

    #[test]
    fn test_unknown_mode_falls_back_to_conscious() {
        let config = Config::from_toml("[memory]\nmode = \"telepathic\"\n").unwrap();
        assert_eq!(config.memory.mode, MemoryMode::Conscious);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml("[memory\nmode = ").unwrap_err();
        assert!(matches!(err, RecollectError::Config(_)));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backend]\nindexing_agent = true\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert!(config.backend.indexing_agent);
        assert_eq!(config.backend.timeout_secs, 30);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            Config::load(Some(&path)),
            Err(RecollectError::Config(_))
        ));
    }
}
