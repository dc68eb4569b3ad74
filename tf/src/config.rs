//! TaskForce configuration types and loading

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Main TaskForce configuration
///
/// Loaded once at startup and passed by value into constructors. Conceptually
/// immutable after load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM model tiers and call parameters
    pub llm: LlmConfig,

    /// Local-to-cloud escalation policy
    pub fallback: FallbackConfig,

    /// Planner keyword and capability maps
    pub orchestrator: OrchestratorConfig,

    /// Specialist pack definitions, in declaration order (order breaks
    /// routing ties)
    pub specialists: Vec<SpecialistConfig>,

    /// Storage locations
    pub storage: StorageConfig,

    /// Tool sandbox knobs
    pub tools: ToolsConfig,

    /// Tool-loop knobs
    #[serde(rename = "loop")]
    pub tool_loop: LoopConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            let config = Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()))?;
            config.validate()?;
            return Ok(config);
        }

        let local_config = PathBuf::from(".taskforce.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => {
                    config.validate()?;
                    return Ok(config);
                }
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("taskforce").join("taskforce.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        config.validate()?;
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        let config = Self::default_with_packs();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus the built-in specialist pack definitions
    pub fn default_with_packs() -> Self {
        Self {
            specialists: SpecialistConfig::builtin(),
            ..Self::default()
        }
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let mut config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        if config.specialists.is_empty() {
            config.specialists = SpecialistConfig::builtin();
        }
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Validate configuration invariants that are fatal at load time
    pub fn validate(&self) -> Result<()> {
        if self.specialists.is_empty() {
            bail!("No specialists configured");
        }

        let mut seen_ids = std::collections::HashSet::new();
        for specialist in &self.specialists {
            if !seen_ids.insert(specialist.id.as_str()) {
                bail!("Duplicate specialist id: {}", specialist.id);
            }
            let mut seen_servers = std::collections::HashSet::new();
            for server in &specialist.mcp_servers {
                if !seen_servers.insert(server.name.as_str()) {
                    bail!("Duplicate MCP server name '{}' for specialist {}", server.name, specialist.id);
                }
                server.validate().context(format!("MCP server '{}'", server.name))?;
            }
        }

        if self.orchestrator.capability_keywords.is_empty() {
            bail!("Orchestrator capability keyword map is empty");
        }

        Ok(())
    }

    /// Look up a specialist config by id
    pub fn specialist(&self, id: &str) -> Option<&SpecialistConfig> {
        self.specialists.iter().find(|s| s.id == id)
    }

    /// Resolve a model tier key to a model name, falling back to the first tier
    pub fn model_for_tier(&self, tier: &str) -> String {
        self.llm
            .tiers
            .get(tier)
            .cloned()
            .unwrap_or_else(|| self.llm.tiers.values().next().cloned().unwrap_or_default())
    }
}

/// LLM call parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model tier key -> model identifier
    pub tiers: HashMap<String, String>,

    /// Chat Completions base URL of the local backend
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Environment variable holding the API key (unset for keyless backends)
    #[serde(rename = "api-key-env")]
    pub api_key_env: Option<String>,

    /// Sampling temperature
    pub temperature: f32,

    /// Nucleus sampling cutoff
    #[serde(rename = "top-p")]
    pub top_p: f32,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut tiers = HashMap::new();
        tiers.insert("fast".to_string(), "qwen2.5-coder:14b".to_string());
        tiers.insert("quality".to_string(), "claude-sonnet-4-20250514".to_string());
        Self {
            tiers,
            base_url: "http://localhost:11434/v1".to_string(),
            api_key_env: None,
            temperature: 0.2,
            top_p: 0.9,
            max_tokens: 16384,
            timeout_ms: 300_000,
        }
    }
}

/// When to escalate from the local chat client to the cloud one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicyConfig {
    /// Never escalate
    Off,
    /// Escalate when the local response has no tool calls but has content
    NoToolCalls,
    /// Escalate when any local tool call has unparseable arguments
    MalformedArgs,
    /// Always call both and prefer the cloud result
    Always,
}

/// Local-to-cloud escalation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub policy: FallbackPolicyConfig,

    /// Model used by the local client
    #[serde(rename = "local-model")]
    pub local_model: String,

    /// Model used by the cloud client
    #[serde(rename = "cloud-model")]
    pub cloud_model: String,

    /// Chat Completions base URL of the cloud backend
    #[serde(rename = "cloud-base-url")]
    pub cloud_base_url: String,

    /// Environment variable holding the cloud API key
    #[serde(rename = "cloud-api-key-env")]
    pub cloud_api_key_env: Option<String>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            policy: FallbackPolicyConfig::Off,
            local_model: "qwen2.5-coder:14b".to_string(),
            cloud_model: "claude-sonnet-4-20250514".to_string(),
            cloud_base_url: "https://api.openai.com/v1".to_string(),
            cloud_api_key_env: Some("OPENAI_API_KEY".to_string()),
        }
    }
}

/// Planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Lowercase prompt keyword -> capability name, used by the fallback router
    #[serde(rename = "capability-keywords")]
    pub capability_keywords: HashMap<String, String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let mut capability_keywords = HashMap::new();
        for (kw, cap) in [
            ("implement", "coding"),
            ("build", "coding"),
            ("fix", "coding"),
            ("refactor", "coding"),
            ("write code", "coding"),
            ("create", "coding"),
            ("test", "testing"),
            ("verify", "testing"),
            ("research", "research"),
            ("investigate", "research"),
            ("find out", "research"),
            ("compare", "research"),
            ("search", "web"),
            ("look up", "web"),
            ("document", "writing"),
            ("summarize", "writing"),
        ] {
            capability_keywords.insert(kw.to_string(), cap.to_string());
        }
        Self { capability_keywords }
    }
}

/// One specialist pack definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecialistConfig {
    /// Stable pack id (e.g. "engineering")
    pub id: String,

    /// Capabilities this pack covers, for fallback routing
    pub capabilities: Vec<String>,

    /// Keywords scored against the prompt when no capability is inferred
    pub keywords: Vec<String>,

    /// Builtin tool names available to this pack
    pub tools: Vec<String>,

    /// Fields every finish_task payload from this pack must contain
    #[serde(rename = "required-finish-fields")]
    pub required_finish_fields: Vec<String>,

    /// System prompt override; packs ship a default when empty
    #[serde(rename = "system-prompt")]
    pub system_prompt: Option<String>,

    /// Named pack factory override (defaults to the factory registered
    /// under the pack id)
    pub builder: Option<String>,

    /// MCP servers whose tools are multiplexed into this pack
    #[serde(rename = "mcp-servers")]
    pub mcp_servers: Vec<McpServerConfig>,

    /// When set, the shell tool is redirected through this container image
    #[serde(rename = "container-image")]
    pub container_image: Option<String>,
}

impl Default for SpecialistConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            capabilities: Vec::new(),
            keywords: Vec::new(),
            tools: Vec::new(),
            required_finish_fields: vec!["summary".to_string()],
            system_prompt: None,
            builder: None,
            mcp_servers: Vec::new(),
            container_image: None,
        }
    }
}

impl SpecialistConfig {
    /// The built-in pack roster used when no config file defines specialists
    pub fn builtin() -> Vec<Self> {
        vec![
            Self {
                id: "engineering".to_string(),
                capabilities: vec!["coding".to_string(), "testing".to_string()],
                keywords: vec![
                    "code".to_string(),
                    "implement".to_string(),
                    "build".to_string(),
                    "fix".to_string(),
                    "file".to_string(),
                    "test".to_string(),
                ],
                tools: vec![
                    "read_file".to_string(),
                    "write_file".to_string(),
                    "list_files".to_string(),
                    "shell".to_string(),
                    "run_tests".to_string(),
                ],
                required_finish_fields: vec![
                    "summary".to_string(),
                    "files_changed".to_string(),
                    "tests_verified".to_string(),
                ],
                ..Self::default()
            },
            Self {
                id: "research".to_string(),
                capabilities: vec!["research".to_string(), "web".to_string(), "writing".to_string()],
                keywords: vec![
                    "research".to_string(),
                    "investigate".to_string(),
                    "search".to_string(),
                    "summarize".to_string(),
                    "compare".to_string(),
                ],
                tools: vec![
                    "read_file".to_string(),
                    "write_file".to_string(),
                    "list_files".to_string(),
                    "web_search".to_string(),
                    "fetch_url".to_string(),
                    "cross_run_search".to_string(),
                ],
                required_finish_fields: vec!["summary".to_string(), "findings".to_string()],
                ..Self::default()
            },
        ]
    }
}

/// Transport selection for an MCP server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransport {
    Stdio,
    Sse,
}

/// One external MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpServerConfig {
    /// Unique server name; tools are exposed as `mcp__<name>__<tool>`
    pub name: String,

    pub transport: McpTransport,

    /// stdio: command to spawn
    pub command: Option<String>,

    /// stdio: command arguments
    pub args: Vec<String>,

    /// stdio: extra environment variables
    pub env: HashMap<String, String>,

    /// sse: base URL of the event stream
    pub url: Option<String>,

    /// Per-call timeout in milliseconds
    #[serde(rename = "call-timeout-ms")]
    pub call_timeout_ms: u64,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            transport: McpTransport::Stdio,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            url: None,
            call_timeout_ms: 30_000,
        }
    }
}

impl McpServerConfig {
    /// Check transport-specific required fields
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("MCP server name must not be empty");
        }
        match self.transport {
            McpTransport::Stdio if self.command.is_none() => {
                bail!("stdio transport requires 'command'")
            }
            McpTransport::Sse if self.url.is_none() => {
                bail!("sse transport requires 'url'")
            }
            _ => Ok(()),
        }
    }
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root under which `runs/` and `run_index.jsonl` live
    #[serde(rename = "workspace-root")]
    pub workspace_root: PathBuf,

    /// fsync the runlog after every event instead of line-buffered flush
    #[serde(rename = "fsync-events")]
    pub fsync_events: bool,

    /// Streaming queue capacity (drop-oldest on overflow)
    #[serde(rename = "event-queue-capacity")]
    pub event_queue_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let workspace_root = dirs::home_dir()
            .map(|h| h.join(".taskforce"))
            .unwrap_or_else(|| PathBuf::from(".taskforce"));
        Self {
            workspace_root,
            fsync_events: false,
            event_queue_capacity: 256,
        }
    }
}

/// Tool sandbox knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// First-token allowlist for the shell tool
    #[serde(rename = "shell-allowlist")]
    pub shell_allowlist: Vec<String>,

    /// Default shell timeout in milliseconds
    #[serde(rename = "shell-timeout-ms")]
    pub shell_timeout_ms: u64,

    /// Combined stdout+stderr byte cap before truncation
    #[serde(rename = "output-byte-cap")]
    pub output_byte_cap: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell_allowlist: [
                "python", "python3", "pytest", "cargo", "npm", "npx", "node", "bash", "sh", "git", "pip", "pip3",
                "make", "go", "ls", "cat", "grep", "echo",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            shell_timeout_ms: 120_000,
            output_byte_cap: 30_000,
        }
    }
}

/// Tool-loop knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Step budget per specialist
    #[serde(rename = "max-steps")]
    pub max_steps: u32,

    /// Response content cap (chars) applied to llm_response events
    #[serde(rename = "content-log-cap")]
    pub content_log_cap: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_steps: 40,
            content_log_cap: 2_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = Config::default_with_packs();
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_specialists_rejected() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_specialist_ids_rejected() {
        let mut config = Config::default_with_packs();
        let dup = config.specialists[0].clone();
        config.specialists.push(dup);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate specialist id"));
    }

    #[test]
    fn test_duplicate_mcp_names_rejected() {
        let mut config = Config::default_with_packs();
        let server = McpServerConfig {
            name: "files".to_string(),
            command: Some("mcp-files".to_string()),
            ..Default::default()
        };
        config.specialists[0].mcp_servers = vec![server.clone(), server];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate MCP server name"));
    }

    #[test]
    fn test_mcp_stdio_requires_command() {
        let server = McpServerConfig {
            name: "files".to_string(),
            ..Default::default()
        };
        assert!(server.validate().is_err());
    }

    #[test]
    fn test_mcp_sse_requires_url() {
        let server = McpServerConfig {
            name: "remote".to_string(),
            transport: McpTransport::Sse,
            ..Default::default()
        };
        assert!(server.validate().is_err());
        let ok = McpServerConfig {
            name: "remote".to_string(),
            transport: McpTransport::Sse,
            url: Some("http://localhost:8808/sse".to_string()),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_model_for_tier() {
        let config = Config::default_with_packs();
        assert!(!config.model_for_tier("fast").is_empty());
        // Unknown tier falls back to some configured model
        assert!(!config.model_for_tier("nonexistent").is_empty());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default_with_packs();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.specialists.len(), config.specialists.len());
        assert_eq!(parsed.tools.shell_timeout_ms, 120_000);
    }

    #[test]
    fn test_builtin_packs_have_finish_fields() {
        for pack in SpecialistConfig::builtin() {
            assert!(pack.required_finish_fields.contains(&"summary".to_string()));
        }
        let eng = SpecialistConfig::builtin()
            .into_iter()
            .find(|p| p.id == "engineering")
            .unwrap();
        assert!(eng.required_finish_fields.contains(&"tests_verified".to_string()));
    }
}
