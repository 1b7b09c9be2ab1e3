use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub model: String,
    pub api_key_env: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    pub threshold: f64,
    pub keep_recent: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.80,
            keep_recent: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubagentsConfig {
    pub max_concurrent: usize,
}

impl Default for SubagentsConfig {
    fn default() -> Self {
        Self { max_concurrent: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub max_tool_iterations: usize,
    pub max_messages: usize,
    pub emergency_truncate_window: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: 300,
            max_messages: 1000,
            emergency_truncate_window: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub workspace: String,
    pub cron_store: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            workspace: "~/.agentcore/workspace".to_string(),
            cron_store: "~/.agentcore/cron_jobs.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub compaction: CompactionConfig,
    pub subagents: SubagentsConfig,
    pub driver: DriverConfig,
    pub paths: PathsConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.subagents.max_concurrent, 10);
        assert_eq!(cfg.driver.max_tool_iterations, 300);
        assert!(cfg.compaction.threshold > 0.0 && cfg.compaction.threshold < 1.0);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = Config::default();
        let s = toml::to_string_pretty(&cfg).unwrap();
        let back: Config = toml::from_str(&s).unwrap();
        assert_eq!(cfg.provider.model, back.provider.model);
    }
}
