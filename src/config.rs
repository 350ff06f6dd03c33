use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::DEFAULT_TIMEOUT;
use crate::engine::{EngineConfig, DEFAULT_PAGE_SIZE};
use crate::model::{PostStatus, VoteDirection};
use crate::rules::{GateCoverage, GatePolicy, WriteAction, DEFAULT_MAX_LENGTH, DEFAULT_WINDOW_MS};

#[derive(Parser, Debug)]
#[command(name = "threadline", about = "Threaded media comments from the terminal")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Base URL of the comment proxy
    #[arg(long)]
    pub base_url: Option<String>,

    /// Bearer token of the signed-in user
    #[arg(long, env = "THREADLINE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// A post addressed from the command line. The thread is loaded down to
/// `post` (or the root itself when omitted) before acting on it.
#[derive(clap::Args, Debug, Clone)]
pub struct Target {
    /// Media item the thread belongs to
    #[arg(long)]
    pub media: String,

    /// Root comment of the thread
    #[arg(long)]
    pub root: String,

    /// Reply inside the thread, if not the root itself
    #[arg(long)]
    pub post: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteArg {
    Up,
    Down,
}

impl From<VoteArg> for VoteDirection {
    fn from(arg: VoteArg) -> Self {
        match arg {
            VoteArg::Up => VoteDirection::Up,
            VoteArg::Down => VoteDirection::Down,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the comment tree of a media item
    Show {
        #[arg(long)]
        media: String,
        /// Reply levels to expand below the root comments
        #[arg(long, default_value_t = 1)]
        depth: usize,
        /// Include hidden, removed and deleted posts
        #[arg(long)]
        all: bool,
    },
    /// Post a root comment
    Post {
        #[arg(long)]
        media: String,
        content: String,
    },
    /// Reply to a comment or reply
    Reply {
        #[command(flatten)]
        target: Target,
        content: String,
    },
    /// Vote on a post; repeating a vote clears it
    Vote {
        #[command(flatten)]
        target: Target,
        #[arg(value_enum)]
        direction: VoteArg,
    },
    /// Edit your own post
    Edit {
        #[command(flatten)]
        target: Target,
        content: String,
    },
    /// Delete your own post
    Delete {
        #[command(flatten)]
        target: Target,
    },
    /// Report a post to moderators
    Report {
        #[command(flatten)]
        target: Target,
        reason: String,
    },
    /// List the moderation queue
    Reports {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Only show reports matching this text
        #[arg(long)]
        search: Option<String>,
    },
    /// Set a post's moderation status (active, hidden, removed)
    Status { post: String, status: PostStatus },
    /// Ban a user
    Ban { user: String },
    /// Show the signed-in user
    Whoami,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub gate: GateConfig,
    pub comments: CommentsConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GateConfig {
    pub coverage: GateCoverage,
    pub window_ms: u64,
    /// Explicit set of covered actions. Overrides `coverage` when present.
    pub actions: Option<Vec<WriteAction>>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CommentsConfig {
    pub max_length: usize,
    pub page_size: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api/proxy".to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            coverage: GateCoverage::default(),
            window_ms: DEFAULT_WINDOW_MS,
            actions: None,
        }
    }
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| Self::data_dir(cli).join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref base_url) = cli.base_url {
            config.backend.base_url = base_url.clone();
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".threadline")
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs)
    }

    pub fn gate_policy(&self) -> GatePolicy {
        let window = Duration::from_millis(self.gate.window_ms);
        match self.gate.actions {
            Some(ref actions) => GatePolicy::with_actions(window, actions.iter().copied()),
            None => GatePolicy::new(self.gate.coverage, window),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_length: self.comments.max_length,
            page_size: self.comments.page_size,
            gate: self.gate_policy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["threadline"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.backend.base_url, "http://localhost:3000/api/proxy");
        assert_eq!(config.backend.timeout_secs, 10);
        assert_eq!(config.gate.coverage, GateCoverage::CreatesOnly);
        assert_eq!(config.gate.window_ms, 2000);
        assert_eq!(config.comments.max_length, 500);
        assert_eq!(config.comments.page_size, 20);
    }

    #[test]
    fn default_gate_does_not_cover_votes() {
        let policy = Config::default().gate_policy();
        assert!(policy.covers(WriteAction::CreateComment));
        assert!(policy.covers(WriteAction::CreateReply));
        assert!(!policy.covers(WriteAction::Vote));
    }

    #[test]
    fn data_dir_uses_cli_override() {
        let cli = cli(&["--data-dir", "/tmp/test-threadline", "whoami"]);
        assert_eq!(Config::data_dir(&cli), PathBuf::from("/tmp/test-threadline"));
    }

    #[test]
    fn data_dir_defaults_to_home_dot_threadline() {
        let dir = Config::data_dir(&cli(&["whoami"]));
        assert!(dir.ends_with(".threadline"));
    }

    #[test]
    fn load_with_no_config_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let cli = cli(&["--data-dir", tmp.path().to_str().unwrap(), "whoami"]);
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.backend.base_url, "http://localhost:3000/api/proxy");
        assert_eq!(config.engine_config(), EngineConfig::default());
    }

    #[test]
    fn load_reads_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[backend]
base_url = "https://comments.example.com/api/proxy"
timeout_secs = 3

[gate]
coverage = "all-writes"
window_ms = 500

[comments]
page_size = 5
"#,
        )
        .unwrap();

        let cli = cli(&["--config", config_path.to_str().unwrap(), "whoami"]);
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.backend.base_url, "https://comments.example.com/api/proxy");
        assert_eq!(config.timeout(), Duration::from_secs(3));
        assert_eq!(config.comments.max_length, 500);

        let engine = config.engine_config();
        assert_eq!(engine.page_size, 5);
        assert_eq!(engine.gate.window, Duration::from_millis(500));
        assert!(engine.gate.covers(WriteAction::Vote));
    }

    #[test]
    fn explicit_actions_override_coverage() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[gate]
coverage = "creates-only"
actions = ["create-comment", "vote"]
"#,
        )
        .unwrap();

        let cli = cli(&["--config", config_path.to_str().unwrap(), "whoami"]);
        let policy = Config::load(&cli).unwrap().gate_policy();
        assert!(policy.covers(WriteAction::Vote));
        assert!(!policy.covers(WriteAction::CreateReply));
    }

    #[test]
    fn cli_overrides_beat_toml_values() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[backend]
base_url = "https://from-file.example.com"
"#,
        )
        .unwrap();

        let cli = cli(&[
            "--config",
            config_path.to_str().unwrap(),
            "--base-url",
            "http://127.0.0.1:9000",
            "whoami",
        ]);
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.backend.base_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn subcommands_parse() {
        let parsed = cli(&[
            "vote", "--media", "m1", "--root", "c1", "--post", "r1", "down",
        ]);
        match parsed.command {
            Command::Vote { target, direction } => {
                assert_eq!(target.post.as_deref(), Some("r1"));
                assert_eq!(VoteDirection::from(direction), VoteDirection::Down);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let parsed = cli(&["status", "c1", "hidden"]);
        assert!(matches!(
            parsed.command,
            Command::Status {
                status: PostStatus::Hidden,
                ..
            }
        ));
    }
}
