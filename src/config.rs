//! Configuration for lexipipe paths and collaborators.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (LEXIPIPE_HOME, LEXIPIPE_INBOX)
//! 2. Config file (.lexipipe/config.yaml)
//! 3. Defaults (~/.lexipipe)
//!
//! Config file discovery walks the current directory and its parents. The
//! result is an explicit [`ResolvedConfig`] value handed to the orchestrator
//! at construction; nothing here is cached globally, and secrets are
//! resolved separately by the bootstrap ([`Secrets::from_env`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::store::RetryPolicy;

/// Default cap on upload size before compression kicks in (25 MiB)
const MAX_UPLOAD_BYTES_DEFAULT: u64 = 25 * 1024 * 1024;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub api: Option<ApiConfig>,
    #[serde(default)]
    pub cards: Option<CardsConfig>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub tools: Option<ToolsConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to config file)
    pub home: Option<String>,
    /// Capture inbox directory (relative to config file)
    pub inbox: Option<String>,
    /// Ledger CSV location (defaults to `<home>/ledger.csv`)
    pub ledger: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub transcribe_model: Option<String>,
    pub enrich_model: Option<String>,
    /// Language preference; normalized to ISO-639-1
    pub language: Option<String>,
    /// Let the API auto-detect the language instead of hinting
    #[serde(default)]
    pub auto_detect_language: bool,
    pub timeout_seconds: Option<u64>,
    pub max_upload_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardsConfig {
    pub endpoint: Option<String>,
    pub deck: String,
    pub note_model: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsConfig {
    pub ytdlp: Option<String>,
    pub ffmpeg: Option<String>,
    /// Per-invocation bound for either tool
    pub timeout_seconds: Option<u64>,
}

/// API settings with defaults applied
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub transcribe_model: String,
    pub enrich_model: String,
    /// ISO-639-1 hint; `None` means auto-detect
    pub language: Option<String>,
    pub timeout: Duration,
    pub max_upload_bytes: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            transcribe_model: "whisper-1".to_string(),
            enrich_model: "gpt-4o-mini".to_string(),
            language: Some("pt".to_string()),
            timeout: Duration::from_secs(120),
            max_upload_bytes: MAX_UPLOAD_BYTES_DEFAULT,
        }
    }
}

/// Card sync settings (sync is skipped entirely when absent)
#[derive(Debug, Clone)]
pub struct CardSettings {
    pub endpoint: String,
    pub deck: String,
    pub note_model: String,
}

/// External tool binaries and their shared invocation bound
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub ytdlp: String,
    pub ffmpeg: String,
    /// A hung tool is killed at this bound so the run lock is never held
    /// indefinitely (defaults to 15 minutes; downloads can be slow)
    pub timeout: Duration,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ytdlp: "yt-dlp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            timeout: Duration::from_secs(15 * 60),
        }
    }
}

/// Resolved configuration with absolute paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Engine state directory (indexes, stamps, lock)
    pub home: PathBuf,
    /// Capture inbox directory (audio files land here)
    pub inbox_dir: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,

    pub api: ApiSettings,
    pub cards: Option<CardSettings>,
    pub retry: RetryPolicy,
    pub tools: ToolPaths,

    /// Ledger CSV path
    pub ledger_path: PathBuf,
}

impl ResolvedConfig {
    /// Text inbox file inside the capture inbox
    pub fn words_inbox(&self) -> PathBuf {
        self.inbox_dir.join("words_inbox.jsonl")
    }

    /// Where transcripts are written
    pub fn transcripts_dir(&self) -> PathBuf {
        self.inbox_dir.join("Transcripts")
    }

    /// Where processed audio and inbox backups move to
    pub fn archive_dir(&self) -> PathBuf {
        self.inbox_dir.join("Archive")
    }

    /// URL queue consumed by the downloader
    pub fn urls_file(&self) -> PathBuf {
        self.inbox_dir.join("video_urls.txt")
    }

    /// yt-dlp's download archive (one source identifier per line)
    pub fn download_archive(&self) -> PathBuf {
        self.inbox_dir.join("download_archive.txt")
    }

    /// Content-hash index for the audio stream
    pub fn audio_index(&self) -> PathBuf {
        self.home.join("audio_index.jsonl")
    }

    /// Lemma index for the vocabulary stream
    pub fn vocab_index(&self) -> PathBuf {
        self.home.join("vocab_index.jsonl")
    }

    /// Latest-batch snapshot next to the ledger
    pub fn snapshot_path(&self) -> PathBuf {
        self.ledger_path
            .parent()
            .unwrap_or(Path::new("."))
            .join("latest_batch.csv")
    }

    /// Exclusive run lock file
    pub fn lock_path(&self) -> PathBuf {
        self.home.join("lexipipe.lock")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".lexipipe").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Resolve settings from an optional parsed config file and env overrides.
fn resolve(
    config: Option<(ConfigFile, PathBuf)>,
    env_home: Option<PathBuf>,
    env_inbox: Option<PathBuf>,
) -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".lexipipe");

    let (file, config_path) = match config {
        Some((file, path)) => (Some(file), Some(path)),
        None => (None, None),
    };

    // Base for relative paths is the parent of .lexipipe/
    let base_dir = config_path
        .as_deref()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .unwrap_or(Path::new("."))
        .to_path_buf();

    let paths = file.as_ref().map(|f| f.paths.clone()).unwrap_or_default();

    let home = env_home.unwrap_or_else(|| {
        paths
            .home
            .as_deref()
            .map(|p| resolve_path(&base_dir, p))
            .unwrap_or(default_home)
    });

    let inbox_dir = env_inbox.unwrap_or_else(|| {
        paths
            .inbox
            .as_deref()
            .map(|p| resolve_path(&base_dir, p))
            .unwrap_or_else(|| home.join("inbox"))
    });

    let ledger_path = paths
        .ledger
        .as_deref()
        .map(|p| resolve_path(&base_dir, p))
        .unwrap_or_else(|| home.join("ledger.csv"));

    let api = resolve_api(file.as_ref().and_then(|f| f.api.clone()));

    let cards = file
        .as_ref()
        .and_then(|f| f.cards.clone())
        .map(|c| CardSettings {
            endpoint: c
                .endpoint
                .unwrap_or_else(|| "http://127.0.0.1:8765".to_string()),
            deck: c.deck,
            note_model: c.note_model,
        });

    let retry = file
        .as_ref()
        .and_then(|f| f.retry.clone())
        .unwrap_or_default();

    let tools = file
        .as_ref()
        .and_then(|f| f.tools.clone())
        .map(|t| {
            let defaults = ToolPaths::default();
            ToolPaths {
                ytdlp: t.ytdlp.unwrap_or(defaults.ytdlp),
                ffmpeg: t.ffmpeg.unwrap_or(defaults.ffmpeg),
                timeout: t
                    .timeout_seconds
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.timeout),
            }
        })
        .unwrap_or_default();

    Ok(ResolvedConfig {
        home,
        inbox_dir,
        config_file: config_path,
        api,
        cards,
        retry,
        tools,
        ledger_path,
    })
}

fn resolve_api(api: Option<ApiConfig>) -> ApiSettings {
    let defaults = ApiSettings::default();
    let Some(api) = api else {
        return defaults;
    };

    let language = if api.auto_detect_language {
        None
    } else {
        Some(crate::adapters::normalize_language(
            api.language.as_deref().unwrap_or("pt"),
        ))
    };

    ApiSettings {
        base_url: api.base_url.unwrap_or(defaults.base_url),
        transcribe_model: api.transcribe_model.unwrap_or(defaults.transcribe_model),
        enrich_model: api.enrich_model.unwrap_or(defaults.enrich_model),
        language,
        timeout: api
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout),
        max_upload_bytes: api.max_upload_bytes.unwrap_or(defaults.max_upload_bytes),
    }
}

/// Load configuration from all sources.
pub fn load_config() -> Result<ResolvedConfig> {
    let config = match find_config_file() {
        Some(path) => Some((load_config_file(&path)?, path)),
        None => None,
    };

    let env_home = std::env::var("LEXIPIPE_HOME").ok().map(PathBuf::from);
    let env_inbox = std::env::var("LEXIPIPE_INBOX").ok().map(PathBuf::from);

    resolve(config, env_home, env_inbox)
}

/// Secrets resolved once by the bootstrap and passed in explicitly.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub api_key: String,
}

impl Secrets {
    /// Read the API key from LEXIPIPE_API_KEY or OPENAI_API_KEY.
    pub fn from_env() -> Result<Self> {
        for var in ["LEXIPIPE_API_KEY", "OPENAI_API_KEY"] {
            if let Ok(raw) = std::env::var(var) {
                let key = sanitize_api_key(&raw);
                if !key.is_empty() {
                    return Ok(Self { api_key: key });
                }
            }
        }
        anyhow::bail!("API key not found; set LEXIPIPE_API_KEY or OPENAI_API_KEY")
    }
}

/// Strip smart quotes, surrounding quotes, and non-ASCII noise that creeps in
/// when a key is pasted from a notes app.
fn sanitize_api_key(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| c.is_ascii())
        .collect::<String>()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}
