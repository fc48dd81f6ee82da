use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::completion::openai::{self, OpenAiClient};
use crate::controller::{
    CompletionSignal, ContextMode, DEFAULT_CLOSING_TAG, DEFAULT_LENGTH_THRESHOLD, DEFAULT_MARKER,
    DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_SEPARATOR, Dispatch, GenerationSettings,
};
use crate::prompt;
use crate::window::{DEFAULT_PAGE_MARKER, PageSelection, WindowStrategy};

pub const DEFAULT_HEAD_PAGES: usize = 30;
pub const DEFAULT_TAIL_PAGES: usize = 25;
pub const DEFAULT_CHUNK_CHARS: usize = 6000;
pub const DEFAULT_CHUNK_WORDS: usize = 6000;
pub const DEFAULT_BLOCK_PAGES: usize = 10;

/// Environment variables consulted for the API key, in priority order.
pub const API_KEY_ENV_VARS: &[&str] = &["TOCGEN_API_KEY", "OPENAI_API_KEY"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no API key found (pass --api-key, set [completion].api_key, or export {})", API_KEY_ENV_VARS.join(" / "))]
    MissingApiKey,
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("failed to read prompt file {path}: {source}")]
    Prompt {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("failed to write config: {0}")]
    Write(#[from] std::io::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub completion: Option<CompletionConfig>,
    pub windowing: Option<WindowingConfig>,
    pub generation: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowingConfig {
    /// `head-tail`, `char-budget`, `word-budget` or `page-blocks`.
    pub strategy: Option<String>,
    /// Page selection for the budget strategies: `all` or `head-tail`.
    pub select: Option<String>,
    pub head_pages: Option<usize>,
    pub tail_pages: Option<usize>,
    pub chunk_chars: Option<usize>,
    pub chunk_words: Option<usize>,
    pub block_pages: Option<usize>,
    /// Template written above each page; `{n}` is the page number. Empty disables.
    pub page_marker: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// `stateless` or `conversational`.
    pub context_mode: Option<String>,
    /// `queue` or `whole`.
    pub dispatch: Option<String>,
    /// `exhaustion`, `marker` or `structural`.
    pub signal: Option<String>,
    pub marker: Option<String>,
    pub closing_tag: Option<String>,
    pub length_threshold: Option<usize>,
    pub separator: Option<String>,
    pub continue_prompt: Option<String>,
    pub prompt_path: Option<String>,
    pub unwrap_code_fences: Option<bool>,
}

/// Platform config directory path: `<config_dir>/tocgen/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tocgen").join("config.toml"))
}

/// Load config by cascading CWD `.tocgen.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".tocgen.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            None
        }
    }
}

/// Overlay wins field by field.
macro_rules! pick {
    ($base:expr, $overlay:expr, $section:ident . $field:ident) => {
        $overlay
            .$section
            .as_ref()
            .and_then(|s| s.$field.clone())
            .or_else(|| $base.$section.as_ref().and_then(|s| s.$field.clone()))
    };
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        completion: Some(CompletionConfig {
            api_key: pick!(base, overlay, completion.api_key),
            base_url: pick!(base, overlay, completion.base_url),
            model: pick!(base, overlay, completion.model),
            temperature: pick!(base, overlay, completion.temperature),
            max_output_tokens: pick!(base, overlay, completion.max_output_tokens),
            timeout_secs: pick!(base, overlay, completion.timeout_secs),
        }),
        windowing: Some(WindowingConfig {
            strategy: pick!(base, overlay, windowing.strategy),
            select: pick!(base, overlay, windowing.select),
            head_pages: pick!(base, overlay, windowing.head_pages),
            tail_pages: pick!(base, overlay, windowing.tail_pages),
            chunk_chars: pick!(base, overlay, windowing.chunk_chars),
            chunk_words: pick!(base, overlay, windowing.chunk_words),
            block_pages: pick!(base, overlay, windowing.block_pages),
            page_marker: pick!(base, overlay, windowing.page_marker),
        }),
        generation: Some(GenerationConfig {
            context_mode: pick!(base, overlay, generation.context_mode),
            dispatch: pick!(base, overlay, generation.dispatch),
            signal: pick!(base, overlay, generation.signal),
            marker: pick!(base, overlay, generation.marker),
            closing_tag: pick!(base, overlay, generation.closing_tag),
            length_threshold: pick!(base, overlay, generation.length_threshold),
            separator: pick!(base, overlay, generation.separator),
            continue_prompt: pick!(base, overlay, generation.continue_prompt),
            prompt_path: pick!(base, overlay, generation.prompt_path),
            unwrap_code_fences: pick!(base, overlay, generation.unwrap_code_fences),
        }),
    }
}

/// Save the config to the platform config directory.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, toml::to_string_pretty(config)?)?;
    Ok(path)
}

/// A config with every default spelled out, for `config init`.
pub fn default_config() -> ConfigFile {
    ConfigFile {
        completion: Some(CompletionConfig {
            api_key: None,
            base_url: Some(openai::DEFAULT_BASE_URL.to_string()),
            model: Some(openai::DEFAULT_MODEL.to_string()),
            temperature: Some(openai::DEFAULT_TEMPERATURE),
            max_output_tokens: Some(DEFAULT_MAX_OUTPUT_TOKENS),
            timeout_secs: Some(openai::DEFAULT_TIMEOUT.as_secs()),
        }),
        windowing: Some(WindowingConfig {
            strategy: Some("char-budget".into()),
            select: Some("head-tail".into()),
            head_pages: Some(DEFAULT_HEAD_PAGES),
            tail_pages: Some(DEFAULT_TAIL_PAGES),
            chunk_chars: Some(DEFAULT_CHUNK_CHARS),
            chunk_words: Some(DEFAULT_CHUNK_WORDS),
            block_pages: Some(DEFAULT_BLOCK_PAGES),
            page_marker: Some(DEFAULT_PAGE_MARKER.into()),
        }),
        generation: Some(GenerationConfig {
            context_mode: Some("stateless".into()),
            dispatch: Some("queue".into()),
            signal: Some("exhaustion".into()),
            marker: Some(DEFAULT_MARKER.into()),
            closing_tag: Some(DEFAULT_CLOSING_TAG.into()),
            length_threshold: Some(DEFAULT_LENGTH_THRESHOLD),
            separator: Some(DEFAULT_SEPARATOR.into()),
            continue_prompt: None,
            prompt_path: None,
            unwrap_code_fences: Some(true),
        }),
    }
}

/// First layer holding a non-empty value, with the layer's name.
pub fn resolve_layered<'a>(
    layers: impl IntoIterator<Item = (&'a str, Option<String>)>,
) -> Option<(&'a str, String)> {
    layers
        .into_iter()
        .find_map(|(source, value)| value.filter(|v| !v.trim().is_empty()).map(|v| (source, v)))
}

/// API key: CLI flag, then config file, then environment.
pub fn resolve_api_key(flag: Option<String>, config: &ConfigFile) -> Result<String, ConfigError> {
    let file_key = config.completion.as_ref().and_then(|c| c.api_key.clone());
    let mut layers = vec![("command line", flag), ("config file", file_key)];
    layers.extend(
        API_KEY_ENV_VARS
            .iter()
            .map(|var| (*var, std::env::var(var).ok())),
    );
    let (source, key) = resolve_layered(layers).ok_or(ConfigError::MissingApiKey)?;
    tracing::debug!(source, "resolved API key");
    Ok(key)
}

/// Build the completion client from the `[completion]` section.
pub fn build_client(config: &ConfigFile, api_key: String) -> OpenAiClient {
    let section = config.completion.clone().unwrap_or_default();
    let mut client = OpenAiClient::new(api_key);
    if let Some(url) = section.base_url {
        client = client.with_base_url(url);
    }
    if let Some(model) = section.model {
        client = client.with_model(model);
    }
    if let Some(t) = section.temperature {
        client = client.with_temperature(t);
    }
    if let Some(secs) = section.timeout_secs {
        client = client.with_timeout(Duration::from_secs(secs));
    }
    client
}

/// Windowing settings resolved from the `[windowing]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSettings {
    pub strategy: WindowStrategy,
    pub page_marker: Option<String>,
}

pub fn resolve_window_settings(config: &ConfigFile) -> Result<WindowSettings, ConfigError> {
    let w = config.windowing.clone().unwrap_or_default();
    let head = w.head_pages.unwrap_or(DEFAULT_HEAD_PAGES);
    let tail = w.tail_pages.unwrap_or(DEFAULT_TAIL_PAGES);

    let pages = match w.select.as_deref().unwrap_or("head-tail") {
        "all" => PageSelection::All,
        "head-tail" => PageSelection::HeadTail { head, tail },
        other => {
            return Err(ConfigError::InvalidValue {
                key: "windowing.select",
                value: other.to_string(),
            });
        }
    };

    let strategy = match w.strategy.as_deref().unwrap_or("char-budget") {
        "head-tail" => WindowStrategy::HeadTail { head, tail },
        "char-budget" => WindowStrategy::CharBudget {
            budget: w.chunk_chars.unwrap_or(DEFAULT_CHUNK_CHARS),
            pages,
        },
        "word-budget" => WindowStrategy::WordBudget {
            budget: w.chunk_words.unwrap_or(DEFAULT_CHUNK_WORDS),
            pages,
        },
        "page-blocks" => WindowStrategy::PageBlocks {
            pages_per_block: w.block_pages.unwrap_or(DEFAULT_BLOCK_PAGES),
        },
        other => {
            return Err(ConfigError::InvalidValue {
                key: "windowing.strategy",
                value: other.to_string(),
            });
        }
    };

    let page_marker = match w.page_marker {
        Some(m) if m.is_empty() => None,
        Some(m) => Some(m),
        None => Some(DEFAULT_PAGE_MARKER.to_string()),
    };

    Ok(WindowSettings {
        strategy,
        page_marker,
    })
}

pub fn resolve_generation_settings(config: &ConfigFile) -> Result<GenerationSettings, ConfigError> {
    let g = config.generation.clone().unwrap_or_default();
    let defaults = GenerationSettings::default();

    let context_mode = match g.context_mode.as_deref().unwrap_or("stateless") {
        "stateless" => ContextMode::Stateless,
        "conversational" => ContextMode::Conversational,
        other => {
            return Err(ConfigError::InvalidValue {
                key: "generation.context_mode",
                value: other.to_string(),
            });
        }
    };

    let dispatch = match g.dispatch.as_deref().unwrap_or("queue") {
        "queue" => Dispatch::Queue,
        "whole" => Dispatch::Whole,
        other => {
            return Err(ConfigError::InvalidValue {
                key: "generation.dispatch",
                value: other.to_string(),
            });
        }
    };

    let signal = match g.signal.as_deref().unwrap_or("exhaustion") {
        "exhaustion" => CompletionSignal::Exhaustion,
        "marker" => CompletionSignal::Marker {
            marker: g.marker.clone().unwrap_or_else(|| DEFAULT_MARKER.to_string()),
        },
        "structural" => CompletionSignal::Structural {
            closing_tag: g
                .closing_tag
                .clone()
                .unwrap_or_else(|| DEFAULT_CLOSING_TAG.to_string()),
            max_len: g.length_threshold.unwrap_or(DEFAULT_LENGTH_THRESHOLD),
        },
        other => {
            return Err(ConfigError::InvalidValue {
                key: "generation.signal",
                value: other.to_string(),
            });
        }
    };

    let system_prompt = match g.prompt_path {
        Some(path) => {
            let path = PathBuf::from(path);
            std::fs::read_to_string(&path).map_err(|source| ConfigError::Prompt { path, source })?
        }
        None => prompt::DEFAULT_SYSTEM_PROMPT.to_string(),
    };

    let max_output_tokens = config
        .completion
        .as_ref()
        .and_then(|c| c.max_output_tokens)
        .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS);

    Ok(GenerationSettings {
        system_prompt,
        continue_prompt: g.continue_prompt.unwrap_or(defaults.continue_prompt),
        context_mode,
        dispatch,
        signal,
        max_output_tokens,
        separator: g.separator.unwrap_or(defaults.separator),
        unwrap_code_fences: g.unwrap_code_fences.unwrap_or(defaults.unwrap_code_fences),
    })
}
