use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tocgen_core::config_file::{
    self, CompletionConfig, ConfigFile, GenerationConfig, WindowingConfig,
};
use tocgen_core::{AdvanceError, SessionStore, advance, window};

mod output;

use output::ColorMode;

/// Generate an HTML table of contents from a PDF or DOCX with a language model
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the table of contents for a document
    Generate {
        /// Path to the PDF or DOCX file
        file_path: PathBuf,

        /// Write the HTML table here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// API key (overrides config file and TOCGEN_API_KEY / OPENAI_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Ask before every round after the first
        #[arg(long)]
        step: bool,

        /// Stop after this many rounds even if the model keeps going
        #[arg(long, default_value_t = 50)]
        max_rounds: usize,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        #[command(flatten)]
        windowing: WindowArgs,

        #[command(flatten)]
        generation: GenerationArgs,
    },

    /// Show how a document would be split, without calling the model
    Windows {
        /// Path to the PDF or DOCX file
        file_path: PathBuf,

        /// Print each window's text as well
        #[arg(long)]
        show_text: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        #[command(flatten)]
        windowing: WindowArgs,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write a config file with every default spelled out
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
    /// Print the platform config file path
    Path,
}

#[derive(Args, Debug, Default)]
struct WindowArgs {
    /// Windowing strategy
    #[arg(long, value_parser = ["head-tail", "char-budget", "word-budget", "page-blocks"])]
    strategy: Option<String>,

    /// Pages read by the budget strategies
    #[arg(long, value_parser = ["all", "head-tail"])]
    select: Option<String>,

    #[arg(long)]
    head_pages: Option<usize>,

    #[arg(long)]
    tail_pages: Option<usize>,

    /// Character budget per window (char-budget)
    #[arg(long)]
    chunk_chars: Option<usize>,

    /// Word budget per window (word-budget)
    #[arg(long)]
    chunk_words: Option<usize>,

    /// Pages per window (page-blocks)
    #[arg(long)]
    block_pages: Option<usize>,

    /// Page marker template, `{n}` is the page number; empty disables
    #[arg(long)]
    page_marker: Option<String>,
}

impl WindowArgs {
    fn overlay(&self) -> WindowingConfig {
        WindowingConfig {
            strategy: self.strategy.clone(),
            select: self.select.clone(),
            head_pages: self.head_pages,
            tail_pages: self.tail_pages,
            chunk_chars: self.chunk_chars,
            chunk_words: self.chunk_words,
            block_pages: self.block_pages,
            page_marker: self.page_marker.clone(),
        }
    }
}

#[derive(Args, Debug, Default)]
struct GenerationArgs {
    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    max_output_tokens: Option<u32>,

    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Whether earlier rounds are resent
    #[arg(long, value_parser = ["stateless", "conversational"])]
    context_mode: Option<String>,

    /// Send one window per round, or the whole text every round
    #[arg(long, value_parser = ["queue", "whole"])]
    dispatch: Option<String>,

    /// How the end of generation is detected
    #[arg(long, value_parser = ["exhaustion", "marker", "structural"])]
    signal: Option<String>,

    /// File holding a replacement system prompt
    #[arg(long)]
    prompt: Option<PathBuf>,
}

impl GenerationArgs {
    fn overlay(&self) -> (CompletionConfig, GenerationConfig) {
        (
            CompletionConfig {
                api_key: None,
                base_url: self.base_url.clone(),
                model: self.model.clone(),
                temperature: None,
                max_output_tokens: self.max_output_tokens,
                timeout_secs: self.timeout_secs,
            },
            GenerationConfig {
                context_mode: self.context_mode.clone(),
                dispatch: self.dispatch.clone(),
                signal: self.signal.clone(),
                prompt_path: self.prompt.as_ref().map(|p| p.display().to_string()),
                ..Default::default()
            },
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Generate {
            file_path,
            output,
            api_key,
            step,
            max_rounds,
            no_color,
            windowing,
            generation,
        } => {
            let (completion, generation) = generation.overlay();
            let overlay = ConfigFile {
                completion: Some(completion),
                windowing: Some(windowing.overlay()),
                generation: Some(generation),
            };
            generate(file_path, output, api_key, step, max_rounds, no_color, overlay).await
        }
        Command::Windows {
            file_path,
            show_text,
            no_color,
            windowing,
        } => {
            let overlay = ConfigFile {
                windowing: Some(windowing.overlay()),
                ..Default::default()
            };
            list_windows(&file_path, show_text, no_color, overlay)
        }
        Command::Config { action } => config_command(action),
    }
}

fn load(file_path: &Path) -> anyhow::Result<tocgen_core::Document> {
    if !file_path.exists() {
        anyhow::bail!("File not found: {}", file_path.display());
    }
    Ok(tocgen_ingest::load_document(file_path)?)
}

async fn generate(
    file_path: PathBuf,
    output: Option<PathBuf>,
    api_key: Option<String>,
    step: bool,
    max_rounds: usize,
    no_color: bool,
    overlay: ConfigFile,
) -> anyhow::Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};

    // Resolve configuration: CLI flags > config files > env vars > defaults
    let config = config_file::merge(config_file::load_config(), overlay);
    let api_key = config_file::resolve_api_key(api_key, &config)?;
    let window_settings = config_file::resolve_window_settings(&config)?;
    let settings = config_file::resolve_generation_settings(&config)?;
    let client = config_file::build_client(&config, api_key);

    let color = ColorMode(!no_color);
    let mut err = std::io::stderr();

    let document = load(&file_path)?;
    let mut store = SessionStore::new();
    store.submit(document.name(), &settings.separator, || {
        window(
            &document,
            &window_settings.strategy,
            window_settings.page_marker.as_deref(),
        )
    })?;
    let Some(session) = store.session() else {
        anyhow::bail!("document produced no session");
    };
    output::print_window_summary(
        &mut err,
        document.name(),
        &window_settings.strategy,
        session.windows(),
        color,
    )?;

    let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")?;

    loop {
        let (round, remaining) = store
            .session()
            .map(|s| (s.rounds() + 1, s.remaining()))
            .unwrap_or_default();
        if round > max_rounds {
            output::print_error(
                &mut err,
                &format!("stopping after {max_rounds} rounds; the table may be incomplete"),
                color,
            )?;
            break;
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(spinner_style.clone());
        spinner.set_message(format!(
            "Round {round}: waiting for the model ({remaining} window(s) left)"
        ));
        spinner.enable_steady_tick(Duration::from_millis(120));
        let result = advance(&mut store, &client, &settings).await;
        spinner.finish_and_clear();

        match result {
            Ok(report) => {
                output::print_round(&mut err, &report, color)?;
                if report.phase.is_complete() {
                    break;
                }
                if step && !confirm("Generate the next part?")? {
                    break;
                }
            }
            Err(AdvanceError::NothingLeft) => break,
            Err(AdvanceError::Completion(e)) => {
                output::print_error(&mut err, &e.to_string(), color)?;
                if !(step && confirm("Retry this round?")?) {
                    return Err(e.into());
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    let html = store
        .session()
        .map(|s| s.accumulator().html())
        .unwrap_or_default();
    if html.trim().is_empty() {
        anyhow::bail!("The model produced no table of contents");
    }

    match output {
        Some(path) => {
            std::fs::write(&path, &html)?;
            writeln!(err, "Saved table of contents to {}", path.display())?;
        }
        None => {
            let mut out = std::io::stdout().lock();
            writeln!(out, "{html}")?;
        }
    }
    Ok(())
}

fn confirm(question: &str) -> anyhow::Result<bool> {
    let mut err = std::io::stderr();
    write!(err, "{question} [Y/n] ")?;
    err.flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let answer = line.trim().to_lowercase();
    Ok(answer.is_empty() || answer == "y" || answer == "yes")
}

fn list_windows(
    file_path: &Path,
    show_text: bool,
    no_color: bool,
    overlay: ConfigFile,
) -> anyhow::Result<()> {
    let config = config_file::merge(config_file::load_config(), overlay);
    let window_settings = config_file::resolve_window_settings(&config)?;
    let color = ColorMode(!no_color);

    let document = load(file_path)?;
    let windows = window(
        &document,
        &window_settings.strategy,
        window_settings.page_marker.as_deref(),
    )?;

    let mut out = std::io::stdout().lock();
    output::print_window_summary(
        &mut out,
        document.name(),
        &window_settings.strategy,
        &windows,
        color,
    )?;
    output::print_window_list(&mut out, &windows, show_text, color)?;
    Ok(())
}

fn config_command(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init { force } => {
            if let Some(path) = config_file::config_path()
                && path.exists()
                && !force
            {
                anyhow::bail!(
                    "Config file already exists at {} (use --force to overwrite)",
                    path.display()
                );
            }
            let path = config_file::save_config(&config_file::default_config())?;
            println!("Wrote {}", path.display());
        }
        ConfigAction::Show => {
            let mut config = config_file::load_config();
            if let Some(key) = config
                .completion
                .as_mut()
                .and_then(|c| c.api_key.as_mut())
            {
                *key = "***".to_string();
            }
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => match config_file::config_path() {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("Could not determine config directory"),
        },
    }
    Ok(())
}
