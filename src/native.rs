//! Native command-line client.
//!
//! Each subcommand builds a full [`Imgenie`] session against the server, so
//! the CLI goes through the same coordinators, preconditions and config
//! persistence as the browser.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use async_trait::async_trait;
use base64::Engine as _;
use clap::{Args, Parser, Subcommand};

use crate::Imgenie;
use crate::api::HttpApi;
use crate::config::{ClientSettings, ConfigStore, FileStore, LogLevel, MemoryStore};
use crate::constants::{DEFAULT_API_BASE, DEFAULT_LORA_WEIGHT, DEFAULT_REQUEST_TIMEOUT};
use crate::context::Context;
use crate::presenter::LogPresenter;
use crate::scheduler::Timer;
use crate::types::{GenerationResult, ImageAttachment, LoraSlotId, Task};

#[derive(Parser)]
#[command(name = "imgenie", about = "Client for an imgenie image generation server")]
#[command(version)]
pub struct Cli {
    /// API base URL
    #[arg(long, global = true, default_value = DEFAULT_API_BASE)]
    pub api: String,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    pub timeout: u64,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_verbosity(self.verbose)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show server health and loaded models
    Status,
    /// List models for a task
    Models(TaskArgs),
    /// Load a model on the server
    Load(LoadArgs),
    /// Unload the model for a task
    Unload(TaskArgs),
    /// Generate an image from a prompt
    Generate(GenerateArgs),
    /// Describe an image
    Describe(DescribeArgs),
    /// Delete a generated image on the server
    Delete(DeleteArgs),
}

#[derive(Args)]
pub struct TaskArgs {
    /// text-to-image or image-to-text
    #[arg(long, default_value = "text-to-image")]
    pub task: Task,
}

#[derive(Args)]
pub struct LoadArgs {
    /// Model id
    pub model: String,

    /// text-to-image or image-to-text
    #[arg(long, default_value = "text-to-image")]
    pub task: Task,
}

#[derive(Args)]
pub struct GenerateArgs {
    /// Prompt (defaults to the last saved prompt)
    pub prompt: Option<String>,

    /// Model id (defaults to the saved or loaded model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Load the model first if it isn't loaded
    #[arg(long)]
    pub load: bool,

    /// Reference image for image-to-image
    #[arg(short, long)]
    pub reference: Option<PathBuf>,

    /// How strongly the reference image is transformed (0-1)
    #[arg(long)]
    pub strength: Option<f32>,

    #[arg(long)]
    pub steps: Option<u32>,

    #[arg(long)]
    pub guidance: Option<f32>,

    /// WIDTHxHEIGHT
    #[arg(long)]
    pub resolution: Option<String>,

    /// Seed (-1 for random)
    #[arg(long, allow_hyphen_values = true)]
    pub seed: Option<i64>,

    /// Use a prompt preset instead of a prompt
    #[arg(long, conflicts_with = "prompt")]
    pub preset: Option<String>,

    /// Character LoRA as NAME[:WEIGHT] (up to two)
    #[arg(long, value_parser = parse_lora)]
    pub character: Vec<(String, f32)>,

    /// Concept LoRA as NAME[:WEIGHT]
    #[arg(long, value_parser = parse_lora)]
    pub concept: Option<(String, f32)>,

    /// Where to write the image
    #[arg(short, long, default_value = "imgenie.png")]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct DescribeArgs {
    /// Image to describe
    pub image: PathBuf,

    /// Model id
    #[arg(short, long)]
    pub model: Option<String>,

    /// Load the model first if it isn't loaded
    #[arg(long)]
    pub load: bool,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Image id returned by a previous generation
    pub image_id: String,
}

fn parse_lora(value: &str) -> Result<(String, f32), String> {
    let (name, weight) = match value.rsplit_once(':') {
        Some((name, weight)) => {
            let weight = weight
                .parse::<f32>()
                .map_err(|e| format!("invalid weight '{}': {}", weight, e))?;
            (name, weight)
        }
        None => (value, DEFAULT_LORA_WEIGHT),
    };
    if name.trim().is_empty() {
        return Err("LoRA name is empty".to_string());
    }
    Ok((name.trim().to_string(), weight))
}

/// Timer backed by the tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

#[async_trait(?Send)]
impl Timer for TokioTimer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Initialize env_logger. `RUST_LOG` still overrides per module.
pub fn init_logging(level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(level.to_level_filter())
        .parse_default_env()
        .init();
}

fn open_store(path: Option<&Path>) -> Rc<dyn ConfigStore> {
    if let Some(path) = path {
        return Rc::new(FileStore::new(path));
    }
    match FileStore::at_default_path() {
        Some(store) => {
            log::debug!("Using config file {:?}", store.path());
            Rc::new(store)
        }
        None => {
            log::warn!("No config directory found; settings will not be saved");
            Rc::new(MemoryStore::new())
        }
    }
}

fn build(cli: &Cli) -> Result<Imgenie> {
    let mut settings = ClientSettings::default()
        .with_api_base(cli.api.as_str())
        .with_log_level(cli.log_level());
    settings.request_timeout = Duration::from_secs(cli.timeout);

    let api = HttpApi::new(&settings).context("Invalid API URL")?;
    let ctx = Context::new(
        Rc::new(api),
        Rc::new(LogPresenter),
        Rc::new(TokioTimer),
        open_store(cli.config.as_deref()),
        settings,
    );
    Ok(Imgenie::new(ctx))
}

fn read_image(path: &Path) -> Result<ImageAttachment> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.png".to_string());
    Ok(ImageAttachment::new(filename, bytes))
}

/// Decode a `data:<mime>;base64,<payload>` image reference.
fn decode_image_ref(image_ref: &str) -> Result<Vec<u8>> {
    let (_, payload) = image_ref
        .split_once("base64,")
        .context("Server did not return a base64 data URL")?;
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .context("Invalid base64 image data")
}

/// Make sure the model for the session's task is selected and loaded.
async fn ensure_model(app: &Imgenie, model: Option<&str>, load: bool) -> Result<()> {
    let lifecycle = app.lifecycle();
    let (task, selected, loaded) = app.context().read(|state| {
        (
            state.current_task,
            state.selected_model_id.clone(),
            state.model_loaded,
        )
    });
    let wanted = model.map_or_else(|| selected.clone(), str::to_string);

    if loaded && wanted == selected {
        return Ok(());
    }
    if load {
        lifecycle.load_model(&wanted, task).await?;
    } else if wanted != selected {
        lifecycle.select_model(&wanted).await?;
        lifecycle.poll_status().await;
    }

    if !app.context().read(|state| state.model_loaded && state.selected_model_id == wanted) {
        bail!(
            "Model '{}' is not loaded (run `imgenie load {}` or pass --load)",
            wanted,
            wanted
        );
    }
    Ok(())
}

async fn run_generation(app: &Imgenie) -> Result<GenerationResult> {
    let generation = app.generation();
    let ticket = generation.begin()?;
    generation
        .run(ticket)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))
}

async fn status(app: &Imgenie) -> Result<()> {
    let api = &app.context().api;
    let health = api.health().await.context("Server unreachable")?;
    let status = api.status().await?;

    println!("Server:        {} ({})", app.context().settings.api_base, health.status);
    for task in [Task::TextToImage, Task::ImageToText] {
        let (loaded, model) = status.for_task(task);
        let model = if loaded { model.unwrap_or("?") } else { "-" };
        println!("{:<14} {}", format!("{}:", task.name()), model);
    }
    if let Some(usage) = status.usage {
        println!("Usage:         {:.1} / {:.1}", usage.used, usage.max);
    }
    Ok(())
}

async fn models(app: &Imgenie, task: Task) -> Result<()> {
    app.start_with_task(task).await;
    let (models, selected, loaded) = app.context().read(|state| {
        (
            state.available_models.clone(),
            state.selected_model_id.clone(),
            state.model_loaded,
        )
    });
    if models.is_empty() {
        println!("No models available for {}", task);
        return Ok(());
    }
    for model in models {
        let marker = match (model.id == selected, loaded) {
            (true, true) => "*",
            (true, false) => ">",
            _ => " ",
        };
        println!("{} {:<24} {}", marker, model.id, model.display_name());
        if let Some(description) = model.description.as_deref().filter(|d| !d.is_empty()) {
            println!("  {:<24} {}", "", description);
        }
    }
    Ok(())
}

async fn generate(app: &Imgenie, args: &GenerateArgs) -> Result<()> {
    app.start_with_task(Task::TextToImage).await;
    ensure_model(app, args.model.as_deref(), args.load).await?;

    let generation = app.generation();
    if let Some(preset) = &args.preset {
        generation.apply_prompt_preset(preset)?;
    }
    if let Some(prompt) = &args.prompt {
        generation.set_prompt(prompt);
    }
    if let Some(steps) = args.steps {
        generation.set_steps(steps);
    }
    if let Some(guidance) = args.guidance {
        generation.set_guidance_scale(guidance);
    }
    if let Some(strength) = args.strength {
        generation.set_strength(strength);
    }
    if let Some(resolution) = &args.resolution {
        generation.set_resolution(resolution)?;
    }
    if let Some(seed) = args.seed {
        generation.set_seed(seed);
    }
    if !args.character.is_empty() || args.concept.is_some() {
        generation.clear_loras();
        for (i, (name, weight)) in args.character.iter().enumerate() {
            generation.set_lora(LoraSlotId::Character(i), name, *weight)?;
        }
        if let Some((name, weight)) = &args.concept {
            generation.set_lora(LoraSlotId::Concept, name, *weight)?;
        }
    }
    match &args.reference {
        Some(path) => generation.attach_reference_image(read_image(path)?)?,
        None => generation.clear_reference_image(),
    }

    match run_generation(app).await? {
        GenerationResult::Image {
            image_ref,
            image_id,
            ..
        } => {
            let bytes = decode_image_ref(&image_ref)?;
            std::fs::write(&args.output, &bytes)
                .with_context(|| format!("Failed to write {:?}", args.output))?;
            println!("Wrote {}", args.output.display());
            if let Some(id) = image_id {
                println!("Image id: {}", id);
            }
        }
        GenerationResult::Description { text } => println!("{}", text),
    }
    Ok(())
}

async fn describe(app: &Imgenie, args: &DescribeArgs) -> Result<()> {
    app.start_with_task(Task::ImageToText).await;
    ensure_model(app, args.model.as_deref(), args.load).await?;
    app.generation()
        .attach_source_image(read_image(&args.image)?)?;

    match run_generation(app).await? {
        GenerationResult::Description { text } => println!("{}", text),
        GenerationResult::Image { .. } => bail!("Server returned an image instead of a description"),
    }
    Ok(())
}

/// Run one CLI command to completion.
pub async fn run(cli: Cli) -> Result<()> {
    let app = build(&cli)?;

    match &cli.command {
        Commands::Status => status(&app).await,
        Commands::Models(args) => models(&app, args.task).await,
        Commands::Load(args) => {
            app.start_with_task(args.task).await;
            app.lifecycle().load_model(&args.model, args.task).await?;
            if !app.context().read(|state| state.model_loaded) {
                bail!("Failed to load {}", args.model);
            }
            println!("Loaded {}", args.model);
            Ok(())
        }
        Commands::Unload(args) => {
            app.lifecycle()
                .unload_model(args.task)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("Unloaded {} model", args.task);
            Ok(())
        }
        Commands::Generate(args) => generate(&app, args).await,
        Commands::Describe(args) => describe(&app, args).await,
        Commands::Delete(args) => {
            app.context()
                .api
                .delete_image(&args.image_id)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("Deleted {}", args.image_id);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lora() {
        assert_eq!(parse_lora("captain"), Ok(("captain".to_string(), 1.0)));
        assert_eq!(parse_lora("ink:0.35"), Ok(("ink".to_string(), 0.35)));
        assert!(parse_lora("ink:heavy").is_err());
        assert!(parse_lora(":0.5").is_err());
    }

    #[test]
    fn test_decode_image_ref() {
        assert_eq!(
            decode_image_ref("data:image/png;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
        assert!(decode_image_ref("/images/out.png").is_err());
    }

    #[test]
    fn test_cli_parses_generate_flags() {
        let cli = Cli::try_parse_from([
            "imgenie",
            "-v",
            "generate",
            "a fox",
            "--seed",
            "-1",
            "--character",
            "alice:0.5",
            "--character",
            "bob",
            "--concept",
            "ink",
        ])
        .unwrap();
        assert_eq!(cli.log_level(), LogLevel::Debug);
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.prompt.as_deref(), Some("a fox"));
        assert_eq!(args.seed, Some(-1));
        assert_eq!(args.character.len(), 2);
        assert_eq!(args.concept, Some(("ink".to_string(), 1.0)));
    }

    #[test]
    fn test_cli_task_names() {
        let cli = Cli::try_parse_from(["imgenie", "models", "--task", "i2t"]).unwrap();
        assert!(matches!(cli.command, Commands::Models(TaskArgs { task: Task::ImageToText })));
    }
}
