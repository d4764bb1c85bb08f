mod chat;
mod http;

use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use stipple_contracts::tasks::TaskRequest;
use stipple_engine::{load_dotenv, Gateway, GatewayConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "stipple",
    version,
    about = "Prompt and voice driven gateway to the Stability image API"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP gateway.
    Serve(ServeArgs),
    /// Generate one image and print its path.
    Generate(GenerateArgs),
    /// Apply one edit task to an existing image and print the new path.
    Modify(ModifyArgs),
    /// Interactive session over the same dispatcher.
    Chat(ChatArgs),
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Overrides STIPPLE_IMAGE_DIR.
    #[arg(long)]
    image_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Overrides STIPPLE_BIND.
    #[arg(long)]
    bind: Option<String>,
    /// Overrides STIPPLE_WEB_ROOT.
    #[arg(long)]
    web_root: Option<PathBuf>,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Args)]
struct ModifyArgs {
    #[arg(long)]
    task: String,
    /// Source image; becomes the session's current image before the edit.
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    search_prompt: Option<String>,
    #[arg(long)]
    new_prompt: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    left: Option<i64>,
    #[arg(long, allow_hyphen_values = true)]
    down: Option<i64>,
    #[arg(long)]
    background_prompt: Option<String>,
    #[command(flatten)]
    output: OutputArgs,
}

impl ModifyArgs {
    fn task_request(&self) -> TaskRequest {
        TaskRequest {
            task: Some(self.task.clone()),
            prompt: self.prompt.clone(),
            search_prompt: self.search_prompt.clone(),
            new_prompt: self.new_prompt.clone(),
            left: self.left,
            down: self.down,
            background_prompt: self.background_prompt.clone(),
        }
    }
}

#[derive(Debug, Args)]
struct ChatArgs {
    #[command(flatten)]
    output: OutputArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("stipple error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    load_dotenv();
    init_tracing();
    let config = GatewayConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Command::Serve(args) => run_serve(args, config),
        Command::Generate(args) => run_generate(args, config),
        Command::Modify(args) => run_modify(args, config),
        Command::Chat(args) => run_chat(args, config),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn apply_output(config: GatewayConfig, output: &OutputArgs) -> GatewayConfig {
    match &output.image_dir {
        Some(dir) => config.with_image_dir(dir),
        None => config,
    }
}

fn build_gateway(config: &GatewayConfig) -> Result<Gateway> {
    Gateway::from_config(config).context("failed to initialise gateway")
}

fn run_serve(args: ServeArgs, config: GatewayConfig) -> Result<i32> {
    let mut config = apply_output(config, &args.output);
    if let Some(bind) = args.bind {
        config = config.with_bind(bind);
    }
    if let Some(web_root) = args.web_root {
        config = config.with_web_root(web_root);
    }

    // The blocking HTTP clients are created, and finally dropped, outside the async runtime.
    let gateway = build_gateway(&config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(http::server::start_server(gateway.clone(), &config))?;
    drop(runtime);
    drop(gateway);
    Ok(0)
}

fn run_generate(args: GenerateArgs, config: GatewayConfig) -> Result<i32> {
    let config = apply_output(config, &args.output);
    let gateway = build_gateway(&config)?;
    let path = gateway.dispatcher.generate(&args.prompt)?;
    println!("{}", path.display());
    Ok(0)
}

fn run_modify(args: ModifyArgs, config: GatewayConfig) -> Result<i32> {
    if !args.image.is_file() {
        bail!("source image not found: {}", args.image.display());
    }
    let config = apply_output(config, &args.output);
    let gateway = build_gateway(&config)?;
    gateway.dispatcher.set_current_image(&args.image);
    let path = gateway.dispatcher.modify(&args.task_request())?;
    println!("{}", path.display());
    Ok(0)
}

fn run_chat(args: ChatArgs, config: GatewayConfig) -> Result<i32> {
    let config = apply_output(config, &args.output);
    let gateway = build_gateway(&config)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    chat::run_chat(&gateway.dispatcher, stdin.lock(), &mut stdout)?;
    Ok(0)
}
