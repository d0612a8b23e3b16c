//! BitBot CLI
//!
//! Entry point for the `bitbot` command-line tool.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bitbot::cipher::{
    decrypt_with_report, encrypt, patch_blob, CipherKey, FeatureMap, FeatureValue,
};
use bitbot::clients::{
    ArtifactRepositoryClient, ForumClient, GhCli, RedditClient, RedditCredentials, ReleaseRef,
};
use bitbot::config::{parse_override, ConfigError, ConfigProvider};
use bitbot::mock::{MockArtifacts, MockForum};
use bitbot::release::ReleaseBody;
use bitbot::state::{now_utc, ForumPostState, FORUM_STATE_FILE, LEDGER_FILE};
use bitbot::template::fill;
use bitbot::{
    BotConfig, BotError, BotResult, CommentChecker, EffectiveConfig, PatchOrchestrator,
    PublicationStateMachine, ReleaseLedger, RetryPolicy, RunSummary,
};

#[derive(Parser)]
#[command(name = "bitbot")]
#[command(about = "Release watcher, asset patcher and forum announcer", version)]
struct Cli {
    /// Config file (skipped if it does not exist)
    #[arg(long, short = 'c', global = true, default_value = "bitbot.toml")]
    config: PathBuf,

    /// State directory (overrides paths.state_dir)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Override a config value, e.g. --set retry.max_attempts=5
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Read from GitHub but write nothing: downstream releases and the
    /// forum are simulated in memory and state files are left untouched
    #[arg(long, global = true)]
    dry_run: bool,

    /// Debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover new upstream releases and queue them
    Gather,

    /// Patch and publish every queued release
    Release,

    /// Announce catalog changes on the forum
    Post,

    /// Read feedback on the active post and update its status line
    Check,

    /// gather, release and post in one go
    Run,

    /// Unlock a local asset file
    Patch {
        input: PathBuf,

        /// Output path (default: <input>.patched)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Print the features in a local asset file
    Decrypt {
        input: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Encode a JSON object of string and boolean values as an asset file
    Encrypt {
        input: PathBuf,

        /// Output path (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration with secrets redacted
    Config,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Gather => "gather",
            Commands::Release => "release",
            Commands::Post => "post",
            Commands::Check => "check",
            Commands::Run => "run",
            Commands::Patch { .. } => "patch",
            Commands::Decrypt { .. } => "decrypt",
            Commands::Encrypt { .. } => "encrypt",
            Commands::Config => "config",
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match load_config(&cli) {
        Ok(effective) => match &cli.command {
            Commands::Patch { input, output } => {
                exit_code(run_patch(&effective.settings, input, output.as_deref()))
            }
            Commands::Decrypt { input, json } => {
                exit_code(run_decrypt(&effective.settings, input, *json))
            }
            Commands::Encrypt { input, output } => {
                exit_code(run_encrypt(&effective.settings, input, output.as_deref()))
            }
            Commands::Config => exit_code(run_config(&effective)),
            command => run_remote(&cli, command, &effective.settings),
        },
        Err(e) => {
            error!("Configuration error: {}", e);
            BotError::Config(e).exit_code()
        }
    };

    process::exit(code);
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "bitbot=debug" } else { "bitbot=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<EffectiveConfig, ConfigError> {
    let overrides = cli
        .overrides
        .iter()
        .map(|raw| {
            parse_override(raw).ok_or_else(|| {
                ConfigError::ParseError(format!("invalid --set value {:?}, expected KEY=VALUE", raw))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut effective = EffectiveConfig::build(Some(&cli.config), overrides)?;
    if let Some(dir) = &cli.state_dir {
        effective.settings.paths.state_dir = dir.clone();
    }
    Ok(effective)
}

fn exit_code(result: BotResult<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("{}", e);
            e.exit_code()
        }
    }
}

/// Commands that talk to GitHub and the forum. Always leave a summary.
fn run_remote(cli: &Cli, command: &Commands, config: &BotConfig) -> i32 {
    let started = Instant::now();
    let mut summary = RunSummary::new(command.name(), cli.dry_run);

    let result = execute(command, config, cli.dry_run, &mut summary);
    summary.finish(result.as_ref().err(), started.elapsed().as_millis() as u64);

    match summary.exit_code {
        0 => info!(run_id = %summary.run_id, "{}", summary.human_summary),
        1 => warn!(run_id = %summary.run_id, "{}", summary.human_summary),
        _ => error!(run_id = %summary.run_id, "{}", summary.human_summary),
    }

    if !cli.dry_run {
        if let Err(e) = summary.write_to_dir(&config.paths.state_dir) {
            warn!(error = %e, "failed to write run summary");
        }
    }
    summary.exit_code
}

fn execute(
    command: &Commands,
    config: &BotConfig,
    dry_run: bool,
    summary: &mut RunSummary,
) -> BotResult<()> {
    config.require_remote()?;
    let retry = RetryPolicy::from_settings(&config.retry);
    let state_dir = &config.paths.state_dir;

    let mut ledger = ReleaseLedger::open(&state_dir.join(LEDGER_FILE))?;
    let mut forum_state = ForumPostState::open(&state_dir.join(FORUM_STATE_FILE))?;
    if dry_run {
        ledger = ledger.detached();
        forum_state = forum_state.detached();
    }

    let gh = GhCli::new(config.timeouts.call());
    let simulated_artifacts = MockArtifacts::new();
    let artifacts: &dyn ArtifactRepositoryClient = if dry_run {
        seed_artifacts(&simulated_artifacts, config, &ledger);
        &simulated_artifacts
    } else {
        &gh
    };

    let gather = matches!(command, Commands::Gather | Commands::Run);
    let release = matches!(command, Commands::Release | Commands::Run);
    let post = matches!(command, Commands::Post | Commands::Run);

    if gather || release {
        let orchestrator = PatchOrchestrator::new(config, &gh, artifacts, retry.clone())?;
        if gather {
            summary.record_discovery(orchestrator.discover(&mut ledger)?);
        }
        if release {
            summary.record_processing(orchestrator.process_pending(&mut ledger)?);
        }
    }

    if post {
        let forum = forum_client(config, dry_run, &forum_state)?;
        let machine = PublicationStateMachine::new(config, forum.as_ref(), retry.clone());
        summary.record_publication(machine.publish(ledger.catalog(), &mut forum_state, now_utc())?);
    }

    if matches!(command, Commands::Check) {
        let forum = forum_client(config, dry_run, &forum_state)?;
        let checker = CommentChecker::new(config, forum.as_ref(), retry);
        summary.record_feedback(checker.check(&mut forum_state, now_utc())?);
    }

    Ok(())
}

/// Reddit, or an in-memory forum holding the known posts for dry runs.
fn forum_client(
    config: &BotConfig,
    dry_run: bool,
    state: &ForumPostState,
) -> BotResult<Box<dyn ForumClient>> {
    if dry_run {
        let forum = MockForum::new();
        for post_id in &state.post_history {
            forum.seed_post(post_id, "");
        }
        return Ok(Box::new(forum));
    }
    let credentials = RedditCredentials::from_env()?;
    let client = RedditClient::new(credentials, &config.reddit.user_agent, config.timeouts.call())?;
    Ok(Box::new(client))
}

fn seed_artifacts(artifacts: &MockArtifacts, config: &BotConfig, ledger: &ReleaseLedger) {
    for (app_id, entry) in ledger.catalog() {
        let notes = ReleaseBody {
            app: app_id.clone(),
            version: entry.version.clone(),
            asset_name: None,
            sha256: Some(entry.sha256.clone()),
        }
        .to_string();
        let title = fill(
            &config.release.title_format,
            &[
                ("app_id", app_id.as_str()),
                ("display_name", entry.display_name.as_str()),
                ("version", entry.version.as_str()),
            ],
        );
        artifacts.seed(
            ReleaseRef {
                tag: entry.tag.clone(),
                title,
                url: entry.url.clone(),
                notes,
            },
            &config.github.asset_file_name,
            Vec::new(),
        );
    }
}

fn cipher_key(config: &BotConfig) -> BotResult<CipherKey> {
    Ok(CipherKey::derive(config.cipher_key())?)
}

fn run_patch(config: &BotConfig, input: &Path, output: Option<&Path>) -> BotResult<()> {
    let key = cipher_key(config)?;
    let raw = fs::read(input)?;
    let (patched, unlocked) = patch_blob(&String::from_utf8_lossy(&raw), &key)?;

    let output = match output {
        Some(path) => path.to_path_buf(),
        None => {
            let mut name = input.as_os_str().to_owned();
            name.push(".patched");
            PathBuf::from(name)
        }
    };
    fs::write(&output, patched)?;
    println!("Unlocked {} feature(s): {}", unlocked, output.display());
    Ok(())
}

fn run_decrypt(config: &BotConfig, input: &Path, json: bool) -> BotResult<()> {
    let key = cipher_key(config)?;
    let raw = fs::read(input)?;
    let report = decrypt_with_report(&String::from_utf8_lossy(&raw), &key)?;
    if report.skipped > 0 {
        warn!(skipped = report.skipped, "skipped malformed lines");
    }

    if json {
        let rendered = serde_json::to_string_pretty(&report.features)
            .map_err(|e| BotError::Parse(format!("serializing features: {}", e)))?;
        println!("{}", rendered);
    } else {
        for (name, value) in report.features.iter() {
            match value {
                FeatureValue::Bool(b) => println!("{} = {}", name, b),
                FeatureValue::Text(s) => println!("{} = {:?}", name, s),
            }
        }
    }
    Ok(())
}

fn run_encrypt(config: &BotConfig, input: &Path, output: Option<&Path>) -> BotResult<()> {
    let key = cipher_key(config)?;
    let text = fs::read_to_string(input)?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| BotError::Parse(format!("{}: {}", input.display(), e)))?;
    let features = FeatureMap::from_json(&value)?;
    let encoded = encrypt(&features, &key)?;

    match output {
        Some(path) => {
            fs::write(path, &encoded)?;
            println!("Encoded {} feature(s): {}", features.len(), path.display());
        }
        None => println!("{}", encoded),
    }
    Ok(())
}

fn run_config(effective: &EffectiveConfig) -> BotResult<()> {
    let rendered = effective
        .to_json()
        .map_err(|e| BotError::Config(ConfigError::ParseError(e.to_string())))?;
    println!("{}", rendered);
    Ok(())
}
