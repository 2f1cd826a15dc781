use anyhow::Context;
use clap::{Parser, Subcommand};
use jarvis_wake::config::DEFAULT_SETTINGS_PATH;
use jarvis_wake::console::ConsoleSource;
use jarvis_wake::session::{EngineCommand, run_engine};
use jarvis_wake::{AlwaysGranted, ConfigPatch, EngineNotice, TomlFileStore, WakeWordEngine};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jarvis")]
struct Cli {
    /// Settings file (created on first change)
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_PATH)]
    settings: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for wake phrases in transcript lines read from stdin (default)
    Listen,
    /// Manage wake phrases
    Phrases {
        #[command(subcommand)]
        action: PhraseAction,
    },
    /// Show or change engine config
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum PhraseAction {
    List,
    Add { phrase: String },
    Remove { phrase: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Set {
        /// Minimum transcript confidence (0.0-1.0)
        #[arg(long)]
        threshold: Option<f64>,
        /// Fuzzy similarity needed to match (0.0-1.0)
        #[arg(long)]
        sensitivity: Option<f64>,
        #[arg(long)]
        cooldown_ms: Option<u64>,
        #[arg(long)]
        background: Option<bool>,
    },
}

#[hotpath::main]
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = TomlFileStore::new(&cli.settings);

    match cli.command.unwrap_or(Command::Listen) {
        Command::Listen => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(listen(store)),
        Command::Phrases { action } => run_phrases(store, action),
        Command::Config { action } => run_config(store, action),
    }
}

async fn listen(store: TomlFileStore) -> anyhow::Result<()> {
    let (event_tx, event_rx) = flume::unbounded();
    let (cmd_tx, cmd_rx) = flume::unbounded();

    let source = ConsoleSource::new(event_tx);
    let _reader = source.spawn_reader(cmd_tx.clone());

    let mut engine = WakeWordEngine::new(source, AlwaysGranted, store);
    engine.on_activation(|event| {
        println!(
            "Wake word activated: \"{}\" ({:?} match) <- \"{}\"",
            event.matched_phrase, event.kind, event.transcript
        );
    });
    engine.on_notice(|notice| match notice {
        EngineNotice::PermissionDenied(reason) => {
            eprintln!("Microphone access is required for wake word detection ({})", reason)
        }
        EngineNotice::SourceUnavailable(reason) => {
            eprintln!("Wake word detection unavailable: {}", reason)
        }
        EngineNotice::Activated => eprintln!("Wake word detection active"),
        other => tracing::debug!("Notice: {:?}", other),
    });

    let ctrlc_tx = cmd_tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(EngineCommand::Shutdown);
    })
    .context("failed to install Ctrl+C handler")?;

    println!(
        "Say something (type a transcript per line, \"0.6|text\" sets confidence, \"!no-speech\" ends the session)"
    );
    cmd_tx.send(EngineCommand::Activate)?;
    drop(cmd_tx);

    let engine = run_engine(engine, cmd_rx, event_rx).await;
    tracing::info!("Stopped in {} state", engine.state());
    Ok(())
}

fn offline_engine(store: TomlFileStore) -> WakeWordEngine<ConsoleSource, AlwaysGranted> {
    let (event_tx, _) = flume::unbounded();
    WakeWordEngine::new(ConsoleSource::new(event_tx), AlwaysGranted, store)
}

fn run_phrases(store: TomlFileStore, action: PhraseAction) -> anyhow::Result<()> {
    let mut engine = offline_engine(store);
    match action {
        PhraseAction::List => {
            for phrase in engine.wake_phrases().iter() {
                println!("{}", phrase);
            }
        }
        PhraseAction::Add { phrase } => {
            if engine.add_wake_phrase(&phrase)? {
                println!("Added \"{}\"", phrase.trim().to_lowercase());
            } else {
                println!("Already configured");
            }
        }
        PhraseAction::Remove { phrase } => {
            if engine.remove_wake_phrase(&phrase)? {
                println!("Removed \"{}\"", phrase.trim().to_lowercase());
            } else {
                println!("Not configured");
            }
        }
    }
    Ok(())
}

fn run_config(store: TomlFileStore, action: ConfigAction) -> anyhow::Result<()> {
    let path = store.path().to_path_buf();
    let mut engine = offline_engine(store);
    match action {
        ConfigAction::Show => {}
        ConfigAction::Set {
            threshold,
            sensitivity,
            cooldown_ms,
            background,
        } => {
            let patch = ConfigPatch {
                confidence_threshold: threshold,
                fuzzy_sensitivity: sensitivity,
                cooldown_ms,
                background_mode: background,
            };
            if patch.is_empty() {
                anyhow::bail!("nothing to set");
            }
            engine
                .update_config(patch)
                .with_context(|| format!("updating {}", path.display()))?;
        }
    }
    print!("{}", engine.settings().to_toml()?);
    Ok(())
}
