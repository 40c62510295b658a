//! Application entry point for the audiobook converter CLI.
//!
//! # Startup sequence
//!
//! 1. Parse the command line.
//! 2. Load [`AppConfig`] (`--config` or the default settings file; defaults
//!    on first run).
//! 3. Initialise logging at `logging.level`.
//! 4. Create the [`tokio`] runtime (multi-thread).
//! 5. Run the subcommand. `convert` starts a job through [`Converter`],
//!    prints its events and reads `pause` / `resume` / `cancel` / `status`
//!    from stdin until the job ends.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use audiobook_converter::{
    config::AppConfig,
    document::SourceDocument,
    events::JobEvent,
    pipeline::{Converter, JobOutcome},
    progress::ProgressStore,
    synth::{VoiceIdentity, VOICE_PRESETS},
};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "audiobook-converter", version, about = "Convert a book into a chaptered audiobook")]
struct Cli {
    /// Settings file to use instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert (or resume converting) a document.
    Convert(ConvertArgs),
    /// List the chapters of a document.
    Chapters { document: PathBuf },
    /// Show the resumable job in an output directory.
    Status { output_dir: PathBuf },
    /// List the built-in voices.
    Voices,
}

#[derive(Debug, Args)]
struct ConvertArgs {
    /// JSON or plain-text document.
    document: PathBuf,

    #[arg(long, short)]
    output_dir: PathBuf,

    /// Chapter orders to convert, e.g. `0,2,5`. Defaults to all chapters.
    #[arg(long, value_delimiter = ',')]
    chapters: Vec<usize>,

    /// Voice preset id. Defaults to `synthesis.default_voice`.
    #[arg(long)]
    voice: Option<String>,

    /// Cover image to embed, overriding the document's own.
    #[arg(long)]
    cover: Option<PathBuf>,

    /// Print every event as one JSON line.
    #[arg(long)]
    json: bool,
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logging needs the configured level, so remember a load failure and
    // report it once the logger is up.
    let (config, load_error) = match &cli.config {
        Some(path) => (
            AppConfig::load_from(path)
                .with_context(|| format!("cannot load config {}", path.display()))?,
            None,
        ),
        None => match AppConfig::load() {
            Ok(config) => (config, None),
            Err(e) => (AppConfig::default(), Some(e)),
        },
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();
    if let Some(e) = load_error {
        log::warn!("Failed to load config ({e}); using defaults");
    }

    match cli.command {
        Command::Convert(args) => {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to create tokio runtime")?;
            let code = rt.block_on(convert(args, config));
            // The stdin reader sits on a blocking thread; don't wait for it.
            rt.shutdown_background();
            code
        }
        Command::Chapters { document } => {
            list_chapters(&document)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Status { output_dir } => {
            show_status(&output_dir)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Voices => {
            for preset in VOICE_PRESETS {
                println!("{:<18} {:<22} {}", preset.id, preset.label, preset.description);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ---------------------------------------------------------------------------
// convert
// ---------------------------------------------------------------------------

async fn convert(args: ConvertArgs, config: AppConfig) -> Result<ExitCode> {
    let mut document = SourceDocument::load(&args.document)
        .with_context(|| format!("cannot read {}", args.document.display()))?;
    if let Some(cover) = args.cover {
        document = document.with_cover(cover);
    }
    let document = Arc::new(document);
    let selection = if args.chapters.is_empty() {
        document.all_chapter_orders()
    } else {
        args.chapters
    };
    let voice_id = args
        .voice
        .unwrap_or_else(|| config.synthesis.default_voice.clone());
    let voice = VoiceIdentity::resolve(&voice_id)?;
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("cannot create {}", args.output_dir.display()))?;

    let converter = Converter::from_config(config);
    let (job_id, mut events) =
        converter.start_with_events(document, selection, voice, &args.output_dir)?;
    log::info!("cli: started {job_id}; type pause, resume, cancel or status");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => print_event(&event, args.json)?,
                None => break,
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => handle_command(&converter, line.trim())?,
                Ok(None) => stdin_open = false,
                Err(e) => {
                    log::warn!("cli: stdin closed: {e}");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!("interrupt: cancelling at the next chunk boundary");
                if let Err(e) = converter.cancel() {
                    log::warn!("cli: {e}");
                }
            }
        }
    }

    Ok(match converter.wait().await {
        Some(JobOutcome::Completed { .. }) => ExitCode::SUCCESS,
        Some(JobOutcome::Cancelled { .. }) => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    })
}

fn handle_command(converter: &Converter, line: &str) -> Result<()> {
    let result = match line {
        "" => Ok(()),
        "pause" => converter.pause(),
        "resume" => converter.resume(),
        "cancel" => converter.cancel(),
        "status" => {
            println!("{}", serde_json::to_string_pretty(&converter.status())?);
            Ok(())
        }
        other => {
            eprintln!("unknown command {other:?} (pause, resume, cancel, status)");
            Ok(())
        }
    };
    if let Err(e) = result {
        eprintln!("{e}");
    }
    Ok(())
}

fn print_event(event: &JobEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        JobEvent::Progress {
            completed,
            total,
            status_text,
            ..
        } => println!("[{completed}/{total}] {status_text}"),
        // Already mirrored to the logger by the event bus.
        JobEvent::Log { .. } => {}
        JobEvent::StateChanged { state } => println!("state: {}", state.label()),
        JobEvent::Error {
            kind,
            message,
            missing_indices,
            ..
        } => {
            eprintln!("error ({kind}): {message}");
            if !missing_indices.is_empty() {
                eprintln!("missing chunks: {missing_indices:?}");
            }
        }
        JobEvent::Completed {
            output_path,
            manifest_path,
        } => println!(
            "wrote {} (chapters: {})",
            output_path.display(),
            manifest_path.display()
        ),
        JobEvent::Cancelled { completed, total } => println!(
            "cancelled with {completed}/{total} chunks done; run the same command again to resume"
        ),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// chapters / status
// ---------------------------------------------------------------------------

fn list_chapters(path: &Path) -> Result<()> {
    let document = SourceDocument::load(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    println!("{} by {}", document.title, document.author);
    for chapter in &document.chapters {
        println!(
            "{:>4}  {:>9} bytes  {}",
            chapter.order, chapter.byte_size, chapter.title
        );
    }
    Ok(())
}

fn show_status(output_dir: &Path) -> Result<()> {
    let store = ProgressStore::at(output_dir);
    match store.summary()? {
        Some(summary) => {
            println!("{} ({})", summary.title, summary.fingerprint.short());
            println!("voice:    {}", summary.voice_id);
            println!("chapters: {:?}", summary.selected_chapters);
            println!(
                "progress: {}/{} chunks ({:.1}%)",
                summary.completed,
                summary.total,
                summary.percent()
            );
            println!("started:  {}", summary.started_at);
            println!("updated:  {}", summary.last_updated);
        }
        None => println!("no resumable job in {}", output_dir.display()),
    }
    Ok(())
}
