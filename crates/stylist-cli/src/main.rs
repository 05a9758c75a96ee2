use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use stylist_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use stylist_contracts::events::EventWriter;
use stylist_contracts::{ColorTheme, RecordStatus, Style};
use stylist_engine::{default_capability_registry, ApplyOutcome, StylistConfig, Studio};

#[derive(Debug, Parser)]
#[command(name = "stylist-rs", version, about = "Virtual stylist: three outfits from one item")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat(ChatArgs),
    Run(RunArgs),
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("stylist-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = StylistConfig::from_env();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args, config)?;
            Ok(0)
        }
        Command::Run(args) => run_run(args, config),
    }
}

fn build_studio(
    mut config: StylistConfig,
    out: &Path,
    events: Option<&Path>,
    provider: Option<&str>,
    image_model: Option<&str>,
) -> Result<Studio> {
    if let Some(model) = image_model.map(str::trim).filter(|model| !model.is_empty()) {
        config.image_model = model.to_string();
    }
    let provider = provider
        .map(str::trim)
        .filter(|provider| !provider.is_empty())
        .unwrap_or(config.provider.as_str())
        .to_string();
    let capabilities = default_capability_registry(&config);
    let Some(capability) = capabilities.get(&provider) else {
        bail!(
            "unknown provider '{provider}' (available: {})",
            capabilities.names().join(", ")
        );
    };

    fs::create_dir_all(out).with_context(|| format!("failed to create {}", out.display()))?;
    let events_path = events
        .map(Path::to_path_buf)
        .unwrap_or_else(|| out.join("events.jsonl"));
    let session_id = uuid::Uuid::new_v4().to_string();
    Studio::new(capability, EventWriter::new(events_path, session_id))
}

fn run_run(args: RunArgs, config: StylistConfig) -> Result<i32> {
    let mut studio = build_studio(
        config,
        &args.out,
        args.events.as_deref(),
        args.provider.as_deref(),
        args.image_model.as_deref(),
    )?;
    if let Some(advisory) = studio.upload_path(&args.image)? {
        eprintln!("{advisory}");
    }
    studio.wait_idle()?;

    let mut all_ready = true;
    let mut rows = Vec::new();
    for record in studio.snapshot()? {
        let mut row = record.summary();
        if record.is_ready() {
            let path = studio.download(Some(record.style), &args.out)?;
            println!("{}: {}", record.style.label(), path.display());
            row.insert("path".to_string(), json!(path.to_string_lossy()));
        } else {
            all_ready = false;
            println!(
                "{}: {}",
                record.style.label(),
                record.error_message.as_deref().unwrap_or("not generated")
            );
        }
        rows.push(Value::Object(row));
    }

    let summary_path = args.out.join("results.json");
    fs::write(
        &summary_path,
        serde_json::to_string_pretty(&json!({
            "session_id": studio.events().session_id(),
            "results": rows,
        }))?,
    )
    .with_context(|| format!("failed to write {}", summary_path.display()))?;

    Ok(if all_ready { 0 } else { 2 })
}

fn run_chat(args: ChatArgs, config: StylistConfig) -> Result<()> {
    let mut studio = build_studio(
        config,
        &args.out,
        args.events.as_deref(),
        args.provider.as_deref(),
        args.image_model.as_deref(),
    )?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();
    println!("Virtual stylist started. Type /help for commands.");

    loop {
        print!("> ");
        stdout.flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        match handle_intent(&mut studio, &intent, &args.out, &mut stdout) {
            Ok(ChatFlow::Continue) => {}
            Ok(ChatFlow::Quit) => break,
            Err(err) => writeln!(stdout, "Error: {err:#}")?,
        }
    }

    studio.close_edit();
    studio.wait_idle()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatFlow {
    Continue,
    Quit,
}

fn handle_intent(
    studio: &mut Studio,
    intent: &Intent,
    out_dir: &Path,
    w: &mut impl Write,
) -> Result<ChatFlow> {
    match intent.action.as_str() {
        "noop" => {}
        "help" => {
            writeln!(w, "Commands: {}", CHAT_HELP_COMMANDS.join(" "))?;
            writeln!(
                w,
                "Styles: {}",
                Style::ALL.map(|style| style.slug()).join(", ")
            )?;
            writeln!(
                w,
                "Themes: {}",
                ColorTheme::ALL.map(|theme| theme.label()).join(", ")
            )?;
        }
        "quit" => return Ok(ChatFlow::Quit),
        "upload" => {
            let Some(path) = intent.arg_str("path") else {
                writeln!(w, "/upload requires a path")?;
                return Ok(ChatFlow::Continue);
            };
            if let Some(advisory) = studio.upload_path(Path::new(path))? {
                writeln!(w, "{advisory}")?;
            }
            writeln!(w, "Generating Casual, Business and Night Out outfits...")?;
        }
        "clear_source" => {
            studio.clear_source()?;
            writeln!(w, "Source cleared.")?;
        }
        "status" => write_status(studio, w)?,
        "retry" => {
            let style = require_style(intent, "/retry")?;
            studio.retry(style)?;
            writeln!(w, "Retrying {}...", style.label())?;
        }
        "open_edit" => {
            let style = require_style(intent, "/open")?;
            studio.open_edit(style)?;
            writeln!(w, "Editing {}. Describe a change or pick a /theme.", style.label())?;
        }
        "set_instruction" => {
            let text = intent.prompt.as_deref().unwrap_or_default();
            studio.set_instruction(text)?;
            writeln!(w, "Instruction set. Use /apply to send it.")?;
        }
        "set_theme" => {
            let Some(theme) = intent.arg_str("theme").and_then(ColorTheme::parse) else {
                writeln!(
                    w,
                    "Unknown theme. Choose one of: {}",
                    ColorTheme::ALL.map(|theme| theme.label()).join(", ")
                )?;
                return Ok(ChatFlow::Continue);
            };
            studio.apply_theme(theme)?;
            writeln!(w, "{} theme ready. Use /apply to send it.", theme.label())?;
        }
        "apply_edit" => write_apply(studio.apply_edit()?, w)?,
        "instruction" => {
            let text = intent.prompt.as_deref().unwrap_or_default();
            studio.set_instruction(text)?;
            write_apply(studio.apply_edit()?, w)?;
        }
        "close_edit" => {
            if studio.close_edit() {
                writeln!(w, "Edit session closed.")?;
            } else {
                writeln!(w, "No edit session is open.")?;
            }
        }
        "download" => {
            let (style, dir) = download_target(&intent.arg_list("args"), out_dir);
            let path = studio.download(style, &dir)?;
            writeln!(w, "Saved {}", path.display())?;
        }
        _ => {
            let command = intent.arg_str("command").unwrap_or_default();
            writeln!(w, "Unknown command /{command}. Type /help for commands.")?;
        }
    }
    Ok(ChatFlow::Continue)
}

fn require_style(intent: &Intent, command: &str) -> Result<Style> {
    match intent.arg_str("style").and_then(Style::parse) {
        Some(style) => Ok(style),
        None => bail!("{command} requires a style: casual, business or night-out"),
    }
}

/// `/download [style] [dir]`: a leading one- or two-word style, then the directory.
fn download_target(args: &[String], out_dir: &Path) -> (Option<Style>, PathBuf) {
    let two_word = match args {
        [first, second, ..] => Style::parse(&format!("{first} {second}")),
        _ => None,
    };
    let (style, rest) = match (two_word, args.first().and_then(|first| Style::parse(first))) {
        (Some(style), _) => (Some(style), &args[2..]),
        (None, Some(style)) => (Some(style), &args[1..]),
        (None, None) => (None, args),
    };
    let dir = if rest.is_empty() {
        out_dir.to_path_buf()
    } else {
        PathBuf::from(rest.join(" "))
    };
    (style, dir)
}

fn write_apply(outcome: ApplyOutcome, w: &mut impl Write) -> Result<()> {
    match outcome {
        ApplyOutcome::Skipped => writeln!(w, "Nothing to apply.")?,
        ApplyOutcome::Applied { committed: true } => writeln!(w, "Edit applied.")?,
        ApplyOutcome::Applied { committed: false } => {
            writeln!(w, "Edit applied to the session only; the source has changed.")?
        }
        ApplyOutcome::Failed { message } => writeln!(w, "Edit failed: {message}")?,
    }
    Ok(())
}

fn write_status(studio: &Studio, w: &mut impl Write) -> Result<()> {
    match studio.source() {
        Some(source) => writeln!(
            w,
            "Source: {} ({}, {} bytes)",
            source.file_name.as_deref().unwrap_or(&source.id),
            source.image.mime_type,
            source.image.len()
        )?,
        None => writeln!(w, "Source: none")?,
    }
    for record in studio.snapshot()? {
        let detail = match record.status {
            RecordStatus::Failed => record.error_message.clone().unwrap_or_default(),
            RecordStatus::Loading if record.image.is_some() => "regenerating".to_string(),
            _ => String::new(),
        };
        if detail.is_empty() {
            writeln!(w, "  {:<9} {}", record.style.label(), record.status.as_str())?;
        } else {
            writeln!(
                w,
                "  {:<9} {} ({detail})",
                record.style.label(),
                record.status.as_str()
            )?;
        }
    }
    if let Some(session) = studio.edit_session() {
        writeln!(w, "Editing: {}", session.style().label())?;
        if let Some(error) = session.last_error() {
            writeln!(w, "  last error: {error}")?;
        }
    }
    Ok(())
}
