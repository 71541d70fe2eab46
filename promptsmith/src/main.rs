//! Interactive prompt-building assistant.
//!
//! `promptsmith chat` runs an orchestrator model that discusses the user's
//! examples, proposes prompts, and refines them based on worker outputs the
//! user accepts. Transcripts and the final prompts are written under the
//! configured output directory.

use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use promptsmith::core::capabilities::CapabilityTable;
use promptsmith::core::parser::{parse_call, parse_response};
use promptsmith::errors::{BackendError, CallSyntaxError, HandlerError, ParseError, ProtocolError};
use promptsmith::exit_codes;
use promptsmith::io::backend::CommandGenerator;
use promptsmith::io::config::{SessionConfig, load_config, write_config};
use promptsmith::logging;
use promptsmith::session::{Backends, Session};
use promptsmith::turn_loop::{TurnStop, run_turn};

const DEFAULT_CONFIG_PATH: &str = ".promptsmith/config.toml";

#[derive(Parser)]
#[command(
    name = "promptsmith",
    version,
    about = "Build prompts together with an orchestrator model"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write `.promptsmith/config.toml` with default settings.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Start an interactive session over stdin/stdout.
    Chat {
        /// File holding one example text. Repeat for more examples.
        #[arg(short, long = "example", value_name = "FILE", required = true)]
        examples: Vec<PathBuf>,
        /// Config file to load.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Parse a stored orchestrator response and print its calls as JSON lines.
    Parse {
        /// File holding the raw response.
        file: PathBuf,
    },
}

fn main() {
    let code = match run() {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code(&err)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => {
            logging::init(None)?;
            cmd_init(Path::new(DEFAULT_CONFIG_PATH), force)
        }
        Command::Chat { examples, config } => cmd_chat(&examples, &config),
        Command::Parse { file } => {
            logging::init(None)?;
            cmd_parse(&file)
        }
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if !force && path.exists() {
        println!("{} already exists", path.display());
        return Ok(());
    }
    write_config(path, &SessionConfig::default())?;
    println!("wrote {}", path.display());
    Ok(())
}

fn cmd_chat(example_paths: &[PathBuf], config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let examples = example_paths
        .iter()
        .map(|path| fs::read_to_string(path).with_context(|| format!("read {}", path.display())))
        .collect::<Result<Vec<_>>>()?;

    let orchestrator = CommandGenerator::new("orchestrator", config.orchestrator.clone());
    let worker = CommandGenerator::new("worker", config.worker.clone());
    let backends = Backends {
        orchestrator: &orchestrator,
        worker: &worker,
    };

    let mut session = Session::new(config, CapabilityTable::standard());
    println!("{}\n", session.welcome());
    session.start(examples)?;
    let paths = session.paths().cloned();
    logging::init(paths.as_ref().map(|paths| paths.log_path.as_path()))?;
    if let (Some(id), Some(paths)) = (session.session_id(), paths.as_ref()) {
        info!(
            session_id = id,
            dir = %paths.dir.display(),
            examples = session.examples().len(),
            "chat started"
        );
    }

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        let outcome = run_turn(&mut session, backends, |call| {
            tracing::debug!(call, "dispatched");
        })?;
        for message in session.take_agent_messages() {
            println!("{message}\n");
        }
        if outcome.stop == TurnStop::Finished {
            if let Some(paths) = session.paths() {
                println!("prompts saved to {}", paths.prompts_path.display());
            }
            return Ok(());
        }

        print!("> ");
        std::io::stdout().flush().context("flush stdout")?;
        let Some(line) = lines.next() else {
            return Ok(());
        };
        let line = line.context("read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        session.add_user_message(line.trim());
    }
}

fn cmd_parse(path: &Path) -> Result<()> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let table = CapabilityTable::standard();
    let calls = parse_response(&raw, &table.names())?;
    for call in calls {
        let invocation = parse_call(&call, &table)?;
        println!(
            "{}",
            json!({ "name": invocation.name, "args": invocation.args })
        );
    }
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ProtocolError>().is_some()
        || err.downcast_ref::<ParseError>().is_some()
        || err.downcast_ref::<CallSyntaxError>().is_some()
    {
        exit_codes::PROTOCOL
    } else if err.downcast_ref::<HandlerError>().is_some() {
        exit_codes::HANDLER
    } else if err.downcast_ref::<BackendError>().is_some() {
        exit_codes::BACKEND
    } else {
        exit_codes::INVALID
    }
}
