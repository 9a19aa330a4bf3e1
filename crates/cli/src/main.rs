// corefer CLI - headless entity-resolution operations
//
// Thin shell over corefer-engine: reads entities and configs from
// disk, hands them to the engine, writes JSON back. No matching logic
// lives here.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use corefer_core::{Entity, EntityId};
use corefer_engine::{evaluate, run, train, Model, ResolutionConfig, ResolutionInput};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_IO_ERROR: u8 = 3;
pub const EXIT_PARSE_ERROR: u8 = 4;

#[derive(Parser)]
#[command(name = "corefer")]
#[command(about = "Entity resolution between a source and a target collection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Link two entity collections and emit the decisions as JSON
    #[command(after_help = "\
Examples:
  corefer link -c people.toml --source wikidata.jsonl --target catalog.jsonl
  corefer link -c people.toml --source s.jsonl --target t.jsonl -m model.json -o out.json")]
    Link {
        /// Resolution config (TOML)
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Source entities, one JSON object per line
        #[arg(long)]
        source: PathBuf,

        /// Target entities, one JSON object per line
        #[arg(long)]
        target: PathBuf,

        /// Trained model artifact; omit for a rule-based run
        #[arg(long, short = 'm')]
        model: Option<PathBuf>,

        /// Output file (omit for stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Train a classifier from a ground-truth link map
    #[command(after_help = "\
Examples:
  corefer train -c people.toml --source s.jsonl --target t.jsonl --links truth.json -o model.json")]
    Train {
        /// Resolution config (TOML)
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Source entities, one JSON object per line
        #[arg(long)]
        source: PathBuf,

        /// Target entities, one JSON object per line
        #[arg(long)]
        target: PathBuf,

        /// Ground truth: JSON object mapping source id to target id
        #[arg(long)]
        links: PathBuf,

        /// Where to write the model artifact
        #[arg(long, short = 'o')]
        output: PathBuf,
    },

    /// Cross-validate the configured classifier on ground truth
    #[command(after_help = "\
Examples:
  corefer evaluate -c people.toml --source s.jsonl --target t.jsonl --links truth.json")]
    Evaluate {
        /// Resolution config (TOML)
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Source entities, one JSON object per line
        #[arg(long)]
        source: PathBuf,

        /// Target entities, one JSON object per line
        #[arg(long)]
        target: PathBuf,

        /// Ground truth: JSON object mapping source id to target id
        #[arg(long)]
        links: PathBuf,

        /// Output file (omit for stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Link { config, source, target, model, output } => {
            cmd_link(&config, &source, &target, model.as_deref(), output.as_deref())
        }
        Commands::Train { config, source, target, links, output } => {
            cmd_train(&config, &source, &target, &links, &output)
        }
        Commands::Evaluate { config, source, target, links, output } => {
            cmd_evaluate(&config, &source, &target, &links, output.as_deref())
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            eprintln!("error: {message}");
            if let Some(hint) = hint {
                eprintln!("hint:  {hint}");
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    fn io(context: &str, err: io::Error) -> Self {
        Self { code: EXIT_IO_ERROR, message: format!("{context}: {err}"), hint: None }
    }

    fn parse(message: String, hint: Option<&str>) -> Self {
        Self { code: EXIT_PARSE_ERROR, message, hint: hint.map(String::from) }
    }

    fn engine(err: corefer_engine::EngineError) -> Self {
        Self { code: EXIT_ERROR, message: err.to_string(), hint: None }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_link(
    config: &Path,
    source: &Path,
    target: &Path,
    model: Option<&Path>,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let config = load_config(config)?;
    let input = ResolutionInput {
        source: read_entities(source)?,
        target: read_entities(target)?,
    };

    let model = match model {
        Some(path) => {
            let json = fs::read_to_string(path)
                .map_err(|e| CliError::io(&format!("reading {}", path.display()), e))?;
            Some(Model::from_json(&json).map_err(CliError::engine)?)
        }
        None => None,
    };

    let result = run(&config, &input, model.as_ref()).map_err(CliError::engine)?;
    let json = serde_json::to_string_pretty(&result)
        .map_err(|e| CliError::parse(format!("serializing result: {e}"), None))?;
    write_output(output, &json)
}

fn cmd_train(
    config: &Path,
    source: &Path,
    target: &Path,
    links: &Path,
    output: &Path,
) -> Result<(), CliError> {
    let config = load_config(config)?;
    let input = ResolutionInput {
        source: read_entities(source)?,
        target: read_entities(target)?,
    };
    let links = read_links(links)?;

    let model = train(&config, &input, &links).map_err(CliError::engine)?;
    let json = model.to_json().map_err(CliError::engine)?;
    fs::write(output, json)
        .map_err(|e| CliError::io(&format!("writing {}", output.display()), e))?;

    tracing::info!(
        algorithm = %model.algorithm,
        training_pairs = model.training_pairs,
        artifact = %output.display(),
        "model written"
    );
    Ok(())
}

fn cmd_evaluate(
    config: &Path,
    source: &Path,
    target: &Path,
    links: &Path,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let config = load_config(config)?;
    let input = ResolutionInput {
        source: read_entities(source)?,
        target: read_entities(target)?,
    };
    let links = read_links(links)?;

    let report = evaluate(&config, &input, &links).map_err(CliError::engine)?;
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| CliError::parse(format!("serializing report: {e}"), None))?;
    write_output(output, &json)
}

// ---------------------------------------------------------------------------
// IO helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<ResolutionConfig, CliError> {
    let text = fs::read_to_string(path)
        .map_err(|e| CliError::io(&format!("reading {}", path.display()), e))?;
    ResolutionConfig::from_toml(&text).map_err(CliError::engine)
}

/// One JSON entity per line; blank lines are allowed.
fn read_entities(path: &Path) -> Result<Vec<Entity>, CliError> {
    let text = fs::read_to_string(path)
        .map_err(|e| CliError::io(&format!("reading {}", path.display()), e))?;

    let mut entities = Vec::new();
    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entity: Entity = serde_json::from_str(line).map_err(|e| {
            CliError::parse(
                format!("{}:{}: {e}", path.display(), number + 1),
                Some("expected one JSON entity object per line"),
            )
        })?;
        entities.push(entity);
    }
    Ok(entities)
}

fn read_links(path: &Path) -> Result<BTreeMap<EntityId, EntityId>, CliError> {
    let text = fs::read_to_string(path)
        .map_err(|e| CliError::io(&format!("reading {}", path.display()), e))?;
    serde_json::from_str(&text).map_err(|e| {
        CliError::parse(
            format!("{}: {e}", path.display()),
            Some("expected a JSON object mapping source ids to target ids"),
        )
    })
}

fn write_output(path: Option<&Path>, json: &str) -> Result<(), CliError> {
    match path {
        Some(path) => fs::write(path, json)
            .map_err(|e| CliError::io(&format!("writing {}", path.display()), e)),
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "{json}").map_err(|e| CliError::io("writing stdout", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const SOURCE: &str = r#"{"id":"Q1","collection":"source","attributes":{"name":{"kind":"names","values":["Charles Hartshorne"]},"born":{"kind":"dates","values":[{"year":1897,"month":null,"day":null}]}}}"#;
    const TARGET: &str = r#"{"id":"T1","collection":"target","attributes":{"name":{"kind":"names","values":["charles hartshorne"]},"born":{"kind":"dates","values":[{"year":1897,"month":6,"day":5}]}}}"#;

    #[test]
    fn entities_round_trip_from_jsonl() {
        let file = temp(&format!("{SOURCE}\n\n{TARGET}\n"));
        let entities = read_entities(file.path()).unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].id.as_str(), "Q1");
        assert!(entities[1].names("name").is_some());
    }

    #[test]
    fn bad_jsonl_reports_the_line() {
        let file = temp(&format!("{SOURCE}\nnot json\n"));
        let err = read_entities(file.path()).unwrap_err();
        assert_eq!(err.code, EXIT_PARSE_ERROR);
        assert!(err.message.contains(":2:"));
    }

    #[test]
    fn link_command_writes_decisions() {
        let config = temp("name = \"People\"\n");
        let source = temp(&format!("{SOURCE}\n"));
        let target = temp(&format!("{TARGET}\n"));
        let output = NamedTempFile::new().unwrap();

        cmd_link(
            config.path(),
            source.path(),
            target.path(),
            None,
            Some(output.path()),
        )
        .unwrap();

        let written = fs::read_to_string(output.path()).unwrap();
        let result: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(result["summary"]["matches"], 1);
        assert_eq!(result["decisions"][0]["label"], "match");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_entities(Path::new("/nonexistent/entities.jsonl")).unwrap_err();
        assert_eq!(err.code, EXIT_IO_ERROR);
    }
}
