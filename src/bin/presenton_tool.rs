use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use presenton_kernel::schema::{
    CONTRACT_ADD_FIELD, CONTRACT_CLEAN_RESPONSE, CONTRACT_ENSURE_STRICT, CONTRACT_FLATTEN,
    CONTRACT_MAKE_REQUIRED, CONTRACT_REMOVE_DEFAULTS, CONTRACT_REMOVE_FIELDS,
    CONTRACT_REMOVE_TITLES,
};
use presenton_kernel::schools::{builtin_updates, import_csv, UniversityDirectory, UniversityUpdate};
use presenton_kernel::slides::CONTRACT_PREPARE_SCHEMA;
use presenton_kernel::{default_registry, load_compose, run_compose, Settings};
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(name = "presenton-tool")]
#[command(about = "Schema transforms, compose pipelines and university data maintenance")]
struct CliOptions {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply one schema operation to a JSON input `{ "schema": ..., ... }`
    Schema {
        op: SchemaOp,
        /// JSON input file (use '-' for stdin)
        #[arg(long, short = 'i')]
        input: Option<String>,
    },
    /// Run a compose file (YAML/JSON) against the contract registry
    Compose {
        #[arg(long = "compose", short = 'c')]
        compose: PathBuf,
        /// JSON initial state file (use '-' for stdin)
        #[arg(long, short = 'i')]
        input: Option<String>,
    },
    /// List the contracts registered by default
    Contracts,
    /// Maintain the university directory snapshot
    Schools {
        /// App data directory (defaults to APP_DATA_DIRECTORY or ./app_data)
        #[arg(long = "data-dir", global = true)]
        data_dir: Option<PathBuf>,
        #[command(subcommand)]
        action: SchoolsAction,
    },
}

#[derive(Subcommand, Debug)]
enum SchoolsAction {
    /// Import CSV files in the ministry list format
    Import { files: Vec<PathBuf> },
    /// Apply curated aliases and codes (built-in list unless --file is given)
    Update {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Remove every university
    Drop,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SchemaOp {
    RemoveFields,
    AddField,
    RemoveDefaults,
    RemoveTitles,
    MakeRequired,
    EnsureStrict,
    Flatten,
    CleanResponse,
    Prepare,
}

impl SchemaOp {
    fn contract(self) -> &'static str {
        match self {
            SchemaOp::RemoveFields => CONTRACT_REMOVE_FIELDS,
            SchemaOp::AddField => CONTRACT_ADD_FIELD,
            SchemaOp::RemoveDefaults => CONTRACT_REMOVE_DEFAULTS,
            SchemaOp::RemoveTitles => CONTRACT_REMOVE_TITLES,
            SchemaOp::MakeRequired => CONTRACT_MAKE_REQUIRED,
            SchemaOp::EnsureStrict => CONTRACT_ENSURE_STRICT,
            SchemaOp::Flatten => CONTRACT_FLATTEN,
            SchemaOp::CleanResponse => CONTRACT_CLEAN_RESPONSE,
            SchemaOp::Prepare => CONTRACT_PREPARE_SCHEMA,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse();
    match options.command {
        Command::Schema { op, input } => {
            let input = load_input(input)?;
            let registry = default_registry();
            let mut ctx = registry.context();
            let output = ctx.call(op.contract(), input, None)?;
            print_json(&output)
        }
        Command::Compose { compose, input } => {
            let steps = load_compose(&compose)?;
            let state = match load_input(input)? {
                Value::Object(map) => Value::Object(map),
                other => json!({ "input": other }),
            };
            let registry = default_registry();
            let mut ctx = registry.context();
            let result = run_compose(&mut ctx, &steps, state)?;
            print_json(&result)
        }
        Command::Contracts => {
            for name in default_registry().names() {
                println!("{name}");
            }
            Ok(())
        }
        Command::Schools { data_dir, action } => {
            let data_dir = data_dir.unwrap_or_else(|| Settings::from_env().app_data_directory());
            run_schools(data_dir, action)
        }
    }
}

fn run_schools(data_dir: PathBuf, action: SchoolsAction) -> Result<()> {
    let mut directory = UniversityDirectory::open_in(&data_dir)?;
    match action {
        SchoolsAction::Import { files } => {
            let mut total = 0;
            for path in files {
                let file = fs::File::open(&path)
                    .with_context(|| format!("unable to open {}", path.display()))?;
                let count = import_csv(&mut directory, file)
                    .with_context(|| format!("error processing {}", path.display()))?;
                println!("Imported {count} new universities from {}", path.display());
                total += count;
            }
            directory.save()?;
            println!("Total imported: {total}");
        }
        SchoolsAction::Update { file } => {
            let updates: Vec<UniversityUpdate> = match file {
                Some(path) => {
                    let text = fs::read_to_string(&path)
                        .with_context(|| format!("unable to read {}", path.display()))?;
                    serde_json::from_str(&text)
                        .with_context(|| format!("invalid update list in {}", path.display()))?
                }
                None => builtin_updates(),
            };
            let changes = directory.apply_updates(&updates);
            directory.save()?;
            println!("Successfully processed. {changes} changes made.");
        }
        SchoolsAction::Drop => {
            let count = directory.len();
            directory.clear()?;
            println!("Dropped {count} universities.");
        }
    }
    Ok(())
}

fn load_input(source: Option<String>) -> Result<Value> {
    let payload = match source {
        None => Value::Object(Default::default()),
        Some(path) if path == "-" => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read JSON payload from stdin")?;
            if buffer.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&buffer).context("Invalid JSON payload read from stdin")?
            }
        }
        Some(path) => {
            let data = fs::read_to_string(&path).with_context(|| format!("Unable to read {path}"))?;
            serde_json::from_str(&data).with_context(|| format!("Invalid JSON payload in {path}"))?
        }
    };
    Ok(payload)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
