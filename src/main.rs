//! bloomtree CLI - Command line interface for bloomtree stores
//!
//! Keeps named sequences and text sets in a single store file. Every
//! mutating command persists the new tree and moves the named root to it.

use anyhow::Context;
use bloomtree::{
    BloomSet, Config, FileStore, FilterShape, Hash, Sequence, SequenceHandle, SharedStore, Text,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "bloomtree")]
#[command(about = "Persistent sequences and bloom-filter sets in a content-addressed store")]
#[command(version)]
struct Cli {
    /// Path to the store file
    #[arg(short, long, default_value = "bloomtree.db")]
    store: PathBuf,

    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Log debug events to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new store
    Init,

    /// Work with a named sequence
    #[command(subcommand)]
    Seq(SeqCommand),

    /// Work with a named text set
    #[command(subcommand)]
    Set(SetCommand),

    /// List all named roots
    Roots {
        #[command(subcommand)]
        command: Option<RootsCommand>,
    },
}

#[derive(Subcommand)]
enum RootsCommand {
    /// Forget a named root; its blocks stay in the store
    Rm {
        /// Full root name, e.g. seq/todo
        name: String,
    },
}

#[derive(Subcommand)]
enum SeqCommand {
    /// Insert a value before an index
    Insert {
        /// Sequence name
        name: String,
        /// Position to insert before; the length appends
        index: u64,
        /// The value to insert
        value: String,
    },

    /// Append a value
    Push {
        /// Sequence name
        name: String,
        /// The value to append
        value: String,
    },

    /// Get the value at an index
    Get {
        /// Sequence name
        name: String,
        /// Position to read
        index: u64,
    },

    /// Remove the value at an index
    Remove {
        /// Sequence name
        name: String,
        /// Position to remove
        index: u64,
    },

    /// List every value in order
    List {
        /// Sequence name
        name: String,
        /// Read this root hash instead of the named root
        #[arg(long)]
        at: Option<String>,
    },

    /// Show the number of values
    Count {
        /// Sequence name
        name: String,
    },
}

#[derive(Subcommand)]
enum SetCommand {
    /// Add a space-separated text
    Add {
        /// Set name
        name: String,
        /// The text to add
        text: String,
    },

    /// Remove a text
    Remove {
        /// Set name
        name: String,
        /// The text to remove
        text: String,
    },

    /// Find texts containing a word, or with a given word count
    Find {
        /// Set name
        name: String,
        /// Word to look for
        #[arg(required_unless_present = "count")]
        word: Option<String>,
        /// Match texts with exactly this many words instead
        #[arg(long, conflicts_with = "word")]
        count: Option<u64>,
        /// Search this root hash instead of the named root
        #[arg(long)]
        at: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Init => {
            let store = FileStore::create(&cli.store)?;
            store.sync()?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "message": format!("Created store at {}", cli.store.display())
                }),
            )?;
        }

        Commands::Seq(command) => {
            let store = open_store(&cli.store, &config)?;
            let shared: SharedStore = store.clone();
            let value = run_seq(command, &store, &shared)?;
            store.sync()?;
            output(cli.format, &value)?;
        }

        Commands::Set(command) => {
            let store = open_store(&cli.store, &config)?;
            let shared: SharedStore = store.clone();
            let value = run_set(command, &store, &shared, FilterShape::from(&config))?;
            store.sync()?;
            output(cli.format, &value)?;
        }

        Commands::Roots { command: None } => {
            let store = open_store(&cli.store, &config)?;
            let roots: Vec<_> = store
                .list_roots()
                .into_iter()
                .map(|(name, hash)| {
                    serde_json::json!({
                        "name": name,
                        "hash": hash.to_hex(),
                    })
                })
                .collect();
            output(cli.format, &serde_json::json!(roots))?;
        }

        Commands::Roots {
            command: Some(RootsCommand::Rm { name }),
        } => {
            let store = open_store(&cli.store, &config)?;
            let hash = store.remove_root(&name)?;
            store.sync()?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "name": name,
                    "root": hash.to_hex(),
                }),
            )?;
        }
    }

    Ok(())
}

fn run_seq(
    command: SeqCommand,
    store: &FileStore,
    shared: &SharedStore,
) -> anyhow::Result<serde_json::Value> {
    let value = match command {
        SeqCommand::Insert { name, index, value } => {
            let seq = load_seq(store, shared, &name)?.insert_at(index, value)?;
            save_seq(store, shared, &name, &seq)?
        }

        SeqCommand::Push { name, value } => {
            let seq = load_seq(store, shared, &name)?.push(value)?;
            save_seq(store, shared, &name, &seq)?
        }

        SeqCommand::Get { name, index } => {
            let mut handle = SequenceHandle::new(load_seq(store, shared, &name)?);
            let bytes = handle.get_at(index)?;
            serde_json::json!({
                "index": index,
                "value": String::from_utf8_lossy(&bytes),
            })
        }

        SeqCommand::Remove { name, index } => {
            let seq = load_seq(store, shared, &name)?.remove_at(index)?;
            save_seq(store, shared, &name, &seq)?
        }

        SeqCommand::List { name, at } => {
            let seq = match at {
                Some(hex) => Sequence::load(parse_root(&hex)?, shared.clone())?,
                None => load_seq(store, shared, &name)?,
            };
            let values = seq
                .iter()
                .map(|item| item.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
                .collect::<bloomtree::Result<Vec<_>>>()?;
            serde_json::json!({
                "name": name,
                "values": values,
            })
        }

        SeqCommand::Count { name } => {
            let seq = load_seq(store, shared, &name)?;
            serde_json::json!({
                "name": name,
                "count": seq.count(),
            })
        }
    };
    Ok(value)
}

fn run_set(
    command: SetCommand,
    store: &FileStore,
    shared: &SharedStore,
    shape: FilterShape,
) -> anyhow::Result<serde_json::Value> {
    let value = match command {
        SetCommand::Add { name, text } => {
            let set = load_set(store, shared, &name)?.insert(&Text::with_shape(text, shape))?;
            save_set(store, shared, &name, &set)?
        }

        SetCommand::Remove { name, text } => {
            let set = load_set(store, shared, &name)?.remove(&Text::with_shape(text, shape))?;
            save_set(store, shared, &name, &set)?
        }

        SetCommand::Find {
            name,
            word,
            count,
            at,
        } => {
            let query = match (word, count) {
                (_, Some(n)) => shape.count_filter(n),
                (Some(word), None) => shape.word_filter(&word),
                (None, None) => anyhow::bail!("Give a word or --count"),
            };
            let set = match at {
                Some(hex) => BloomSet::load(parse_root(&hex)?, shared.clone())?,
                None => load_set(store, shared, &name)?,
            };
            let matches = set
                .find(&query)
                .map(|item| item.map(|text| text.content))
                .collect::<bloomtree::Result<Vec<_>>>()?;
            serde_json::json!({
                "name": name,
                "matches": matches,
            })
        }
    };
    Ok(value)
}

fn parse_root(hex: &str) -> anyhow::Result<Hash> {
    Hash::from_hex(hex).with_context(|| format!("Invalid root hash '{}'", hex))
}

fn seq_root(name: &str) -> String {
    format!("seq/{}", name)
}

fn set_root(name: &str) -> String {
    format!("set/{}", name)
}

fn load_seq(store: &FileStore, shared: &SharedStore, name: &str) -> anyhow::Result<Sequence> {
    let hash = store.root(&seq_root(name)).unwrap_or(Hash::ZERO);
    Ok(Sequence::load(hash, shared.clone())?)
}

fn save_seq(
    store: &FileStore,
    shared: &SharedStore,
    name: &str,
    seq: &Sequence,
) -> anyhow::Result<serde_json::Value> {
    let hash = seq.persist(shared)?;
    store.set_root(&seq_root(name), hash);
    Ok(serde_json::json!({
        "status": "ok",
        "name": name,
        "count": seq.count(),
        "root": hash.to_hex(),
    }))
}

fn load_set(store: &FileStore, shared: &SharedStore, name: &str) -> anyhow::Result<BloomSet<Text>> {
    let hash = store.root(&set_root(name)).unwrap_or(Hash::ZERO);
    Ok(BloomSet::load(hash, shared.clone())?)
}

fn save_set(
    store: &FileStore,
    shared: &SharedStore,
    name: &str,
    set: &BloomSet<Text>,
) -> anyhow::Result<serde_json::Value> {
    let hash = set.persist(shared)?;
    store.set_root(&set_root(name), hash);
    Ok(serde_json::json!({
        "status": "ok",
        "name": name,
        "len": set.len(),
        "root": hash.to_hex(),
    }))
}

fn open_store(path: &Path, config: &Config) -> anyhow::Result<Arc<FileStore>> {
    let store = FileStore::open_or_create(path)
        .with_context(|| format!("Failed to open store {}", path.display()))?
        .with_compression(config.compression_level);
    Ok(Arc::new(store))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn output(format: OutputFormat, value: &serde_json::Value) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
        OutputFormat::Text => {
            for line in text_lines(value) {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

/// Plain rendering: `key: value` per field, one line per list item
fn text_lines(value: &serde_json::Value) -> Vec<String> {
    use serde_json::Value;

    fn scalar(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Object(map) => map.values().map(scalar).collect::<Vec<_>>().join("  "),
            other => other.to_string(),
        }
    }

    let mut lines = Vec::new();
    match value {
        Value::Array(items) => lines.extend(items.iter().map(scalar)),
        Value::Object(map) => {
            for (key, field) in map {
                match field {
                    Value::Array(items) => {
                        lines.push(format!("{}:", key));
                        lines.extend(items.iter().map(|item| format!("  {}", scalar(item))));
                    }
                    _ => lines.push(format!("{}: {}", key, scalar(field))),
                }
            }
        }
        other => lines.push(scalar(other)),
    }
    lines
}
