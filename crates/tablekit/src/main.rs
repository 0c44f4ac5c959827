//! tablekit CLI entry point.
//!
//! Inspects DynamoDB tables through the raw accessor methods.

use std::sync::{Arc, OnceLock};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use tablekit::storage::DynamoDbStore;
use tablekit::{Config, GetOptions, ScanOptions, Table};
use tablekit_core::model::{ConversionError, Fields, Item, Record, Schema, Value};

/// tablekit - Inspect DynamoDB tables
#[derive(Parser, Debug)]
#[command(name = "tablekit")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Table name prefix
    #[arg(long, env = "TABLEKIT_ENVIRONMENT")]
    environment: Option<String>,

    /// Custom DynamoDB endpoint, e.g. a local emulator
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    endpoint_url: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Read one item by key.
    Get {
        /// Table name, without the environment prefix
        #[arg(long)]
        table: String,
        /// Key attribute as name=value (repeatable)
        #[arg(long = "key", required = true)]
        keys: Vec<String>,
    },
    /// Scan a table.
    Scan {
        #[arg(long)]
        table: String,
        /// Stop once more than this many items are collected
        #[arg(long, default_value_t = 0)]
        size: usize,
    },
    /// Count the items of a table.
    Count {
        #[arg(long)]
        table: String,
    },
}

/// Untyped row. Only raw reads go through it, so it declares no fields.
#[derive(Debug, Clone)]
struct Document(Item);

impl Record for Document {
    fn schema() -> &'static Schema {
        static SCHEMA: OnceLock<Schema> = OnceLock::new();
        SCHEMA.get_or_init(|| Schema::new("Document", Vec::new()))
    }

    fn from_fields(fields: Fields) -> Result<Self, ConversionError> {
        Ok(Self(fields.into_values()))
    }

    fn to_fields(&self) -> Item {
        self.0.clone()
    }
}

/// Parses `name=value` pairs. Values that parse as integers become numbers.
fn parse_key(pairs: &[String]) -> Result<Item> {
    pairs
        .iter()
        .map(|pair| -> Result<(String, Value)> {
            let (name, value) = pair
                .split_once('=')
                .with_context(|| format!("Invalid key '{pair}', expected name=value"))?;
            if name.is_empty() {
                bail!("Invalid key '{pair}', empty attribute name");
            }
            let value = match value.parse::<i64>() {
                Ok(number) => Value::Int(number),
                Err(_) => Value::from(value),
            };
            Ok((name.to_string(), value))
        })
        .collect()
}

fn print_item(item: &Item) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(item)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    let fmt_layer = if cli.json {
        tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        tracing_subscriber::fmt::layer().with_writer(std::io::stderr).boxed()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tablekit=info".into()),
        )
        .with(fmt_layer)
        .init();

    let mut config = Config::from_env();
    if let Some(environment) = cli.environment {
        config.environment = environment;
    }
    if cli.endpoint_url.is_some() {
        config.endpoint_url = cli.endpoint_url;
    }

    let store = Arc::new(DynamoDbStore::from_config(&config).await);
    let table = |suffix: &str| Table::<Document>::from_config(store.clone(), &config, suffix);

    match cli.command {
        Commands::Get { table: name, keys } => {
            let key = parse_key(&keys)?;
            let table = table(&name);
            match table.get_raw(key, GetOptions::default()).await? {
                Some(item) => print_item(&item)?,
                None => {
                    tracing::warn!(table = %table.name(), "Item not found");
                    std::process::exit(1);
                }
            }
        }
        Commands::Scan { table: name, size } => {
            let table = table(&name);
            let result = table
                .scan_raw(ScanOptions {
                    size_hint: size,
                    ..Default::default()
                })
                .await?;
            for item in &result.items {
                print_item(item)?;
            }
            tracing::info!(
                table = %table.name(),
                count = result.count,
                scanned = result.scanned_count,
                more = result.last_evaluated_key.is_some(),
                "Scan finished"
            );
        }
        Commands::Count { table: name } => {
            let count = table(&name).scan_count(ScanOptions::default()).await?;
            println!("{count}");
        }
    }

    Ok(())
}
