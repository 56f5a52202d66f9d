//! Virtindex CLI
//!
//! Command-line client for a running Virtindex server:
//! - Resolve queries and complete partial tags
//! - Send metrics, tags and custom messages
//! - Trigger materialization and check status

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "virtindex-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Client for the Virtindex tag query engine")]
#[command(long_about = "Virtindex resolves tag queries to metric names.\nUse this client to feed it messages and run queries against a running server.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API server URL
    #[arg(long, default_value = "http://localhost:8085", global = true)]
    pub api_url: String,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a query to metric names
    Query {
        /// Tags, with or without the virt.v1. prefix
        tags: Vec<String>,
    },

    /// Complete a partial tag ("*" lists services)
    Complete {
        /// Partial tag, e.g. "servers-d" or "servers-dc:"
        partial: String,
    },

    /// Attach tags to a join value
    Tags {
        /// Join key name (e.g. fqdn)
        key: String,
        /// Join value (e.g. host1)
        value: String,
        /// Tags in service-key:value format
        tags: Vec<String>,
    },

    /// Attach metrics to a join value
    Metrics {
        /// Join key name (e.g. fqdn)
        key: String,
        /// Join value (e.g. host1)
        value: String,
        /// Metric names
        metrics: Vec<String>,
    },

    /// Tag metrics directly
    Custom {
        /// Tags in service-key:value format
        #[arg(short = 'T', long, required = true)]
        tags: Vec<String>,
        /// Metric names
        metrics: Vec<String>,
    },

    /// Publish buffered writes now
    Materialize,

    /// Show server status
    Status,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Query { tags } => {
            let query = build_query(&tags);

            let response = client
                .get(format!("{}/api/v1/query", cli.api_url))
                .query(&[("q", query.as_str())])
                .send()
                .await?;

            let data = expect_success(response, "Query").await?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                print_list(&data["metrics"], "No metrics match");
                if let Some(ms) = data["meta"]["execution_time_ms"].as_u64() {
                    eprintln!("({} ms)", ms);
                }
            }
        }

        Commands::Complete { partial } => {
            let response = client
                .get(format!("{}/api/v1/autocomplete", cli.api_url))
                .query(&[("q", partial.as_str())])
                .send()
                .await?;

            let data = expect_success(response, "Autocomplete").await?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                print_list(&data["completions"], "No completions");
            }
        }

        Commands::Tags { key, value, tags } => {
            let body = serde_json::json!({
                "Key": key,
                "Value": value,
                "Tags": tags,
            });
            ingest(&client, &cli.api_url, "tags", &body, &cli.format).await?;
        }

        Commands::Metrics {
            key,
            value,
            metrics,
        } => {
            let body = serde_json::json!({
                "Key": key,
                "Value": value,
                "Metrics": metrics,
            });
            ingest(&client, &cli.api_url, "metrics", &body, &cli.format).await?;
        }

        Commands::Custom { tags, metrics } => {
            let body = serde_json::json!({
                "Tags": tags,
                "Metrics": metrics,
            });
            ingest(&client, &cli.api_url, "custom", &body, &cli.format).await?;
        }

        Commands::Materialize => {
            let response = client
                .post(format!("{}/api/v1/materialize", cli.api_url))
                .send()
                .await?;

            let data = expect_success(response, "Materialize").await?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                println!("{:<20} {:>10} {:>10} {:>10}", "Index", "Generation", "Keys", "Added");
                println!("{}", "-".repeat(53));

                for index in data["indexes"].as_array().into_iter().flatten() {
                    println!(
                        "{:<20} {:>10} {:>10} {:>10}",
                        index["index"].as_str().unwrap_or("-"),
                        index["generation"].as_u64().unwrap_or(0),
                        index["keys"].as_u64().unwrap_or(0),
                        index["added"].as_u64().unwrap_or(0)
                    );
                }
            }
        }

        Commands::Status => {
            let response = client
                .get(format!("{}/health", cli.api_url))
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let health: serde_json::Value = resp.json().await?;

                    println!("Virtindex v{}", env!("CARGO_PKG_VERSION"));
                    println!();
                    println!(
                        "API Status: {}",
                        health["status"].as_str().unwrap_or("unknown")
                    );
                    println!(
                        "Generation: {}",
                        health["generation"].as_u64().unwrap_or(0)
                    );
                    println!(
                        "Services:   {}",
                        health["services"].as_u64().unwrap_or(0)
                    );
                    if let Some(error) = health["error"].as_str() {
                        println!("Error:      {}", error);
                    }

                    if let Some(uptime) = health["uptime_seconds"].as_u64() {
                        println!();
                        println!("Uptime: {}", format_duration(uptime));
                    }
                }
                Ok(resp) => {
                    eprintln!("API returned error: {}", resp.status());
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Cannot connect to Virtindex API at {}", cli.api_url);
                    eprintln!("Error: {}", e);
                    eprintln!();
                    eprintln!("Make sure the Virtindex server is running:");
                    eprintln!("  cargo run --bin virtindex");
                    std::process::exit(1);
                }
            }
        }

        Commands::Config { output } => {
            let config = virtindex::config::generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

/// Join tags into a query string, adding the prefix when missing
fn build_query(tags: &[String]) -> String {
    let joined = tags.join(".");
    if joined.starts_with(virtindex::query::QUERY_PREFIX) {
        joined
    } else {
        format!("{}{}", virtindex::query::QUERY_PREFIX, joined)
    }
}

async fn ingest(
    client: &reqwest::Client,
    api_url: &str,
    kind: &str,
    body: &serde_json::Value,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{}/api/v1/ingest/{}", api_url, kind))
        .json(body)
        .send()
        .await?;

    let data = expect_success(response, "Ingest").await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("Accepted: {}", data["accepted"].as_u64().unwrap_or(0));
    for dropped in data["dropped"].as_array().into_iter().flatten() {
        println!(
            "  dropped {}: {}",
            dropped["tag"].as_str().unwrap_or("-"),
            dropped["error"].as_str().unwrap_or("-")
        );
    }
    Ok(())
}

async fn expect_success(
    response: reqwest::Response,
    what: &str,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        eprintln!("{} failed ({}): {}", what, status, text);
        std::process::exit(1);
    }
    Ok(response.json().await?)
}

fn print_list(values: &serde_json::Value, empty: &str) {
    match values.as_array() {
        Some(items) if !items.is_empty() => {
            for item in items {
                println!("{}", item.as_str().unwrap_or("-"));
            }
        }
        _ => println!("{}", empty),
    }
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}
