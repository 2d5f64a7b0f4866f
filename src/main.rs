use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod charts;
mod classify;
mod config;
mod dashboard;
mod db;
mod filter;
mod metrics;
mod models;
mod overview;
mod report;
mod web;

use config::{AuthMode, WarehouseConfig};
use dashboard::{render_page, Page};
use db::DataSource;
use filter::CategoryFilter;

#[derive(Parser)]
#[command(name = "purchase-analytics")]
#[command(about = "Customer purchase behavior analytics over a SQL warehouse table", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Read an exported CSV copy of the table instead of the warehouse
    #[arg(long)]
    csv: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = AuthMode::ServicePrincipal)]
    auth: AuthMode,
    /// User access token for --auth user-token (falls back to WAREHOUSE_USER_TOKEN)
    #[arg(long)]
    token: Option<String>,
}

#[derive(Args)]
struct FilterArgs {
    /// Category value to keep; repeat for several. Omit for all categories.
    #[arg(long = "category")]
    categories: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the two-tab dashboard as a markdown report
    Report {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        /// Also render every chart as an SVG file into this directory
        #[arg(long)]
        charts_dir: Option<PathBuf>,
    },
    /// Print key metrics for the current selection
    Summary {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        filter: FilterArgs,
        /// Print the whole page as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which column was picked for each role
    Columns {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Serve the dashboard over HTTP
    Serve {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

impl SourceArgs {
    /// Resolves the data source. The warehouse config is only required when no CSV is given.
    fn data_source(&self) -> anyhow::Result<DataSource> {
        match &self.csv {
            Some(path) => {
                let records = db::load_csv(path)?;
                Ok(DataSource::Snapshot {
                    label: path.display().to_string(),
                    records: Arc::new(records),
                })
            }
            None => {
                let config = WarehouseConfig::from_env()?;
                info!(host = %config.host, warehouse = %config.warehouse_id, "using warehouse");
                Ok(DataSource::Warehouse {
                    config,
                    mode: self.auth,
                })
            }
        }
    }

    fn user_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var("WAREHOUSE_USER_TOKEN").ok())
    }

    async fn page(&self, filter: &FilterArgs) -> anyhow::Result<(DataSource, Page)> {
        let source = self.data_source()?;
        let filter = CategoryFilter::new(filter.categories.clone());
        let page = render_page(&source, self.user_token().as_deref(), &filter).await;
        Ok((source, page))
    }
}

fn write_charts(page: &Page, dir: &Path) -> anyhow::Result<usize> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let mut written = 0usize;
    for chart in charts::plan(page) {
        match charts::render_svg(&chart) {
            Ok(svg) => {
                let path = dir.join(chart.file_name());
                std::fs::write(&path, svg)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                written += 1;
            }
            Err(err) => warn!(chart = %chart.title, "skipping chart: {err:#}"),
        }
    }
    Ok(written)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Report {
            source,
            filter,
            out,
            charts_dir,
        } => {
            let (_, page) = source.page(&filter).await?;
            std::fs::write(&out, report::build_report(&page))
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());

            if let Some(dir) = charts_dir {
                let written = write_charts(&page, &dir)?;
                println!("Wrote {written} charts to {}.", dir.display());
            }
        }
        Commands::Summary {
            source,
            filter,
            json,
        } => {
            let (_, page) = source.page(&filter).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else {
                print!("{}", report::build_summary(&page));
            }
        }
        Commands::Columns { source } => {
            let (source, page) = source.page(&FilterArgs { categories: Vec::new() }).await?;
            match &page {
                Page::NoData { message } => println!("{message}"),
                Page::Loaded { analytics, .. } => {
                    println!("Column roles for {}:", source.label());
                    for (role, column) in analytics.roles.assignments() {
                        let ignored = analytics.roles.candidates(role).len().saturating_sub(1);
                        match column {
                            Some(column) if ignored > 0 => {
                                println!("- {role}: {column} ({ignored} other candidates ignored)")
                            }
                            Some(column) => println!("- {role}: {column}"),
                            None => println!("- {role}: none"),
                        }
                    }
                }
            }
        }
        Commands::Serve { source, host, port } => {
            let addr: SocketAddr = format!("{host}:{port}")
                .parse()
                .with_context(|| format!("invalid listen address {host}:{port}"))?;
            web::serve(source.data_source()?, addr).await?;
        }
    }

    Ok(())
}
