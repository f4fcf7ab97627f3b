use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mrc_pipeline::{
    apply_view, format_rupees_opt, write_export, DatasetCache, LocalityTable, SortMode, ViewFilter,
};
use mrc_web::WebConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mrc-cli")]
#[command(about = "Mumbai Rent Compare command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the web dashboard.
    Serve,
    /// Print the filtered ranking table.
    Rank(ViewArgs),
    /// Write the filtered view as CSV.
    Export {
        #[command(flatten)]
        view: ViewArgs,
        /// Output file; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct ViewArgs {
    /// Dataset path; defaults to MRC_DATA_PATH or data/mmr_rent_data.csv.
    #[arg(long)]
    data: Option<PathBuf>,
    /// YAML locality override; defaults to MRC_LOCALITIES.
    #[arg(long)]
    localities: Option<PathBuf>,
    #[arg(long = "zone")]
    zones: Vec<String>,
    #[arg(long)]
    min_rent: Option<f64>,
    #[arg(long)]
    max_rent: Option<f64>,
    #[arg(long, default_value = "")]
    search: String,
    #[arg(long)]
    group_by_zone: bool,
    /// One of rank, median_asc, median_desc, area.
    #[arg(long, default_value = "rank", value_parser = parse_sort_mode)]
    sort: SortMode,
}

impl ViewArgs {
    fn filter(&self) -> ViewFilter {
        ViewFilter {
            zones: self.zones.clone(),
            min_rent: self.min_rent,
            max_rent: self.max_rent,
            search: self.search.clone(),
            group_by_zone: self.group_by_zone,
            sort: self.sort,
        }
    }

    fn localities(&self) -> Result<LocalityTable> {
        match &self.localities {
            Some(path) => LocalityTable::from_yaml_path(path),
            None => LocalityTable::from_env(),
        }
    }

    fn data_path(&self) -> PathBuf {
        self.data
            .clone()
            .unwrap_or_else(|| WebConfig::from_env().resolved_data_path())
    }
}

fn parse_sort_mode(value: &str) -> std::result::Result<SortMode, String> {
    SortMode::from_param(value).ok_or_else(|| {
        let known = SortMode::ALL.map(SortMode::param).join(", ");
        format!("unknown sort mode `{value}` (expected one of: {known})")
    })
}

/// Used when `RUST_LOG` is unset or unparseable.
const DEFAULT_LOG_FILTER: &str = "mrc=info,info";

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            mrc_web::serve_from_env().await?;
        }
        Commands::Rank(view) => {
            let path = view.data_path();
            let cache = DatasetCache::new(view.localities()?);
            let table = cache
                .load(&path)
                .await
                .with_context(|| format!("loading {}", path.display()))?;
            let rows = apply_view(&table, &view.filter());
            println!(
                "{:>4}  {:<14} {:<12} {:<22} {:>10}  {}",
                "rank", "badge", "zone", "area", "median", "deposit"
            );
            for row in &rows {
                println!(
                    "{:>4}  {:<14} {:<12} {:<22} {:>10}  {}",
                    row.global_rank.map(|r| r.to_string()).unwrap_or_default(),
                    row.badge_label(),
                    row.zone,
                    row.area,
                    format_rupees_opt(row.rent_median_1bhk),
                    row.deposit_ratio.as_deref().unwrap_or("")
                );
            }
            info!(shown = rows.len(), total = table.rows.len(), "rank complete");
        }
        Commands::Export { view, out } => {
            let path = view.data_path();
            let cache = DatasetCache::new(view.localities()?);
            let table = cache
                .load(&path)
                .await
                .with_context(|| format!("loading {}", path.display()))?;
            let rows = apply_view(&table, &view.filter());
            match &out {
                Some(out_path) => {
                    let file = std::fs::File::create(out_path)
                        .with_context(|| format!("creating {}", out_path.display()))?;
                    write_export(&rows, file)?;
                    info!(rows = rows.len(), out = %out_path.display(), "export written");
                }
                None => write_export(&rows, std::io::stdout().lock())?,
            }
        }
    }

    Ok(())
}
