use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use promo_engine::config::{AppConfig, StorageBackend};
use promo_engine::loader::{load_promotions, load_sales_csv, load_stock_csv};
use promo_engine::models::{DailySalesRecord, Recommendation};
use promo_engine::pipeline::Pipeline;
use promo_engine::storage::{DuckDbRepository, open_repository};
use promo_engine::{report, utils};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "promo-engine", about = "Promotion elasticity learning and recommendations", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Args)]
struct RecommendArgs {
    /// Stock on hand CSV (product code, quantity); enables clearance for LOW products
    #[arg(long)]
    stock: Option<PathBuf>,

    /// Planning date (default: today)
    #[arg(long)]
    as_of: Option<NaiveDate>,

    /// Also export recommendations to this CSV file
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Show only the top N recommendations
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Replace the stored promotion history with a CSV file or a directory of CSVs
    ImportPromos {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Learn per-product promotion profiles from historical daily sales
    Learn {
        #[arg(short, long)]
        sales: PathBuf,
    },

    /// List products whose sales are falling
    Declines {
        #[arg(short, long)]
        sales: PathBuf,

        /// Window in days (default: engine.recommendation_lookback_days)
        #[arg(long)]
        lookback: Option<u32>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Rank promotion recommendations from recent sales
    Recommend {
        #[arg(short, long)]
        sales: PathBuf,

        #[command(flatten)]
        opts: RecommendArgs,
    },

    /// Import promotions, learn and recommend in one go
    Run {
        #[arg(long)]
        promos: PathBuf,

        /// Historical daily sales used for learning
        #[arg(long)]
        history: PathBuf,

        /// Recent daily sales used for recommendations
        #[arg(long)]
        recent: PathBuf,

        #[command(flatten)]
        opts: RecommendArgs,
    },

    /// List stored promotion profiles
    Profiles,

    /// Show repository statistics
    Stats,

    /// Apply schema migrations without loading data
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "promo_engine=info,warn",
        1 => "promo_engine=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::ImportPromos { file } => {
            let _t = utils::Timer::start("Promotion import");
            let pipeline = open_pipeline(&config)?;
            let events = load_promotions(&file)?;
            let n = pipeline.import_promotion_history(&events).await?;
            println!("Imported {} promotion events from {:?}.", n, file);
        }

        Command::Learn { sales } => {
            let _t = utils::Timer::start("Elasticity learning");
            let pipeline = open_pipeline(&config)?;
            let history = load_sales_csv(&sales)?;
            let outcome = pipeline.learn_elasticity(&history).await?;
            if cli.json {
                println!("{}", report::to_json(&outcome.profiles)?);
            } else {
                println!("Learned {} profiles.", outcome.count);
            }
        }

        Command::Declines { sales, lookback, limit } => {
            let pipeline = open_pipeline(&config)?;
            let recent = load_sales_csv(&sales)?;
            let lookback = lookback.unwrap_or(config.engine.recommendation_lookback_days);
            let mut declines = pipeline.detect_declining_products(&recent, lookback);
            if let Some(n) = limit {
                declines.truncate(n);
            }
            if cli.json {
                println!("{}", report::to_json(&declines)?);
            } else {
                print!("{}", report::render_declines(&declines));
            }
        }

        Command::Recommend { sales, opts } => {
            let _t = utils::Timer::start("Recommendations");
            let pipeline = open_pipeline(&config)?;
            let recent = load_sales_csv(&sales)?;
            let recs = recommend(&pipeline, &recent, &opts).await?;
            emit_recommendations(recs, &opts, cli.json)?;
        }

        Command::Run {
            promos,
            history,
            recent,
            opts,
        } => {
            let _t = utils::Timer::start("Full run");
            let pipeline = open_pipeline(&config)?;

            let events = load_promotions(&promos)?;
            pipeline.import_promotion_history(&events).await?;

            let history = load_sales_csv(&history)?;
            let outcome = pipeline.learn_elasticity(&history).await?;
            info!("Learned {} profiles", outcome.count);

            let recent = load_sales_csv(&recent)?;
            let recs = recommend(&pipeline, &recent, &opts).await?;
            emit_recommendations(recs, &opts, cli.json)?;
        }

        Command::Profiles => {
            let repo = open_repository(&config.storage)?;
            let profiles = repo.get_product_profiles().await?;
            if cli.json {
                println!("{}", report::to_json(&profiles)?);
            } else {
                print!("{}", report::render_profiles(&profiles));
            }
        }

        Command::Stats => {
            let repo = open_repository(&config.storage)?;
            let events = repo.promotion_event_count().await?;
            let profiles = repo.get_product_profiles().await?;
            let avg = repo.get_category_average_uplift().await?;
            println!("─────────────────────────────────");
            println!("  Promotion Engine: Stats");
            println!("─────────────────────────────────");
            println!("  Promotions : {}", utils::fmt_number(events as i64));
            println!("  Profiles   : {}", utils::fmt_number(profiles.len() as i64));
            println!("  Avg uplift : {:.3}", avg.avg_uplift);
            println!("  Avg conf.  : {:.3}", avg.confidence_score);
            println!("─────────────────────────────────");
        }

        Command::Migrate => match config.storage.backend {
            StorageBackend::Duckdb => {
                DuckDbRepository::open(&config.storage.db_path)?.run_migrations()?;
                println!("Migrations applied.");
            }
            StorageBackend::Memory => println!("In-memory backend has no schema to migrate."),
        },
    }

    Ok(())
}

fn open_pipeline(config: &AppConfig) -> Result<Pipeline> {
    let repo = open_repository(&config.storage).context("Failed to open repository")?;
    Ok(Pipeline::from_config(repo, config))
}

fn load_stock(path: Option<&Path>) -> Result<HashMap<String, f64>> {
    match path {
        Some(p) => load_stock_csv(p),
        None => Ok(HashMap::new()),
    }
}

async fn recommend(
    pipeline: &Pipeline,
    recent: &[DailySalesRecord],
    opts: &RecommendArgs,
) -> Result<Vec<Recommendation>> {
    let stock = load_stock(opts.stock.as_deref())?;
    let as_of = opts.as_of.unwrap_or_else(|| Local::now().date_naive());
    Ok(pipeline.generate_recommendations(recent, &stock, as_of).await?)
}

fn emit_recommendations(mut recs: Vec<Recommendation>, opts: &RecommendArgs, json: bool) -> Result<()> {
    if let Some(n) = opts.limit {
        recs.truncate(n);
    }
    if let Some(out) = &opts.out {
        report::write_recommendations_csv(out, &recs)?;
        info!("Wrote {} recommendations to {:?}", recs.len(), out);
    }
    if json {
        println!("{}", report::to_json(&recs)?);
    } else {
        print!("{}", report::render_recommendations(&recs));
    }
    Ok(())
}
