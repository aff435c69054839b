use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use portfolio_store::prelude::*;
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Portfolio asset store")]
struct Args {
    #[arg(long, env = "DB_USER")]
    user: String,
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    host: String,
    #[arg(long, env = "DB_NAME")]
    name: String,
    #[arg(long, env = "DB_PORT", default_value_t = 5432)]
    port: u16,
    #[arg(long, env = "DB_SCHEMA", default_value = "public")]
    schema: String,
    /// Per-command deadline in seconds
    #[arg(long, default_value = "30", value_parser = parse_secs)]
    timeout: Duration,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the net gold holding
    Gold,
    /// Print open stock positions as JSON
    Stocks,
    /// Record one stock entry and print its id
    InsertStock {
        #[arg(long)]
        side: String,
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        industry: String,
        #[arg(long, default_value = "")]
        sub_industry: String,
        #[arg(long)]
        market: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        price: Decimal,
        #[arg(long)]
        currency: String,
        #[arg(long)]
        actor: String,
    },
}

fn parse_secs(raw: &str) -> Result<Duration, String> {
    raw.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| format!("expected whole seconds: {e}"))
}

impl Args {
    fn credentials(&self) -> Credentials {
        Credentials {
            username: self.user.clone(),
            password: self.password.clone(),
            host: self.host.clone(),
            database: self.name.clone(),
            port: self.port,
            schema: self.schema.clone(),
        }
    }
}

async fn run(store: &PgStore, args: Args) -> Result<(), StoreError> {
    let ctx = Context::background().with_timeout(args.timeout);
    let db: Arc<dyn StoreHandle> = Arc::new(store.clone());

    match args.command {
        Command::Gold => {
            let service = AssetInquiryService::new(Arc::new(InquiryRepoDb::new(db)));
            let amount = service.inquiry_asset_gold(&ctx).await?;
            println!("{amount}");
        }
        Command::Stocks => {
            let service = AssetInquiryService::new(Arc::new(InquiryRepoDb::new(db)));
            let stocks = service.inquiry_stocks(&ctx).await?;
            let json = serde_json::to_string_pretty(&stocks)
                .unwrap_or_else(|_| "[]".to_string());
            println!("{json}");
        }
        Command::InsertStock {
            side,
            symbol,
            title,
            industry,
            sub_industry,
            market,
            amount,
            price,
            currency,
            actor,
        } => {
            let repo = RepoDb::new(db);
            let out = repo
                .insert_stock(
                    &ctx,
                    InsertStockInput {
                        side,
                        symbol,
                        title,
                        industry,
                        sub_industry,
                        market,
                        amount,
                        price,
                        currency,
                        created_by: actor.clone(),
                        updated_by: actor,
                    },
                )
                .await?;
            println!("{}", out.id);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    tracing::info!(
        host = %args.host,
        port = args.port,
        db = %args.name,
        schema = %args.schema,
        "starting"
    );

    // The process must not continue with an unreachable or misconfigured store.
    let store = match PgStore::open(&args.credentials()).await {
        Ok(store) => store,
        Err(err) => {
            eprintln!("failed to open database: {err}");
            std::process::exit(1);
        }
    };

    let outcome = run(&store, args).await;
    store.close().await;

    if let Err(err) = outcome {
        tracing::error!(error = %err, "command failed");
        std::process::exit(2);
    }
}
