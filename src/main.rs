use clap::{Args, Parser, Subcommand};
use mealpay::application::engine::LifecycleEngine;
use mealpay::application::notifier::NotificationQueue;
use mealpay::application::sweeper::ExpirySweeper;
use mealpay::config::{EngineConfig, SweepConfig};
use mealpay::domain::order::{OrderId, UserId};
use mealpay::domain::payment::{CallbackOutcome, PaymentMethod};
use mealpay::domain::ports::{OrderStoreBox, PaymentIntentStoreBox};
use mealpay::error::PaymentError;
use mealpay::infrastructure::gateway::MockGateway;
use mealpay::infrastructure::in_memory::{InMemoryOrderStore, InMemoryPaymentIntentStore};
use mealpay::infrastructure::notify::LoggingDispatcher;
#[cfg(feature = "storage-rocksdb")]
use mealpay::infrastructure::rocksdb::RocksDBStore;
use mealpay::interfaces::csv::order_reader::OrderReader;
use mealpay::interfaces::csv::order_writer::OrderWriter;
use mealpay::interfaces::http::{self, AppState};
use mealpay::telemetry;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Seed orders from CSV, pay each one through the mock gateway and print the outcome.
    Simulate {
        /// Input orders CSV file (order,merchant,user,total,pay_amount)
        input: PathBuf,

        #[arg(long, default_value = "card")]
        method: PaymentMethod,

        #[arg(long, default_value = "success")]
        outcome: CallbackOutcome,

        /// How many times the gateway delivers each callback.
        #[arg(long, default_value_t = 1)]
        deliveries: u32,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Run the HTTP service and the expiry sweeper until Ctrl-C.
    Serve {
        #[arg(long, env = "MEALPAY_BIND", default_value = "127.0.0.1:8080")]
        bind: String,

        /// Orders CSV file to load before serving.
        #[arg(long, env = "MEALPAY_SEED_ORDERS")]
        seed_orders: Option<PathBuf>,

        #[arg(long, env = "MEALPAY_SWEEP_INTERVAL_SECS", default_value_t = 30)]
        sweep_interval_secs: u64,

        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[derive(Args)]
struct EngineArgs {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "MEALPAY_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Seconds a payment intent stays payable.
    #[arg(long, env = "MEALPAY_TTL_SECS", default_value_t = 900)]
    ttl_secs: i64,

    #[arg(long, env = "MEALPAY_LOCK_TIMEOUT_MS", default_value_t = 250)]
    lock_timeout_ms: u64,
}

impl EngineArgs {
    fn config(&self) -> mealpay::error::Result<EngineConfig> {
        let payment_ttl = chrono::Duration::try_seconds(self.ttl_secs).ok_or_else(|| {
            PaymentError::ValidationError(format!(
                "payment TTL of {} seconds is out of range",
                self.ttl_secs
            ))
        })?;
        Ok(EngineConfig {
            payment_ttl,
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            ..EngineConfig::default()
        })
    }
}

fn open_stores(db_path: Option<PathBuf>) -> Result<(OrderStoreBox, PaymentIntentStoreBox)> {
    if let Some(db_path) = db_path {
        #[cfg(feature = "storage-rocksdb")]
        {
            let store = RocksDBStore::open(db_path).into_diagnostic()?;
            return Ok((Box::new(store.clone()), Box::new(store)));
        }

        #[cfg(not(feature = "storage-rocksdb"))]
        {
            let _ = db_path;
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
        }
    }

    Ok((
        Box::new(InMemoryOrderStore::new()),
        Box::new(InMemoryPaymentIntentStore::new()),
    ))
}

fn build_engine(args: &EngineArgs, gateway: MockGateway) -> Result<Arc<LifecycleEngine>> {
    let config = args.config().into_diagnostic()?;
    let (orders, intents) = open_stores(args.db_path.clone())?;
    let (notifications, _worker) =
        NotificationQueue::spawn(Box::new(LoggingDispatcher), config.notification_capacity);
    let engine = LifecycleEngine::new(orders, intents, Arc::new(gateway), notifications)
        .with_config(config)
        .into_diagnostic()?;
    Ok(Arc::new(engine))
}

/// Registers every readable row; returns the owner of each order named in the file.
async fn seed_orders(engine: &LifecycleEngine, path: &Path) -> Result<Vec<(OrderId, UserId)>> {
    let file = File::open(path).into_diagnostic()?;
    let reader = OrderReader::new(file);
    let mut seeded = Vec::new();
    for record in reader.records() {
        let order = match record.and_then(|r| r.into_order(engine.now())) {
            Ok(order) => order,
            Err(e) => {
                eprintln!("Error reading order: {}", e);
                continue;
            }
        };
        let owner = (order.id.clone(), order.user_id.clone());
        match engine.register_order(order).await {
            Ok(()) | Err(PaymentError::DuplicateOrder(_)) => seeded.push(owner),
            Err(e) => eprintln!("Error processing order: {}", e),
        }
    }
    info!(orders = seeded.len(), "seeded orders");
    Ok(seeded)
}

async fn simulate(
    input: PathBuf,
    method: PaymentMethod,
    outcome: CallbackOutcome,
    deliveries: u32,
    args: EngineArgs,
) -> Result<()> {
    let gateway = MockGateway::default()
        .with_delay(Duration::from_millis(5))
        .with_deliveries(deliveries);
    let engine = build_engine(&args, gateway)?;

    let mut pending = Vec::new();
    for (order_id, user_id) in seed_orders(&engine, &input).await? {
        let scheduled = match engine.create_intent(&user_id, &order_id, method).await {
            Ok(created) => {
                LifecycleEngine::simulate_callback(&engine, &created.payment_id, outcome)
            }
            Err(e) => Err(e),
        };
        match scheduled {
            Ok(handle) => pending.push(handle),
            Err(e) => eprintln!("Error processing order: {}", e),
        }
    }
    for handle in pending {
        if let Err(e) = handle.await {
            eprintln!("Error processing order: {}", e);
        }
    }

    let report = engine.expire_stale(engine.now()).await.into_diagnostic()?;
    info!(expired = report.expired, "final expiry sweep");
    engine.flush_notifications().await;

    let orders = engine.all_orders().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = OrderWriter::new(stdout.lock());
    writer.write_orders(orders).into_diagnostic()?;

    Ok(())
}

async fn serve(
    bind: String,
    seed: Option<PathBuf>,
    sweep_interval_secs: u64,
    args: EngineArgs,
) -> Result<()> {
    let engine = build_engine(&args, MockGateway::new(format!("http://{bind}/mock-gateway")))?;
    if let Some(path) = seed {
        seed_orders(&engine, &path).await?;
    }

    let (stop, shutdown) = watch::channel(false);
    let sweeper = ExpirySweeper::new(
        engine.clone(),
        SweepConfig {
            interval: Duration::from_secs(sweep_interval_secs.max(1)),
            ..SweepConfig::default()
        },
    )
    .spawn(shutdown);

    let listener = tokio::net::TcpListener::bind(&bind).await.into_diagnostic()?;
    info!(%bind, "listening");
    axum::serve(listener, http::router(AppState::new(engine.clone())))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .into_diagnostic()?;

    let _ = stop.send(true);
    sweeper.await.into_diagnostic()?;
    engine.flush_notifications().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init("mealpay=info");
    let cli = Cli::parse();

    match cli.command {
        Command::Simulate {
            input,
            method,
            outcome,
            deliveries,
            engine,
        } => simulate(input, method, outcome, deliveries, engine).await,
        Command::Serve {
            bind,
            seed_orders,
            sweep_interval_secs,
            engine,
        } => serve(bind, seed_orders, sweep_interval_secs, engine).await,
    }
}
