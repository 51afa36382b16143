use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::checkout::CheckoutService;
use crate::core::Config;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::db::DbService;
use crate::db::repository::transaction;
use crate::payment::{MpesaGateway, PaymentGateway, Reconciler};
use crate::receipt::ReceiptService;
use crate::utils::now_millis;

/// Server state shared by every handler.
///
/// Cloning is cheap; all services sit behind `Arc`.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub db: DbService,
    pub gateway: Arc<dyn PaymentGateway>,
    pub receipts: Arc<ReceiptService>,
    pub checkout: Arc<CheckoutService>,
    pub reconciler: Arc<Reconciler>,
    /// Serializes payment attempt registration across checkout and the
    /// payment initiation endpoint
    pub attempt_lock: Arc<Mutex<()>>,
    tasks: Arc<Mutex<Option<BackgroundTasks>>>,
}

impl ServerState {
    /// Initialize the full state: work directory, database, gateway,
    /// receipt pipeline, checkout orchestrator and reconciler.
    pub async fn initialize(config: &Config) -> Result<Self, crate::utils::AppError> {
        let gateway: Arc<dyn PaymentGateway> = Arc::new(MpesaGateway::new(
            config.mpesa.clone(),
            &config.public_base_url,
            config.timezone,
        ));
        Self::initialize_with_gateway(config, gateway).await
    }

    /// Initialize with a caller-supplied gateway.
    ///
    /// Tests inject a stub gateway through this entry point.
    pub async fn initialize_with_gateway(
        config: &Config,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Result<Self, crate::utils::AppError> {
        config
            .ensure_work_dir()
            .map_err(|e| crate::utils::AppError::Internal(format!("work dir: {e}")))?;

        let db_path = config.database_dir().join("fidpos.db");
        let db = DbService::new(&db_path.to_string_lossy()).await?;

        let receipts = Arc::new(ReceiptService::from_config(config));
        let attempt_lock = Arc::new(Mutex::new(()));
        let checkout = Arc::new(CheckoutService::new(
            db.pool.clone(),
            receipts.clone(),
            gateway.clone(),
            attempt_lock.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(db.pool.clone()));

        Ok(Self {
            config: Arc::new(config.clone()),
            db,
            gateway,
            receipts,
            checkout,
            reconciler,
            attempt_lock,
            tasks: Arc::new(Mutex::new(Some(BackgroundTasks::new()))),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db.pool
    }

    /// Start the background tasks: the payment expiry sweep and the
    /// periodic database backup. Must be called before `Server::run()`.
    pub async fn start_background_tasks(&self) {
        let mut guard = self.tasks.lock().await;
        let Some(tasks) = guard.as_mut() else {
            warn!("Background tasks already shut down");
            return;
        };

        let token = tasks.shutdown_token();
        tasks.spawn(
            "payment_expiry_sweep",
            TaskKind::Periodic,
            expiry_sweep_loop(
                self.db.pool.clone(),
                self.config.payment_expiry_secs,
                token.clone(),
            ),
        );
        tasks.spawn(
            "database_backup",
            TaskKind::Periodic,
            backup_loop(
                self.db.pool.clone(),
                self.config.backups_dir(),
                self.config.backup_interval_secs,
                self.config.timezone,
                token,
            ),
        );

        info!(count = tasks.len(), "Background tasks started");
    }

    /// Cancel the background tasks and wait for them to stop.
    pub async fn shutdown_background_tasks(&self) {
        if let Some(tasks) = self.tasks.lock().await.take() {
            tasks.shutdown().await;
        }
    }
}

/// Periodically fail payment attempts whose confirmation window has
/// closed, so abandoned STK prompts don't pin transactions in
/// AWAITING_PAYMENT forever.
async fn expiry_sweep_loop(pool: SqlitePool, expiry_secs: u64, token: CancellationToken) {
    // Sweep well inside the window so attempts expire close to on time
    let sweep_every = std::time::Duration::from_secs((expiry_secs / 4).clamp(5, 60));
    let mut interval = tokio::time::interval(sweep_every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                let cutoff = now_millis() - (expiry_secs as i64) * 1000;
                match transaction::expire_awaiting(&pool, cutoff).await {
                    Ok(0) => {}
                    Ok(n) => info!(expired = n, "Expired stale payment attempts"),
                    Err(e) => error!(error = %e, "Payment expiry sweep failed"),
                }
            }
        }
    }
}

/// Periodic online backup via `VACUUM INTO`.
async fn backup_loop(
    pool: SqlitePool,
    backups_dir: std::path::PathBuf,
    interval_secs: u64,
    timezone: chrono_tz::Tz,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(60)));
    // First tick fires immediately; skip it so startup stays quick
    interval.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                let stamp = chrono::Utc::now()
                    .with_timezone(&timezone)
                    .format("%Y%m%d-%H%M%S");
                let target = backups_dir.join(format!("fidpos-{stamp}.db"));
                let sql = format!("VACUUM INTO '{}'", target.to_string_lossy());
                match sqlx::query(&sql).execute(&pool).await {
                    Ok(_) => info!(path = %target.display(), "Database backup written"),
                    Err(e) => error!(error = %e, "Database backup failed"),
                }
            }
        }
    }
}
