use std::future::Future;
use std::sync::Arc;

use countersign_core::config::{AppConfig, LoadOptions};
use countersign_core::{
    ApprovalEngine, Principal, PrincipalDirectory, PrincipalId, QueryService, TracingAuditSink,
};
use countersign_db::{
    connect_with_config, migrations, DbPool, SqlApplicationRepository, SqlPrincipalDirectory,
};

use super::CommandFailure;

pub type Engine =
    ApprovalEngine<Arc<SqlApplicationRepository>, Arc<SqlPrincipalDirectory>, TracingAuditSink>;

/// Everything a command needs once configuration and storage are up.
pub struct CommandContext {
    pub config: AppConfig,
    pub pool: DbPool,
    pub engine: Engine,
    pub queries: QueryService<Arc<SqlApplicationRepository>>,
    pub directory: Arc<SqlPrincipalDirectory>,
}

impl CommandContext {
    /// Connects and applies pending migrations so every command sees the current schema.
    pub async fn open(config: AppConfig) -> Result<Self, CommandFailure> {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| CommandFailure::new("db_connectivity", error.to_string(), 4))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| CommandFailure::new("migration", error.to_string(), 5))?;

        let repository = Arc::new(SqlApplicationRepository::new(pool.clone()));
        let directory = Arc::new(SqlPrincipalDirectory::new(pool.clone()));
        let engine = ApprovalEngine::from_config(
            &config.workflow,
            repository.clone(),
            directory.clone(),
            TracingAuditSink,
        );
        let queries = QueryService::new(repository);

        Ok(Self { config, pool, engine, queries, directory })
    }

    /// Resolves the `--as` principal. Unknown ids are refused before any engine call.
    pub async fn actor(&self, id: &str) -> Result<Principal, CommandFailure> {
        let principal = self
            .directory
            .lookup(&PrincipalId::new(id))
            .await
            .map_err(|error| CommandFailure::new("storage", error.to_string(), 14))?;

        principal.ok_or_else(|| {
            CommandFailure::new(
                "permission_denied",
                format!("principal `{id}` is not registered; run `countersign seed` or provision it"),
                11,
            )
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

pub fn load_config(options: &LoadOptions) -> Result<AppConfig, CommandFailure> {
    AppConfig::load(options.clone()).map_err(|error| {
        CommandFailure::new("config_validation", format!("configuration issue: {error}"), 2)
    })
}

/// Loads config, builds a current-thread runtime, opens the context and runs `step` on it.
pub fn run_with_context<T, F, Fut>(options: &LoadOptions, step: F) -> Result<T, CommandFailure>
where
    F: FnOnce(Arc<CommandContext>) -> Fut,
    Fut: Future<Output = Result<T, CommandFailure>>,
{
    let config = load_config(options)?;
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
        |error| {
            CommandFailure::new(
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        },
    )?;

    runtime.block_on(async move {
        let context = Arc::new(CommandContext::open(config).await?);
        let result = step(context.clone()).await;
        if let Ok(context) = Arc::try_unwrap(context) {
            context.close().await;
        }
        result
    })
}
