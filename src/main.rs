use std::{process, sync::Arc};

use docvault::{
    application::{
        counters::{recount_collection, recount_document},
        entity_manager::Commit,
        error::AppError,
        filter::{Direction, Query},
        hooks::{HookName, HookRegistry, Payload},
        repos::Database,
        scope::{RequestContext, RequestScope},
    },
    cache::{CacheConfig, CacheManager},
    config,
    domain::entities::{Collection, Document},
    extensions,
    infra::{db, error::InfraError, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(origin = report.source, chain = ?report.messages, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(origin = report.source, chain = ?report.messages, "application error");
    });
}

/// Long-lived parts every request scope is built from.
struct Runtime {
    database: Arc<dyn Database>,
    cache: CacheManager,
    hooks: Arc<HookRegistry>,
}

impl Runtime {
    async fn start(settings: &config::Settings) -> Result<Self, AppError> {
        let database = db::connect(&settings.database).await?;
        let cache = CacheManager::in_memory(&CacheConfig::from(&settings.cache));
        let hooks = HookRegistry::from_config(&settings.hooks, &extensions::catalog())?;
        Ok(Self {
            database,
            cache,
            hooks: Arc::new(hooks),
        })
    }

    fn scope(&self) -> RequestScope {
        RequestScope::new(
            Arc::clone(&self.database),
            self.cache.clone(),
            Arc::clone(&self.hooks),
            RequestContext::new(),
        )
    }
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;
    let runtime = Runtime::start(&settings).await?;

    let mut startup = runtime.scope();
    startup.dispatch(HookName::AfterStartup, Payload::Empty).await?;
    startup.commit().await?;

    match cli_args.command.unwrap_or_default() {
        config::Command::Check(_) => run_check(&runtime).await,
        config::Command::Recount(args) => run_recount(&runtime, args.collection).await,
    }
}

async fn run_check(runtime: &Runtime) -> Result<(), AppError> {
    runtime
        .database
        .health_check()
        .await
        .map_err(InfraError::HealthCheck)?;
    info!(
        extensions = ?runtime.hooks.extensions(),
        cache_enabled = runtime.cache.is_enabled(),
        "durable store reachable"
    );
    Ok(())
}

/// Recompute counters one collection per unit of work.
async fn run_recount(runtime: &Runtime, only: Option<i64>) -> Result<(), AppError> {
    let mut scope = runtime.scope();
    let collection_ids: Vec<i64> = match only {
        Some(id) => vec![id],
        None => scope
            .repository::<Collection>()
            .select_all(Query::all().order_by(Collection::ID, Direction::Asc))
            .await?
            .iter()
            .filter_map(|collection| collection.id)
            .collect(),
    };
    scope.commit().await?;

    let mut documents_total = 0usize;
    for collection_id in &collection_ids {
        let result = recount_one(&mut scope, *collection_id).await;
        match result {
            Ok(count) => {
                scope.commit().await?;
                documents_total += count;
            }
            Err(err) => {
                scope.rollback().await?;
                return Err(err);
            }
        }
    }

    info!(
        collections = collection_ids.len(),
        documents = documents_total,
        "counters recomputed"
    );
    Ok(())
}

async fn recount_one(scope: &mut RequestScope, collection_id: i64) -> Result<usize, AppError> {
    let cache = scope.cache().clone();
    let documents = scope
        .repository::<Document>()
        .select_all(Query::all().filter(Document::COLLECTION_ID.eq(collection_id)))
        .await?;
    for document in &documents {
        if let Some(id) = document.id {
            recount_document(scope.entity_manager(), &cache, id, Commit::Deferred).await?;
        }
    }
    recount_collection(scope.entity_manager(), &cache, collection_id, Commit::Deferred)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(documents.len())
}
