use std::error::Error;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter};

use cfs_server::api;
use cfs_server::collab::configmap::K8sConfigMapStore;
use cfs_server::collab::secret_store::VaultSecretStore;
use cfs_server::collab::tenant_service::HttpTenantService;
use cfs_server::component::ComponentRegistry;
use cfs_server::configuration::{ConfigurationRegistry, VcsDefaults};
use cfs_server::event::{EventBus, RedisEventTransport};
use cfs_server::health::HealthProbe;
use cfs_server::kv::backend::RedisKvBackend;
use cfs_server::kv::{KvBackend, KvStore};
use cfs_server::migration::MigrationPass;
use cfs_server::options::OptionsCache;
use cfs_server::session::SessionFSM;
use cfs_server::source::SourceRegistry;
use cfs_server::source_resolver::SourceResolver;
use cfs_server::tenancy::TenancyGate;

/// Redis logical database indices, one per keyspace, matching the
/// original `DATABASES` ordering (options, sessions, components,
/// configurations, sources).
const DB_OPTIONS: i64 = 0;
const DB_SESSIONS: i64 = 1;
const DB_COMPONENTS: i64 = 2;
const DB_CONFIGURATIONS: i64 = 3;
const DB_SOURCES: i64 = 4;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

struct AppConfig {
    redis_url: String,
    db_busy_seconds: u64,
    kv_batch_size: usize,
    starting_log_level: String,
    vcs_username: String,
    vcs_password: String,
    git_ssl_cainfo: String,
    vault_addr: String,
    tenant_service_addr: String,
    ara_url: String,
    server_host: String,
    server_port: u16,
    options_refresh_interval_seconds: u64,
}

impl AppConfig {
    fn from_env() -> Self {
        Self {
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            db_busy_seconds: env_parse("DB_BUSY_SECONDS", 60),
            kv_batch_size: env_parse("KV_BATCH_SIZE", 100),
            starting_log_level: env_or("STARTING_LOG_LEVEL", "info"),
            vcs_username: env_or("VCS_USERNAME", ""),
            vcs_password: env_or("VCS_PASSWORD", ""),
            git_ssl_cainfo: env_or("GIT_SSL_CAINFO", "/etc/ssl/certs/ca-certificates.crt"),
            vault_addr: env_or("VAULT_ADDR", "http://127.0.0.1:8200"),
            tenant_service_addr: env_or("TENANT_SERVICE_ADDR", "http://127.0.0.1:8080"),
            ara_url: env_or("ARA_URL", "https://ara.cfs.svc.cluster.local"),
            server_host: env_or("SERVER_HOST", "0.0.0.0"),
            server_port: env_parse("SERVER_PORT", 8888),
            options_refresh_interval_seconds: env_parse("OPTIONS_REFRESH_INTERVAL_SECONDS", 30),
        }
    }
}

fn init_logging(starting_level: &str) -> reload::Handle<EnvFilter, tracing_subscriber::Registry> {
    let filter = EnvFilter::try_new(starting_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer().with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339()))
        .init();
    handle
}

fn keyspace_store(url: &str, db_index: i64, busy_seconds: u64, batch_size: usize) -> Result<Arc<KvStore>, Box<dyn Error>> {
    let backend: Arc<dyn KvBackend> = Arc::new(RedisKvBackend::connect(url, db_index)?);
    Ok(Arc::new(KvStore::new(backend, busy_seconds, batch_size)))
}

/// Periodically refreshes [`OptionsCache`] even when no HTTP traffic is
/// flowing, so a stored `logging_level` change takes effect without
/// waiting on the next request, per spec.md §5's "additional background
/// refresher".
fn spawn_background_refresher(options: Arc<OptionsCache>, interval: Duration) {
    std::thread::spawn(move || loop {
        std::thread::sleep(interval);
        if let Err(err) = options.refresh() {
            warn!(error = %err, "background options refresh failed");
        }
    });
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::from_env();
    let log_reload = init_logging(&config.starting_log_level);

    let options_store = keyspace_store(&config.redis_url, DB_OPTIONS, config.db_busy_seconds, config.kv_batch_size)?;
    let components_store =
        keyspace_store(&config.redis_url, DB_COMPONENTS, config.db_busy_seconds, config.kv_batch_size)?;
    let configurations_store =
        keyspace_store(&config.redis_url, DB_CONFIGURATIONS, config.db_busy_seconds, config.kv_batch_size)?;
    let sources_store = keyspace_store(&config.redis_url, DB_SOURCES, config.db_busy_seconds, config.kv_batch_size)?;
    let sessions_store = keyspace_store(&config.redis_url, DB_SESSIONS, config.db_busy_seconds, config.kv_batch_size)?;

    let options = Arc::new(OptionsCache::new(options_store.clone(), Some(log_reload))?);

    info!("running startup migration pass");
    let migration = MigrationPass::new(
        options_store.clone(),
        components_store.clone(),
        configurations_store.clone(),
        sessions_store.clone(),
    );
    let report = tokio::task::spawn_blocking(move || migration.run()).await??;
    info!(?report, "migration pass complete");

    let event_bus = Arc::new(EventBus::new(Arc::new(RedisEventTransport::new(
        config.redis_url.clone(),
        Duration::from_secs(2),
    ))));

    let secrets = Arc::new(VaultSecretStore::new(config.vault_addr.clone())?);
    let tenant_service = Arc::new(HttpTenantService::new(config.tenant_service_addr.clone())?);

    // Dedicated runtime for the kube client's async calls, invoked from
    // actix worker threads via `web::block`'s blocking pool -- kept separate
    // from the actix-web reactor so a slow cluster API call never starves it.
    let k8s_runtime = Arc::new(tokio::runtime::Runtime::new()?);
    let configmaps = Arc::new(K8sConfigMapStore::try_new(k8s_runtime)?);

    let resolver = Arc::new(SourceResolver::new(config.git_ssl_cainfo.clone()));
    let vcs_defaults = VcsDefaults {
        username: config.vcs_username.clone(),
        password: config.vcs_password.clone(),
    };

    let configurations = Arc::new(ConfigurationRegistry::new(
        configurations_store.clone(),
        sources_store.clone(),
        components_store.clone(),
        resolver,
        secrets.clone(),
        configmaps,
        vcs_defaults,
    ));
    let sources = Arc::new(SourceRegistry::new(
        sources_store,
        configurations_store.clone(),
        secrets,
        options.clone(),
    ));
    let components = Arc::new(ComponentRegistry::new(components_store, configurations_store, config.ara_url.clone()));
    let sessions = Arc::new(SessionFSM::new(sessions_store, event_bus.clone()));
    let health = Arc::new(HealthProbe::new(options_store, event_bus));
    let tenancy = Arc::new(TenancyGate::new(tenant_service));

    spawn_background_refresher(
        options.clone(),
        Duration::from_secs(config.options_refresh_interval_seconds),
    );

    let state = web::Data::new(api::AppState {
        options: options.clone(),
        components,
        configurations,
        sources,
        sessions,
        health,
        tenancy,
    });

    info!(host = %config.server_host, port = config.server_port, "starting CFS HTTP server");
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(|cfg| api::configure(cfg, options.clone()))
    })
    .bind((config.server_host.as_str(), config.server_port))
    .inspect_err(|err| error!(error = %err, "failed to bind HTTP server"))?
    .run();

    server.await?;
    info!("CFS server exited");
    Ok(())
}
