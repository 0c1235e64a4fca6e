use crate::cache::{CacheSettings, CacheStore, Clock, EntityCache, EntityKind, MemoryStore, SystemClock};
use crate::cli::ServiceName;
use crate::config::Config;
use crate::data::PgCacheStore;
use crate::models::{Commodity, Item, Mob, Recipe, ServerStatus, Vehicle};
use crate::services::bot::BotService;
use crate::services::manager::ServiceManager;
use crate::services::warmer::WarmerService;
use crate::state::{AppState, Caches, ServiceStatus};
use crate::upstream::codex::CodexClient;
use crate::upstream::ror::RorClient;
use crate::upstream::uex::UexClient;
use crate::upstream::{Fetcher, HttpClient, Unconfigured};
use crate::utils::fmt_duration;
use anyhow::Context;
use figment::{Figment, providers::Env};
use sqlx::ConnectOptions;
use sqlx::postgres::PgPoolOptions;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Load configuration from the environment.
pub fn load_config() -> Result<Config, anyhow::Error> {
    Figment::new()
        .merge(Env::raw())
        .extract()
        .context("Failed to load config")
}

/// Main application struct containing all necessary components
pub struct App {
    config: Config,
    app_state: AppState,
    service_manager: ServiceManager,
}

impl App {
    /// Create a new App instance with all necessary components initialized
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let db_pool = match &config.database_url {
            Some(url) => Some(Self::connect_database(url).await?),
            None => {
                warn!("DATABASE_URL not set, caching in process memory only");
                None
            }
        };

        let store: Arc<dyn CacheStore> = match &db_pool {
            Some(pool) => Arc::new(PgCacheStore::new(pool.clone())),
            None => Arc::new(MemoryStore::new()),
        };

        let caches = Self::build_caches(&config, store)?;
        let app_state = AppState::new(caches, db_pool);
        let service_manager = ServiceManager::new(app_state.service_statuses.clone());

        Ok(App {
            config,
            app_state,
            service_manager,
        })
    }

    async fn connect_database(url: &str) -> Result<sqlx::PgPool, anyhow::Error> {
        let connect_options = sqlx::postgres::PgConnectOptions::from_str(url)
            .context("Failed to parse database URL")?
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

        let slow_threshold = Duration::from_millis(500);
        let db_pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(4)
            .acquire_slow_threshold(slow_threshold)
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(Duration::from_secs(60 * 2))
            .max_lifetime(Duration::from_secs(60 * 30))
            .connect_with(connect_options)
            .await
            .context("Failed to create database pool")?;

        info!(
            max_connections = 4,
            acquire_timeout = "4s",
            acquire_slow_threshold = fmt_duration(slow_threshold),
            "database pool established"
        );

        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed successfully");

        Ok(db_pool)
    }

    /// One HTTP client (and rate limiter) per upstream, one cache per kind.
    fn build_caches(config: &Config, store: Arc<dyn CacheStore>) -> Result<Caches, anyhow::Error> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let http = || HttpClient::new(config.fetch_timeout, config.upstream_rate_limit);

        let codex = match &config.codex_base_url {
            Some(base_url) => {
                let client = CodexClient::new(
                    http().context("Failed to create codex HTTP client")?,
                    base_url.clone(),
                    config.codex_api_key.clone(),
                    config.codex_page_size,
                );
                Some(Arc::new(client))
            }
            None => {
                warn!("CODEX_BASE_URL not set, Ashes of Creation lookups are disabled");
                None
            }
        };
        let uex = Arc::new(UexClient::new(
            http().context("Failed to create UEX HTTP client")?,
            config.uex_base_url.clone(),
        ));
        let ror = match &config.ror_status_url {
            Some(url) => Some(Arc::new(
                RorClient::new(http().context("Failed to create RoR HTTP client")?, url)
                    .context("Failed to create RoR client")?,
            )),
            None => {
                warn!("ROR_STATUS_URL not set, server status lookups are disabled");
                None
            }
        };

        let unconfigured = |upstream: &'static str| Arc::new(Unconfigured { upstream });
        let item_fetcher: Arc<dyn Fetcher<Item>> = match &codex {
            Some(c) => c.clone(),
            None => unconfigured("codex"),
        };
        let recipe_fetcher: Arc<dyn Fetcher<Recipe>> = match &codex {
            Some(c) => c.clone(),
            None => unconfigured("codex"),
        };
        let mob_fetcher: Arc<dyn Fetcher<Mob>> = match &codex {
            Some(c) => c.clone(),
            None => unconfigured("codex"),
        };
        let server_fetcher: Arc<dyn Fetcher<ServerStatus>> = match ror {
            Some(r) => r,
            None => unconfigured("realm status"),
        };

        let commodity_fetcher: Arc<dyn Fetcher<Commodity>> = uex.clone();
        let vehicle_fetcher: Arc<dyn Fetcher<Vehicle>> = uex;

        let settings = |kind: EntityKind| -> CacheSettings {
            let settings = config.cache_settings(kind);
            info!(
                kind = %kind,
                ttl = fmt_duration(settings.ttl),
                threshold = settings.threshold,
                "cache configured"
            );
            settings
        };

        Ok(Caches {
            items: Arc::new(EntityCache::new(store.clone(), item_fetcher, clock.clone(), settings(EntityKind::Item))),
            recipes: Arc::new(EntityCache::new(
                store.clone(),
                recipe_fetcher,
                clock.clone(),
                settings(EntityKind::Recipe),
            )),
            mobs: Arc::new(EntityCache::new(store.clone(), mob_fetcher, clock.clone(), settings(EntityKind::Mob))),
            commodities: Arc::new(EntityCache::new(
                store.clone(),
                commodity_fetcher,
                clock.clone(),
                settings(EntityKind::Commodity),
            )),
            vehicles: Arc::new(EntityCache::new(
                store.clone(),
                vehicle_fetcher,
                clock.clone(),
                settings(EntityKind::Vehicle),
            )),
            servers: Arc::new(EntityCache::new(store, server_fetcher, clock, settings(EntityKind::Server))),
        })
    }

    /// Register the warmer service if enabled
    pub fn setup_services(&mut self, services: &[ServiceName]) -> Result<(), anyhow::Error> {
        if services.contains(&ServiceName::Warmer) {
            let warmer = WarmerService::new(
                self.app_state.caches.warm_targets(),
                self.app_state.db_pool.clone(),
                self.app_state.service_statuses.clone(),
            );
            self.service_manager.register_service(Box::new(warmer));
        }
        Ok(())
    }

    /// Setup bot service if enabled and a token is configured
    pub async fn setup_bot_service(&mut self) -> Result<(), anyhow::Error> {
        let Some(token) = self.config.bot_token.clone() else {
            warn!("BOT_TOKEN not set, Discord bot is disabled");
            self.app_state
                .service_statuses
                .set(ServiceName::Bot.as_str(), ServiceStatus::Disabled);
            return Ok(());
        };

        let client = BotService::create_client(&token, self.app_state.clone())
            .await
            .context("Failed to create Discord client")?;
        let bot_service = BotService::new(client, self.app_state.service_statuses.clone());
        self.service_manager.register_service(Box::new(bot_service));
        Ok(())
    }

    /// Start all registered services
    pub fn start_services(&mut self) -> Result<(), anyhow::Error> {
        if !self.service_manager.has_services() {
            error!("No services enabled. Cannot start application.");
            return Err(anyhow::anyhow!("No services enabled"));
        }
        self.service_manager.spawn_all();
        Ok(())
    }

    /// Run the application and handle shutdown signals
    pub async fn run(self) -> ExitCode {
        use crate::services::signals::handle_shutdown_signals;
        handle_shutdown_signals(self.service_manager, self.config.shutdown_timeout).await
    }
}
