//! Application Startup
//!
//! Application building and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::services::{
    AttachmentResolver, AuthGate, IdentityProvider, JwtIdentityProvider, MessageStore,
    PresenceTracker, RoomService,
};
use crate::config::Settings;
use crate::domain::{MessageRepository, PresenceRepository, RoomRepository, UserDirectory};
use crate::infrastructure::database;
use crate::infrastructure::repositories::{
    InMemoryChatStore, PgMessageRepository, PgPresenceRepository, PgRoomRepository,
    PgUserDirectory,
};
use crate::infrastructure::storage::{LocalObjectStore, ObjectStore};
use crate::presentation::http::routes;
use crate::presentation::middleware::{cors, logging};
use crate::presentation::websocket::{ConnectionRegistry, RoomBroker};
use crate::shared::snowflake::SnowflakeGenerator;

/// The repository implementations the engine runs on.
#[derive(Clone)]
pub struct Repositories {
    pub rooms: Arc<dyn RoomRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub users: Arc<dyn UserDirectory>,
    pub presence: Arc<dyn PresenceRepository>,
}

impl Repositories {
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            rooms: Arc::new(PgRoomRepository::new(pool.clone())),
            messages: Arc::new(PgMessageRepository::new(pool.clone())),
            users: Arc::new(PgUserDirectory::new(pool.clone())),
            presence: Arc::new(PgPresenceRepository::new(pool.clone())),
        }
    }

    pub fn in_memory(store: Arc<InMemoryChatStore>) -> Self {
        Self {
            rooms: store.clone(),
            messages: store.clone(),
            users: store.clone(),
            presence: store,
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub auth: Arc<AuthGate>,
    pub rooms: Arc<RoomService>,
    pub messages: Arc<MessageStore>,
    pub presence: Arc<PresenceTracker>,
    pub registry: Arc<ConnectionRegistry>,
    pub broker: Arc<RoomBroker>,
    /// Present when running against PostgreSQL
    pub db: Option<PgPool>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        repositories: Repositories,
        identity: Arc<dyn IdentityProvider>,
        object_store: Arc<dyn ObjectStore>,
        db: Option<PgPool>,
    ) -> Self {
        let ids = Arc::new(SnowflakeGenerator::new(
            settings.snowflake.machine_id as u64,
            settings.snowflake.epoch,
        ));

        let presence = Arc::new(PresenceTracker::new(repositories.presence.clone()));
        let rooms = Arc::new(RoomService::new(
            repositories.rooms.clone(),
            repositories.messages.clone(),
            repositories.users.clone(),
            presence.clone(),
            ids.clone(),
        ));
        let attachments = Arc::new(AttachmentResolver::new(
            object_store,
            settings.attachments.clone(),
        ));
        let messages = Arc::new(MessageStore::new(
            rooms.clone(),
            repositories.messages.clone(),
            attachments,
            ids,
        ));

        let websocket = &settings.websocket;
        let registry = Arc::new(ConnectionRegistry::new(
            presence.clone(),
            Duration::from_secs(websocket.presence_grace_secs),
        ));
        let broker = Arc::new(RoomBroker::new(
            rooms.clone(),
            registry.clone(),
            Duration::from_secs(websocket.typing_ttl_secs),
        ));

        let auth = Arc::new(AuthGate::new(identity, repositories.users.clone()));

        Self {
            settings: Arc::new(settings),
            auth,
            rooms,
            messages,
            presence,
            registry,
            broker,
            db,
        }
    }

    /// State on the in-process store with JWT identity, for single-process
    /// runs and tests.
    pub fn in_memory(settings: Settings, store: Arc<InMemoryChatStore>) -> Self {
        let identity = Arc::new(JwtIdentityProvider::new(&settings.jwt.secret));
        let object_store = Arc::new(LocalObjectStore::new(
            &settings.attachments.storage_root,
            &settings.attachments.public_base_url,
        ));
        Self::new(
            settings,
            Repositories::in_memory(store),
            identity,
            object_store,
            None,
        )
    }
}

/// Spawn the tasks that keep the gateway running: presence fan-out and the
/// typing sweep. They stop when `shutdown` is cancelled.
pub fn spawn_background_tasks(state: &AppState, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
    let presence_task = {
        let mut events = state.presence.subscribe();
        let broker = state.broker.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let change = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    change = events.recv() => change,
                };
                match change {
                    Ok(change) => {
                        if let Err(e) = broker.broadcast_presence(change).await {
                            tracing::warn!(user_id = change.user_id, error = %e, "Presence fan-out failed");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Presence fan-out lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };

    let typing_task = {
        let broker = state.broker.clone();
        let period = Duration::from_millis(state.settings.websocket.typing_sweep_ms.max(1));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let expired = broker.sweep_typing(Instant::now()).await;
                        if expired > 0 {
                            tracing::trace!(expired, "Typing indicators expired");
                        }
                    }
                }
            }
        })
    };

    vec![presence_task, typing_task]
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    state: AppState,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        let state = match settings.database.url.clone() {
            Some(url) => {
                let db = database::create_pool(&settings.database, &url).await?;
                tracing::info!("Database connection pool created");
                if settings.database.run_migrations {
                    database::run_migrations(&db).await?;
                    tracing::info!("Database migrations applied");
                }

                let repositories = Repositories::postgres(&db);
                let identity = Arc::new(JwtIdentityProvider::new(&settings.jwt.secret));
                let object_store = Arc::new(LocalObjectStore::new(
                    &settings.attachments.storage_root,
                    &settings.attachments.public_base_url,
                ));
                AppState::new(settings.clone(), repositories, identity, object_store, Some(db))
            }
            None => {
                tracing::warn!("No database configured, using the in-memory store");
                AppState::in_memory(settings.clone(), Arc::new(InMemoryChatStore::new()))
            }
        };

        let router = Self::router_for_state(state.clone());

        let addr: SocketAddr = settings.server_addr().parse()?;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self {
            listener,
            router,
            state,
        })
    }

    /// The full router with middleware, without binding a socket.
    pub fn router_for_state(state: AppState) -> Router {
        let cors = cors::create_cors_layer(&state.settings.cors);
        routes::create_router(state)
            .layer(logging::create_trace_layer())
            .layer(cors)
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        let shutdown = CancellationToken::new();
        let tasks = spawn_background_tasks(&self.state, shutdown.clone());
        let registry = self.state.registry.clone();

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                tracing::info!("Shutdown signal received");
                registry.cancel_all();
                shutdown.cancel();
            })
            .await?;

        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
