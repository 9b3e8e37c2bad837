use std::sync::Arc;

use fetchline_core::clock::{Clock, SystemClock, Timer, TokioTimer};
use fetchline_core::estimation::{SizeLookup, StaticSizeTable};
use fetchline_events::JobFeed;
use fetchline_registry::{InMemoryRegistry, JobRegistry};
use fetchline_worker::{ArtifactIssuer, HmacArtifactIssuer, JobWorker};

use crate::config::ServerConfig;
use crate::delivery::{DeliveryCoordinator, DeliveryLatches};
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone; everything inside is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub clock: Arc<dyn Clock>,
    pub registry: Arc<dyn JobRegistry>,
    pub sizes: Arc<dyn SizeLookup>,
    pub worker: JobWorker,
    pub delivery: Arc<DeliveryCoordinator>,
    pub ws_manager: Arc<WsManager>,
}

impl AppState {
    pub fn builder(config: ServerConfig) -> AppStateBuilder {
        AppStateBuilder {
            config,
            clock: None,
            timer: None,
            sizes: None,
            issuer: None,
        }
    }
}

/// Wires the registry, its observers, the worker and the coordinator.
///
/// Every collaborator defaults to its production implementation.
pub struct AppStateBuilder {
    config: ServerConfig,
    clock: Option<Arc<dyn Clock>>,
    timer: Option<Arc<dyn Timer>>,
    sizes: Option<Arc<dyn SizeLookup>>,
    issuer: Option<Arc<dyn ArtifactIssuer>>,
}

impl AppStateBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn sizes(mut self, sizes: Arc<dyn SizeLookup>) -> Self {
        self.sizes = Some(sizes);
        self
    }

    pub fn issuer(mut self, issuer: Arc<dyn ArtifactIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    pub fn build(self) -> AppState {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let timer = self.timer.unwrap_or_else(|| Arc::new(TokioTimer));
        let sizes = self
            .sizes
            .unwrap_or_else(|| Arc::new(StaticSizeTable::builtin()));
        let issuer = self.issuer.unwrap_or_else(|| {
            Arc::new(HmacArtifactIssuer::new(
                config.artifact_base_url.clone(),
                config.artifact_signing_secret.clone(),
                config.artifact_url_ttl(),
                Arc::clone(&clock),
            ))
        });

        let feed = Arc::new(JobFeed::new());
        let latches = Arc::new(DeliveryLatches::new());
        let registry: Arc<dyn JobRegistry> = Arc::new(
            InMemoryRegistry::new(Arc::clone(&clock), config.job_retention())
                .with_observer(feed.clone())
                .with_observer(latches.clone()),
        );

        let worker = JobWorker::new(Arc::clone(&registry), issuer, timer);
        let delivery = Arc::new(DeliveryCoordinator::new(
            Arc::clone(&registry),
            feed,
            latches,
            config.push_timeout(),
        ));

        AppState {
            config: Arc::new(config),
            clock,
            registry,
            sizes,
            worker,
            delivery,
            ws_manager: Arc::new(WsManager::new()),
        }
    }
}
