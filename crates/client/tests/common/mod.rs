#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fetchline_api::config::ServerConfig;
use fetchline_api::router::build_app_router;
use fetchline_api::state::{AppState, AppStateBuilder};
use fetchline_client::ClientConfig;
use fetchline_core::clock::{ManualClock, ScaledTimer};
use fetchline_core::delivery::Transport;
use fetchline_core::job_events::StatusMessage;

/// A server on a loopback port plus the handles tests poke at.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
}

impl TestServer {
    pub async fn start(
        config: ServerConfig,
        configure: impl FnOnce(AppStateBuilder) -> AppStateBuilder,
    ) -> Self {
        let clock = Arc::new(ManualClock::starting_now());
        let state = configure(AppState::builder(config).clock(clock.clone())).build();
        let router = build_app_router(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { addr, state, clock }
    }

    /// Server whose worker runs `factor` times real time.
    pub async fn scaled(config: ServerConfig, factor: f64) -> Self {
        Self::start(config, |b| b.timer(Arc::new(ScaledTimer::new(factor)))).await
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            poll_interval: Duration::from_millis(50),
            ..ClientConfig::new(format!("http://{}", self.addr))
        }
    }
}

pub fn server_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..ServerConfig::default()
    }
}

/// Everything the driver callbacks saw.
#[derive(Default, Clone)]
pub struct Recorder {
    pub updates: Arc<Mutex<Vec<(Transport, StatusMessage)>>>,
    pub terminals: Arc<Mutex<Vec<StatusMessage>>>,
}

impl Recorder {
    pub fn on_update(&self) -> impl FnMut(Transport, &StatusMessage) {
        let updates = self.updates.clone();
        move |transport, msg| updates.lock().unwrap().push((transport, msg.clone()))
    }

    pub fn on_terminal(&self) -> impl FnOnce(&StatusMessage) {
        let terminals = self.terminals.clone();
        move |msg| terminals.lock().unwrap().push(msg.clone())
    }

    pub fn updates(&self) -> Vec<(Transport, StatusMessage)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn terminals(&self) -> Vec<StatusMessage> {
        self.terminals.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<u8> {
        self.updates().iter().map(|(_, m)| m.progress).collect()
    }
}
