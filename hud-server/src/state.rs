//! Application state management

use hud_adapters::Protocol;
use hud_core::targets::DEFAULT_IGNORE_RADIUS_MI;
use hud_core::{Aircraft, AircraftDelta, DecoderStats};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

/// Diagnostic view of one configured input
#[derive(Clone, Debug, Serialize)]
pub struct InputStatus {
    pub name: String,
    pub protocol: Protocol,
    pub source: String,
    pub running: bool,
    pub stats: DecoderStats,
    pub error: Option<String>,
    /// Raised to stop the reader thread. Readers also raise it themselves
    /// on an I/O fault.
    #[serde(skip)]
    pub must_exit: Arc<AtomicBool>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Sample collections and traffic. Written only by the fusion actor
    /// and the target endpoints.
    pub aircraft: Arc<RwLock<Aircraft>>,

    /// One entry per configured input, in configuration order
    pub inputs: Arc<RwLock<Vec<InputStatus>>>,

    /// Slots touched by every applied batch, for SSE subscribers
    pub telemetry_tx: broadcast::Sender<Arc<AircraftDelta>>,

    /// Cancelled once on shutdown; the fusion actor runs until then
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(ignore_radius_mi: f64) -> Self {
        // room for ~100 batches before slow subscribers start lagging
        let (telemetry_tx, _) = broadcast::channel(100);

        Self {
            aircraft: Arc::new(RwLock::new(Aircraft::new(ignore_radius_mi))),
            inputs: Arc::new(RwLock::new(Vec::new())),
            telemetry_tx,
            shutdown: CancellationToken::new(),
        }
    }

    /// Add an input and return its index and stop flag
    pub async fn register_input(
        &self,
        name: &str,
        protocol: Protocol,
        source: String,
    ) -> (usize, Arc<AtomicBool>) {
        let must_exit = Arc::new(AtomicBool::new(false));
        let mut inputs = self.inputs.write().await;
        inputs.push(InputStatus {
            name: name.to_string(),
            protocol,
            source,
            running: true,
            stats: DecoderStats::default(),
            error: None,
            must_exit: must_exit.clone(),
        });
        (inputs.len() - 1, must_exit)
    }

    /// Ask every reader to stop
    pub async fn stop_all_inputs(&self) {
        for input in self.inputs.read().await.iter() {
            input.must_exit.store(true, Ordering::Relaxed);
        }
    }

    /// Subscribe to per-batch telemetry changes
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AircraftDelta>> {
        self.telemetry_tx.subscribe()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORE_RADIUS_MI)
    }
}
