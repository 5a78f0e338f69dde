//! Input lifecycle manager
//!
//! This module handles:
//! - Opening byte sources and decoders for each configured input
//! - One reader thread per input, decoding frames and forwarding updates
//! - The fusion actor that applies updates to the shared aircraft,
//!   sweeps stale targets and broadcasts what each batch changed

use crate::config::{Config, InputConfig, SourceConfig};
use crate::state::AppState;
use anyhow::{Context, Result};
use chrono::Utc;
use hud_adapters::source::{CaptureSource, FileSource, SerialSource, UdpSource};
use hud_core::{
    ByteSource, DecodeOutcome, DecoderStats, SampleKind, SampleSlots, SourceKind, TelemetryDecoder,
    TelemetryUpdate,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Pause between empty polls of a non-blocking source
const IDLE_POLL: Duration = Duration::from_millis(5);

const FUSION_QUEUE: usize = 256;

/// Messages from reader threads to the fusion actor
#[derive(Debug)]
pub enum FusionMsg {
    Updates {
        input: usize,
        slots: SampleSlots,
        updates: Vec<TelemetryUpdate>,
        stats: DecoderStats,
    },
    Stopped {
        input: usize,
        stats: DecoderStats,
        error: Option<String>,
    },
}

/// Open the byte source an input is configured for, with the capture tee
/// applied when requested
pub fn open_source(input: &InputConfig) -> Result<Box<dyn ByteSource>> {
    let source: Box<dyn ByteSource> = match &input.source {
        SourceConfig::Serial { port, baud } => Box::new(SerialSource::open(port, *baud)?),
        SourceConfig::Udp { port } => Box::new(UdpSource::bind(*port)?),
        SourceConfig::File { path } => Box::new(FileSource::open(path)?),
    };
    match &input.capture_file {
        Some(path) => Ok(Box::new(CaptureSource::new(source, path)?)),
        None => Ok(source),
    }
}

/// Register every configured input and start its reader thread.
///
/// An input whose source fails to open is recorded as stopped with the
/// error; the others still start.
pub async fn start_inputs(
    state: &AppState,
    config: &Config,
    tx: mpsc::Sender<FusionMsg>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();
    for input in &config.inputs {
        let (index, must_exit) = state
            .register_input(&input.name, input.protocol, input.source.to_string())
            .await;

        let source = match open_source(input) {
            Ok(s) => s,
            Err(e) => {
                error!(input = %input.name, "failed to open source: {:#}", e);
                let mut inputs = state.inputs.write().await;
                if let Some(status) = inputs.get_mut(index) {
                    status.running = false;
                    status.error = Some(format!("{:#}", e));
                }
                continue;
            }
        };

        let decoder = input.protocol.decoder(&input.options);
        let slots = state.aircraft.write().await.register(decoder.provides());
        match spawn_reader(index, input, decoder, source, slots, must_exit, tx.clone()) {
            Ok(handle) => handles.push(handle),
            Err(e) => error!(input = %input.name, "failed to spawn reader: {:#}", e),
        }
    }
    handles
}

/// Start the reader loop for one input on its own OS thread
pub fn spawn_reader(
    index: usize,
    input: &InputConfig,
    decoder: Box<dyn TelemetryDecoder>,
    source: Box<dyn ByteSource>,
    slots: SampleSlots,
    must_exit: Arc<AtomicBool>,
    tx: mpsc::Sender<FusionMsg>,
) -> Result<JoinHandle<()>> {
    let name = input.name.clone();
    let delay = input.playback_delay;
    info!(input = %name, protocol = %input.protocol, source = %input.source, "starting input");
    std::thread::Builder::new()
        .name(format!("input-{}", name))
        .spawn(move || reader_loop(index, decoder, source, slots, must_exit, delay, tx))
        .context("spawning reader thread")
}

/// Decode until told to stop or the source fails.
///
/// Runs on a plain thread: byte sources block for up to their timeout.
pub fn reader_loop(
    index: usize,
    mut decoder: Box<dyn TelemetryDecoder>,
    mut source: Box<dyn ByteSource>,
    slots: SampleSlots,
    must_exit: Arc<AtomicBool>,
    playback_delay: Duration,
    tx: mpsc::Sender<FusionMsg>,
) {
    let mut out = Vec::new();
    let playback = source.kind() == SourceKind::Playback;
    let mut error = None;

    while !must_exit.load(Ordering::Relaxed) {
        let outcome = match decoder.decode(source.as_mut(), &mut out) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(input = index, source = source.name(), "input stopped: {}", e);
                must_exit.store(true, Ordering::Relaxed);
                error = Some(e.to_string());
                break;
            }
        };

        if !out.is_empty() || outcome != DecodeOutcome::NoFrame {
            let msg = FusionMsg::Updates {
                input: index,
                slots,
                updates: std::mem::take(&mut out),
                stats: decoder.stats(),
            };
            if tx.blocking_send(msg).is_err() {
                debug!(input = index, "fusion actor gone, reader exiting");
                break;
            }
        }

        match outcome {
            DecodeOutcome::FrameApplied if playback => std::thread::sleep(playback_delay),
            DecodeOutcome::SourceExhausted => debug!(input = index, "playback looped"),
            DecodeOutcome::NoFrame if source.kind() == SourceKind::Udp => std::thread::sleep(IDLE_POLL),
            _ => {}
        }
    }

    source.close();
    let _ = tx.blocking_send(FusionMsg::Stopped {
        input: index,
        stats: decoder.stats(),
        error,
    });
}

/// Create the channel readers send on
pub fn fusion_channel() -> (mpsc::Sender<FusionMsg>, mpsc::Receiver<FusionMsg>) {
    mpsc::channel(FUSION_QUEUE)
}

/// Single writer for decoder output.
///
/// Keeps sweeping targets after every reader is gone, so buoys dropped
/// through the API still refresh and age. Exits when `state.shutdown` is
/// cancelled, after applying what the readers already sent.
pub async fn run_fusion(state: AppState, mut rx: mpsc::Receiver<FusionMsg>, cleanup_interval: Duration) {
    let mut cleanup = tokio::time::interval(cleanup_interval);
    cleanup.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut readers_open = true;
    info!("fusion actor started");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                rx.close();
                while let Some(msg) = rx.recv().await {
                    handle_message(&state, msg).await;
                }
                break;
            }
            msg = rx.recv(), if readers_open => match msg {
                Some(msg) => handle_message(&state, msg).await,
                None => {
                    debug!("no readers left, sweeping only");
                    readers_open = false;
                }
            },
            _ = cleanup.tick() => {
                let mut aircraft = state.aircraft.write().await;
                let before = aircraft.targets.count();
                aircraft.clean_up(Utc::now().timestamp());
                let removed = before.saturating_sub(aircraft.targets.count());
                if removed > 0 {
                    debug!(removed, "aged out targets");
                }
            }
        }
    }
    info!("fusion actor stopped");
}

async fn handle_message(state: &AppState, msg: FusionMsg) {
    match msg {
        FusionMsg::Updates {
            input,
            slots,
            updates,
            stats,
        } => {
            if !updates.is_empty() {
                let kinds: Vec<SampleKind> = updates.iter().map(|u| u.kind()).collect();
                let delta = {
                    let mut aircraft = state.aircraft.write().await;
                    for update in updates {
                        aircraft.apply(&slots, update);
                    }
                    aircraft.delta(&slots, &kinds)
                };
                if !delta.is_empty() {
                    // no subscribers is fine
                    let _ = state.telemetry_tx.send(Arc::new(delta));
                }
            }
            if let Some(status) = state.inputs.write().await.get_mut(input) {
                status.stats = stats;
            }
        }
        FusionMsg::Stopped { input, stats, error } => {
            let mut inputs = state.inputs.write().await;
            if let Some(status) = inputs.get_mut(input) {
                warn!(input = %status.name, error = ?error, "input stopped");
                status.running = false;
                status.stats = stats;
                status.error = error;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hud_adapters::source::MemorySource;
    use hud_adapters::{nmea, DecoderOptions, Protocol};

    fn input(name: &str) -> InputConfig {
        InputConfig {
            name: name.to_string(),
            protocol: Protocol::Nmea,
            source: SourceConfig::File {
                path: "memory".into(),
            },
            options: DecoderOptions::default(),
            playback_delay: Duration::from_millis(1),
            capture_file: None,
        }
    }

    #[tokio::test]
    async fn test_reader_feeds_fusion_actor() {
        let state = AppState::default();
        let (tx, rx) = fusion_channel();
        let fusion = tokio::spawn(run_fusion(state.clone(), rx, Duration::from_secs(60)));

        let cfg = input("gps");
        let (index, must_exit) = state
            .register_input(&cfg.name, cfg.protocol, cfg.source.to_string())
            .await;
        let decoder = cfg.protocol.decoder(&cfg.options);
        let slots = state.aircraft.write().await.register(decoder.provides());
        let source = Box::new(MemorySource::playback(nmea::encode_sentence(
            "GPRMC,123520,A,3700.000,N,12200.000,W,100.0,090.0,191194,,",
        )));
        let mut rx_snap = state.subscribe();
        let handle = spawn_reader(index, &cfg, decoder, source, slots, must_exit.clone(), tx).unwrap();

        let delta = tokio::time::timeout(Duration::from_secs(5), rx_snap.recv())
            .await
            .unwrap()
            .unwrap();
        let (slot, gps) = delta.gps.as_ref().unwrap();
        assert_eq!(*slot, 0);
        assert!((gps.lat.unwrap() - 37.0).abs() < 1e-9);
        assert!(delta.attitude.is_none());

        must_exit.store(true, Ordering::Relaxed);
        tokio::task::spawn_blocking(move || handle.join().unwrap())
            .await
            .unwrap();
        state.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), fusion)
            .await
            .unwrap()
            .unwrap();

        let inputs = state.inputs.read().await;
        assert!(!inputs[0].running);
        assert!(inputs[0].stats.frames >= 1);
        assert!(inputs[0].error.is_none());
    }

    #[tokio::test]
    async fn test_source_fault_stops_only_that_input() {
        let state = AppState::default();
        let (tx, rx) = fusion_channel();
        let fusion = tokio::spawn(run_fusion(state.clone(), rx, Duration::from_secs(60)));

        let cfg = input("broken");
        let (index, must_exit) = state
            .register_input(&cfg.name, cfg.protocol, cfg.source.to_string())
            .await;
        let (_, other_flag) = state.register_input("other", Protocol::Nmea, "x".into()).await;
        let decoder = cfg.protocol.decoder(&cfg.options);
        let mut source = MemorySource::live(Vec::new());
        source.close();

        let handle = spawn_reader(index, &cfg, decoder, Box::new(source), SampleSlots::default(), must_exit.clone(), tx).unwrap();
        tokio::task::spawn_blocking(move || handle.join().unwrap())
            .await
            .unwrap();
        state.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), fusion)
            .await
            .unwrap()
            .unwrap();

        assert!(must_exit.load(Ordering::Relaxed));
        assert!(!other_flag.load(Ordering::Relaxed));
        let inputs = state.inputs.read().await;
        assert!(!inputs[0].running);
        assert!(inputs[0].error.as_deref().unwrap_or("").contains("closed"));
        assert!(inputs[1].running);
    }

    #[tokio::test]
    async fn test_sweeps_continue_without_inputs() {
        use hud_core::model::{GpsSample, Target};
        use hud_core::{BuoyPlacement, BuoySpeed};

        let state = AppState::default();
        let now = Utc::now().timestamp();
        {
            let mut aircraft = state.aircraft.write().await;
            let slots = aircraft.register(&[SampleKind::Gps, SampleKind::Traffic]);
            aircraft.apply(
                &slots,
                TelemetryUpdate::Gps(GpsSample {
                    lat: Some(37.0),
                    lon: Some(-122.0),
                    ground_track: Some(0.0),
                    ..Default::default()
                }),
            );
            let own = aircraft.ownship();
            aircraft
                .targets
                .drop_buoy(&own, BuoyPlacement::Ahead, 2.0, 0.0, BuoySpeed::Default, now - 200)
                .unwrap();
            let stale = Target {
                lat: Some(37.05),
                lon: Some(-122.0),
                ..Target::new(0xABCDEF, now - 200)
            };
            aircraft.apply(&slots, TelemetryUpdate::Target(stale));
            assert_eq!(aircraft.targets.count(), 2);
        }

        // no input ever opened: every sender is gone from the start
        let (tx, rx) = fusion_channel();
        drop(tx);
        let fusion = tokio::spawn(run_fusion(state.clone(), rx, Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!fusion.is_finished());

        {
            let aircraft = state.aircraft.read().await;
            assert_eq!(aircraft.targets.count(), 1);
            let buoy = &aircraft.targets.targets()[0];
            assert_eq!(buoy.buoy_num, Some(1));
            assert!(buoy.last_seen >= now);
        }

        state.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), fusion)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_unopenable_input_is_reported() {
        let state = AppState::default();
        let (tx, _rx) = fusion_channel();
        let mut config = Config::default();
        let mut cfg = input("missing");
        cfg.source = SourceConfig::File {
            path: "/nonexistent/definitely/not/here.bin".into(),
        };
        config.inputs.push(cfg);

        let handles = start_inputs(&state, &config, tx).await;
        assert!(handles.is_empty());
        let inputs = state.inputs.read().await;
        assert!(!inputs[0].running);
        assert!(inputs[0].error.as_deref().unwrap().contains("playback file"));
    }
}
