///! Render loop - keeps the strip in sync with the satellite table
use chrono::NaiveDateTime;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::LedError;
use crate::led::{Frame, LedDriver};
use crate::model::{PatternResolver, SatelliteStatus, SatelliteTable, local_now};

/// Lifecycle of the render loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Stopped,
    Running,
    ShuttingDown,
}

impl RenderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderState::Stopped => "STOPPED",
            RenderState::Running => "RUNNING",
            RenderState::ShuttingDown => "SHUTTING_DOWN",
        }
    }
}

impl std::fmt::Display for RenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read-only view of the loop's state, shared with the HTTP layer.
#[derive(Debug, Clone)]
pub struct RenderStateHandle(Arc<RwLock<RenderState>>);

impl RenderStateHandle {
    pub async fn get(&self) -> RenderState {
        *self.0.read().await
    }
}

/// Strip geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripLayout {
    pub satellite_count: usize,
    pub leds_per_satellite: usize,
}

impl StripLayout {
    pub fn total_leds(&self) -> usize {
        self.satellite_count * self.leds_per_satellite
    }
}

/// Build the frame for one tick. Every satellite shares the same `phase`,
/// so alternating satellites blink in step.
pub fn compose_frame(
    statuses: &[SatelliteStatus],
    resolver: &PatternResolver,
    layout: StripLayout,
    phase: Duration,
) -> Frame {
    let mut frame = Frame::blank(layout.total_leds());
    for (index, status) in statuses.iter().enumerate() {
        let color = resolver
            .resolve(status.solved, status.transmitting)
            .color_at(phase);
        frame.fill_satellite(index, layout.leds_per_satellite, color);
    }
    frame
}

async fn set_state(cell: &RwLock<RenderState>, state: RenderState) {
    *cell.write().await = state;
    tracing::info!("Render loop state: {}", state);
}

pub struct RenderLoop {
    table: Arc<SatelliteTable>,
    resolver: PatternResolver,
    driver: Box<dyn LedDriver>,
    layout: StripLayout,
    tick: Duration,
    state: Arc<RwLock<RenderState>>,
}

impl RenderLoop {
    pub fn new(
        table: Arc<SatelliteTable>,
        resolver: PatternResolver,
        driver: Box<dyn LedDriver>,
        layout: StripLayout,
        tick: Duration,
    ) -> Self {
        Self {
            table,
            resolver,
            driver,
            layout,
            tick,
            state: Arc::new(RwLock::new(RenderState::Stopped)),
        }
    }

    pub fn state_handle(&self) -> RenderStateHandle {
        RenderStateHandle(self.state.clone())
    }

    /// Spawn the loop. It runs until `shutdown` carries `true` or its sender is dropped.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> JoinHandle<Result<(), LedError>> {
        tracing::info!(
            "Starting render loop ({} LEDs, tick {:?})",
            self.layout.total_leds(),
            self.tick
        );
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Drive the strip until shutdown, then blank it.
    ///
    /// Returns the result of the final blanking push.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), LedError> {
        if let Err(e) = self.push(&Frame::blank(self.layout.total_leds())) {
            tracing::warn!("Failed to blank strip on startup: {}", e);
        }
        // the driver is not Sync: await on the cloned cell, never on &self
        let state = self.state.clone();
        set_state(&state, RenderState::Running).await;

        let started = Instant::now();
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let stop_requested = *shutdown.borrow();
            if stop_requested {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick_at(local_now(), started.elapsed()).await {
                        tracing::warn!("Render tick failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        set_state(&state, RenderState::ShuttingDown).await;
        let result = self.push(&Frame::blank(self.layout.total_leds()));
        match &result {
            Ok(()) => tracing::info!("Strip blanked"),
            Err(e) => tracing::error!("Failed to blank strip on shutdown: {}", e),
        }
        set_state(&state, RenderState::Stopped).await;
        result
    }

    /// One tick: evaluate windows at `now`, resolve patterns at `phase`, push one frame.
    ///
    /// The table lock is released before the driver is called.
    pub async fn tick_at(&mut self, now: NaiveDateTime, phase: Duration) -> Result<(), LedError> {
        let statuses = self.table.statuses_at(now).await;
        let frame = compose_frame(&statuses, &self.resolver, self.layout, phase);
        self.push(&frame)
    }

    /// Push a frame, turning a driver panic into an error so the next tick still runs.
    fn push(&mut self, frame: &Frame) -> Result<(), LedError> {
        let driver = &mut self.driver;
        match catch_unwind(AssertUnwindSafe(|| driver.show(frame))) {
            Ok(result) => result,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(LedError::Panicked(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::led::testing::{FlakyDriver, RecordingDriver};
    use crate::model::{Palette, StateStore, parse_timestamp};
    use smart_leds::RGB8;
    use tempfile::TempDir;

    const RED: RGB8 = RGB8::new(255, 0, 0);
    const GREEN: RGB8 = RGB8::new(0, 255, 0);
    const BLUE: RGB8 = RGB8::new(0, 0, 255);

    const LAYOUT: StripLayout = StripLayout {
        satellite_count: 3,
        leds_per_satellite: 2,
    };

    async fn scenario_table(temp_dir: &TempDir) -> Arc<SatelliteTable> {
        let table =
            SatelliteTable::load(StateStore::new(temp_dir.path().join("state.json")), 3).await;
        table.set_solved(1, true).await.unwrap();
        table
            .add_windows(
                2,
                &[("2030/01/01 00:00:00".to_string(), "2030/01/01 01:00:00".to_string())],
            )
            .await
            .unwrap();
        Arc::new(table)
    }

    fn resolver() -> PatternResolver {
        PatternResolver::new(Palette::default(), Duration::from_millis(500))
    }

    #[test]
    fn test_compose_frame_expands_satellites() {
        let statuses = [
            SatelliteStatus { solved: false, transmitting: false },
            SatelliteStatus { solved: true, transmitting: false },
            SatelliteStatus { solved: true, transmitting: true },
        ];

        let first_half = compose_frame(&statuses, &resolver(), LAYOUT, Duration::from_millis(100));
        assert_eq!(first_half.pixels(), &[RED, RED, GREEN, GREEN, GREEN, GREEN]);

        let second_half = compose_frame(&statuses, &resolver(), LAYOUT, Duration::from_millis(600));
        assert_eq!(second_half.pixels(), &[RED, RED, GREEN, GREEN, BLUE, BLUE]);
    }

    #[test]
    fn test_transmitting_satellites_blink_in_step() {
        let statuses = [SatelliteStatus { solved: false, transmitting: true }; 3];
        for phase_ms in [0, 250, 500, 750, 1_250] {
            let frame = compose_frame(
                &statuses,
                &resolver(),
                LAYOUT,
                Duration::from_millis(phase_ms),
            );
            let first = frame.pixels()[0];
            assert!(frame.pixels().iter().all(|p| *p == first));
        }
    }

    #[tokio::test]
    async fn test_tick_pushes_one_full_frame() {
        let temp_dir = TempDir::new().unwrap();
        let table = scenario_table(&temp_dir).await;
        let driver = RecordingDriver::default();
        let mut render = RenderLoop::new(
            table,
            resolver(),
            Box::new(driver.clone()),
            LAYOUT,
            Duration::from_millis(100),
        );

        let now = parse_timestamp("2030/01/01 00:30:00").unwrap();
        render.tick_at(now, Duration::ZERO).await.unwrap();
        render.tick_at(now, Duration::from_millis(500)).await.unwrap();

        let frames = driver.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].pixels(), &[RED, RED, GREEN, GREEN, RED, RED]);
        assert_eq!(frames[1].pixels(), &[RED, RED, GREEN, GREEN, BLUE, BLUE]);
    }

    #[tokio::test]
    async fn test_window_end_stops_blinking() {
        let temp_dir = TempDir::new().unwrap();
        let table = scenario_table(&temp_dir).await;
        let driver = RecordingDriver::default();
        let mut render = RenderLoop::new(
            table,
            resolver(),
            Box::new(driver.clone()),
            LAYOUT,
            Duration::from_millis(100),
        );

        let end = parse_timestamp("2030/01/01 01:00:00").unwrap();
        render.tick_at(end, Duration::from_millis(500)).await.unwrap();
        assert_eq!(driver.frames()[0].pixels()[4], RED);
    }

    #[tokio::test]
    async fn test_failed_ticks_do_not_stop_rendering() {
        let temp_dir = TempDir::new().unwrap();
        let table = scenario_table(&temp_dir).await;
        let recorder = RecordingDriver::default();
        let driver = FlakyDriver {
            inner: recorder.clone(),
            calls: 0,
            fail_on: 1,
            panic_on: 2,
        };
        let mut render = RenderLoop::new(
            table,
            resolver(),
            Box::new(driver),
            LAYOUT,
            Duration::from_millis(100),
        );

        let now = parse_timestamp("2030/01/01 00:30:00").unwrap();
        assert!(matches!(
            render.tick_at(now, Duration::ZERO).await,
            Err(LedError::Write(_))
        ));
        assert!(matches!(
            render.tick_at(now, Duration::ZERO).await,
            Err(LedError::Panicked(_))
        ));
        render.tick_at(now, Duration::ZERO).await.unwrap();
        assert_eq!(recorder.frames().len(), 1);
    }

    #[tokio::test]
    async fn test_run_until_shutdown_then_blank() {
        let temp_dir = TempDir::new().unwrap();
        let table = scenario_table(&temp_dir).await;
        let driver = RecordingDriver::default();
        let render = RenderLoop::new(
            table,
            resolver(),
            Box::new(driver.clone()),
            LAYOUT,
            Duration::from_millis(10),
        );
        let state = render.state_handle();
        assert_eq!(state.get().await, RenderState::Stopped);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = render.start(shutdown_rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(state.get().await, RenderState::Running);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(state.get().await, RenderState::Stopped);

        let frames = driver.frames();
        assert!(frames.len() >= 3);
        assert!(frames.first().unwrap().is_blank());
        assert!(frames.last().unwrap().is_blank());
        // satellite 1 is solved, so at least one tick painted it green
        assert!(frames.iter().any(|f| f.pixels()[2] == GREEN));
        assert!(frames.iter().all(|f| f.len() == LAYOUT.total_leds()));
    }

    #[tokio::test]
    async fn test_dropped_sender_stops_loop() {
        let temp_dir = TempDir::new().unwrap();
        let table = scenario_table(&temp_dir).await;
        let render = RenderLoop::new(
            table,
            resolver(),
            Box::new(RecordingDriver::default()),
            LAYOUT,
            Duration::from_millis(10),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = render.start(shutdown_rx);
        drop(shutdown_tx);

        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(result.unwrap().unwrap().is_ok());
    }
}
