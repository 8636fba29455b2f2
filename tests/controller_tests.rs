//! Controller runs against an in-process master
mod common;

use async_trait::async_trait;
use common::{collect_events, random_grid, MemoryImageIo};
use grid_life::grid::{next_grid, Cell};
use grid_life::{
    Controller, ControllerConfig, ControllerError, Event, Grid, MasterEngine, MasterError,
    MasterService, RunOutcome, SimulationParams, State, TurnState, WorkerEngine, WorkerService,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Delegates to a shared engine, optionally slowed down, recording each
/// `run_master` call as `(grid supplied, turn)`.
struct RecordingMaster {
    inner: Arc<MasterEngine>,
    delay: Duration,
    calls: Mutex<Vec<(bool, u64)>>,
}

impl RecordingMaster {
    fn new(inner: Arc<MasterEngine>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(bool, u64)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MasterService for RecordingMaster {
    async fn run_master(
        &self,
        grid: Option<Grid>,
        params: SimulationParams,
        turn: u64,
    ) -> Result<Grid, MasterError> {
        self.calls.lock().unwrap().push((grid.is_some(), turn));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.run_master(grid, params, turn).await
    }

    async fn get_world_state(&self) -> Result<Option<Grid>, MasterError> {
        self.inner.get_world_state().await
    }

    async fn get_turn_number(&self) -> Result<u64, MasterError> {
        self.inner.get_turn_number().await
    }

    async fn check_params_compatible(&self, params: &SimulationParams) -> Result<bool, MasterError> {
        self.inner.check_params_compatible(params).await
    }

    async fn reset_state(&self) -> Result<(), MasterError> {
        self.inner.reset_state().await
    }

    async fn get_available_node_count(&self) -> Result<usize, MasterError> {
        self.inner.get_available_node_count().await
    }
}

fn engine(workers: usize) -> Arc<MasterEngine> {
    let workers = (0..workers)
        .map(|_| Arc::new(WorkerEngine::new()) as Arc<dyn WorkerService>)
        .collect();
    Arc::new(MasterEngine::new(workers))
}

fn config(turns: u64, width: usize, height: usize) -> ControllerConfig {
    ControllerConfig {
        params: SimulationParams::new(turns, 4, width, height),
        ..ControllerConfig::default()
    }
}

fn evolve(grid: &Grid, turns: u64) -> Grid {
    (0..turns).fold(grid.clone(), |grid, _| next_grid(&grid))
}

fn glider(width: usize, height: usize) -> Grid {
    Grid::from_cells(
        width,
        height,
        &[Cell::new(1, 0), Cell::new(2, 1), Cell::new(0, 2), Cell::new(1, 2), Cell::new(2, 2)],
    )
}

#[tokio::test]
async fn test_complete_run_publishes_final_state() {
    let start = glider(16, 16);
    let images = Arc::new(MemoryImageIo::with_image("16x16", &start));
    let master = engine(4);
    let controller = Controller::new(master.clone(), images.clone(), config(12, 16, 16));

    let (events_tx, events_rx) = mpsc::channel(64);
    let (_keys_tx, keys_rx) = mpsc::channel(4);
    let collector = tokio::spawn(collect_events(events_rx));

    let outcome = controller.run(events_tx, keys_rx).await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    drop(controller);
    let events = collector.await.unwrap();

    let expected = evolve(&start, 12);
    assert_eq!(
        events.first(),
        Some(&Event::StateChange {
            completed_turns: 0,
            new_state: State::Executing
        })
    );
    assert!(events.contains(&Event::FinalTurnComplete {
        completed_turns: 12,
        alive: expected.alive_cells(),
    }));
    assert!(events.contains(&Event::ImageOutputComplete {
        completed_turns: 12,
        filename: "16x16x12".to_string(),
    }));
    assert_eq!(
        events.last(),
        Some(&Event::StateChange {
            completed_turns: 12,
            new_state: State::Quitting
        })
    );

    assert_eq!(images.image("16x16x12"), Some(expected.to_bytes()));
    assert_eq!(master.turn_state().await, TurnState::Empty);
}

#[tokio::test]
async fn test_ticker_reports_alive_cells() {
    let start = random_grid(20, 20, 99);
    let images = Arc::new(MemoryImageIo::with_image("20x20", &start));
    let master = Arc::new(RecordingMaster::new(engine(2), Duration::from_millis(5)));
    let mut config = config(40, 20, 20);
    config.report_interval_ms = 20;
    let controller = Controller::new(master, images, config);

    let (events_tx, events_rx) = mpsc::channel(256);
    let (_keys_tx, keys_rx) = mpsc::channel(4);
    let collector = tokio::spawn(collect_events(events_rx));
    controller.run(events_tx, keys_rx).await.unwrap();
    drop(controller);
    let events = collector.await.unwrap();

    let reports: Vec<(u64, usize)> = events
        .iter()
        .filter_map(|event| match event {
            Event::AliveCellsCount {
                completed_turns,
                cells_count,
            } => Some((*completed_turns, *cells_count)),
            _ => None,
        })
        .collect();
    assert!(!reports.is_empty());
    assert!(reports.windows(2).all(|pair| pair[0].0 <= pair[1].0));
    for (turns, count) in reports {
        assert!(turns <= 40);
        assert_eq!(count, evolve(&start, turns).alive_count());
    }
}

#[tokio::test]
async fn test_detach_then_resume_continues_run() {
    let start = random_grid(12, 12, 4);
    let images = Arc::new(MemoryImageIo::with_image("12x12", &start));
    let shared = engine(3);

    let slow = Arc::new(RecordingMaster::new(shared.clone(), Duration::from_millis(2)));
    let first = Controller::new(slow.clone(), images.clone(), config(200, 12, 12));
    let (events_tx, events_rx) = mpsc::channel(256);
    let (keys_tx, keys_rx) = mpsc::channel(4);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        keys_tx.send('q').await.unwrap();
    });
    let collector = tokio::spawn(collect_events(events_rx));

    let outcome = first.run(events_tx, keys_rx).await.unwrap();
    assert_eq!(outcome, RunOutcome::Detached);
    drop(first);
    let events = collector.await.unwrap();

    let detached_at = shared.get_turn_number().await.unwrap();
    assert!(detached_at > 0 && detached_at < 200);
    assert_eq!(
        events.last(),
        Some(&Event::StateChange {
            completed_turns: detached_at,
            new_state: State::Quitting
        })
    );
    assert!(!events.iter().any(|e| matches!(e, Event::FinalTurnComplete { .. })));
    let snapshot = format!("12x12x{}", detached_at);
    assert_eq!(images.image(&snapshot), Some(evolve(&start, detached_at).to_bytes()));

    let recorder = Arc::new(RecordingMaster::new(shared.clone(), Duration::ZERO));
    let mut resume_config = config(200, 12, 12);
    resume_config.resume = true;
    let second = Controller::new(recorder.clone(), images.clone(), resume_config);
    let (events_tx, events_rx) = mpsc::channel(256);
    let (_keys_tx, keys_rx) = mpsc::channel(4);
    let collector = tokio::spawn(collect_events(events_rx));

    assert_eq!(second.run(events_tx, keys_rx).await.unwrap(), RunOutcome::Completed);
    drop(second);
    let events = collector.await.unwrap();

    let calls = recorder.calls();
    assert_eq!(calls.first(), Some(&(false, detached_at)));
    assert!(calls[1..].iter().all(|(with_grid, _)| *with_grid));
    assert_eq!(calls.len() as u64, 200 - detached_at);
    assert!(events.contains(&Event::FinalTurnComplete {
        completed_turns: 200,
        alive: evolve(&start, 200).alive_cells(),
    }));
}

#[tokio::test]
async fn test_incompatible_resume_starts_fresh() {
    let start = glider(10, 10);
    let images = Arc::new(MemoryImageIo::with_image("10x10", &start));
    let shared = engine(2);
    shared
        .run_master(Some(random_grid(10, 10, 8)), SimulationParams::new(500, 4, 10, 10), 0)
        .await
        .unwrap();

    let recorder = Arc::new(RecordingMaster::new(shared.clone(), Duration::ZERO));
    let mut config = config(6, 10, 10);
    config.resume = true;
    let controller = Controller::new(recorder.clone(), images.clone(), config);
    let (events_tx, events_rx) = mpsc::channel(64);
    let (_keys_tx, keys_rx) = mpsc::channel(4);
    let collector = tokio::spawn(collect_events(events_rx));

    controller.run(events_tx, keys_rx).await.unwrap();
    drop(controller);
    collector.await.unwrap();

    assert_eq!(recorder.calls().first(), Some(&(true, 0)));
    assert_eq!(images.image("10x10x6"), Some(evolve(&start, 6).to_bytes()));
}

#[tokio::test]
async fn test_save_key_writes_current_turn() {
    let start = random_grid(10, 10, 21);
    let images = Arc::new(MemoryImageIo::with_image("10x10", &start));
    let master = Arc::new(RecordingMaster::new(engine(2), Duration::from_millis(2)));
    let controller = Controller::new(master, images.clone(), config(100, 10, 10));

    let (events_tx, events_rx) = mpsc::channel(256);
    let (keys_tx, keys_rx) = mpsc::channel(4);
    keys_tx.send('s').await.unwrap();
    let collector = tokio::spawn(collect_events(events_rx));
    controller.run(events_tx, keys_rx).await.unwrap();
    drop(controller);
    let events = collector.await.unwrap();

    let saves: Vec<(u64, String)> = events
        .iter()
        .filter_map(|event| match event {
            Event::ImageOutputComplete {
                completed_turns,
                filename,
            } => Some((*completed_turns, filename.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(saves.len(), 2);
    let (turn, filename) = &saves[0];
    assert_eq!(filename, &format!("10x10x{}", turn));
    assert_eq!(images.image(filename), Some(evolve(&start, *turn).to_bytes()));
    assert_eq!(saves[1].1, "10x10x100");
}

#[tokio::test]
async fn test_missing_initial_image_fails() {
    let images = Arc::new(MemoryImageIo::default());
    let controller = Controller::new(engine(1), images, config(5, 8, 8));
    let (events_tx, events_rx) = mpsc::channel(8);
    let (_keys_tx, keys_rx) = mpsc::channel(4);

    let err = controller.run(events_tx, keys_rx).await.unwrap_err();
    assert!(matches!(err, ControllerError::Image(_)));
    drop(controller);
    assert!(collect_events(events_rx).await.is_empty());
}

/// Master whose turns always fail
struct BrokenMaster;

#[async_trait]
impl MasterService for BrokenMaster {
    async fn run_master(
        &self,
        _grid: Option<Grid>,
        _params: SimulationParams,
        _turn: u64,
    ) -> Result<Grid, MasterError> {
        Err(MasterError::NoRetainedWorld)
    }

    async fn get_world_state(&self) -> Result<Option<Grid>, MasterError> {
        Ok(None)
    }

    async fn get_turn_number(&self) -> Result<u64, MasterError> {
        Ok(0)
    }

    async fn check_params_compatible(&self, _params: &SimulationParams) -> Result<bool, MasterError> {
        Ok(false)
    }

    async fn reset_state(&self) -> Result<(), MasterError> {
        Ok(())
    }

    async fn get_available_node_count(&self) -> Result<usize, MasterError> {
        Ok(0)
    }
}

#[tokio::test]
async fn test_master_failure_ends_run_and_closes_events() {
    let images = Arc::new(MemoryImageIo::with_image("6x6", &glider(6, 6)));
    let controller = Controller::new(Arc::new(BrokenMaster), images, config(5, 6, 6));
    let (events_tx, events_rx) = mpsc::channel(8);
    let (_keys_tx, keys_rx) = mpsc::channel(4);
    let collector = tokio::spawn(collect_events(events_rx));

    let err = controller.run(events_tx, keys_rx).await.unwrap_err();
    assert!(matches!(err, ControllerError::Master(MasterError::NoRetainedWorld)));
    drop(controller);
    let events = collector.await.unwrap();
    assert_eq!(events.len(), 1);
}
