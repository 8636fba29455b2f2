//! Controller turn loop.
//!
//! The loop drives one `RunMaster` call per turn. Two side tasks read the
//! latest snapshot from a `watch` channel: a ticker that reports the alive
//! cell count and a key listener that saves images or asks the loop to
//! detach. Neither ever blocks the loop.

use super::events::{Event, State};
use super::keys::KeyCommand;
use crate::config::{ControllerConfig, SimulationParams};
use crate::errors::{ControllerError, ImageIoError};
use crate::grid::Grid;
use crate::image_io::ImageIo;
use crate::master_engine::MasterService;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every turn was evolved and the master released the world
    Completed,
    /// Stopped early; the master still holds the run for a later resume
    Detached,
}

/// Latest grid received from the master and how many turns it reflects.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub completed_turns: u64,
    pub grid: Arc<Grid>,
}

/// Where the turn loop starts.
#[derive(Debug, Clone)]
struct StartPoint {
    turn: u64,
    grid: Arc<Grid>,
    /// The master already holds `grid`, so the first call can omit it
    resumed: bool,
}

pub struct Controller<M, I> {
    master: Arc<M>,
    images: Arc<I>,
    config: ControllerConfig,
    shutdown: CancellationToken,
}

impl<M, I> Controller<M, I>
where
    M: MasterService + 'static,
    I: ImageIo + 'static,
{
    pub fn new(master: Arc<M>, images: Arc<I>, config: ControllerConfig) -> Self {
        Self {
            master,
            images,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelling this token detaches the run after the in-flight turn.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn params(&self) -> &SimulationParams {
        &self.config.params
    }

    /// Run the simulation to completion or until detached.
    ///
    /// `events` is dropped when this returns, which closes the stream for the
    /// receiver. On error the master is left as it was after the last
    /// successful turn.
    pub async fn run(
        &self,
        events: mpsc::Sender<Event>,
        keys: mpsc::Receiver<char>,
    ) -> Result<RunOutcome, ControllerError> {
        let params = self.config.params.clone();
        let start = self.starting_point(&params).await?;
        info!(
            "🚀 Starting {}x{} run at turn {} of {}",
            params.image_width, params.image_height, start.turn, params.turns
        );

        let (snapshots, watcher) = watch::channel(Snapshot {
            completed_turns: start.turn,
            grid: start.grid.clone(),
        });
        let stop = self.shutdown.child_token();
        let tasks = CancellationToken::new();

        let ticker = tokio::spawn(run_ticker(
            watcher.clone(),
            events.clone(),
            self.config.report_interval(),
            tasks.clone(),
        ));
        let listener = tokio::spawn(run_key_listener(
            keys,
            watcher,
            self.images.clone(),
            params.clone(),
            events.clone(),
            stop.clone(),
            tasks.clone(),
        ));

        publish(
            &events,
            Event::StateChange {
                completed_turns: start.turn,
                new_state: State::Executing,
            },
        )
        .await;

        let result = self.run_turns(&params, start, &snapshots, &stop).await;

        tasks.cancel();
        for task in [ticker, listener] {
            if let Err(e) = task.await {
                warn!("⚠️ Controller task ended abnormally: {}", e);
            }
        }

        let outcome = result?;
        let last = snapshots.borrow().clone();
        self.finish(&params, outcome, last, &events).await?;
        Ok(outcome)
    }

    /// Resume from the master when allowed and compatible, otherwise load the
    /// initial image.
    async fn starting_point(&self, params: &SimulationParams) -> Result<StartPoint, ControllerError> {
        if self.config.resume {
            if self.master.check_params_compatible(params).await? {
                let turn = self.master.get_turn_number().await?;
                if let Some(world) = self.master.get_world_state().await? {
                    check_world(params, &world)?;
                    info!("🔁 Resuming run in progress at turn {}", turn);
                    return Ok(StartPoint {
                        turn,
                        grid: Arc::new(world),
                        resumed: true,
                    });
                }
                warn!("⚠️ Master released its world before it could be fetched, starting fresh");
            } else {
                warn!("⚠️ Master holds no compatible run, resetting and starting fresh");
                self.master.reset_state().await?;
            }
        }

        let pixels = self
            .images
            .load(&params.input_image_name(), params.image_width, params.image_height)
            .await?;
        let grid = Grid::from_bytes(params.image_width, params.image_height, &pixels)?;
        Ok(StartPoint {
            turn: 0,
            grid: Arc::new(grid),
            resumed: false,
        })
    }

    async fn run_turns(
        &self,
        params: &SimulationParams,
        start: StartPoint,
        snapshots: &watch::Sender<Snapshot>,
        stop: &CancellationToken,
    ) -> Result<RunOutcome, ControllerError> {
        let mut grid = start.grid;
        let mut send_grid = !start.resumed;

        for turn in start.turn..params.turns {
            if stop.is_cancelled() {
                info!("⏸️ Detaching after {} turns", turn);
                return Ok(RunOutcome::Detached);
            }
            let request = send_grid.then(|| grid.as_ref().clone());
            let next = self.master.run_master(request, params.clone(), turn).await?;
            check_world(params, &next)?;
            send_grid = true;

            grid = Arc::new(next);
            snapshots.send_replace(Snapshot {
                completed_turns: turn + 1,
                grid: grid.clone(),
            });
            debug!("Turn {} complete", turn + 1);
        }
        Ok(RunOutcome::Completed)
    }

    async fn finish(
        &self,
        params: &SimulationParams,
        outcome: RunOutcome,
        last: Snapshot,
        events: &mpsc::Sender<Event>,
    ) -> Result<(), ControllerError> {
        if outcome == RunOutcome::Completed {
            info!("🏁 Run complete after {} turns", last.completed_turns);
            publish(
                events,
                Event::FinalTurnComplete {
                    completed_turns: last.completed_turns,
                    alive: last.grid.alive_cells(),
                },
            )
            .await;
        }

        save_snapshot(self.images.as_ref(), params, &last, events).await?;
        self.images.wait_idle().await?;

        publish(
            events,
            Event::StateChange {
                completed_turns: last.completed_turns,
                new_state: State::Quitting,
            },
        )
        .await;
        Ok(())
    }
}

fn check_world(params: &SimulationParams, grid: &Grid) -> Result<(), ControllerError> {
    if grid.has_dimensions(params.image_width, params.image_height) {
        return Ok(());
    }
    Err(ControllerError::WorldMismatch {
        width: params.image_width,
        height: params.image_height,
        actual_width: grid.width(),
        actual_height: grid.height(),
    })
}

/// Send an event, ignoring a receiver that has gone away.
async fn publish(events: &mpsc::Sender<Event>, event: Event) {
    if events.send(event).await.is_err() {
        debug!("Event receiver dropped");
    }
}

async fn save_snapshot<I: ImageIo + ?Sized>(
    images: &I,
    params: &SimulationParams,
    snapshot: &Snapshot,
    events: &mpsc::Sender<Event>,
) -> Result<(), ImageIoError> {
    let filename = params.output_image_name(snapshot.completed_turns);
    images
        .save(
            &filename,
            snapshot.grid.width(),
            snapshot.grid.height(),
            snapshot.grid.to_bytes(),
        )
        .await?;
    info!("💾 Saved {}", filename);
    publish(
        events,
        Event::ImageOutputComplete {
            completed_turns: snapshot.completed_turns,
            filename,
        },
    )
    .await;
    Ok(())
}

async fn run_ticker(
    watcher: watch::Receiver<Snapshot>,
    events: mpsc::Sender<Event>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticks.tick() => {
                let snapshot = watcher.borrow().clone();
                publish(&events, Event::AliveCellsCount {
                    completed_turns: snapshot.completed_turns,
                    cells_count: snapshot.grid.alive_count(),
                }).await;
            }
        }
    }
}

async fn run_key_listener<I: ImageIo>(
    mut keys: mpsc::Receiver<char>,
    watcher: watch::Receiver<Snapshot>,
    images: Arc<I>,
    params: SimulationParams,
    events: mpsc::Sender<Event>,
    stop: CancellationToken,
    cancel: CancellationToken,
) {
    loop {
        let key = tokio::select! {
            _ = cancel.cancelled() => break,
            key = keys.recv() => match key {
                Some(key) => key,
                None => break,
            },
        };
        match KeyCommand::from_char(key) {
            Some(KeyCommand::Save) => {
                let snapshot = watcher.borrow().clone();
                if let Err(e) = save_snapshot(images.as_ref(), &params, &snapshot, &events).await {
                    warn!("⚠️ Save requested but failed: {}", e);
                }
            }
            Some(KeyCommand::Detach) => {
                info!("⏏️ Detach requested");
                stop.cancel();
            }
            None => debug!("Ignoring key {:?}", key),
        }
    }
}
