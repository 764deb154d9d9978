//! One run, end to end
//!
//! [`RunController`] loads the initial image, starts the run on the
//! coordinator and, while StartRun is outstanding, polls the population and
//! serves interactive commands. When the run ends it reports the final state,
//! writes the final image and closes the event stream.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};
use tracing::{debug, error, info, warn};

use coordinator::proto::{
    AliveCellsCountRequest, PauseRequest, QuitRequest, ResumeRequest, ShutdownRequest,
    SnapshotRequest, StartRunRequest, StartRunResponse,
};
use coordinator::CoordinatorClient;
use life_core::config::{ControllerConfig, NetworkConfig};
use life_core::{Cell, Error, Grid, Result, Turn};

use crate::command::Command;
use crate::events::{Event, State};
use crate::image::{input_name, output_name, ImageStore};

/// Parameters of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    pub turns: Turn,
    pub threads: usize,
    pub image_width: usize,
    pub image_height: usize,
}

impl From<&ControllerConfig> for Params {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            turns: config.turns,
            threads: config.threads,
            image_width: config.image_width,
            image_height: config.image_height,
        }
    }
}

/// Final state of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub final_turn: Turn,
    pub grid: Grid,
    pub alive: Vec<Cell>,
}

fn status_to_error(status: Status) -> Error {
    Error::Grpc(format!("{:?}: {}", status.code(), status.message()))
}

pub struct RunController {
    client: CoordinatorClient<Channel>,
    params: Params,
    store: Arc<dyn ImageStore>,
    events: mpsc::UnboundedSender<Event>,
    poll_interval: Duration,
}

impl RunController {
    /// Connect to the coordinator; failure here is fatal for the run
    pub async fn connect(
        address: &str,
        network: &NetworkConfig,
        params: Params,
        store: Arc<dyn ImageStore>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Result<Self> {
        let uri = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };

        let channel = Endpoint::from_shared(uri)
            .map_err(|e| Error::InvalidConfig {
                message: format!("invalid coordinator address {}: {}", address, e),
            })?
            .connect_timeout(network.connect_timeout)
            .tcp_keepalive(Some(network.tcp_keepalive))
            .connect()
            .await
            .map_err(|e| Error::CoordinatorUnavailable {
                address: address.to_string(),
                message: e.to_string(),
            })?;

        let client = CoordinatorClient::new(channel)
            .max_decoding_message_size(network.max_message_size)
            .max_encoding_message_size(network.max_message_size);

        info!(address = %address, "Connected to coordinator");

        Ok(Self {
            client,
            params,
            store,
            events,
            poll_interval: ControllerConfig::default().poll_interval,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }

    /// Drive the run to completion, serving `commands` while it executes
    ///
    /// Consumes the controller so the event stream closes when this returns.
    pub async fn run(self, mut commands: mpsc::Receiver<Command>) -> Result<RunReport> {
        let Params {
            turns,
            threads,
            image_width: width,
            image_height: height,
        } = self.params;

        let grid = self.store.load(&input_name(width, height), height, width)?;
        for cell in grid.alive_cells() {
            self.emit(Event::CellFlipped { turn: 0, cell });
        }

        info!(turns = turns, width = width, height = height, threads = threads, "Starting run");

        let request = StartRunRequest {
            turns,
            height: height as u32,
            width: width as u32,
            thread_count: threads as u32,
            grid: Bytes::from(grid.into_bytes()),
        };
        let mut start_client = self.client.clone();
        let mut run = tokio::spawn(async move { start_client.start_run(request).await });

        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut paused = false;
        let mut terminate = false;
        let mut commands_open = true;

        let response = loop {
            tokio::select! {
                result = &mut run => {
                    let response = result
                        .map_err(|e| Error::Internal {
                            message: format!("StartRun task failed: {}", e),
                        })?
                        .map_err(|status| {
                            error!(error = %status, "Run failed");
                            status_to_error(status)
                        })?;
                    break response.into_inner();
                }
                _ = ticker.tick(), if !paused => {
                    self.report_alive_cells().await;
                }
                command = commands.recv(), if commands_open => {
                    match command {
                        Some(Command::Snapshot) => self.snapshot().await?,
                        Some(Command::TogglePause) => {
                            paused = self.toggle_pause(paused).await?;
                            if !paused {
                                ticker.reset();
                            }
                        }
                        Some(Command::Quit) => self.quit().await?,
                        Some(Command::Terminate) => {
                            terminate = true;
                            self.quit().await?;
                        }
                        None => commands_open = false,
                    }
                }
            }
        };

        let report = self.finish(response, width, height)?;

        if terminate {
            let mut client = self.client.clone();
            client
                .shutdown(ShutdownRequest {})
                .await
                .map_err(status_to_error)?;
            info!("Coordinator and workers shut down");
        }

        self.emit(Event::StateChange {
            turn: report.final_turn,
            state: State::Quitting,
        });
        Ok(report)
    }

    fn finish(&self, response: StartRunResponse, width: usize, height: usize) -> Result<RunReport> {
        let grid = Grid::from_bytes(height, width, response.final_grid.to_vec())?;
        let alive: Vec<Cell> = response
            .alive_cells
            .iter()
            .map(|c| Cell::new(c.x as usize, c.y as usize))
            .collect();
        let final_turn = response.final_turn;

        info!(final_turn = final_turn, alive = alive.len(), "Run complete");
        self.emit(Event::FinalTurnComplete {
            completed_turns: final_turn,
            alive: alive.clone(),
        });

        let filename = output_name(width, height, final_turn);
        self.store.save(&filename, &grid)?;
        self.emit(Event::ImageOutputComplete {
            turn: final_turn,
            filename,
        });

        Ok(RunReport {
            final_turn,
            grid,
            alive,
        })
    }

    async fn report_alive_cells(&self) {
        let mut client = self.client.clone();
        match client.alive_cells_count(AliveCellsCountRequest {}).await {
            Ok(response) => {
                let response = response.into_inner();
                self.emit(Event::AliveCellsCount {
                    completed_turns: response.completed_turns,
                    cells_count: response.cells_count as usize,
                });
            }
            Err(status) => warn!(error = %status, "AliveCellsCount failed"),
        }
    }

    async fn snapshot(&self) -> Result<()> {
        let mut client = self.client.clone();
        let snapshot = client
            .snapshot(SnapshotRequest {})
            .await
            .map_err(status_to_error)?
            .into_inner();

        let (height, width) = (snapshot.height as usize, snapshot.width as usize);
        if height == 0 || width == 0 {
            warn!("Snapshot requested with no active run");
            return Ok(());
        }

        let grid = Grid::from_bytes(height, width, snapshot.grid.to_vec())?;
        let filename = output_name(width, height, snapshot.turn);
        self.store.save(&filename, &grid)?;

        info!(turn = snapshot.turn, filename = %filename, "Snapshot written");
        self.emit(Event::ImageOutputComplete {
            turn: snapshot.turn,
            filename,
        });
        Ok(())
    }

    /// Returns the new paused flag
    async fn toggle_pause(&self, paused: bool) -> Result<bool> {
        let mut client = self.client.clone();
        let result = if paused {
            client.resume(ResumeRequest {}).await
        } else {
            client.pause(PauseRequest {}).await
        };

        match result {
            Ok(response) => {
                let turn = response.into_inner().turn;
                let state = if paused { State::Executing } else { State::Paused };
                info!(turn = turn, state = %state, "Run state changed");
                self.emit(Event::StateChange { turn, state });
                Ok(!paused)
            }
            // The run ended between the key press and the call
            Err(status) if status.code() == Code::FailedPrecondition => {
                warn!(error = %status, "Pause toggle ignored");
                Ok(paused)
            }
            Err(status) => Err(status_to_error(status)),
        }
    }

    async fn quit(&self) -> Result<()> {
        let mut client = self.client.clone();
        match client.quit(QuitRequest {}).await {
            Ok(response) => {
                info!(turn = response.into_inner().turn, "Run quit");
                Ok(())
            }
            Err(status) if status.code() == Code::FailedPrecondition => {
                debug!(error = %status, "Run already finished");
                Ok(())
            }
            Err(status) => Err(status_to_error(status)),
        }
    }
}
