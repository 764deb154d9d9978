use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use compute_worker::{WorkerServer, WorkerService};
use coordinator::{CoordinatorServer, CoordinatorService, RemoteWorkerPool};
use life_core::config::NetworkConfig;
use life_core::{kernel, Grid};
use run_controller::image::output_name;
use run_controller::{Command, Event, ImageStore, Params, PgmStore, RunController, State};

type ServerHandle = JoinHandle<Result<(), Box<dyn std::error::Error + Send + Sync>>>;

/// Compute workers plus a coordinator on random local ports
struct Cluster {
    coordinator_addr: String,
    coordinator: ServerHandle,
    workers: Vec<ServerHandle>,
}

impl Cluster {
    async fn start(worker_count: usize) -> Result<Self> {
        let mut addresses = Vec::new();
        let mut workers = Vec::new();
        for _ in 0..worker_count {
            let addr = local_addr()?;
            workers.push(tokio::spawn(
                WorkerServer::new(WorkerService::new()).run_on(addr),
            ));
            addresses.push(addr.to_string());
        }
        sleep(Duration::from_millis(100)).await;

        let pool = RemoteWorkerPool::connect(&addresses, &NetworkConfig::default()).await?;
        let addr = local_addr()?;
        let coordinator = tokio::spawn(
            CoordinatorServer::new(CoordinatorService::new(Arc::new(pool))).run_on(addr),
        );
        sleep(Duration::from_millis(100)).await;

        Ok(Self {
            coordinator_addr: format!("http://{}", addr),
            coordinator,
            workers,
        })
    }
}

fn local_addr() -> Result<SocketAddr> {
    let port = portpicker::pick_unused_port().expect("No ports free");
    Ok(format!("127.0.0.1:{}", port).parse()?)
}

fn random_grid(size: usize, seed: u64) -> Grid {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut grid = Grid::new(size, size);
    for row in 0..size {
        for col in 0..size {
            grid.set(row, col, rng.gen_bool(0.3));
        }
    }
    grid
}

async fn collect(mut rx: mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_controller_run_writes_final_image() -> Result<()> {
    let cluster = Cluster::start(4).await?;
    let dir = tempfile::tempdir()?;
    let store = PgmStore::new(dir.path(), dir.path());

    let grid = random_grid(16, 21);
    store.save("16x16", &grid)?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let controller = RunController::connect(
        &cluster.coordinator_addr,
        &NetworkConfig::default(),
        Params {
            turns: 30,
            threads: 4,
            image_width: 16,
            image_height: 16,
        },
        Arc::new(store.clone()),
        events_tx,
    )
    .await?
    .with_poll_interval(Duration::from_millis(10));

    let (_commands_tx, commands_rx) = mpsc::channel(4);
    let report = controller.run(commands_rx).await?;
    let events = collect(events_rx).await;

    let mut expected = grid.clone();
    for _ in 0..30 {
        expected = kernel::step(&expected, 2)?;
    }
    assert_eq!(report.final_turn, 30);
    assert_eq!(report.grid, expected);
    assert_eq!(store.load(&output_name(16, 16, 30), 16, 16)?, expected);

    let flipped = events
        .iter()
        .filter(|e| matches!(e, Event::CellFlipped { .. }))
        .count();
    assert_eq!(flipped, grid.alive_count());

    assert!(matches!(
        events.last(),
        Some(Event::StateChange {
            turn: 30,
            state: State::Quitting
        })
    ));

    // Polled counts never run backwards
    let counts: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            Event::AliveCellsCount {
                completed_turns, ..
            } => Some(*completed_turns),
            _ => None,
        })
        .collect();
    assert!(counts.windows(2).all(|w| w[0] <= w[1]));

    Ok(())
}

#[tokio::test]
async fn test_terminate_shuts_down_cluster() -> Result<()> {
    let cluster = Cluster::start(2).await?;
    let dir = tempfile::tempdir()?;
    let store = PgmStore::new(dir.path(), dir.path());
    store.save("16x16", &random_grid(16, 5))?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let controller = RunController::connect(
        &cluster.coordinator_addr,
        &NetworkConfig::default(),
        Params {
            turns: u64::MAX,
            threads: 1,
            image_width: 16,
            image_height: 16,
        },
        Arc::new(store),
        events_tx,
    )
    .await?;

    let (commands_tx, commands_rx) = mpsc::channel(4);
    let run = tokio::spawn(controller.run(commands_rx));

    sleep(Duration::from_millis(150)).await;
    commands_tx.send(Command::Terminate).await?;

    let report = run.await??;
    let events = collect(events_rx).await;

    let final_name = output_name(16, 16, report.final_turn);
    assert!(dir.path().join(format!("{}.pgm", final_name)).exists());
    assert!(events.iter().any(|e| matches!(
        e,
        Event::FinalTurnComplete { completed_turns, .. } if *completed_turns == report.final_turn
    )));

    for handle in cluster.workers {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await?
            .map_err(|e| anyhow::anyhow!(e))?
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    tokio::time::timeout(Duration::from_secs(5), cluster.coordinator)
        .await?
        .map_err(|e| anyhow::anyhow!(e))?
        .map_err(|e| anyhow::anyhow!(e))?;

    Ok(())
}
