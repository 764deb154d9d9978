use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use compute_worker::{WorkerServer, WorkerService};
use coordinator::proto::{
    AliveCellsCountRequest, PauseRequest, QuitRequest, ResumeRequest, ShutdownRequest,
    SnapshotRequest, StartRunRequest,
};
use coordinator::{CoordinatorClient, CoordinatorServer, CoordinatorService, RemoteWorkerPool};
use life_core::config::NetworkConfig;
use life_core::{kernel, Grid};

type ServerHandle = JoinHandle<Result<(), Box<dyn std::error::Error + Send + Sync>>>;

fn local_addr() -> Result<SocketAddr> {
    let port = portpicker::pick_unused_port().expect("No ports free");
    Ok(format!("127.0.0.1:{}", port).parse()?)
}

// Start `count` compute workers on random ports
async fn start_workers(count: usize) -> Result<(Vec<String>, Vec<ServerHandle>)> {
    let mut addresses = Vec::with_capacity(count);
    let mut handles = Vec::with_capacity(count);

    for _ in 0..count {
        let addr = local_addr()?;
        handles.push(tokio::spawn(
            WorkerServer::new(WorkerService::new()).run_on(addr),
        ));
        addresses.push(addr.to_string());
    }

    // Give them a moment to start
    sleep(Duration::from_millis(100)).await;
    Ok((addresses, handles))
}

// Start a coordinator wired to the given workers
async fn start_coordinator(workers: &[String]) -> Result<(String, ServerHandle)> {
    let pool = RemoteWorkerPool::connect(workers, &NetworkConfig::default()).await?;
    let service = CoordinatorService::new(Arc::new(pool));

    let addr = local_addr()?;
    let handle = tokio::spawn(CoordinatorServer::new(service).run_on(addr));
    sleep(Duration::from_millis(100)).await;

    Ok((format!("http://{}", addr), handle))
}

fn random_grid(height: usize, width: usize, seed: u64) -> Grid {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut grid = Grid::new(height, width);
    for row in 0..height {
        for col in 0..width {
            grid.set(row, col, rng.gen_bool(0.35));
        }
    }
    grid
}

fn reference(grid: &Grid, turns: u64) -> Result<Grid> {
    let mut current = grid.clone();
    for _ in 0..turns {
        current = kernel::step(&current, 1)?;
    }
    Ok(current)
}

fn start_request(grid: &Grid, turns: u64, thread_count: u32) -> StartRunRequest {
    StartRunRequest {
        turns,
        height: grid.height() as u32,
        width: grid.width() as u32,
        thread_count,
        grid: Bytes::copy_from_slice(grid.as_bytes()),
    }
}

#[tokio::test]
async fn test_distributed_run_matches_local() -> Result<()> {
    let (workers, _worker_handles) = start_workers(4).await?;
    let (addr, _coordinator) = start_coordinator(&workers).await?;
    let mut client = CoordinatorClient::connect(addr).await?;

    let grid = random_grid(48, 64, 7);
    let response = client
        .start_run(start_request(&grid, 25, 3))
        .await?
        .into_inner();

    let expected = reference(&grid, 25)?;
    assert_eq!(response.final_turn, 25);
    assert_eq!(response.final_grid.as_ref(), expected.as_bytes());
    assert_eq!(response.alive_cells.len(), expected.alive_count());

    Ok(())
}

#[tokio::test]
async fn test_pool_larger_than_grid_height() -> Result<()> {
    let (workers, _worker_handles) = start_workers(4).await?;
    let (addr, _coordinator) = start_coordinator(&workers).await?;
    let mut client = CoordinatorClient::connect(addr).await?;

    let grid = Grid::from_rows(&["......", "..###.", "......"])?;
    let response = client
        .start_run(start_request(&grid, 4, 1))
        .await?
        .into_inner();

    assert_eq!(response.final_grid.as_ref(), reference(&grid, 4)?.as_bytes());
    Ok(())
}

#[tokio::test]
async fn test_pause_resume_quit_over_grpc() -> Result<()> {
    let (workers, _worker_handles) = start_workers(2).await?;
    let (addr, _coordinator) = start_coordinator(&workers).await?;
    let mut client = CoordinatorClient::connect(addr).await?;

    let grid = random_grid(32, 32, 11);
    let mut run_client = client.clone();
    let run = {
        let request = start_request(&grid, u64::MAX, 2);
        tokio::spawn(async move { run_client.start_run(request).await })
    };

    // Let a few turns complete
    loop {
        let count = client
            .alive_cells_count(AliveCellsCountRequest {})
            .await?
            .into_inner();
        if count.completed_turns >= 3 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }

    let paused_at = client.pause(PauseRequest {}).await?.into_inner().turn;
    sleep(Duration::from_millis(100)).await;

    // Frozen while paused
    let count = client
        .alive_cells_count(AliveCellsCountRequest {})
        .await?
        .into_inner();
    assert_eq!(count.completed_turns, paused_at);

    let snapshot = client.snapshot(SnapshotRequest {}).await?.into_inner();
    assert_eq!(snapshot.turn, paused_at);
    assert_eq!(snapshot.grid.as_ref(), reference(&grid, paused_at)?.as_bytes());
    assert_eq!(count.cells_count as usize, reference(&grid, paused_at)?.alive_count());

    // A second pause is rejected
    let status = client.pause(PauseRequest {}).await.unwrap_err();
    assert_eq!(status.code(), tonic::Code::FailedPrecondition);

    let resumed_at = client.resume(ResumeRequest {}).await?.into_inner().turn;
    assert_eq!(resumed_at, paused_at);

    let quit_turn = client.quit(QuitRequest {}).await?.into_inner().turn;
    assert!(quit_turn >= paused_at);

    let response = run.await??.into_inner();
    assert_eq!(response.final_turn, quit_turn);
    assert_eq!(response.final_grid.as_ref(), reference(&grid, quit_turn)?.as_bytes());

    // Idle again: queries report turn 0 and the next run may start
    let count = client
        .alive_cells_count(AliveCellsCountRequest {})
        .await?
        .into_inner();
    assert_eq!(count.completed_turns, 0);

    let response = client
        .start_run(start_request(&grid, 2, 1))
        .await?
        .into_inner();
    assert_eq!(response.final_turn, 2);

    Ok(())
}

#[tokio::test]
async fn test_lifecycle_errors_when_idle() -> Result<()> {
    let (workers, _worker_handles) = start_workers(1).await?;
    let (addr, _coordinator) = start_coordinator(&workers).await?;
    let mut client = CoordinatorClient::connect(addr).await?;

    let status = client.pause(PauseRequest {}).await.unwrap_err();
    assert_eq!(status.code(), tonic::Code::FailedPrecondition);

    let status = client.resume(ResumeRequest {}).await.unwrap_err();
    assert_eq!(status.code(), tonic::Code::FailedPrecondition);

    let status = client.quit(QuitRequest {}).await.unwrap_err();
    assert_eq!(status.code(), tonic::Code::FailedPrecondition);

    let snapshot = client.snapshot(SnapshotRequest {}).await?.into_inner();
    assert_eq!(snapshot.turn, 0);
    assert!(snapshot.grid.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_close_all_stops_every_process() -> Result<()> {
    let (workers, worker_handles) = start_workers(3).await?;
    let (addr, coordinator) = start_coordinator(&workers).await?;
    let mut client = CoordinatorClient::connect(addr).await?;

    let mut run_client = client.clone();
    let grid = random_grid(24, 24, 3);
    let run = {
        let request = start_request(&grid, u64::MAX, 1);
        tokio::spawn(async move { run_client.start_run(request).await })
    };
    sleep(Duration::from_millis(100)).await;

    let ack = client.shutdown(ShutdownRequest {}).await?.into_inner();
    assert!(ack.acknowledged);
    drop(client);

    // The active run was quit before the pool went down
    let response = run.await??.into_inner();
    assert_eq!(
        response.final_grid.as_ref(),
        reference(&grid, response.final_turn)?.as_bytes()
    );

    for handle in worker_handles {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await?
            .map_err(|e| anyhow::anyhow!(e))?
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    tokio::time::timeout(Duration::from_secs(5), coordinator)
        .await?
        .map_err(|e| anyhow::anyhow!(e))?
        .map_err(|e| anyhow::anyhow!(e))?;

    Ok(())
}

#[tokio::test]
async fn test_unreachable_worker_fails_startup() -> Result<()> {
    let (mut workers, _worker_handles) = start_workers(1).await?;
    workers.push(local_addr()?.to_string());

    let result = RemoteWorkerPool::connect(&workers, &NetworkConfig::default()).await;
    assert!(matches!(
        result,
        Err(life_core::Error::WorkerUnavailable { .. })
    ));

    Ok(())
}
