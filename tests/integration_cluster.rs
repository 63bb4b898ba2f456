//! Exercises the real TCP transport end to end: a `MasterRouter` bound on
//! `127.0.0.1`, with worker tasks connecting in-process via
//! `transport::worker::connect_to_master`. No SSH launch involved — this
//! is the router/transport layer the launcher hands off to once workers
//! are running.

use mpi_run::comm::{Comm, Transport};
use mpi_run::transport::{master::MasterRouter, worker};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

async fn spawn_cluster(world_size: u32) -> (Arc<Comm>, Vec<Arc<Comm>>) {
    let router = MasterRouter::bind("127.0.0.1", 0, world_size - 1)
        .await
        .expect("bind master router");
    let port = router.actual_port();

    let mut worker_handles = Vec::new();
    for rank in 1..world_size {
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(async move {
            worker::connect_to_master("127.0.0.1", port, rank, cancel)
                .await
                .expect("worker connects")
        });
        worker_handles.push(handle);
    }

    router
        .accept_all(Duration::from_secs(5))
        .await
        .expect("master accepts every worker");

    let master_comm = Arc::new(Comm::new(0, world_size, Transport::Master(router)));
    let mut workers = Vec::new();
    for (rank, handle) in (1..world_size).zip(worker_handles) {
        let transport = handle.await.expect("worker task panicked");
        workers.push(Arc::new(Comm::new(rank, world_size, Transport::Worker(transport))));
    }
    (master_comm, workers)
}

#[tokio::test]
async fn point_to_point_send_recv_across_real_sockets() {
    let (master, workers) = spawn_cluster(2).await;
    let worker = workers.into_iter().next().unwrap();

    let send_task = tokio::spawn(async move {
        master.send(&42i32, 1, 0).await.unwrap();
    });
    let value: i32 = worker.recv(Some(0), Some(0), Some(Duration::from_secs(2))).await.unwrap();
    send_task.await.unwrap();

    assert_eq!(value, 42);
}

#[tokio::test]
async fn broadcast_reaches_every_worker() {
    let (master, workers) = spawn_cluster(3).await;

    let bcast_task = tokio::spawn(async move { master.bcast(99i32, 0).await.unwrap() });

    let mut recv_tasks = Vec::new();
    for worker in workers {
        recv_tasks.push(tokio::spawn(async move { worker.bcast(0i32, 0).await.unwrap() }));
    }

    assert_eq!(bcast_task.await.unwrap(), 99);
    for t in recv_tasks {
        assert_eq!(t.await.unwrap(), 99);
    }
}

#[tokio::test]
async fn gather_collects_in_rank_order() {
    let (master, workers) = spawn_cluster(3).await;

    let gather_task = tokio::spawn(async move { master.gather(0i32, 0).await.unwrap() });

    let mut send_tasks = Vec::new();
    for (i, worker) in workers.into_iter().enumerate() {
        let v = (i as i32 + 1) * 10;
        send_tasks.push(tokio::spawn(async move {
            let out = worker.gather(v, 0).await.unwrap();
            assert!(out.is_none());
        }));
    }
    for t in send_tasks {
        t.await.unwrap();
    }

    let gathered = gather_task.await.unwrap().unwrap();
    assert_eq!(gathered, vec![0, 10, 20]);
}

#[tokio::test]
async fn barrier_releases_every_rank() {
    let (master, workers) = spawn_cluster(4).await;

    let mut tasks = vec![tokio::spawn(async move { master.barrier().await.unwrap() })];
    for worker in workers {
        tasks.push(tokio::spawn(async move { worker.barrier().await.unwrap() }));
    }
    for t in tasks {
        tokio::time::timeout(Duration::from_secs(5), t)
            .await
            .expect("barrier did not release within timeout")
            .unwrap();
    }
}

#[tokio::test]
async fn cancel_broadcast_sets_worker_cancel_flag() {
    let (master, workers) = spawn_cluster(2).await;
    let worker = workers.into_iter().next().unwrap();
    let worker_cancel = worker.cancel_flag().unwrap();

    master.broadcast_cancel().await.unwrap();

    let start = std::time::Instant::now();
    while !worker_cancel.load(std::sync::atomic::Ordering::SeqCst) {
        if start.elapsed() > Duration::from_secs(2) {
            panic!("cancel flag never observed");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
