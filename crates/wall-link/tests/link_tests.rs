#![allow(missing_docs)]
use wall_link::local::in_process;
use wall_link::tcp::{TcpHub, TcpWorkerLink};
use wall_link::{LinkError, MasterLink, WorkerLink};
use wall_math::Mat4;
use wall_proto::{Command, SyncBlock, TfPoint};

fn block(frame: u32) -> SyncBlock {
    SyncBlock {
        frame,
        time: f64::from(frame) * 0.5,
        transform: Mat4::translation(f32::from(u16::try_from(frame).unwrap()), 0.0, 0.0),
        ..SyncBlock::default()
    }
}

/// Worker side of one tick; returns the block and whatever was drained.
async fn worker_tick<W: WorkerLink>(
    link: &mut W,
) -> Result<Option<(SyncBlock, Option<Vec<TfPoint>>, Vec<Command>)>, LinkError> {
    let Some(b) = link.recv_sync().await? else {
        return Ok(None);
    };
    link.barrier().await?;
    let tf = link.try_recv_transfer_function()?;
    let mut cmds = Vec::new();
    while let Some(c) = link.try_recv_command()? {
        cmds.push(c);
    }
    link.barrier().await?;
    Ok(Some((b, tf, cmds)))
}

async fn master_tick<M: MasterLink>(
    link: &mut M,
    frame: u32,
    tf: Option<&[TfPoint]>,
    cmds: &[Command],
) -> Result<(), LinkError> {
    if let Some(points) = tf {
        link.push_transfer_function(points).await?;
    }
    link.broadcast_sync(&block(frame)).await?;
    link.barrier().await?;
    link.barrier().await?;
    for c in cmds {
        link.send_command(c).await?;
    }
    Ok(())
}

#[tokio::test]
async fn in_process_delivers_same_blocks_in_order() {
    let (mut master, workers) = in_process(3);
    assert_eq!(master.worker_count(), 3);
    let handles: Vec<_> = workers
        .into_iter()
        .map(|mut w| {
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some((b, _, _)) = worker_tick(&mut w).await.unwrap() {
                    seen.push(b);
                }
                (w.rank(), seen)
            })
        })
        .collect();
    for frame in 0..5 {
        master_tick(&mut master, frame, None, &[]).await.unwrap();
    }
    master.shutdown().await.unwrap();
    let expected: Vec<_> = (0..5).map(block).collect();
    let mut ranks = Vec::new();
    for h in handles {
        let (rank, seen) = h.await.unwrap();
        assert_eq!(seen, expected);
        ranks.push(rank);
    }
    assert_eq!(ranks, vec![1, 2, 3]);
}

#[tokio::test]
async fn updates_sent_after_a_tick_are_drained_on_the_next() {
    let (mut master, mut workers) = in_process(1);
    let mut w = workers.remove(0);
    let tf = vec![TfPoint::new(1.0, 0.0, 0.0, 1.0, 0.5)];
    let cmd = Command::new("draw_balls", vec![0], vec![]);

    let worker = tokio::spawn(async move {
        let mut ticks = Vec::new();
        while let Some(t) = worker_tick(&mut w).await.unwrap() {
            ticks.push(t);
        }
        ticks
    });
    master_tick(&mut master, 0, None, std::slice::from_ref(&cmd))
        .await
        .unwrap();
    master_tick(&mut master, 1, Some(&tf), &[]).await.unwrap();
    master.shutdown().await.unwrap();

    let ticks = worker.await.unwrap();
    assert_eq!(ticks.len(), 2);
    assert!(ticks[0].1.is_none() && ticks[0].2.is_empty());
    assert_eq!(ticks[1].1.as_deref(), Some(tf.as_slice()));
    assert_eq!(ticks[1].2, vec![cmd]);
}

#[tokio::test]
async fn dropped_master_is_peer_lost() {
    let (master, mut workers) = in_process(1);
    drop(master);
    let err = workers[0].recv_sync().await.unwrap_err();
    assert!(matches!(err, LinkError::PeerLost { rank: 0 }));
}

#[tokio::test]
async fn tcp_star_ranks_and_synchronizes() {
    let hub = TcpHub::bind("127.0.0.1:0").await.unwrap();
    let addr = hub.local_addr().unwrap();
    let accept = tokio::spawn(hub.accept(2));
    let mut w1 = TcpWorkerLink::connect(addr, "cave-1").await.unwrap();
    let mut w2 = TcpWorkerLink::connect(addr, "cave-2").await.unwrap();
    let mut master = accept.await.unwrap().unwrap();
    assert_eq!(master.hostnames(), ["cave-1", "cave-2"]);
    assert_eq!((w1.rank(), w2.rank(), w2.worker_count()), (1, 2, 2));

    let cmd = Command::new("color_scale", vec![], vec![1.3]);
    let run_worker = |mut w: TcpWorkerLink| {
        tokio::spawn(async move {
            let mut out = Vec::new();
            while let Some(t) = worker_tick(&mut w).await.unwrap() {
                out.push(t);
            }
            out
        })
    };
    let h1 = run_worker(w1);
    let h2 = run_worker(w2);
    for frame in 0..3 {
        master_tick(&mut master, frame, None, std::slice::from_ref(&cmd))
            .await
            .unwrap();
    }
    master.shutdown().await.unwrap();
    let a = h1.await.unwrap();
    let b = h2.await.unwrap();
    assert_eq!(a.len(), 3);
    assert_eq!(a, b);
    assert!(a[0].2.is_empty());
    assert_eq!(a[2].2, vec![cmd]);
}

#[tokio::test]
async fn tcp_barrier_reports_lost_worker() {
    let hub = TcpHub::bind("127.0.0.1:0").await.unwrap();
    let addr = hub.local_addr().unwrap();
    let accept = tokio::spawn(hub.accept(1));
    let worker = TcpWorkerLink::connect(addr, "cave-1").await.unwrap();
    let mut master = accept.await.unwrap().unwrap();
    drop(worker);
    let err = master.barrier().await.unwrap_err();
    assert!(matches!(err, LinkError::PeerLost { rank: 1 }));
}
