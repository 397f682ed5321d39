// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-process link: encoded packets over channels plus a shared barrier.

use std::sync::Arc;

use tokio::sync::{mpsc, Barrier};
use wall_proto::{Command, Message, SyncBlock, TfPoint};

use crate::inbox::Inbox;
use crate::{LinkError, MasterLink, WorkerLink};

const OUTBOX_DEPTH: usize = 256;

/// Master end of an in-process cluster.
pub struct InProcessMaster {
    outboxes: Vec<mpsc::Sender<Vec<u8>>>,
    barrier: Arc<Barrier>,
}

/// Worker end of an in-process cluster.
pub struct InProcessWorker {
    rank: usize,
    worker_count: usize,
    inbox: Inbox,
    barrier: Arc<Barrier>,
}

/// Builds a master link and `workers` worker links (ranks `1..=workers`).
pub fn in_process(workers: usize) -> (InProcessMaster, Vec<InProcessWorker>) {
    let barrier = Arc::new(Barrier::new(workers + 1));
    let mut outboxes = Vec::with_capacity(workers);
    let mut ends = Vec::with_capacity(workers);
    for rank in 1..=workers {
        let (tx, rx) = mpsc::channel(OUTBOX_DEPTH);
        outboxes.push(tx);
        ends.push(InProcessWorker {
            rank,
            worker_count: workers,
            inbox: Inbox::new(rx),
            barrier: Arc::clone(&barrier),
        });
    }
    (InProcessMaster { outboxes, barrier }, ends)
}

impl InProcessMaster {
    async fn broadcast(&self, msg: &Message) -> Result<(), LinkError> {
        let bytes = msg.encode()?;
        for (idx, tx) in self.outboxes.iter().enumerate() {
            tx.send(bytes.clone())
                .await
                .map_err(|_| LinkError::PeerLost { rank: idx + 1 })?;
        }
        Ok(())
    }
}

impl MasterLink for InProcessMaster {
    fn worker_count(&self) -> usize {
        self.outboxes.len()
    }

    async fn broadcast_sync(&mut self, block: &SyncBlock) -> Result<(), LinkError> {
        self.broadcast(&Message::Sync(*block)).await
    }

    async fn barrier(&mut self) -> Result<(), LinkError> {
        self.barrier.wait().await;
        Ok(())
    }

    async fn push_transfer_function(&mut self, points: &[TfPoint]) -> Result<(), LinkError> {
        self.broadcast(&Message::TransferFunction(points.to_vec()))
            .await
    }

    async fn send_command(&mut self, command: &Command) -> Result<(), LinkError> {
        self.broadcast(&Message::Command(command.clone())).await
    }

    async fn shutdown(&mut self) -> Result<(), LinkError> {
        self.broadcast(&Message::Shutdown).await
    }
}

impl WorkerLink for InProcessWorker {
    fn rank(&self) -> usize {
        self.rank
    }

    fn worker_count(&self) -> usize {
        self.worker_count
    }

    async fn recv_sync(&mut self) -> Result<Option<SyncBlock>, LinkError> {
        match self.inbox.next_control().await? {
            Message::Sync(block) => Ok(Some(block)),
            Message::Shutdown => Ok(None),
            other => Err(LinkError::Unexpected {
                phase: "waiting for sync",
                got: other.kind(),
            }),
        }
    }

    async fn barrier(&mut self) -> Result<(), LinkError> {
        self.barrier.wait().await;
        Ok(())
    }

    fn try_recv_transfer_function(&mut self) -> Result<Option<Vec<TfPoint>>, LinkError> {
        self.inbox.take_transfer_function()
    }

    fn try_recv_command(&mut self) -> Result<Option<Command>, LinkError> {
        self.inbox.pop_command()
    }
}
