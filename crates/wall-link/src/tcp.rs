// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! TCP star link: the master listens, workers connect and are ranked in
//! accept order.
//!
//! Barrier protocol: every worker sends `BarrierArrive{epoch}`; once all have
//! arrived the master sends `BarrierRelease{epoch}` to everyone.

use std::collections::HashSet;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wall_proto::packet::{frame_len, HEADER_SIZE};
use wall_proto::{Command, Message, SyncBlock, TfPoint};

use crate::inbox::Inbox;
use crate::{LinkError, MasterLink, WorkerLink};

const OUTBOX_DEPTH: usize = 256;

/// Reads one complete packet. Returns `Ok(None)` on a clean close before any
/// header byte.
async fn read_packet<R>(reader: &mut R) -> Result<Option<Vec<u8>>, LinkError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    let mut read = 0usize;
    while read < HEADER_SIZE {
        let n = reader.read(&mut header[read..]).await?;
        if n == 0 {
            if read == 0 {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("truncated frame header: read {read} of {HEADER_SIZE} bytes"),
            )
            .into());
        }
        read += n;
    }
    let (_, total) = frame_len(&header)?;
    let mut packet = vec![0u8; total];
    packet[..HEADER_SIZE].copy_from_slice(&header);
    reader.read_exact(&mut packet[HEADER_SIZE..]).await?;
    Ok(Some(packet))
}

async fn write_message(writer: &mut OwnedWriteHalf, msg: &Message) -> Result<(), LinkError> {
    writer.write_all(&msg.encode()?).await?;
    Ok(())
}

/// Listening socket that turns connecting workers into a [`TcpMasterLink`].
pub struct TcpHub {
    listener: TcpListener,
}

impl TcpHub {
    /// Binds the hub.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, LinkError> {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
        })
    }

    /// Bound address (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, LinkError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts exactly `workers` workers, assigning ranks `1..=workers` in
    /// accept order.
    pub async fn accept(self, workers: usize) -> Result<TcpMasterLink, LinkError> {
        let count = u32::try_from(workers)
            .map_err(|_| LinkError::Handshake(format!("too many workers: {workers}")))?;
        let (events_tx, events) = mpsc::channel(OUTBOX_DEPTH);
        let mut outboxes = Vec::with_capacity(workers);
        let mut hostnames = Vec::with_capacity(workers);
        for rank in 1..=workers {
            let (stream, peer) = self.listener.accept().await?;
            stream.set_nodelay(true)?;
            let (mut reader, mut writer) = stream.into_split();
            let hostname = match read_packet(&mut reader).await? {
                Some(bytes) => match Message::decode(&bytes)?.0 {
                    Message::Hello { hostname } => hostname,
                    other => {
                        return Err(LinkError::Unexpected {
                            phase: "waiting for hello",
                            got: other.kind(),
                        })
                    }
                },
                None => return Err(LinkError::PeerLost { rank }),
            };
            #[allow(clippy::cast_possible_truncation)]
            let welcome = Message::Welcome {
                rank: rank as u32,
                worker_count: count,
            };
            write_message(&mut writer, &welcome).await?;
            info!(rank, %peer, %hostname, "worker joined");

            // writer task
            let (tx, mut rx) = mpsc::channel::<Vec<u8>>(OUTBOX_DEPTH);
            tokio::spawn(async move {
                while let Some(buf) = rx.recv().await {
                    if writer.write_all(&buf).await.is_err() {
                        break;
                    }
                }
            });

            // reader task
            let events_tx = events_tx.clone();
            tokio::spawn(async move {
                loop {
                    let event = match read_packet(&mut reader).await {
                        Ok(Some(bytes)) => Message::decode(&bytes)
                            .map(|(msg, _)| msg)
                            .map_err(LinkError::from),
                        Ok(None) => Err(LinkError::PeerLost { rank }),
                        Err(err) => Err(err),
                    };
                    let done = event.is_err();
                    if events_tx.send((rank, event)).await.is_err() || done {
                        break;
                    }
                }
            });

            outboxes.push(tx);
            hostnames.push(hostname);
        }
        Ok(TcpMasterLink {
            outboxes,
            hostnames,
            events,
            epoch: 0,
        })
    }
}

/// Master end of the TCP star.
pub struct TcpMasterLink {
    outboxes: Vec<mpsc::Sender<Vec<u8>>>,
    hostnames: Vec<String>,
    events: mpsc::Receiver<(usize, Result<Message, LinkError>)>,
    epoch: u64,
}

impl TcpMasterLink {
    /// Hostname each worker announced, indexed by `rank - 1`.
    pub fn hostnames(&self) -> &[String] {
        &self.hostnames
    }

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

impl MasterLink for TcpMasterLink {
    fn worker_count(&self) -> usize {
        self.outboxes.len()
    }

    async fn broadcast_sync(&mut self, block: &SyncBlock) -> Result<(), LinkError> {
        self.broadcast(&Message::Sync(*block)).await
    }

    async fn barrier(&mut self) -> Result<(), LinkError> {
        self.epoch += 1;
        let epoch = self.epoch;
        let mut arrived = HashSet::with_capacity(self.outboxes.len());
        while arrived.len() < self.outboxes.len() {
            let (rank, event) = self
                .events
                .recv()
                .await
                .ok_or(LinkError::PeerLost { rank: 0 })?;
            match event? {
                Message::BarrierArrive { epoch: got } if got == epoch => {
                    arrived.insert(rank);
                }
                Message::BarrierArrive { epoch: got } => {
                    return Err(LinkError::EpochMismatch {
                        rank,
                        expected: epoch,
                        got,
                    })
                }
                other => {
                    return Err(LinkError::Unexpected {
                        phase: "collecting barrier arrivals",
                        got: other.kind(),
                    })
                }
            }
        }
        debug!(epoch, "barrier released");
        self.broadcast(&Message::BarrierRelease { epoch }).await
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

/// Worker end of the TCP star.
pub struct TcpWorkerLink {
    rank: usize,
    worker_count: usize,
    writer: OwnedWriteHalf,
    inbox: Inbox,
    epoch: u64,
}

impl TcpWorkerLink {
    /// Connects to the master and completes the rank handshake.
    pub async fn connect(addr: impl ToSocketAddrs, hostname: &str) -> Result<Self, LinkError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (mut reader, mut writer) = stream.into_split();
        write_message(
            &mut writer,
            &Message::Hello {
                hostname: hostname.to_owned(),
            },
        )
        .await?;
        let (rank, worker_count) = match read_packet(&mut reader).await? {
            Some(bytes) => match Message::decode(&bytes)?.0 {
                Message::Welcome { rank, worker_count } => (rank as usize, worker_count as usize),
                other => {
                    return Err(LinkError::Unexpected {
                        phase: "waiting for welcome",
                        got: other.kind(),
                    })
                }
            },
            None => return Err(LinkError::PeerLost { rank: 0 }),
        };
        if rank == 0 || rank > worker_count {
            return Err(LinkError::Handshake(format!(
                "rank {rank} outside 1..={worker_count}"
            )));
        }

        let (tx, rx) = mpsc::channel(OUTBOX_DEPTH);
        tokio::spawn(async move {
            loop {
                match read_packet(&mut reader).await {
                    Ok(Some(bytes)) => {
                        if tx.send(bytes).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(?err, "master connection failed");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            rank,
            worker_count,
            writer,
            inbox: Inbox::new(rx),
            epoch: 0,
        })
    }
}

impl WorkerLink for TcpWorkerLink {
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
        self.epoch += 1;
        let epoch = self.epoch;
        write_message(&mut self.writer, &Message::BarrierArrive { epoch }).await?;
        match self.inbox.next_control().await? {
            Message::BarrierRelease { epoch: got } if got == epoch => Ok(()),
            Message::BarrierRelease { epoch: got } => Err(LinkError::EpochMismatch {
                rank: 0,
                expected: epoch,
                got,
            }),
            other => Err(LinkError::Unexpected {
                phase: "waiting for barrier release",
                got: other.kind(),
            }),
        }
    }

    fn try_recv_transfer_function(&mut self) -> Result<Option<Vec<TfPoint>>, LinkError> {
        self.inbox.take_transfer_function()
    }

    fn try_recv_command(&mut self) -> Result<Option<Command>, LinkError> {
        self.inbox.pop_command()
    }
}
