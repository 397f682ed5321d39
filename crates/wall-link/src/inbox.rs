// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use std::collections::VecDeque;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use wall_proto::{Command, Message, TfPoint};

use crate::LinkError;

/// Worker-side packet queue.
///
/// Control messages (sync, barrier, shutdown) are handed back to the caller;
/// transfer functions and commands are parked until the worker drains them.
pub(crate) struct Inbox {
    rx: mpsc::Receiver<Vec<u8>>,
    transfer_function: Option<Vec<TfPoint>>,
    commands: VecDeque<Command>,
}

impl Inbox {
    pub(crate) fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            transfer_function: None,
            commands: VecDeque::new(),
        }
    }

    fn park(&mut self, msg: Message) -> Option<Message> {
        match msg {
            Message::TransferFunction(points) => {
                self.transfer_function = Some(points);
                None
            }
            Message::Command(cmd) => {
                self.commands.push_back(cmd);
                None
            }
            other => Some(other),
        }
    }

    /// Waits for the next control message from the master.
    pub(crate) async fn next_control(&mut self) -> Result<Message, LinkError> {
        loop {
            let bytes = self
                .rx
                .recv()
                .await
                .ok_or(LinkError::PeerLost { rank: 0 })?;
            let (msg, _) = Message::decode(&bytes)?;
            if let Some(control) = self.park(msg) {
                return Ok(control);
            }
        }
    }

    /// Parks everything already delivered without waiting.
    fn poll_ready(&mut self) -> Result<(), LinkError> {
        loop {
            match self.rx.try_recv() {
                Ok(bytes) => {
                    let (msg, _) = Message::decode(&bytes)?;
                    if let Some(control) = self.park(msg) {
                        return Err(LinkError::Unexpected {
                            phase: "draining updates",
                            got: control.kind(),
                        });
                    }
                }
                // A closed channel surfaces at the next blocking receive.
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return Ok(()),
            }
        }
    }

    pub(crate) fn take_transfer_function(&mut self) -> Result<Option<Vec<TfPoint>>, LinkError> {
        self.poll_ready()?;
        Ok(self.transfer_function.take())
    }

    pub(crate) fn pop_command(&mut self) -> Result<Option<Command>, LinkError> {
        self.poll_ready()?;
        Ok(self.commands.pop_front())
    }
}
