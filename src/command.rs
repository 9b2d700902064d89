//! Commands that other tasks send to the life engine, and the queue
//! that carries them.
//!
//! Producers (HTTP handlers) hold a cloneable [`CommandSender`]; the render
//! thread owns the single [`CommandReceiver`]. The queue is an unbounded
//! `std::sync::mpsc` channel, so sending never blocks and commands come
//! out in the order they went in.

use serde::Serialize;
use std::fmt;
use std::sync::mpsc::{self, Receiver, SendError, Sender, TryRecvError};

/// Runtime mutations the engine understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifeCommand {
    /// Replace the board with a fresh random one and restart the generation count
    Reset,
    /// Sprinkle extra live cells over the current board
    AddNoise,
}

impl LifeCommand {
    pub const ALL: [LifeCommand; 2] = [LifeCommand::Reset, LifeCommand::AddNoise];

    /// Parse a wire token such as `"RESET"`. Unknown tokens yield `None`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim() {
            "RESET" => Some(LifeCommand::Reset),
            "ADD_NOISE" => Some(LifeCommand::AddNoise),
            _ => None,
        }
    }

    pub const fn token(self) -> &'static str {
        match self {
            LifeCommand::Reset => "RESET",
            LifeCommand::AddNoise => "ADD_NOISE",
        }
    }
}

impl fmt::Display for LifeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Create a connected sender/receiver pair.
pub fn command_queue() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::channel();
    (
        CommandSender { tx },
        CommandReceiver { rx, closed: false },
    )
}

/// Producer half. Cheap to clone; every clone feeds the same queue.
#[derive(Clone, Debug)]
pub struct CommandSender {
    tx: Sender<LifeCommand>,
}

impl CommandSender {
    /// Queue a command. Fails only when the receiver has been dropped.
    pub fn send(&self, command: LifeCommand) -> Result<(), SendError<LifeCommand>> {
        self.tx.send(command)
    }

    /// Queue the command named by `token`.
    ///
    /// Returns `Ok(false)` without queueing anything when the token is not
    /// a known command.
    pub fn send_token(&self, token: &str) -> Result<bool, SendError<LifeCommand>> {
        match LifeCommand::from_token(token) {
            Some(command) => self.send(command).map(|()| true),
            None => {
                tracing::debug!("Ignoring unknown life command token {:?}", token);
                Ok(false)
            }
        }
    }
}

/// Consumer half, owned by the render thread.
#[derive(Debug)]
pub struct CommandReceiver {
    rx: Receiver<LifeCommand>,
    closed: bool,
}

impl CommandReceiver {
    /// Pop the next queued command without blocking.
    pub fn try_next(&mut self) -> Option<LifeCommand> {
        match self.rx.try_recv() {
            Ok(command) => Some(command),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }

    /// True once every sender is gone and the queue has been drained.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
