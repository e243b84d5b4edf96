//! Fan-out primitive for server-to-client messages
//!
//! All sends are best-effort: a closed channel is silently skipped and the
//! heartbeat sweep reaps the connection behind it.

use std::collections::HashMap;

use tokio::sync::mpsc::UnboundedSender;

use crate::ws::protocol::{PlayerId, ServerMsg};

#[derive(Default)]
pub struct Broadcaster {
    senders: HashMap<PlayerId, UnboundedSender<ServerMsg>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, player: PlayerId, sender: UnboundedSender<ServerMsg>) {
        self.senders.insert(player, sender);
    }

    /// Dropping the sender closes the player's outbound channel, which
    /// ends their socket task
    pub fn unregister(&mut self, player: PlayerId) {
        self.senders.remove(&player);
    }

    pub fn to_one(&self, player: PlayerId, msg: ServerMsg) {
        if let Some(sender) = self.senders.get(&player) {
            let _ = sender.send(msg);
        }
    }

    pub fn to_all(&self, msg: ServerMsg) {
        for sender in self.senders.values() {
            let _ = sender.send(msg.clone());
        }
    }

    pub fn to_others(&self, exclude: PlayerId, msg: ServerMsg) {
        for (&player, sender) in &self.senders {
            if player != exclude {
                let _ = sender.send(msg.clone());
            }
        }
    }

    pub fn to_lobby(
        &self,
        members: impl IntoIterator<Item = PlayerId>,
        msg: ServerMsg,
        exclude: Option<PlayerId>,
    ) {
        for player in members {
            if Some(player) == exclude {
                continue;
            }
            self.to_one(player, msg.clone());
        }
    }
}
