use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;

use crate::net::protocol::ServerMessage;

/// Outbound delivery seam between the game session and connection workers.
/// Sessions only know nicknames; where the bytes go is this trait's problem.
pub trait Dispatcher: Send + Sync {
	fn unicast(&self, nickname: &str, msg: &ServerMessage);

	fn broadcast(&self, members: &[String], msg: &ServerMessage) {
		for nickname in members {
			self.unicast(nickname, msg);
		}
	}
}

/// Nickname -> outbound line channel. Each connection worker registers its
/// writer half here; a missing or closed peer makes delivery a no-op, which
/// is exactly the disconnect behavior we want.
#[derive(Default)]
pub struct PeerTable {
	peers: Mutex<HashMap<String, UnboundedSender<String>>>,
}

impl PeerTable {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&self, nickname: &str, tx: UnboundedSender<String>) {
		let mut peers = self.peers.lock().unwrap_or_else(|e| e.into_inner());
		peers.insert(nickname.to_string(), tx);
	}

	pub fn deregister(&self, nickname: &str) {
		let mut peers = self.peers.lock().unwrap_or_else(|e| e.into_inner());
		peers.remove(nickname);
	}

	/// Send to every connected client, room or not (room-list refreshes).
	pub fn broadcast_all(&self, msg: &ServerMessage) {
		let line = msg.encode();
		let peers = self.peers.lock().unwrap_or_else(|e| e.into_inner());
		for tx in peers.values() {
			let _ = tx.send(line.clone());
		}
	}
}

impl Dispatcher for PeerTable {
	fn unicast(&self, nickname: &str, msg: &ServerMessage) {
		let peers = self.peers.lock().unwrap_or_else(|e| e.into_inner());
		if let Some(tx) = peers.get(nickname) {
			let _ = tx.send(msg.encode());
		}
	}

	fn broadcast(&self, members: &[String], msg: &ServerMessage) {
		let line = msg.encode();
		let peers = self.peers.lock().unwrap_or_else(|e| e.into_inner());
		for nickname in members {
			if let Some(tx) = peers.get(nickname) {
				let _ = tx.send(line.clone());
			}
		}
	}
}
