use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::catalog::{RoomCatalog, RoomStatus};
use crate::config::ServerConfig;
use crate::dispatch::{Dispatcher, PeerTable};
use crate::logging;
use crate::net::protocol::{ClientCommand, ServerMessage};
use crate::session::{self, SessionCommand, SessionHandle};

/// Per-connection state kept by the reader loop. The nickname is learned
/// from the first lobby command that carries one.
struct ConnState {
	nickname: Option<String>,
	room_id: Option<u32>,
	tx: UnboundedSender<String>,
}

impl ConnState {
	fn send(&self, msg: &ServerMessage) {
		let _ = self.tx.send(msg.encode());
	}
}

pub struct GameServer {
	catalog: Arc<Mutex<RoomCatalog>>,
	peers: Arc<PeerTable>,
	sessions: Arc<Mutex<HashMap<u32, SessionHandle>>>,
	config: ServerConfig,
}

impl GameServer {
	pub fn new(config: ServerConfig) -> Self {
		Self {
			catalog: Arc::new(Mutex::new(RoomCatalog::new())),
			peers: Arc::new(PeerTable::new()),
			sessions: Arc::new(Mutex::new(HashMap::new())),
			config,
		}
	}

	pub async fn run(self: Arc<Self>) -> std::io::Result<()> {
		let listener = TcpListener::bind(&self.config.listen).await?;
		println!("Mafia server listening on {}", self.config.listen);
		logging::server::conn(&format!("listening on {}", self.config.listen));

		loop {
			let (stream, addr) = listener.accept().await?;
			logging::server::conn(&format!("accepted {}", addr));
			let server = Arc::clone(&self);
			tokio::spawn(async move {
				server.handle_connection(stream).await;
			});
		}
	}

	async fn handle_connection(&self, stream: TcpStream) {
		let (read_half, mut write_half) = stream.into_split();
		let (tx, mut rx) = mpsc::unbounded_channel::<String>();

		// Writer drains the outbound channel; one task per connection.
		tokio::spawn(async move {
			while let Some(line) = rx.recv().await {
				if write_half.write_all(line.as_bytes()).await.is_err() {
					break;
				}
				if write_half.write_all(b"\n").await.is_err() {
					break;
				}
			}
		});

		let mut state = ConnState { nickname: None, room_id: None, tx };
		let mut lines = BufReader::new(read_half).lines();

		while let Ok(Some(line)) = lines.next_line().await {
			if let Some(cmd) = ClientCommand::parse(&line) {
				self.process(&mut state, cmd);
			}
		}

		// Disconnect only unhooks delivery; rosters and sessions keep the
		// nickname, so further messages to it become no-ops.
		if let Some(nickname) = &state.nickname {
			self.peers.deregister(nickname);
			logging::server::conn(&format!("{} disconnected", nickname));
		}
	}

	fn identify(&self, state: &mut ConnState, nickname: &str) {
		if state.nickname.as_deref() != Some(nickname) {
			state.nickname = Some(nickname.to_string());
		}
		self.peers.register(nickname, state.tx.clone());
	}

	/// Live session for the room, if its game is still running.
	fn session_for(&self, room_id: u32) -> Option<SessionHandle> {
		let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
		sessions.get(&room_id).filter(|s| !s.is_finished()).cloned()
	}

	fn process(&self, state: &mut ConnState, cmd: ClientCommand) {
		match cmd {
			ClientCommand::GetRooms => {
				let list = {
					let catalog = self.catalog.lock().unwrap_or_else(|e| e.into_inner());
					catalog.list()
				};
				state.send(&ServerMessage::RoomList(list));
			}

			ClientCommand::CreateRoom { nickname, name, mode, limit, password } => {
				self.identify(state, &nickname);
				let (room_id, reply, players) = {
					let mut catalog = self.catalog.lock().unwrap_or_else(|e| e.into_inner());
					let id = catalog.create(
						name.clone(),
						mode,
						limit,
						password.clone(),
						nickname.clone(),
					);
					match catalog.join(id, &nickname, password.as_deref()) {
						Ok(room) => {
							let host = room.host_nickname().unwrap_or_default();
							(
								id,
								ServerMessage::JoinOk { room_id: id, name, host },
								room.players.clone(),
							)
						}
						Err(err) => (id, ServerMessage::JoinFail(err), Vec::new()),
					}
				};
				state.room_id = Some(room_id);
				state.send(&reply);
				if !players.is_empty() {
					self.peers.broadcast(&players, &ServerMessage::PlayerList(players.clone()));
				}
				self.broadcast_room_list();
				logging::server::room(room_id, &format!("created by {}", nickname));
			}

			ClientCommand::JoinRoom { nickname, room_id, password } => {
				self.identify(state, &nickname);
				let result = {
					let mut catalog = self.catalog.lock().unwrap_or_else(|e| e.into_inner());
					match catalog.join(room_id, &nickname, password.as_deref()) {
						Ok(room) => {
							let host = room.host_nickname().unwrap_or_default();
							Ok((room.name.clone(), host, room.players.clone()))
						}
						Err(err) => Err(err),
					}
				};
				match result {
					Ok((name, host, players)) => {
						state.room_id = Some(room_id);
						state.send(&ServerMessage::JoinOk { room_id, name, host });
						self.peers
							.broadcast(&players, &ServerMessage::PlayerList(players.clone()));
						self.broadcast_room_list();
						logging::server::room(room_id, &format!("{} joined", nickname));
					}
					Err(err) => state.send(&ServerMessage::JoinFail(err)),
				}
			}

			ClientCommand::GetPlayers { room_id } => {
				let players = {
					let catalog = self.catalog.lock().unwrap_or_else(|e| e.into_inner());
					catalog.get(room_id).map(|r| r.players.clone())
				};
				if let Some(players) = players {
					state.send(&ServerMessage::PlayerList(players));
				}
			}

			ClientCommand::StartGame { nickname } => {
				self.identify(state, &nickname);
				let room_id = match state.room_id {
					Some(id) => id,
					None => return,
				};
				let start = {
					let mut catalog = self.catalog.lock().unwrap_or_else(|e| e.into_inner());
					match catalog.get_mut(room_id) {
						Some(room) => {
							// A room hosts at most one game, ever: running and
							// finished rooms are inert to further starts.
							if room.status != RoomStatus::Waiting {
								return;
							}
							if room.host_nickname().as_deref() != Some(nickname.as_str()) {
								None
							} else {
								room.status = RoomStatus::InProgress;
								Some((room.players.clone(), room.mode))
							}
						}
						None => None,
					}
				};
				match start {
					Some((roster, mode)) => {
						logging::server::room(
							room_id,
							&format!("game started by {} with {} players", nickname, roster.len()),
						);
						let handle = session::start(
							room_id,
							roster,
							mode,
							self.config.timing.session_config(),
							Arc::clone(&self.peers) as Arc<dyn Dispatcher>,
						);
						{
							let mut sessions =
								self.sessions.lock().unwrap_or_else(|e| e.into_inner());
							sessions.insert(room_id, handle.clone());
						}
						let catalog = Arc::clone(&self.catalog);
						tokio::spawn(async move {
							handle.closed().await;
							let mut catalog =
								catalog.lock().unwrap_or_else(|e| e.into_inner());
							if let Some(room) = catalog.get_mut(room_id) {
								room.status = RoomStatus::Finished;
							}
							logging::server::room(room_id, "game finished, room closed");
						});
					}
					None => state.send(&ServerMessage::NotHost),
				}
			}

			ClientCommand::Chat { sender, text } => {
				let room_id = match state.room_id {
					Some(id) => id,
					None => return,
				};
				match self.session_for(room_id) {
					Some(session) => session.submit(SessionCommand::Chat { sender, text }),
					None => {
						// Lobby chat before the game starts.
						let members = {
							let catalog =
								self.catalog.lock().unwrap_or_else(|e| e.into_inner());
							catalog.get(room_id).map(|r| r.players.clone())
						};
						if let Some(members) = members {
							self.peers
								.broadcast(&members, &ServerMessage::Chat { sender, text });
						}
					}
				}
			}

			ClientCommand::MafiaChat { sender, text } => {
				if let Some(session) = state.room_id.and_then(|id| self.session_for(id)) {
					session.submit(SessionCommand::MafiaChat { sender, text });
				}
			}

			ClientCommand::Vote { voter, target } => {
				if let Some(session) = state.room_id.and_then(|id| self.session_for(id)) {
					session.submit(SessionCommand::Vote { voter, target });
				}
			}

			ClientCommand::NightAction { actor, role, target } => {
				if let Some(session) = state.room_id.and_then(|id| self.session_for(id)) {
					session.submit(SessionCommand::NightAction { actor, role, target });
				}
			}

			// Window and targeting replies are attributed to the connection's
			// own nickname, never to a name embedded in the line.
			ClientCommand::TrackerTarget { target } => {
				if let (Some(actor), Some(session)) = (
					state.nickname.clone(),
					state.room_id.and_then(|id| self.session_for(id)),
				) {
					session.submit(SessionCommand::TrackerTarget { actor, target });
				}
			}

			ClientCommand::HackerChange { voter, new_target } => {
				if let (Some(actor), Some(session)) = (
					state.nickname.clone(),
					state.room_id.and_then(|id| self.session_for(id)),
				) {
					session.submit(SessionCommand::HackerChange { actor, voter, new_target });
				}
			}

			ClientCommand::ForgerChange { role } => {
				if let (Some(actor), Some(session)) = (
					state.nickname.clone(),
					state.room_id.and_then(|id| self.session_for(id)),
				) {
					session.submit(SessionCommand::ForgerChange { actor, role });
				}
			}

			ClientCommand::TimeManagerChoice { skip } => {
				if let (Some(actor), Some(session)) = (
					state.nickname.clone(),
					state.room_id.and_then(|id| self.session_for(id)),
				) {
					session.submit(SessionCommand::TimeManagerChoice { actor, skip });
				}
			}
		}
	}

	fn broadcast_room_list(&self) {
		let list = {
			let catalog = self.catalog.lock().unwrap_or_else(|e| e.into_inner());
			catalog.list()
		};
		self.peers.broadcast_all(&ServerMessage::RoomList(list));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::sync::mpsc::UnboundedReceiver;

	fn conn() -> (ConnState, UnboundedReceiver<String>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(ConnState { nickname: None, room_id: None, tx }, rx)
	}

	fn submit(server: &GameServer, state: &mut ConnState, line: &str) {
		let cmd = ClientCommand::parse(line).expect("test line must parse");
		server.process(state, cmd);
	}

	async fn wait_for(rx: &mut UnboundedReceiver<String>, prefix: &str) -> String {
		loop {
			let line = rx.recv().await.expect("connection closed");
			if line.starts_with(prefix) {
				return line;
			}
		}
	}

	fn room_status(server: &GameServer, room_id: u32) -> Option<RoomStatus> {
		let catalog = server.catalog.lock().unwrap();
		catalog.get(room_id).map(|r| r.status)
	}

	#[tokio::test(start_paused = true)]
	async fn test_finished_room_stays_inert() {
		let server = GameServer::new(ServerConfig::default());
		let (mut ana, mut ana_rx) = conn();
		let (mut bo, _bo_rx) = conn();

		submit(&server, &mut ana, "CREATE_ROOM|ana|den|CLASSIC|5");
		submit(&server, &mut bo, "JOIN_ROOM|bo|1");
		submit(&server, &mut ana, "START_GAME|ana");
		assert_eq!(room_status(&server, 1), Some(RoomStatus::InProgress));

		// Two players sit at parity, so the first vote resolution ends it.
		wait_for(&mut ana_rx, "GAME_OVER|").await;

		for _ in 0..1000 {
			if room_status(&server, 1) == Some(RoomStatus::Finished) {
				break;
			}
			tokio::task::yield_now().await;
		}
		assert_eq!(room_status(&server, 1), Some(RoomStatus::Finished));

		// A second start request from the host is a no-op.
		submit(&server, &mut ana, "START_GAME|ana");
		for _ in 0..100 {
			tokio::task::yield_now().await;
		}
		while let Ok(line) = ana_rx.try_recv() {
			assert!(!line.starts_with("ROLE|"), "new game dealt roles: {}", line);
		}
		assert_eq!(room_status(&server, 1), Some(RoomStatus::Finished));
	}

	#[tokio::test(start_paused = true)]
	async fn test_start_game_rejects_non_host() {
		let server = GameServer::new(ServerConfig::default());
		let (mut ana, _ana_rx) = conn();
		let (mut bo, mut bo_rx) = conn();

		submit(&server, &mut ana, "CREATE_ROOM|ana|den|CLASSIC|5");
		submit(&server, &mut bo, "JOIN_ROOM|bo|1");
		submit(&server, &mut bo, "START_GAME|bo");

		assert_eq!(wait_for(&mut bo_rx, "ERROR|").await, "ERROR|NOT_HOST");
		assert_eq!(room_status(&server, 1), Some(RoomStatus::Waiting));
	}
}
