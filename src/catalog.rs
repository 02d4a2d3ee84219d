use crate::net::protocol::{JoinError, RoomSummary};
use crate::roles::GameMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
	Waiting,
	InProgress,
	Finished,
}

/// A lobby room. Rooms are created on request and never removed from the
/// catalog; once its game finishes a room stays listed but is inert.
#[derive(Debug, Clone)]
pub struct Room {
	pub id: u32,
	pub name: String,
	pub mode: GameMode,
	pub limit: usize,
	pub password: Option<String>,
	pub host: Option<String>,
	pub players: Vec<String>,
	pub status: RoomStatus,
}

impl Room {
	pub fn summary(&self) -> RoomSummary {
		RoomSummary {
			id: self.id,
			name: self.name.clone(),
			mode: self.mode,
			players: self.players.len(),
			limit: self.limit,
			locked: self.password.is_some(),
		}
	}

	/// Host nickname, falling back to the first member if none was recorded.
	pub fn host_nickname(&mut self) -> Option<String> {
		if self.host.is_none() {
			self.host = self.players.first().cloned();
		}
		self.host.clone()
	}
}

pub struct RoomCatalog {
	rooms: Vec<Room>,
	next_id: u32,
}

impl RoomCatalog {
	pub fn new() -> Self {
		Self { rooms: Vec::new(), next_id: 1 }
	}

	pub fn create(
		&mut self,
		name: String,
		mode: GameMode,
		limit: usize,
		password: Option<String>,
		host: String,
	) -> u32 {
		let id = self.next_id;
		self.next_id += 1;
		self.rooms.push(Room {
			id,
			name,
			mode,
			limit,
			password,
			host: Some(host),
			players: Vec::new(),
			status: RoomStatus::Waiting,
		});
		id
	}

	pub fn get(&self, id: u32) -> Option<&Room> {
		self.rooms.iter().find(|r| r.id == id)
	}

	pub fn get_mut(&mut self, id: u32) -> Option<&mut Room> {
		self.rooms.iter_mut().find(|r| r.id == id)
	}

	pub fn join(
		&mut self,
		id: u32,
		nickname: &str,
		password: Option<&str>,
	) -> Result<&mut Room, JoinError> {
		let room = self
			.rooms
			.iter_mut()
			.find(|r| r.id == id)
			.ok_or(JoinError::NotFound)?;

		if room.status != RoomStatus::Waiting {
			return Err(JoinError::Started);
		}
		if room.players.len() >= room.limit {
			return Err(JoinError::Full);
		}
		if let Some(expected) = &room.password {
			if password != Some(expected.as_str()) {
				return Err(JoinError::BadPassword);
			}
		}

		if !room.players.iter().any(|p| p == nickname) {
			room.players.push(nickname.to_string());
		}
		if room.host.is_none() {
			room.host = room.players.first().cloned();
		}
		Ok(room)
	}

	pub fn list(&self) -> Vec<RoomSummary> {
		self.rooms.iter().map(|r| r.summary()).collect()
	}
}

impl Default for RoomCatalog {
	fn default() -> Self {
		Self::new()
	}
}
