use crate::roles::{GameMode, Role, Team};

/// One decoded client line. Parsing is forgiving the same way the wire is:
/// anything malformed or too short yields `None` and is dropped upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
	GetRooms,
	CreateRoom {
		nickname: String,
		name: String,
		mode: GameMode,
		limit: usize,
		password: Option<String>,
	},
	JoinRoom {
		nickname: String,
		room_id: u32,
		password: Option<String>,
	},
	GetPlayers {
		room_id: u32,
	},
	Chat {
		sender: String,
		text: String,
	},
	MafiaChat {
		sender: String,
		text: String,
	},
	StartGame {
		nickname: String,
	},
	Vote {
		voter: String,
		target: String,
	},
	NightAction {
		actor: String,
		role: Role,
		target: String,
	},
	TrackerTarget {
		target: String,
	},
	HackerChange {
		voter: String,
		new_target: String,
	},
	ForgerChange {
		role: Role,
	},
	TimeManagerChoice {
		skip: bool,
	},
}

const DEFAULT_ROOM_LIMIT: usize = 10;
const MIN_ROOM_LIMIT: usize = 5;
const MAX_ROOM_LIMIT: usize = 10;

fn clamp_limit(limit: usize) -> usize {
	limit.clamp(MIN_ROOM_LIMIT, MAX_ROOM_LIMIT)
}

fn non_empty(field: &str) -> Option<String> {
	let trimmed = field.trim();
	if trimmed.is_empty() {
		None
	} else {
		Some(trimmed.to_string())
	}
}

impl ClientCommand {
	pub fn parse(line: &str) -> Option<ClientCommand> {
		let line = line.trim_end_matches(['\r', '\n']);
		let (tag, rest) = match line.split_once('|') {
			Some((tag, rest)) => (tag, rest),
			None => (line, ""),
		};

		match tag {
			"GET_ROOMS" => Some(ClientCommand::GetRooms),

			"CREATE_ROOM" => {
				// nickname|roomName|mode|limit[|password]
				let p: Vec<&str> = rest.split('|').collect();
				if p.len() < 2 {
					return None;
				}
				let nickname = non_empty(p[0])?;
				let name = non_empty(p[1])?;
				let mode = p
					.get(2)
					.and_then(|m| m.trim().parse().ok())
					.unwrap_or(GameMode::Classic);
				let limit = p
					.get(3)
					.and_then(|l| l.trim().parse().ok())
					.unwrap_or(DEFAULT_ROOM_LIMIT);
				let password = p.get(4).and_then(|pw| non_empty(pw));
				Some(ClientCommand::CreateRoom {
					nickname,
					name,
					mode,
					limit: clamp_limit(limit),
					password,
				})
			}

			"JOIN_ROOM" => {
				let p: Vec<&str> = rest.split('|').collect();
				if p.len() < 2 {
					return None;
				}
				let nickname = non_empty(p[0])?;
				let room_id = p[1].trim().parse().ok()?;
				let password = p.get(2).and_then(|pw| non_empty(pw));
				Some(ClientCommand::JoinRoom { nickname, room_id, password })
			}

			"GET_PLAYERS" => {
				let room_id = rest.trim().parse().ok()?;
				Some(ClientCommand::GetPlayers { room_id })
			}

			"CHAT" => {
				let (sender, text) = rest.split_once('|')?;
				Some(ClientCommand::Chat {
					sender: non_empty(sender)?,
					text: text.to_string(),
				})
			}

			"MAFIA_CHAT" => {
				let (sender, text) = rest.split_once('|')?;
				Some(ClientCommand::MafiaChat {
					sender: non_empty(sender)?,
					text: text.to_string(),
				})
			}

			"START_GAME" => Some(ClientCommand::StartGame {
				nickname: non_empty(rest)?,
			}),

			"VOTE" => {
				let (voter, target) = rest.split_once('|')?;
				Some(ClientCommand::Vote {
					voter: non_empty(voter)?,
					target: non_empty(target)?,
				})
			}

			"NIGHT_ACTION" => {
				// actor|role|target
				let p: Vec<&str> = rest.split('|').collect();
				if p.len() < 3 {
					return None;
				}
				Some(ClientCommand::NightAction {
					actor: non_empty(p[0])?,
					role: p[1].trim().parse().ok()?,
					target: non_empty(p[2])?,
				})
			}

			"TRACKER_TARGET" => Some(ClientCommand::TrackerTarget {
				target: non_empty(rest)?,
			}),

			"HACKER_CHANGE" => {
				let (voter, new_target) = rest.split_once('|')?;
				Some(ClientCommand::HackerChange {
					voter: non_empty(voter)?,
					new_target: non_empty(new_target)?,
				})
			}

			"FORGER_CHANGE" => Some(ClientCommand::ForgerChange {
				role: rest.trim().parse().ok()?,
			}),

			"TIME_MANAGER_CHOICE" => match rest.trim() {
				"YES" => Some(ClientCommand::TimeManagerChoice { skip: true }),
				"NO" => Some(ClientCommand::TimeManagerChoice { skip: false }),
				_ => None,
			},

			_ => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
	pub id: u32,
	pub name: String,
	pub mode: GameMode,
	pub players: usize,
	pub limit: usize,
	pub locked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
	NotFound,
	Full,
	BadPassword,
	Started,
}

impl JoinError {
	fn as_str(&self) -> &'static str {
		match self {
			JoinError::NotFound => "NOT_FOUND",
			JoinError::Full => "FULL",
			JoinError::BadPassword => "BAD_PASSWORD",
			JoinError::Started => "STARTED",
		}
	}
}

/// One outbound server line, encoded without the trailing newline; the
/// connection writer appends it.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
	RoomList(Vec<RoomSummary>),
	JoinOk {
		room_id: u32,
		name: String,
		host: String,
	},
	JoinFail(JoinError),
	PlayerList(Vec<String>),
	Chat {
		sender: String,
		text: String,
	},
	GhostChat {
		sender: String,
		text: String,
	},
	MafiaChat {
		sender: String,
		text: String,
	},
	NotHost,
	Role {
		nickname: String,
		role: Role,
	},
	DayStart,
	VoteStart,
	HackerVoteInfo(Vec<(String, String)>),
	HackerPrompt(String),
	ForgerPrompt {
		victim: String,
		real_role: Role,
	},
	VoteResult(Option<(String, Role)>),
	JesterWin(String),
	NightStart,
	PoliceResult {
		target: String,
		team: String,
	},
	TrackerResult(String),
	NightResult(Option<String>),
	TimeManagerPrompt(String),
	TimeManagerSkip(String),
	DestinyTargets(Vec<String>),
	ThiefStolen {
		role: Role,
		available: bool,
	},
	GameOver {
		team: Team,
		winners: Vec<(String, Role)>,
	},
}

impl ServerMessage {
	pub fn encode(&self) -> String {
		match self {
			ServerMessage::RoomList(rooms) => {
				let entries: Vec<String> = rooms
					.iter()
					.map(|r| {
						let lock = if r.locked { "* " } else { "" };
						format!(
							"{}#{} {} [{}] ({}/{})",
							lock, r.id, r.name, r.mode, r.players, r.limit
						)
					})
					.collect();
				format!("ROOM_LIST|{}", entries.join(","))
			}
			ServerMessage::JoinOk { room_id, name, host } => {
				format!("JOIN_OK|{}|{}|{}", room_id, name, host)
			}
			ServerMessage::JoinFail(err) => format!("JOIN_FAIL|{}", err.as_str()),
			ServerMessage::PlayerList(players) => {
				format!("PLAYER_LIST|{}", players.join(","))
			}
			ServerMessage::Chat { sender, text } => format!("CHAT|{}|{}", sender, text),
			ServerMessage::GhostChat { sender, text } => {
				format!("GHOST_CHAT|{}|{}", sender, text)
			}
			ServerMessage::MafiaChat { sender, text } => {
				format!("MAFIA_CHAT|{}|{}", sender, text)
			}
			ServerMessage::NotHost => "ERROR|NOT_HOST".to_string(),
			ServerMessage::Role { nickname, role } => {
				format!("ROLE|{}|{}", nickname, role)
			}
			ServerMessage::DayStart => "DAY_START|discussion".to_string(),
			ServerMessage::VoteStart => "VOTE_START".to_string(),
			ServerMessage::HackerVoteInfo(votes) => {
				let entries: Vec<String> = votes
					.iter()
					.map(|(voter, target)| format!("{}:{}", voter, target))
					.collect();
				format!("HACKER_VOTE_INFO|{}", entries.join(","))
			}
			ServerMessage::HackerPrompt(text) => format!("HACKER_PROMPT|{}", text),
			ServerMessage::ForgerPrompt { victim, real_role } => {
				format!("FORGER_PROMPT|{}|{}", victim, real_role)
			}
			ServerMessage::VoteResult(Some((victim, role))) => {
				format!("VOTE_RESULT|{}|{}", victim, role)
			}
			ServerMessage::VoteResult(None) => "VOTE_RESULT|NONE|NONE".to_string(),
			ServerMessage::JesterWin(nickname) => format!("JESTER_WIN|{}", nickname),
			ServerMessage::NightStart => "NIGHT_START|power".to_string(),
			ServerMessage::PoliceResult { target, team } => {
				format!("POLICE_RESULT|{}|{}", target, team)
			}
			ServerMessage::TrackerResult(text) => format!("TRACKER_RESULT|{}", text),
			ServerMessage::NightResult(Some(victim)) => {
				format!("NIGHT_RESULT|{}", victim)
			}
			ServerMessage::NightResult(None) => "NIGHT_RESULT|NONE".to_string(),
			ServerMessage::TimeManagerPrompt(text) => {
				format!("TIME_MANAGER_PROMPT|{}", text)
			}
			ServerMessage::TimeManagerSkip(text) => {
				format!("TIME_MANAGER_SKIP|{}", text)
			}
			ServerMessage::DestinyTargets(targets) => {
				format!("DESTINY_TARGETS|{}", targets.join(","))
			}
			ServerMessage::ThiefStolen { role, available } => {
				let state = if *available { "AVAILABLE" } else { "USED" };
				format!("THIEF_STOLEN|{}|{}", role, state)
			}
			ServerMessage::GameOver { team, winners } => {
				let entries: Vec<String> = winners
					.iter()
					.map(|(nick, role)| format!("{}:{}", nick, role))
					.collect();
				format!("GAME_OVER|{}|{}", team, entries.join(","))
			}
		}
	}
}
