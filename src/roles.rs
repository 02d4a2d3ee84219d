use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
	Mafia,
	Forger,
	Hacker,
	Police,
	Doctor,
	Civilian,
	TimeManager,
	Destiny,
	Tracker,
	Jester,
	Thief,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Team {
	Mafia,
	Civilian,
	Neutral,
}

impl Role {
	pub fn team(&self) -> Team {
		match self {
			Role::Mafia | Role::Forger | Role::Hacker => Team::Mafia,
			Role::Police | Role::Doctor | Role::Civilian
			| Role::TimeManager | Role::Destiny | Role::Tracker => Team::Civilian,
			Role::Jester | Role::Thief => Team::Neutral,
		}
	}

	pub fn is_mafia_aligned(&self) -> bool {
		self.team() == Team::Mafia
	}

	/// Roles whose special ability fires at most once per game.
	pub fn is_one_shot(&self) -> bool {
		matches!(self, Role::Forger | Role::Hacker | Role::TimeManager)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Role::Mafia => "MAFIA",
			Role::Forger => "FORGER",
			Role::Hacker => "HACKER",
			Role::Police => "POLICE",
			Role::Doctor => "DOCTOR",
			Role::Civilian => "CIVILIAN",
			Role::TimeManager => "TIME_MANAGER",
			Role::Destiny => "DESTINY",
			Role::Tracker => "TRACKER",
			Role::Jester => "JESTER",
			Role::Thief => "THIEF",
		}
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Role {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"MAFIA" => Ok(Role::Mafia),
			"FORGER" => Ok(Role::Forger),
			"HACKER" => Ok(Role::Hacker),
			"POLICE" => Ok(Role::Police),
			"DOCTOR" => Ok(Role::Doctor),
			"CIVILIAN" => Ok(Role::Civilian),
			"TIME_MANAGER" => Ok(Role::TimeManager),
			"DESTINY" => Ok(Role::Destiny),
			"TRACKER" => Ok(Role::Tracker),
			"JESTER" => Ok(Role::Jester),
			"THIEF" => Ok(Role::Thief),
			_ => Err(()),
		}
	}
}

impl fmt::Display for Team {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Team::Mafia => f.write_str("MAFIA"),
			Team::Civilian => f.write_str("CIVIL"),
			Team::Neutral => f.write_str("NEUTRAL"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
	Classic,
	Special,
}

impl GameMode {
	pub fn as_str(&self) -> &'static str {
		match self {
			GameMode::Classic => "CLASSIC",
			GameMode::Special => "SPECIAL",
		}
	}
}

impl fmt::Display for GameMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for GameMode {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"CLASSIC" => Ok(GameMode::Classic),
			"SPECIAL" => Ok(GameMode::Special),
			_ => Err(()),
		}
	}
}

fn mafia_count(players: usize) -> usize {
	if players <= 6 {
		1
	} else if players <= 8 {
		2
	} else {
		3
	}
}

/// Build the role pool for a game. The pool always has exactly `players`
/// entries; callers shuffle and zip it with the roster.
pub fn role_pool(mode: GameMode, players: usize) -> Vec<Role> {
	let mafia = mafia_count(players);
	let mut pool = Vec::with_capacity(players);

	match mode {
		GameMode::Classic => {
			for _ in 0..mafia {
				pool.push(Role::Mafia);
			}
			pool.push(Role::Doctor);
			pool.push(Role::Police);
		}
		GameMode::Special => {
			let mafia_slots = [Role::Mafia, Role::Forger, Role::Hacker];
			pool.extend_from_slice(&mafia_slots[..mafia.min(mafia_slots.len())]);
			pool.push(Role::Doctor);
			pool.push(Role::Police);
			let specials = [
				Role::Jester,
				Role::Thief,
				Role::TimeManager,
				Role::Destiny,
				Role::Tracker,
			];
			for role in specials {
				if pool.len() >= players {
					break;
				}
				pool.push(role);
			}
		}
	}

	while pool.len() < players {
		pool.push(Role::Civilian);
	}
	pool.truncate(players);
	pool
}

/// Shuffle the mode's pool and deal one role per roster member.
pub fn assign_roles(
	mode: GameMode,
	roster: &[String],
	rng: &mut StdRng,
) -> HashMap<String, Role> {
	let mut pool = role_pool(mode, roster.len());
	pool.shuffle(rng);

	roster.iter().cloned().zip(pool).collect()
}
