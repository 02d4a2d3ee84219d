mod resolve;
mod win;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::SeedableRng;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{self, Instant};

use crate::dispatch::Dispatcher;
use crate::logging;
use crate::net::protocol::ServerMessage;
use crate::roles::{assign_roles, GameMode, Role};

pub use resolve::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	Lobby,
	Day,
	Vote,
	Night,
	Finished,
}

/// Phase durations and the bounded ability-window length. `seed` pins the
/// role shuffle and Destiny sampling for reproducible games.
#[derive(Debug, Clone)]
pub struct SessionConfig {
	pub day: Duration,
	pub vote: Duration,
	pub night: Duration,
	pub window: Duration,
	pub seed: Option<u64>,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			day: Duration::from_secs(60),
			vote: Duration::from_secs(30),
			night: Duration::from_secs(30),
			window: Duration::from_secs(15),
			seed: None,
		}
	}
}

/// Inbound game action, already attributed to a sender by the connection
/// worker. Everything the session does happens in its own task in response
/// to these, so per-room state never needs a lock.
#[derive(Debug, Clone)]
pub enum SessionCommand {
	Vote { voter: String, target: String },
	NightAction { actor: String, role: Role, target: String },
	TrackerTarget { actor: String, target: String },
	HackerChange { actor: String, voter: String, new_target: String },
	ForgerChange { actor: String, role: Role },
	TimeManagerChoice { actor: String, skip: bool },
	Chat { sender: String, text: String },
	MafiaChat { sender: String, text: String },
}

#[derive(Clone)]
pub struct SessionHandle {
	tx: UnboundedSender<SessionCommand>,
	finished: Arc<AtomicBool>,
}

impl SessionHandle {
	/// Dropped commands (session already gone) are a no-op by design.
	pub fn submit(&self, cmd: SessionCommand) {
		let _ = self.tx.send(cmd);
	}

	pub fn is_finished(&self) -> bool {
		self.finished.load(Ordering::SeqCst)
	}

	/// Resolves once the session task has ended and dropped its receiver.
	pub async fn closed(&self) {
		self.tx.closed().await;
	}
}

pub struct GameSession {
	room_id: u32,
	roster: Vec<String>,
	roles: HashMap<String, Role>,
	phase: Phase,
	dead: HashSet<String>,
	vote_ledger: Vec<(String, String)>,
	mafia_target: Option<String>,
	doctor_target: Option<String>,
	night_actions: HashMap<String, String>,
	tracker_target: Option<String>,
	skip_night: bool,
	forger_used: bool,
	hacker_used: bool,
	time_manager_used: bool,
	stolen_role: Option<Role>,
	stolen_used: bool,
	theft_resolved: bool,
	destiny_targets: Vec<String>,
	cfg: SessionConfig,
	dispatcher: Arc<dyn Dispatcher>,
}

/// Assign roles for the mode and launch the session task.
pub fn start(
	room_id: u32,
	roster: Vec<String>,
	mode: GameMode,
	cfg: SessionConfig,
	dispatcher: Arc<dyn Dispatcher>,
) -> SessionHandle {
	let mut rng = rng_from_seed(cfg.seed);
	let roles = assign_roles(mode, &roster, &mut rng);
	start_with_roles(room_id, roster, roles, cfg, dispatcher)
}

/// Launch with a fixed role map. Role notifications and the Destiny hint go
/// out before the first day begins.
pub fn start_with_roles(
	room_id: u32,
	roster: Vec<String>,
	roles: HashMap<String, Role>,
	cfg: SessionConfig,
	dispatcher: Arc<dyn Dispatcher>,
) -> SessionHandle {
	let (tx, rx) = mpsc::unbounded_channel();
	let finished = Arc::new(AtomicBool::new(false));
	let mut rng = rng_from_seed(cfg.seed);

	let session = GameSession {
		room_id,
		roster,
		roles,
		phase: Phase::Lobby,
		dead: HashSet::new(),
		vote_ledger: Vec::new(),
		mafia_target: None,
		doctor_target: None,
		night_actions: HashMap::new(),
		tracker_target: None,
		skip_night: false,
		forger_used: false,
		hacker_used: false,
		time_manager_used: false,
		stolen_role: None,
		stolen_used: false,
		theft_resolved: false,
		destiny_targets: Vec::new(),
		cfg,
		dispatcher,
	};

	let mut session = session;
	session.announce_roles(&mut rng);

	let flag = Arc::clone(&finished);
	tokio::spawn(session.run(rx, flag));

	SessionHandle { tx, finished }
}

fn rng_from_seed(seed: Option<u64>) -> StdRng {
	match seed {
		Some(s) => StdRng::seed_from_u64(s),
		None => StdRng::from_os_rng(),
	}
}

impl GameSession {
	fn announce_roles(&mut self, rng: &mut StdRng) {
		for nick in &self.roster {
			if let Some(role) = self.roles.get(nick) {
				self.dispatcher.unicast(
					nick,
					&ServerMessage::Role { nickname: nick.clone(), role: *role },
				);
			}
		}
		self.send_destiny_hint(rng);
	}

	/// Three other nicknames for a living Destiny, at least one of them
	/// mafia-aligned, list order shuffled before delivery.
	fn send_destiny_hint(&mut self, rng: &mut StdRng) {
		let destiny = match self
			.roster
			.iter()
			.find(|n| self.roles.get(*n) == Some(&Role::Destiny))
		{
			Some(nick) => nick.clone(),
			None => return,
		};

		let mafia: Vec<String> = self
			.roster
			.iter()
			.filter(|n| {
				**n != destiny
					&& self.roles.get(*n).is_some_and(|r| r.is_mafia_aligned())
			})
			.cloned()
			.collect();
		let anchor = match mafia.choose(rng) {
			Some(nick) => nick.clone(),
			None => return,
		};

		let mut rest: Vec<String> = self
			.roster
			.iter()
			.filter(|n| **n != destiny && **n != anchor)
			.cloned()
			.collect();
		rest.shuffle(rng);

		let mut targets = vec![anchor];
		targets.extend(rest.into_iter().take(2));
		if targets.len() < 3 {
			return;
		}
		targets.shuffle(rng);

		self.dispatcher
			.unicast(&destiny, &ServerMessage::DestinyTargets(targets.clone()));
		self.destiny_targets = targets;
	}

	async fn run(mut self, mut rx: UnboundedReceiver<SessionCommand>, finished: Arc<AtomicBool>) {
		'game: loop {
			// Day: discussion only, fresh vote ledger.
			self.phase = Phase::Day;
			self.vote_ledger.clear();
			logging::session::phase(self.room_id, "DAY");
			self.broadcast(&ServerMessage::DayStart);
			self.run_phase(&mut rx, self.cfg.day).await;

			// Vote: ballots and the Time Manager's one-shot choice.
			self.phase = Phase::Vote;
			self.skip_night = false;
			logging::session::phase(self.room_id, "VOTE");
			self.broadcast(&ServerMessage::VoteStart);
			if let Some(tm) = self.privileged_holder(Role::TimeManager) {
				self.unicast(
					&tm,
					&ServerMessage::TimeManagerPrompt(
						"Skip the coming night? Reply YES or NO".to_string(),
					),
				);
			}
			self.run_phase(&mut rx, self.cfg.vote).await;

			if self.resolve_vote(&mut rx).await == Outcome::GameOver {
				break 'game;
			}

			if self.skip_night {
				self.skip_night = false;
				logging::session::phase(self.room_id, "NIGHT SKIPPED");
				self.broadcast(&ServerMessage::TimeManagerSkip(
					"The night was skipped".to_string(),
				));
				continue 'game;
			}

			// Night: role abilities and the Tracker's watch.
			self.phase = Phase::Night;
			self.clear_night_ledgers();
			logging::session::phase(self.room_id, "NIGHT");
			self.broadcast(&ServerMessage::NightStart);
			self.run_phase(&mut rx, self.cfg.night).await;

			if self.resolve_night() == Outcome::GameOver {
				break 'game;
			}
		}

		self.phase = Phase::Finished;
		finished.store(true, Ordering::SeqCst);
		logging::session::game_over(self.room_id, "session closed");
	}

	/// Accept commands until the phase deadline. Phases run their full
	/// wall-clock length even if every eligible action is already in.
	async fn run_phase(&mut self, rx: &mut UnboundedReceiver<SessionCommand>, duration: Duration) {
		let deadline = Instant::now() + duration;
		loop {
			tokio::select! {
				_ = time::sleep_until(deadline) => break,
				cmd = rx.recv() => match cmd {
					Some(cmd) => self.handle_command(cmd),
					None => {
						time::sleep_until(deadline).await;
						break;
					}
				}
			}
		}
	}

	fn handle_command(&mut self, cmd: SessionCommand) {
		match cmd {
			SessionCommand::Chat { sender, text } => self.route_chat(&sender, &text),
			SessionCommand::MafiaChat { sender, text } => {
				self.route_mafia_chat(&sender, &text)
			}
			SessionCommand::Vote { voter, target } => self.handle_vote(voter, target),
			SessionCommand::TimeManagerChoice { actor, skip } => {
				self.handle_time_manager_choice(&actor, skip)
			}
			SessionCommand::NightAction { actor, role, target } => {
				self.handle_night_action(&actor, role, &target)
			}
			SessionCommand::TrackerTarget { actor, target } => {
				self.handle_tracker_target(&actor, target)
			}
			// Window replies are only meaningful inside their window.
			SessionCommand::HackerChange { .. } | SessionCommand::ForgerChange { .. } => {}
		}
	}

	fn in_roster(&self, nickname: &str) -> bool {
		self.roster.iter().any(|n| n == nickname)
	}

	fn is_dead(&self, nickname: &str) -> bool {
		self.dead.contains(nickname)
	}

	/// The role a player currently acts as: the Thief acts as their stolen
	/// role once a theft has happened.
	fn effective_role(&self, nickname: &str) -> Option<Role> {
		match self.roles.get(nickname)? {
			Role::Thief => Some(self.stolen_role.unwrap_or(Role::Thief)),
			role => Some(*role),
		}
	}

	fn one_shot_used(&self, role: Role) -> bool {
		match role {
			Role::Forger => self.forger_used,
			Role::Hacker => self.hacker_used,
			Role::TimeManager => self.time_manager_used,
			_ => false,
		}
	}

	/// The living player who may fire `role`'s one-shot right now: either
	/// its original holder, or a Thief who stole it. The Thief's copy is
	/// tracked independently of the original flag.
	fn privileged_holder(&self, role: Role) -> Option<String> {
		for nick in &self.roster {
			if self.is_dead(nick) {
				continue;
			}
			match self.roles.get(nick) {
				Some(r) if *r == role => {
					if !self.one_shot_used(role) {
						return Some(nick.clone());
					}
				}
				Some(Role::Thief) if self.stolen_role == Some(role) => {
					if !self.stolen_used {
						return Some(nick.clone());
					}
				}
				_ => {}
			}
		}
		None
	}

	fn consume_one_shot(&mut self, holder: &str, role: Role) {
		if self.roles.get(holder) == Some(&Role::Thief) {
			self.stolen_used = true;
			return;
		}
		match role {
			Role::Forger => self.forger_used = true,
			Role::Hacker => self.hacker_used = true,
			Role::TimeManager => self.time_manager_used = true,
			_ => {}
		}
	}

	fn handle_time_manager_choice(&mut self, actor: &str, skip: bool) {
		if self.phase != Phase::Vote {
			return;
		}
		match self.privileged_holder(Role::TimeManager) {
			Some(holder) if holder == actor => {}
			_ => return,
		}
		if skip {
			self.skip_night = true;
			self.consume_one_shot(actor, Role::TimeManager);
			logging::session::action(self.room_id, &format!("{} elected to skip the night", actor));
		}
	}

	fn handle_tracker_target(&mut self, actor: &str, target: String) {
		if self.phase != Phase::Night {
			return;
		}
		if self.is_dead(actor) || !self.in_roster(&target) {
			return;
		}
		if self.effective_role(actor) != Some(Role::Tracker) {
			return;
		}
		self.tracker_target = Some(target);
	}

	fn clear_night_ledgers(&mut self) {
		self.mafia_target = None;
		self.doctor_target = None;
		self.night_actions.clear();
		self.tracker_target = None;
	}

	fn route_chat(&self, sender: &str, text: &str) {
		if !self.in_roster(sender) {
			return;
		}
		if self.is_dead(sender) {
			// Ghost chat stays among the dead.
			let msg = ServerMessage::GhostChat {
				sender: sender.to_string(),
				text: text.to_string(),
			};
			for nick in &self.roster {
				if self.is_dead(nick) {
					self.unicast(nick, &msg);
				}
			}
		} else {
			let msg = ServerMessage::Chat {
				sender: sender.to_string(),
				text: text.to_string(),
			};
			for nick in &self.roster {
				if !self.is_dead(nick) {
					self.unicast(nick, &msg);
				}
			}
		}
	}

	fn route_mafia_chat(&self, sender: &str, text: &str) {
		if self.is_dead(sender) {
			return;
		}
		match self.effective_role(sender) {
			Some(role) if role.is_mafia_aligned() => {}
			_ => return,
		}
		let msg = ServerMessage::MafiaChat {
			sender: sender.to_string(),
			text: text.to_string(),
		};
		for nick in &self.roster {
			if !self.is_dead(nick)
				&& self.effective_role(nick).is_some_and(|r| r.is_mafia_aligned())
			{
				self.unicast(nick, &msg);
			}
		}
	}

	fn unicast(&self, nickname: &str, msg: &ServerMessage) {
		self.dispatcher.unicast(nickname, msg);
	}

	fn broadcast(&self, msg: &ServerMessage) {
		self.dispatcher.broadcast(&self.roster, msg);
	}
}


#[cfg(test)]
mod tests {
	use super::testutil::*;
	use super::*;

	#[test]
	fn test_effective_role_follows_theft() {
		let (mut session, _) =
			session_with_roles(&[("ana", Role::Thief), ("bo", Role::Doctor)]);
		assert_eq!(session.effective_role("ana"), Some(Role::Thief));
		session.stolen_role = Some(Role::Doctor);
		assert_eq!(session.effective_role("ana"), Some(Role::Doctor));
		assert_eq!(session.effective_role("bo"), Some(Role::Doctor));
	}

	#[test]
	fn test_privileged_holder_respects_one_shot_flag() {
		let (mut session, _) =
			session_with_roles(&[("ana", Role::Hacker), ("bo", Role::Civilian)]);
		assert_eq!(session.privileged_holder(Role::Hacker).as_deref(), Some("ana"));
		session.consume_one_shot("ana", Role::Hacker);
		assert_eq!(session.privileged_holder(Role::Hacker), None);
	}

	#[test]
	fn test_privileged_holder_ignores_dead_holder() {
		let (mut session, _) =
			session_with_roles(&[("ana", Role::Forger), ("bo", Role::Civilian)]);
		session.dead.insert("ana".to_string());
		assert_eq!(session.privileged_holder(Role::Forger), None);
	}

	#[test]
	fn test_thief_copy_is_independent_of_original_flag() {
		let (mut session, _) = session_with_roles(&[
			("ana", Role::Thief),
			("bo", Role::Civilian),
		]);
		session.stolen_role = Some(Role::Hacker);
		session.stolen_used = false;
		session.hacker_used = true;
		assert_eq!(session.privileged_holder(Role::Hacker).as_deref(), Some("ana"));
		session.consume_one_shot("ana", Role::Hacker);
		assert!(session.stolen_used);
		assert_eq!(session.privileged_holder(Role::Hacker), None);
	}

	#[test]
	fn test_time_manager_choice_only_in_vote_phase() {
		let (mut session, _) = session_with_roles(&[
			("ana", Role::TimeManager),
			("bo", Role::Civilian),
		]);
		session.handle_time_manager_choice("ana", true);
		assert!(!session.skip_night);

		session.set_phase(Phase::Vote);
		session.handle_time_manager_choice("bo", true);
		assert!(!session.skip_night);

		session.handle_time_manager_choice("ana", true);
		assert!(session.skip_night);
		assert!(session.time_manager_used);
	}

	#[test]
	fn test_time_manager_no_does_not_consume() {
		let (mut session, _) = session_with_roles(&[
			("ana", Role::TimeManager),
			("bo", Role::Civilian),
		]);
		session.set_phase(Phase::Vote);
		session.handle_time_manager_choice("ana", false);
		assert!(!session.skip_night);
		assert!(!session.time_manager_used);
	}

	#[test]
	fn test_tracker_target_requires_living_tracker_at_night() {
		let (mut session, _) = session_with_roles(&[
			("ana", Role::Tracker),
			("bo", Role::Civilian),
		]);
		session.handle_tracker_target("ana", "bo".to_string());
		assert_eq!(session.tracker_target, None);

		session.set_phase(Phase::Night);
		session.handle_tracker_target("bo", "ana".to_string());
		assert_eq!(session.tracker_target, None);

		session.handle_tracker_target("ana", "bo".to_string());
		assert_eq!(session.tracker_target.as_deref(), Some("bo"));
	}

	#[test]
	fn test_ghost_chat_stays_among_the_dead() {
		let (mut session, dispatcher) = session_with_roles(&[
			("ana", Role::Civilian),
			("bo", Role::Civilian),
			("cy", Role::Civilian),
		]);
		session.dead.insert("ana".to_string());
		session.dead.insert("cy".to_string());

		session.route_chat("ana", "anyone here?");
		assert_eq!(dispatcher.lines_for("cy"), vec!["GHOST_CHAT|ana|anyone here?"]);
		assert!(dispatcher.lines_for("bo").is_empty());

		dispatcher.clear();
		session.route_chat("bo", "quiet day");
		assert_eq!(dispatcher.lines_for("bo"), vec!["CHAT|bo|quiet day"]);
		assert!(dispatcher.lines_for("ana").is_empty());
	}

	#[test]
	fn test_mafia_chat_reaches_living_mafia_aligned_only() {
		let (mut session, dispatcher) = session_with_roles(&[
			("ana", Role::Mafia),
			("bo", Role::Forger),
			("cy", Role::Civilian),
			("dee", Role::Mafia),
		]);
		session.dead.insert("dee".to_string());

		session.route_mafia_chat("ana", "tonight?");
		assert_eq!(dispatcher.lines_for("bo"), vec!["MAFIA_CHAT|ana|tonight?"]);
		assert!(dispatcher.lines_for("cy").is_empty());
		assert!(dispatcher.lines_for("dee").is_empty());

		dispatcher.clear();
		session.route_mafia_chat("cy", "let me in");
		assert!(dispatcher.lines_for("ana").is_empty());
	}

	#[test]
	fn test_destiny_hint_contains_mafia_aligned() {
		let dispatcher = RecordingDispatcher::new();
		let roster: Vec<String> = ["ana", "bo", "cy", "dee", "eli"]
			.iter()
			.map(|s| s.to_string())
			.collect();
		let roles: HashMap<String, Role> = [
			("ana", Role::Destiny),
			("bo", Role::Mafia),
			("cy", Role::Civilian),
			("dee", Role::Doctor),
			("eli", Role::Police),
		]
		.iter()
		.map(|(n, r)| (n.to_string(), *r))
		.collect();

		let (mut session, _) = session_with_roles(&[]);
		session.roster = roster;
		session.roles = roles;
		session.dispatcher = dispatcher.clone();

		let mut rng = StdRng::seed_from_u64(3);
		session.send_destiny_hint(&mut rng);

		assert_eq!(session.destiny_targets.len(), 3);
		assert!(session.destiny_targets.iter().any(|n| n == "bo"));
		assert!(!session.destiny_targets.iter().any(|n| n == "ana"));
		let hint = dispatcher.lines_for("ana");
		assert_eq!(hint.len(), 1);
		assert!(hint[0].starts_with("DESTINY_TARGETS|"));
	}
}
