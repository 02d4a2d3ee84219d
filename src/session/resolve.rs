use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{self, Instant};

use crate::logging;
use crate::net::protocol::ServerMessage;
use crate::roles::Role;

use super::{GameSession, Phase, SessionCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	Continue,
	GameOver,
}

impl GameSession {
	/// Cast or replace a ballot. Late ballots (after the ledger sweep) never
	/// reach this: the resolution windows drop them on the floor.
	pub(super) fn handle_vote(&mut self, voter: String, target: String) {
		if self.phase != Phase::Vote {
			return;
		}
		if self.is_dead(&voter) || !self.in_roster(&voter) || !self.in_roster(&target) {
			return;
		}
		logging::session::action(self.room_id, &format!("vote {} -> {}", voter, target));
		match self.vote_ledger.iter().position(|(v, _)| *v == voter) {
			Some(i) => self.vote_ledger[i].1 = target,
			None => self.vote_ledger.push((voter, target)),
		}
	}

	/// Night submission, resolved per the actor's effective role. Police is
	/// answered immediately; Mafia and Doctor overwrite their single target
	/// slot, last writer wins.
	pub(super) fn handle_night_action(&mut self, actor: &str, claimed: Role, target: &str) {
		if self.phase != Phase::Night {
			return;
		}
		if self.is_dead(actor) || !self.in_roster(actor) || !self.in_roster(target) {
			return;
		}
		let effective = match self.effective_role(actor) {
			Some(role) => role,
			None => return,
		};
		if claimed != effective {
			return;
		}

		match effective {
			Role::Mafia => {
				if actor == target {
					self.unicast(
						actor,
						&ServerMessage::Chat {
							sender: "SERVER".to_string(),
							text: "You cannot target yourself".to_string(),
						},
					);
					return;
				}
				self.mafia_target = Some(target.to_string());
				self.night_actions.insert(actor.to_string(), target.to_string());
				logging::session::action(self.room_id, &format!("mafia {} -> {}", actor, target));
			}
			Role::Doctor => {
				self.doctor_target = Some(target.to_string());
				self.night_actions.insert(actor.to_string(), target.to_string());
				logging::session::action(self.room_id, &format!("doctor {} -> {}", actor, target));
			}
			Role::Police => {
				let team = match self.effective_role(target) {
					Some(role) if role.is_mafia_aligned() => "MAFIA".to_string(),
					Some(role) => role.to_string(),
					None => return,
				};
				self.unicast(
					actor,
					&ServerMessage::PoliceResult { target: target.to_string(), team },
				);
				self.night_actions.insert(actor.to_string(), target.to_string());
				logging::session::action(self.room_id, &format!("police {} -> {}", actor, target));
			}
			_ => {}
		}
	}

	/// The target with the strictly highest count; ties go to whichever
	/// target entered the ledger first. Empty ledger means no victim.
	pub(super) fn tally_victim(&self) -> Option<String> {
		let mut counts: Vec<(&str, u32)> = Vec::new();
		for (_, target) in &self.vote_ledger {
			match counts.iter().position(|(t, _)| t == target) {
				Some(i) => counts[i].1 += 1,
				None => counts.push((target, 1)),
			}
		}

		let mut best: Option<(&str, u32)> = None;
		for (target, count) in counts {
			if best.map_or(true, |(_, c)| count > c) {
				best = Some((target, count));
			}
		}
		best.map(|(target, _)| target.to_string())
	}

	/// Vote-end resolution: Hacker window, tally, Jester short-circuit,
	/// Forger window, then death, broadcast, and win check.
	pub(super) async fn resolve_vote(
		&mut self,
		rx: &mut UnboundedReceiver<SessionCommand>,
	) -> Outcome {
		if let Some(hacker) = self.privileged_holder(Role::Hacker) {
			self.unicast(&hacker, &ServerMessage::HackerVoteInfo(self.vote_ledger.clone()));
			self.unicast(
				&hacker,
				&ServerMessage::HackerPrompt(
					"Override one ballot with HACKER_CHANGE|voter|newTarget".to_string(),
				),
			);
			logging::session::window(self.room_id, &format!("hacker window open for {}", hacker));
			if let Some((voter, new_target)) = self.hacker_window(rx, &hacker).await {
				logging::session::window(
					self.room_id,
					&format!("hacker override {} -> {}", voter, new_target),
				);
				match self.vote_ledger.iter().position(|(v, _)| *v == voter) {
					Some(i) => self.vote_ledger[i].1 = new_target,
					None => self.vote_ledger.push((voter, new_target)),
				}
				self.consume_one_shot(&hacker, Role::Hacker);
			}
		}

		let victim = self.tally_victim();

		if let Some(v) = &victim {
			if self.effective_role(v) == Some(Role::Jester) {
				logging::session::game_over(self.room_id, &format!("jester win: {}", v));
				self.broadcast(&ServerMessage::JesterWin(v.clone()));
				return Outcome::GameOver;
			}
		}

		let mut revealed = victim.as_deref().and_then(|v| self.effective_role(v));
		if let (Some(v), Some(real)) = (victim.as_deref(), revealed) {
			if let Some(forger) = self.privileged_holder(Role::Forger) {
				self.unicast(
					&forger,
					&ServerMessage::ForgerPrompt { victim: v.to_string(), real_role: real },
				);
				logging::session::window(self.room_id, &format!("forger window open for {}", forger));
				if let Some(substitute) = self.forger_window(rx, &forger).await {
					logging::session::window(
						self.room_id,
						&format!("forged role: {}", substitute),
					);
					revealed = Some(substitute);
					self.consume_one_shot(&forger, Role::Forger);
				}
			}
		}

		match (victim, revealed) {
			(Some(v), Some(role)) => {
				self.mark_dead(&v, "lynched");
				self.broadcast(&ServerMessage::VoteResult(Some((v, role))));
			}
			_ => self.broadcast(&ServerMessage::VoteResult(None)),
		}
		self.broadcast(&ServerMessage::PlayerList(self.roster.clone()));
		self.vote_ledger.clear();

		if self.check_game_over() {
			Outcome::GameOver
		} else {
			Outcome::Continue
		}
	}

	/// Bounded wait for the Hacker's single override. Chat keeps flowing;
	/// every other command that arrives here is dropped, including ballots
	/// that missed the sweep.
	async fn hacker_window(
		&mut self,
		rx: &mut UnboundedReceiver<SessionCommand>,
		holder: &str,
	) -> Option<(String, String)> {
		let deadline = Instant::now() + self.cfg.window;
		loop {
			tokio::select! {
				_ = time::sleep_until(deadline) => return None,
				cmd = rx.recv() => match cmd {
					Some(SessionCommand::HackerChange { actor, voter, new_target })
						if actor == holder
							&& self.in_roster(&voter)
							&& self.in_roster(&new_target) =>
					{
						return Some((voter, new_target));
					}
					Some(SessionCommand::Chat { sender, text }) => {
						self.route_chat(&sender, &text)
					}
					Some(SessionCommand::MafiaChat { sender, text }) => {
						self.route_mafia_chat(&sender, &text)
					}
					Some(_) => {}
					None => return None,
				}
			}
		}
	}

	/// Bounded wait for the Forger's substitute role.
	async fn forger_window(
		&mut self,
		rx: &mut UnboundedReceiver<SessionCommand>,
		holder: &str,
	) -> Option<Role> {
		let deadline = Instant::now() + self.cfg.window;
		loop {
			tokio::select! {
				_ = time::sleep_until(deadline) => return None,
				cmd = rx.recv() => match cmd {
					Some(SessionCommand::ForgerChange { actor, role }) if actor == holder => {
						return Some(role);
					}
					Some(SessionCommand::Chat { sender, text }) => {
						self.route_chat(&sender, &text)
					}
					Some(SessionCommand::MafiaChat { sender, text }) => {
						self.route_mafia_chat(&sender, &text)
					}
					Some(_) => {}
					None => return None,
				}
			}
		}
	}

	/// Night-end resolution: the kill (unless healed), the Tracker report,
	/// then ledger sweep, broadcast, and win check.
	pub(super) fn resolve_night(&mut self) -> Outcome {
		let killed = match (&self.mafia_target, &self.doctor_target) {
			(Some(mafia), Some(doctor)) if mafia == doctor => None,
			(Some(mafia), _) => Some(mafia.clone()),
			_ => None,
		};

		if let Some(victim) = &killed {
			self.mark_dead(victim, "killed in the night");
		}

		self.deliver_tracker_result();
		self.clear_night_ledgers();
		self.broadcast(&ServerMessage::NightResult(killed));
		self.broadcast(&ServerMessage::PlayerList(self.roster.clone()));

		if self.check_game_over() {
			Outcome::GameOver
		} else {
			Outcome::Continue
		}
	}

	fn deliver_tracker_result(&self) {
		let watch = match &self.tracker_target {
			Some(watch) => watch,
			None => return,
		};
		let text = match self.night_actions.get(watch) {
			Some(target) => format!("{} acted on {}", watch, target),
			None => format!("{}: no action", watch),
		};
		for nick in &self.roster {
			if !self.is_dead(nick) && self.effective_role(nick) == Some(Role::Tracker) {
				self.unicast(nick, &ServerMessage::TrackerResult(text.clone()));
			}
		}
	}

	/// Deaths are monotonic. The first death of the game also settles the
	/// Thief's inheritance, exactly once.
	pub(super) fn mark_dead(&mut self, victim: &str, cause: &str) {
		if !self.in_roster(victim) {
			return;
		}
		self.dead.insert(victim.to_string());
		logging::session::death(self.room_id, victim, cause);

		if !self.theft_resolved {
			self.theft_resolved = true;
			self.settle_theft(victim);
		}
	}

	fn settle_theft(&mut self, victim: &str) {
		let stolen = match self.roles.get(victim) {
			Some(Role::Thief) | None => return,
			Some(role) => *role,
		};
		let thief = self
			.roster
			.iter()
			.find(|n| self.roles.get(*n) == Some(&Role::Thief) && !self.dead.contains(*n))
			.cloned();
		if let Some(thief) = thief {
			self.stolen_role = Some(stolen);
			self.stolen_used = self.one_shot_used(stolen);
			self.unicast(
				&thief,
				&ServerMessage::ThiefStolen { role: stolen, available: !self.stolen_used },
			);
			logging::session::action(
				self.room_id,
				&format!("{} inherited {} from {}", thief, stolen, victim),
			);
		}
	}
}
