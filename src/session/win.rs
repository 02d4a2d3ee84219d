use crate::logging;
use crate::net::protocol::ServerMessage;
use crate::roles::Team;

use super::GameSession;

impl GameSession {
	/// End-of-resolution win check. Civilians win once no mafia-aligned
	/// player is left alive; mafia wins once they match or outnumber
	/// everyone else. Counting goes by effective role, so a Thief acting
	/// as Mafia counts for the mafia side.
	pub(super) fn check_game_over(&mut self) -> bool {
		let mut mafia = 0usize;
		let mut others = 0usize;
		for nick in &self.roster {
			if self.is_dead(nick) {
				continue;
			}
			match self.effective_role(nick) {
				Some(role) if role.is_mafia_aligned() => mafia += 1,
				Some(_) => others += 1,
				None => {}
			}
		}

		let team = if mafia == 0 && others > 0 {
			Team::Civilian
		} else if mafia > 0 && mafia >= others {
			Team::Mafia
		} else {
			return false;
		};

		let winners: Vec<_> = self
			.roster
			.iter()
			.filter_map(|nick| {
				let role = self.effective_role(nick)?;
				let on_winning_side = match team {
					Team::Mafia => role.is_mafia_aligned(),
					_ => !role.is_mafia_aligned(),
				};
				on_winning_side.then(|| (nick.clone(), role))
			})
			.collect();

		logging::session::game_over(
			self.room_id,
			&format!("{} wins ({} mafia vs {} others alive)", team, mafia, others),
		);
		self.broadcast(&ServerMessage::GameOver { team, winners });
		true
	}
}
