use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use mafia_night::dispatch::Dispatcher;
use mafia_night::net::protocol::ServerMessage;
use mafia_night::roles::Role;
use mafia_night::session::{self, SessionCommand, SessionConfig, SessionHandle};

/// Forwards every outbound line into a channel the test can await on.
struct ChannelDispatcher {
	tx: UnboundedSender<(String, String)>,
}

impl Dispatcher for ChannelDispatcher {
	fn unicast(&self, nickname: &str, msg: &ServerMessage) {
		let _ = self.tx.send((nickname.to_string(), msg.encode()));
	}
}

struct Wire {
	rx: UnboundedReceiver<(String, String)>,
}

impl Wire {
	/// Next line addressed to `nickname` whose text starts with `prefix`,
	/// discarding everything else. Paused time auto-advances through the
	/// phase timers while we wait.
	async fn wait_for(&mut self, nickname: &str, prefix: &str) -> String {
		loop {
			let (to, line) = self.rx.recv().await.expect("session hung up");
			if to == nickname && line.starts_with(prefix) {
				return line;
			}
		}
	}

	/// Like `wait_for`, but fails the test if a line with `forbid` shows up
	/// for the same player first.
	async fn wait_for_without(&mut self, nickname: &str, prefix: &str, forbid: &str) -> String {
		loop {
			let (to, line) = self.rx.recv().await.expect("session hung up");
			if to != nickname {
				continue;
			}
			if line.starts_with(forbid) {
				panic!("saw {} while waiting for {}", line, prefix);
			}
			if line.starts_with(prefix) {
				return line;
			}
		}
	}
}

fn start_game(roles: &[(&str, Role)]) -> (SessionHandle, Wire) {
	let (tx, rx) = mpsc::unbounded_channel();
	let dispatcher = Arc::new(ChannelDispatcher { tx });

	let roster: Vec<String> = roles.iter().map(|(n, _)| n.to_string()).collect();
	let role_map: HashMap<String, Role> = roles
		.iter()
		.map(|(n, r)| (n.to_string(), *r))
		.collect();

	let cfg = SessionConfig { seed: Some(7), ..SessionConfig::default() };
	let handle = session::start_with_roles(1, roster, role_map, cfg, dispatcher);
	(handle, Wire { rx })
}

async fn until_finished(handle: &SessionHandle) {
	for _ in 0..1000 {
		if handle.is_finished() {
			return;
		}
		tokio::task::yield_now().await;
	}
	panic!("session did not finish");
}

#[tokio::test(start_paused = true)]
async fn test_classic_game_lynching_the_mafia_ends_in_civil_win() {
	let (handle, mut wire) = start_game(&[
		("mara", Role::Mafia),
		("dot", Role::Doctor),
		("po", Role::Police),
		("ca", Role::Civilian),
		("cb", Role::Civilian),
	]);

	assert_eq!(wire.wait_for("mara", "ROLE|").await, "ROLE|mara|MAFIA");
	wire.wait_for("ca", "DAY_START").await;
	wire.wait_for("ca", "VOTE_START").await;

	for voter in ["dot", "po", "ca"] {
		handle.submit(SessionCommand::Vote {
			voter: voter.to_string(),
			target: "mara".to_string(),
		});
	}

	assert_eq!(
		wire.wait_for("ca", "VOTE_RESULT|").await,
		"VOTE_RESULT|mara|MAFIA"
	);
	assert_eq!(
		wire.wait_for("ca", "GAME_OVER|").await,
		"GAME_OVER|CIVIL|dot:DOCTOR,po:POLICE,ca:CIVILIAN,cb:CIVILIAN"
	);
	until_finished(&handle).await;
}

#[tokio::test(start_paused = true)]
async fn test_night_kills_carry_mafia_to_parity_win() {
	let (handle, mut wire) = start_game(&[
		("mara", Role::Mafia),
		("dot", Role::Doctor),
		("ca", Role::Civilian),
		("cb", Role::Civilian),
	]);

	// Day one: nobody votes, night falls.
	wire.wait_for("dot", "VOTE_START").await;
	assert_eq!(
		wire.wait_for("dot", "VOTE_RESULT|").await,
		"VOTE_RESULT|NONE|NONE"
	);
	wire.wait_for("dot", "NIGHT_START").await;

	handle.submit(SessionCommand::NightAction {
		actor: "mara".to_string(),
		role: Role::Mafia,
		target: "ca".to_string(),
	});
	handle.submit(SessionCommand::NightAction {
		actor: "dot".to_string(),
		role: Role::Doctor,
		target: "cb".to_string(),
	});
	assert_eq!(wire.wait_for("dot", "NIGHT_RESULT|").await, "NIGHT_RESULT|ca");

	// Day two: still no lynch; the second kill brings parity.
	wire.wait_for("dot", "NIGHT_START").await;
	handle.submit(SessionCommand::NightAction {
		actor: "mara".to_string(),
		role: Role::Mafia,
		target: "cb".to_string(),
	});
	handle.submit(SessionCommand::NightAction {
		actor: "dot".to_string(),
		role: Role::Doctor,
		target: "dot".to_string(),
	});
	assert_eq!(wire.wait_for("dot", "NIGHT_RESULT|").await, "NIGHT_RESULT|cb");
	assert_eq!(
		wire.wait_for("dot", "GAME_OVER|").await,
		"GAME_OVER|MAFIA|mara:MAFIA"
	);
	until_finished(&handle).await;
}

#[tokio::test(start_paused = true)]
async fn test_doctor_save_blanks_the_night() {
	let (handle, mut wire) = start_game(&[
		("mara", Role::Mafia),
		("dot", Role::Doctor),
		("ca", Role::Civilian),
		("cb", Role::Civilian),
	]);

	wire.wait_for("ca", "NIGHT_START").await;
	handle.submit(SessionCommand::NightAction {
		actor: "mara".to_string(),
		role: Role::Mafia,
		target: "ca".to_string(),
	});
	handle.submit(SessionCommand::NightAction {
		actor: "dot".to_string(),
		role: Role::Doctor,
		target: "ca".to_string(),
	});
	assert_eq!(
		wire.wait_for("ca", "NIGHT_RESULT|").await,
		"NIGHT_RESULT|NONE"
	);
}

#[tokio::test(start_paused = true)]
async fn test_jester_wins_alone_when_lynched() {
	let (handle, mut wire) = start_game(&[
		("jes", Role::Jester),
		("mara", Role::Mafia),
		("dot", Role::Doctor),
		("po", Role::Police),
		("ca", Role::Civilian),
	]);

	wire.wait_for("ca", "VOTE_START").await;
	for voter in ["mara", "dot", "po"] {
		handle.submit(SessionCommand::Vote {
			voter: voter.to_string(),
			target: "jes".to_string(),
		});
	}

	assert_eq!(wire.wait_for("ca", "JESTER_WIN|").await, "JESTER_WIN|jes");
	until_finished(&handle).await;
}

#[tokio::test(start_paused = true)]
async fn test_hacker_override_redirects_the_lynch() {
	let (handle, mut wire) = start_game(&[
		("mara", Role::Mafia),
		("hak", Role::Hacker),
		("dot", Role::Doctor),
		("po", Role::Police),
		("ca", Role::Civilian),
		("cb", Role::Civilian),
	]);

	wire.wait_for("ca", "VOTE_START").await;
	handle.submit(SessionCommand::Vote {
		voter: "po".to_string(),
		target: "mara".to_string(),
	});
	handle.submit(SessionCommand::Vote {
		voter: "dot".to_string(),
		target: "mara".to_string(),
	});
	handle.submit(SessionCommand::Vote {
		voter: "mara".to_string(),
		target: "po".to_string(),
	});

	// The hacker sees the ledger, then flips one ballot.
	assert_eq!(
		wire.wait_for("hak", "HACKER_VOTE_INFO|").await,
		"HACKER_VOTE_INFO|po:mara,dot:mara,mara:po"
	);
	wire.wait_for("hak", "HACKER_PROMPT|").await;
	handle.submit(SessionCommand::HackerChange {
		actor: "hak".to_string(),
		voter: "dot".to_string(),
		new_target: "po".to_string(),
	});

	assert_eq!(
		wire.wait_for("ca", "VOTE_RESULT|").await,
		"VOTE_RESULT|po|POLICE"
	);
}

#[tokio::test(start_paused = true)]
async fn test_hacker_window_expiry_leaves_the_tally_alone() {
	let (handle, mut wire) = start_game(&[
		("mara", Role::Mafia),
		("hak", Role::Hacker),
		("dot", Role::Doctor),
		("po", Role::Police),
		("ca", Role::Civilian),
		("cb", Role::Civilian),
	]);

	wire.wait_for("ca", "VOTE_START").await;
	handle.submit(SessionCommand::Vote {
		voter: "po".to_string(),
		target: "mara".to_string(),
	});
	handle.submit(SessionCommand::Vote {
		voter: "dot".to_string(),
		target: "mara".to_string(),
	});

	// No override arrives; the window closes on its own.
	wire.wait_for("hak", "HACKER_PROMPT|").await;
	assert_eq!(
		wire.wait_for("ca", "VOTE_RESULT|").await,
		"VOTE_RESULT|mara|MAFIA"
	);
}

#[tokio::test(start_paused = true)]
async fn test_forger_replaces_the_revealed_role() {
	let (handle, mut wire) = start_game(&[
		("mara", Role::Mafia),
		("forg", Role::Forger),
		("dot", Role::Doctor),
		("po", Role::Police),
		("ca", Role::Civilian),
		("cb", Role::Civilian),
	]);

	wire.wait_for("ca", "VOTE_START").await;
	for voter in ["mara", "po", "ca"] {
		handle.submit(SessionCommand::Vote {
			voter: voter.to_string(),
			target: "dot".to_string(),
		});
	}

	assert_eq!(
		wire.wait_for("forg", "FORGER_PROMPT|").await,
		"FORGER_PROMPT|dot|DOCTOR"
	);
	handle.submit(SessionCommand::ForgerChange {
		actor: "forg".to_string(),
		role: Role::Civilian,
	});

	assert_eq!(
		wire.wait_for("ca", "VOTE_RESULT|").await,
		"VOTE_RESULT|dot|CIVILIAN"
	);
}

#[tokio::test(start_paused = true)]
async fn test_time_manager_skips_straight_to_the_next_day() {
	let (handle, mut wire) = start_game(&[
		("tm", Role::TimeManager),
		("mara", Role::Mafia),
		("dot", Role::Doctor),
		("po", Role::Police),
		("ca", Role::Civilian),
	]);

	wire.wait_for("tm", "TIME_MANAGER_PROMPT|").await;
	handle.submit(SessionCommand::TimeManagerChoice { actor: "tm".to_string(), skip: true });

	wire.wait_for("ca", "TIME_MANAGER_SKIP|").await;
	wire.wait_for_without("ca", "DAY_START", "NIGHT_START").await;
}

#[tokio::test(start_paused = true)]
async fn test_thief_takes_over_the_first_victims_role() {
	let (handle, mut wire) = start_game(&[
		("thief", Role::Thief),
		("mara", Role::Mafia),
		("dot", Role::Doctor),
		("po", Role::Police),
		("ca", Role::Civilian),
		("cb", Role::Civilian),
	]);

	wire.wait_for("ca", "VOTE_START").await;
	for voter in ["mara", "po", "ca"] {
		handle.submit(SessionCommand::Vote {
			voter: voter.to_string(),
			target: "dot".to_string(),
		});
	}

	assert_eq!(
		wire.wait_for("thief", "THIEF_STOLEN|").await,
		"THIEF_STOLEN|DOCTOR|AVAILABLE"
	);

	// The thief now heals as the doctor would have.
	wire.wait_for("ca", "NIGHT_START").await;
	handle.submit(SessionCommand::NightAction {
		actor: "mara".to_string(),
		role: Role::Mafia,
		target: "ca".to_string(),
	});
	handle.submit(SessionCommand::NightAction {
		actor: "thief".to_string(),
		role: Role::Doctor,
		target: "ca".to_string(),
	});
	assert_eq!(
		wire.wait_for("ca", "NIGHT_RESULT|").await,
		"NIGHT_RESULT|NONE"
	);
}
