use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

use chrono::Local;

struct LogState {
	file: Option<std::fs::File>,
	current_date: String,
}

static LOG_STATE: Mutex<LogState> = Mutex::new(LogState {
	file: None,
	current_date: String::new(),
});

fn ensure_log_file(state: &mut LogState) {
	let date = Local::now().format("%Y-%m-%d").to_string();
	if state.current_date != date || state.file.is_none() {
		let _ = fs::create_dir_all("logs");
		let path = format!("logs/mafia-{}.log", date);
		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) {
			state.file = Some(file);
			state.current_date = date;
		}
	}
}

pub fn log(room: Option<u32>, module: &str, log_type: &str, message: &str) {
	if let Ok(mut state) = LOG_STATE.lock() {
		ensure_log_file(&mut state);

		let room_tag = match room {
			Some(id) => format!("R{}", id),
			None => "----".to_string(),
		};
		let line = format!(
			"[{}][{}][{}:{}] {}\n",
			Local::now().format("%H:%M:%S%.3f"),
			room_tag,
			module,
			log_type,
			message
		);

		if let Some(ref mut file) = state.file {
			let _ = file.write_all(line.as_bytes());
			let _ = file.flush();
		}
	}
}

pub mod session {
	use super::log;

	pub fn phase(room: u32, phase: &str) {
		log(Some(room), "Session", "PHASE", phase);
	}

	pub fn action(room: u32, msg: &str) {
		log(Some(room), "Session", "ACTION", msg);
	}

	pub fn death(room: u32, nickname: &str, cause: &str) {
		log(Some(room), "Session", "DEATH", &format!("{} ({})", nickname, cause));
	}

	pub fn window(room: u32, msg: &str) {
		log(Some(room), "Session", "WINDOW", msg);
	}

	pub fn game_over(room: u32, msg: &str) {
		log(Some(room), "Session", "GAME", msg);
	}
}

pub mod server {
	use super::log;

	pub fn conn(msg: &str) {
		log(None, "Server", "CONN", msg);
	}

	pub fn room(room: u32, msg: &str) {
		log(Some(room), "Server", "ROOM", msg);
	}

	pub fn error(msg: &str) {
		log(None, "Server", "ERROR", msg);
	}
}
