use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use crate::roles::{GameMode, Role};

/// Blocking line client. A background thread reads server lines into a
/// channel; callers poll or block on `recv`.
pub struct GameClient {
	stream: TcpStream,
	rx: Receiver<String>,
}

impl GameClient {
	pub fn connect(addr: &str) -> std::io::Result<Self> {
		let stream = TcpStream::connect(addr)?;

		let reader = stream.try_clone()?;
		let (tx, rx) = mpsc::channel();

		thread::spawn(move || {
			read_loop(reader, tx);
		});

		Ok(Self { stream, rx })
	}

	pub fn send_line(&mut self, line: &str) -> std::io::Result<()> {
		self.stream.write_all(line.as_bytes())?;
		self.stream.write_all(b"\n")
	}

	pub fn try_recv(&self) -> Option<String> {
		self.rx.try_recv().ok()
	}

	pub fn recv(&self) -> Option<String> {
		self.rx.recv().ok()
	}

	pub fn recv_timeout(&self, timeout: Duration) -> Option<String> {
		self.rx.recv_timeout(timeout).ok()
	}

	pub fn get_rooms(&mut self) -> std::io::Result<()> {
		self.send_line("GET_ROOMS")
	}

	pub fn create_room(
		&mut self,
		nickname: &str,
		name: &str,
		mode: GameMode,
		limit: usize,
		password: Option<&str>,
	) -> std::io::Result<()> {
		let mut line = format!("CREATE_ROOM|{}|{}|{}|{}", nickname, name, mode, limit);
		if let Some(pw) = password {
			line.push('|');
			line.push_str(pw);
		}
		self.send_line(&line)
	}

	pub fn join_room(
		&mut self,
		nickname: &str,
		room_id: u32,
		password: Option<&str>,
	) -> std::io::Result<()> {
		let mut line = format!("JOIN_ROOM|{}|{}", nickname, room_id);
		if let Some(pw) = password {
			line.push('|');
			line.push_str(pw);
		}
		self.send_line(&line)
	}

	pub fn start_game(&mut self, nickname: &str) -> std::io::Result<()> {
		self.send_line(&format!("START_GAME|{}", nickname))
	}

	pub fn chat(&mut self, sender: &str, text: &str) -> std::io::Result<()> {
		self.send_line(&format!("CHAT|{}|{}", sender, text))
	}

	pub fn mafia_chat(&mut self, sender: &str, text: &str) -> std::io::Result<()> {
		self.send_line(&format!("MAFIA_CHAT|{}|{}", sender, text))
	}

	pub fn vote(&mut self, voter: &str, target: &str) -> std::io::Result<()> {
		self.send_line(&format!("VOTE|{}|{}", voter, target))
	}

	pub fn night_action(&mut self, actor: &str, role: Role, target: &str) -> std::io::Result<()> {
		self.send_line(&format!("NIGHT_ACTION|{}|{}|{}", actor, role, target))
	}

	pub fn tracker_target(&mut self, target: &str) -> std::io::Result<()> {
		self.send_line(&format!("TRACKER_TARGET|{}", target))
	}

	pub fn hacker_change(&mut self, voter: &str, new_target: &str) -> std::io::Result<()> {
		self.send_line(&format!("HACKER_CHANGE|{}|{}", voter, new_target))
	}

	pub fn forger_change(&mut self, role: Role) -> std::io::Result<()> {
		self.send_line(&format!("FORGER_CHANGE|{}", role))
	}

	pub fn time_manager_choice(&mut self, skip: bool) -> std::io::Result<()> {
		let answer = if skip { "YES" } else { "NO" };
		self.send_line(&format!("TIME_MANAGER_CHOICE|{}", answer))
	}
}

fn read_loop(reader: TcpStream, tx: Sender<String>) {
	let reader = BufReader::new(reader);
	for line in reader.lines() {
		match line {
			Ok(line) => {
				if tx.send(line).is_err() {
					return;
				}
			}
			Err(_) => break,
		}
	}
}
