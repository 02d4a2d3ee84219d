use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Timing {
	#[serde(default = "default_day_secs")]
	pub day_secs: u64,
	#[serde(default = "default_vote_secs")]
	pub vote_secs: u64,
	#[serde(default = "default_night_secs")]
	pub night_secs: u64,
	#[serde(default = "default_window_secs")]
	pub window_secs: u64,
}

fn default_day_secs() -> u64 { 60 }
fn default_vote_secs() -> u64 { 30 }
fn default_night_secs() -> u64 { 30 }
fn default_window_secs() -> u64 { 15 }

impl Default for Timing {
	fn default() -> Self {
		Self {
			day_secs: default_day_secs(),
			vote_secs: default_vote_secs(),
			night_secs: default_night_secs(),
			window_secs: default_window_secs(),
		}
	}
}

impl Timing {
	pub fn session_config(&self) -> crate::session::SessionConfig {
		crate::session::SessionConfig {
			day: Duration::from_secs(self.day_secs),
			vote: Duration::from_secs(self.vote_secs),
			night: Duration::from_secs(self.night_secs),
			window: Duration::from_secs(self.window_secs),
			seed: None,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
	#[serde(default = "default_listen")]
	pub listen: String,
	#[serde(default)]
	pub timing: Timing,
}

fn default_listen() -> String {
	"127.0.0.1:6000".to_string()
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			listen: default_listen(),
			timing: Timing::default(),
		}
	}
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServerConfig, String> {
	let content = fs::read_to_string(&path)
		.map_err(|e| format!("Failed to read {}: {}", path.as_ref().display(), e))?;

	toml::from_str(&content).map_err(|e| format!("Failed to parse server config: {}", e))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = ServerConfig::default();
		assert_eq!(config.listen, "127.0.0.1:6000");
		assert_eq!(config.timing.day_secs, 60);
		assert_eq!(config.timing.window_secs, 15);
	}

	#[test]
	fn test_partial_toml_fills_defaults() {
		let config: ServerConfig = toml::from_str(
			r#"
			listen = "0.0.0.0:7000"

			[timing]
			day_secs = 90
			"#,
		)
		.unwrap();
		assert_eq!(config.listen, "0.0.0.0:7000");
		assert_eq!(config.timing.day_secs, 90);
		assert_eq!(config.timing.vote_secs, 30);
	}

	#[test]
	fn test_session_config_durations() {
		let timing = Timing { day_secs: 1, vote_secs: 2, night_secs: 3, window_secs: 4 };
		let session = timing.session_config();
		assert_eq!(session.day, Duration::from_secs(1));
		assert_eq!(session.vote, Duration::from_secs(2));
		assert_eq!(session.night, Duration::from_secs(3));
		assert_eq!(session.window, Duration::from_secs(4));
	}
}
