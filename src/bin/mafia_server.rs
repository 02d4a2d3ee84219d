use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use mafia_night::config::{load_config, ServerConfig};
use mafia_night::net::GameServer;

#[derive(Parser)]
#[command(name = "mafia-server")]
#[command(about = "Run the mafia game server")]
struct Cli {
	/// Listen address, overrides the config file.
	#[arg(short, long, env = "MAFIA_LISTEN")]
	listen: Option<String>,

	/// Path to a server config file (TOML).
	#[arg(short, long)]
	config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
	let cli = Cli::parse();

	let mut config = match &cli.config {
		Some(path) => match load_config(path) {
			Ok(config) => config,
			Err(e) => {
				eprintln!("{}", e);
				std::process::exit(1);
			}
		},
		None => ServerConfig::default(),
	};
	if let Some(listen) = cli.listen {
		config.listen = listen;
	}

	let server = Arc::new(GameServer::new(config));
	if let Err(e) = server.run().await {
		eprintln!("Server error: {}", e);
		std::process::exit(1);
	}
}
