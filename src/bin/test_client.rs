use std::io::{self, Write};
use std::time::Duration;

use clap::Parser;

use mafia_night::net::GameClient;

#[derive(Parser)]
#[command(name = "test-client")]
#[command(about = "Raw line client for poking at a mafia server")]
struct Cli {
	#[arg(short, long, default_value = "127.0.0.1:6000")]
	server: String,
}

fn main() -> io::Result<()> {
	let cli = Cli::parse();
	println!("Connecting to {}...", cli.server);

	let mut client = GameClient::connect(&cli.server)?;
	println!("Connected. Type raw protocol lines, 'help' or 'quit'.");

	loop {
		while let Some(line) = client.try_recv() {
			println!("< {}", line);
		}

		print!("> ");
		io::stdout().flush()?;

		let mut input = String::new();
		io::stdin().read_line(&mut input)?;
		let input = input.trim();

		match input {
			"quit" | "q" => break,
			"help" | "h" | "?" => {
				println!("Anything else is sent verbatim. Examples:");
				println!("  GET_ROOMS");
				println!("  CREATE_ROOM|ana|den|CLASSIC|8");
				println!("  JOIN_ROOM|bo|1");
				println!("  START_GAME|ana");
				println!("  CHAT|ana|hello");
				println!("  VOTE|ana|bo");
				println!("  NIGHT_ACTION|ana|MAFIA|bo");
			}
			"" => {}
			line => {
				client.send_line(line)?;
			}
		}

		std::thread::sleep(Duration::from_millis(50));
	}

	println!("Disconnected.");
	Ok(())
}
