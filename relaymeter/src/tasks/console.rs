use std::{io, thread};
use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
	Refresh,
	Toggle,
	Quit,
}

impl ConsoleCommand {
	pub fn parse(line: &str) -> Option<Self> {
		match line.trim().to_ascii_lowercase().as_str() {
			"r" | "refresh" => Some(Self::Refresh),
			"t" | "toggle" => Some(Self::Toggle),
			"q" | "quit" | "exit" => Some(Self::Quit),
			_ => None,
		}
	}
}

/// Reads commands from stdin on a dedicated thread. End of input quits.
///
/// The thread is never joined; it stays blocked on stdin until the process
/// exits.
pub fn spawn(commands: mpsc::Sender<ConsoleCommand>) -> io::Result<thread::JoinHandle<()>> {
	thread::Builder::new()
		.name("console".into())
		.spawn(move || {
			for line in io::stdin().lines() {
				let Ok(line) = line else {
					break;
				};
				match ConsoleCommand::parse(&line) {
					Some(command) => {
						if commands.blocking_send(command).is_err() {
							return;
						}
					}
					None if line.trim().is_empty() => {}
					None => tracing::warn!("unknown command '{}'", line.trim()),
				}
			}
			tracing::debug!("console input closed");
			let _ = commands.blocking_send(ConsoleCommand::Quit);
		})
}
