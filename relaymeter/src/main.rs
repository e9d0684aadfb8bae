mod config;
mod tasks;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use config::Config;
use meterapi::{Client, ClientOptions};
use metermodel::{
	payload::{ConsumptionUpdate, Registration, UserUpdate},
	MeterIdentity, RelayState,
};
use relaymeter::{
	notice::{Notice, Notifier, Severity},
	relay::{RelayController, Settlement},
	report::ReportRetriever,
	session::{FileSessionStore, Session, SessionStore},
	telemetry::TelemetrySynchronizer,
};
use std::{
	fs::File,
	path::{Path, PathBuf},
	sync::Arc,
};
use tasks::{console::ConsoleCommand, display};
use time::{util::local_offset::Soundness, UtcOffset};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Remote control for a metered relay")]
pub struct Arguments {
	/// YAML or JSON configuration file.
	#[arg(short, long, env = "RELAYMETER_CONFIG_PATH")]
	config: PathBuf,

	/// Meter to operate on. Overrides the configuration and stored session.
	#[arg(short, long, global = true, env = "RELAYMETER_METER")]
	meter: Option<String>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Log in and remember the session.
	Login {
		username: String,
		#[arg(long, env = "RELAYMETER_PASSWORD", hide_env_values = true)]
		password: String,
	},
	/// Forget the stored session.
	Logout,
	/// Create an account.
	Register(RegisterArgs),
	/// Manage user accounts (admin only).
	#[command(subcommand)]
	Users(UsersCommand),
	#[command(flatten)]
	Meter(MeterCommand),
}

/// Commands that operate on a single meter.
#[derive(Subcommand)]
enum MeterCommand {
	/// Live view of the meter. Enter r to refresh, t to switch the relay, q to quit.
	Dashboard,
	/// Switch the relay.
	Relay {
		#[arg(value_enum)]
		action: RelayAction,
	},
	/// Show the port report.
	Report {
		/// Write raw entries as CSV instead of a table.
		#[arg(long)]
		csv: bool,
	},
	/// Record a consumption reading.
	Consumption(ConsumptionArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum RelayAction {
	On,
	Off,
	Toggle,
}

#[derive(Args)]
struct RegisterArgs {
	username: String,
	#[arg(long, env = "RELAYMETER_PASSWORD", hide_env_values = true)]
	password: String,
	#[arg(long)]
	email: String,
	#[arg(long)]
	full_name: String,
	#[arg(long)]
	meter_number: String,
	#[arg(long)]
	phone_number: String,
}

impl From<RegisterArgs> for Registration {
	fn from(args: RegisterArgs) -> Self {
		Self {
			username: args.username,
			password: args.password,
			email: args.email,
			full_name: args.full_name,
			meter_number: args.meter_number,
			phone_number: args.phone_number,
		}
	}
}

#[derive(Args)]
struct ConsumptionArgs {
	/// Consumption in kWh.
	consumption: f64,
	#[arg(long)]
	voltage: Option<f64>,
	#[arg(long)]
	current: Option<f64>,
	#[arg(long)]
	power_factor: Option<f64>,
}

#[derive(Subcommand)]
enum UsersCommand {
	List {
		#[arg(long, default_value = "")]
		search: String,
	},
	Update {
		id: String,
		#[command(flatten)]
		fields: UserFields,
	},
	Delete {
		id: String,
	},
}

#[derive(Args)]
struct UserFields {
	#[arg(long)]
	username: Option<String>,
	#[arg(long)]
	email: Option<String>,
	#[arg(long)]
	full_name: Option<String>,
	#[arg(long)]
	meter_number: Option<String>,
	#[arg(long)]
	phone_number: Option<String>,
	#[arg(long)]
	role: Option<String>,
}

impl From<UserFields> for UserUpdate {
	fn from(fields: UserFields) -> Self {
		Self {
			username: fields.username,
			email: fields.email,
			full_name: fields.full_name,
			meter_number: fields.meter_number,
			phone_number: fields.phone_number,
			role: fields.role,
		}
	}
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")),
		)
		.with_writer(std::io::stderr)
		.init();

	// SAFETY: We do not modify our own environment so this is OK.
	unsafe {
		time::util::local_offset::set_soundness(Soundness::Unsound);
	}
	let offset = history::local_offset();

	let arguments = Arguments::parse();
	let config = load_config(&arguments.config)?;

	// The session is read once; commands that change it write it back.
	let store = FileSessionStore::new(config.session_path());
	let session = store.load().unwrap_or_else(|error| {
		tracing::warn!("ignoring stored session: {error}");
		None
	});

	let client = Arc::new(Client::new(
		config.api.base_url.clone(),
		ClientOptions {
			timeout: config.timeout(),
			session_cookie: session.as_ref().and_then(|session| session.cookie.clone()),
		},
	)?);

	let meter_argument = arguments
		.meter
		.as_deref()
		.map(MeterIdentity::new)
		.transpose()
		.context("invalid --meter")?;

	match arguments.command {
		Command::Login { username, password } => {
			let login = client.authenticate(&username, &password).await?;
			let fallback = meter_argument.or_else(|| config.meter_number.clone());
			let session = Session::from_login(login, fallback);
			store.save(&session)?;
			println!("Logged in as {}", session.username);
			if let Some(meter) = &session.meter_number {
				println!("Meter {meter}");
			}
		}
		Command::Logout => {
			store.clear()?;
			println!("Logged out");
		}
		Command::Register(args) => {
			let ack = client.register(&args.into()).await?;
			println!(
				"{}",
				ack.message.as_deref().unwrap_or(
					"Your account has been created successfully. Please login."
				)
			);
		}
		Command::Users(command) => {
			if !session.as_ref().is_some_and(Session::is_admin) {
				tracing::warn!("not logged in as an admin, the backend may reject requests");
			}
			run_users(client, command).await?;
		}
		Command::Meter(command) => {
			if session.is_none() {
				tracing::warn!("not logged in, the backend may reject requests");
			}
			let meter = resolve_meter(meter_argument, &config, session.as_ref())?;
			run_meter_command(command, client, meter, &config, offset).await?;
		}
	}

	Ok(())
}

async fn run_meter_command(
	command: MeterCommand,
	client: Arc<Client>,
	meter: MeterIdentity,
	config: &Config,
	offset: UtcOffset,
) -> anyhow::Result<()> {
	match command {
		MeterCommand::Dashboard => run_dashboard(client, meter, config, offset).await,
		MeterCommand::Relay { action } => run_relay(client, meter, config, action).await,
		MeterCommand::Report { csv } => run_report(client, meter, offset, csv).await,
		MeterCommand::Consumption(args) => {
			let update = ConsumptionUpdate {
				meter_number: meter.meter_number().to_string(),
				consumption: args.consumption,
				voltage: args.voltage,
				current: args.current,
				power_factor: args.power_factor,
			};
			let ack = client.update_consumption(&update).await?;
			println!(
				"{}",
				ack.message.as_deref().unwrap_or("Consumption recorded")
			);
			Ok(())
		}
	}
}

/// The meter from the command line, the configuration, or the session, in
/// that order.
fn resolve_meter(
	argument: Option<MeterIdentity>,
	config: &Config,
	session: Option<&Session>,
) -> anyhow::Result<MeterIdentity> {
	argument
		.or_else(|| config.meter_number.clone())
		.or_else(|| session.and_then(|session| session.meter_number.clone()))
		.context("no meter number: pass --meter, set meter_number in the configuration, or log in")
}

/// The relay state from the latest report entry, or the configured default.
async fn initial_relay(retriever: &ReportRetriever<Client>, config: &Config) -> RelayState {
	match retriever.refresh().await {
		Ok(report) => report.latest_status().unwrap_or(config.initial_relay),
		Err(_) => config.initial_relay,
	}
}

async fn run_dashboard(
	client: Arc<Client>,
	meter: MeterIdentity,
	config: &Config,
	offset: UtcOffset,
) -> anyhow::Result<()> {
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let (notifier, notices) = Notifier::channel();

	let retriever = ReportRetriever::new(Arc::clone(&client), meter.clone(), notifier.clone());
	let initial = initial_relay(&retriever, config).await;

	let telemetry = TelemetrySynchronizer::new(Arc::clone(&client), meter.clone(), notifier.clone());
	let relay = Arc::new(RelayController::with_telemetry(
		Arc::clone(&client),
		initial,
		telemetry.clone(),
		notifier.clone(),
	));

	// Spawn a task to redraw the dashboard
	//
	let display_task = display::create_task(
		meter,
		offset,
		display::Feeds {
			telemetry: telemetry.subscribe(),
			refreshing: telemetry.refreshing(),
			relay: relay.subscribe(),
			notices,
		},
		shutdown_rx,
	);

	let timer = telemetry.start(config.refresh_interval());

	let (console_tx, mut console_rx) = mpsc::channel(8);
	tasks::console::spawn(console_tx)?;

	loop {
		tokio::select! {
			Some(command) = console_rx.recv() => {
				match command {
					ConsoleCommand::Refresh => {
						let telemetry = telemetry.clone();
						tokio::spawn(async move { telemetry.refresh().await });
					}
					ConsoleCommand::Toggle => {
						let relay = Arc::clone(&relay);
						let notifier = notifier.clone();
						tokio::spawn(async move {
							if let Err(error) = relay.toggle().await {
								notifier.error("Error", error.to_string());
							}
						});
					}
					ConsoleCommand::Quit => break,
				}
			}
			_ = tokio::signal::ctrl_c() => {
				tracing::debug!("received ctrl-c, closing");
				break
			}
			else => break,
		}
	}

	timer.cancel();
	telemetry.deactivate();
	let _ = shutdown_tx.send(true);
	display_task.await??;

	Ok(())
}

async fn run_relay(
	client: Arc<Client>,
	meter: MeterIdentity,
	config: &Config,
	action: RelayAction,
) -> anyhow::Result<()> {
	let (notifier, mut notices) = Notifier::channel();

	let result = match action {
		RelayAction::On => {
			let relay = RelayController::new(client, meter, config.initial_relay, notifier);
			relay.set(RelayState::On).await
		}
		RelayAction::Off => {
			let relay = RelayController::new(client, meter, config.initial_relay, notifier);
			relay.set(RelayState::Off).await
		}
		RelayAction::Toggle => {
			let retriever = ReportRetriever::new(Arc::clone(&client), meter.clone(), notifier.clone());
			let initial = initial_relay(&retriever, config).await;
			let relay = RelayController::new(client, meter, initial, notifier);
			relay.toggle().await
		}
	};

	let failure = print_notices(&mut notices);
	match result? {
		Settlement::Confirmed(state) => {
			println!("Power Status: {}", state.connection_label());
			Ok(())
		}
		Settlement::RolledBack(state) => anyhow::bail!(
			"{}; relay remains {}",
			failure.unwrap_or_else(|| "Failed to toggle relay".to_string()),
			state.connection_label().to_ascii_lowercase()
		),
	}
}

async fn run_report(
	client: Arc<Client>,
	meter: MeterIdentity,
	offset: UtcOffset,
	csv: bool,
) -> anyhow::Result<()> {
	let (notifier, mut notices) = Notifier::channel();
	let retriever = ReportRetriever::new(client, meter, notifier);

	let result = retriever.refresh().await;
	print_notices(&mut notices);
	let report = result?;

	if csv {
		report.write_csv(std::io::stdout().lock())?;
	} else {
		display::print(&display::report_page(&report, offset))?;
	}
	Ok(())
}

async fn run_users(client: Arc<Client>, command: UsersCommand) -> anyhow::Result<()> {
	match command {
		UsersCommand::List { search } => {
			let users = client.list_users(&search).await?;
			if users.is_empty() {
				println!("No users found");
			}
			for user in users {
				println!(
					"{}\t{}\t{}\t{}\t{}",
					user.id,
					user.username,
					user.email.as_deref().unwrap_or("-"),
					user.meter_number.as_deref().unwrap_or("-"),
					user.role.as_deref().unwrap_or("user"),
				);
			}
		}
		UsersCommand::Update { id, fields } => {
			let ack = client.update_user(&id, &fields.into()).await?;
			println!("{}", ack.message.as_deref().unwrap_or("User updated"));
		}
		UsersCommand::Delete { id } => {
			let ack = client.delete_user(&id).await?;
			println!("{}", ack.message.as_deref().unwrap_or("User deleted"));
		}
	}
	Ok(())
}

/// Prints informational notices and returns the last error notice's message.
fn print_notices(notices: &mut mpsc::UnboundedReceiver<Notice>) -> Option<String> {
	let mut failure = None;
	while let Ok(notice) = notices.try_recv() {
		match notice.severity {
			Severity::Info => println!("{}", display::notice_line(&notice)),
			Severity::Error => failure = Some(notice.message),
		}
	}
	failure
}

fn load_config<T: AsRef<Path>>(path: T) -> anyhow::Result<Config> {
	let path = path.as_ref();
	let config_file = File::open(path)
		.with_context(|| format!("opening configuration file {}", path.display()))?;
	let config: Config = match path.extension().and_then(|s| s.to_str()) {
		Some("yaml") | Some("yml") => serde_yaml::from_reader(config_file)?,
		Some("json") => serde_json::from_reader(config_file)?,
		None | Some(_) => anyhow::bail!("unknown config file extension: {}", path.display()),
	};
	config.validate()?;
	Ok(config)
}

#[cfg(test)]
mod tests {
	use super::{Arguments, Command, MeterCommand, RelayAction, UsersCommand};
	use clap::{CommandFactory, Parser};

	#[test]
	fn arguments() {
		Arguments::command().debug_assert();
	}

	#[test]
	fn meter_commands_are_top_level() {
		let arguments =
			Arguments::try_parse_from(["relaymeter", "-c", "meter.yaml", "relay", "off"]).unwrap();
		assert!(matches!(
			arguments.command,
			Command::Meter(MeterCommand::Relay {
				action: RelayAction::Off
			})
		));

		let arguments = Arguments::try_parse_from([
			"relaymeter",
			"-c",
			"meter.yaml",
			"users",
			"delete",
			"7",
		])
		.unwrap();
		assert!(matches!(
			arguments.command,
			Command::Users(UsersCommand::Delete { .. })
		));
	}
}
