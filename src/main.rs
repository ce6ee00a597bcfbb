use clap::{Arg, ArgAction, ArgMatches, Command};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jcrsync::config::Config;
use jcrsync::logging::*;
use jcrsync::repository::SlingClient;
use jcrsync::watch;

///////////////////////
// Utility functions //
///////////////////////

fn cli() -> Command {
	Command::new("jcrsync")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Mirror a local jcr_root tree into a JCR repository")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.global(true)
				.help("Config file (.toml, otherwise JSON5)"),
		)
		.arg(
			Arg::new("base")
				.short('b')
				.long("base")
				.value_name("DIR")
				.global(true)
				.help("Local jcr_root directory"),
		)
		.arg(
			Arg::new("host")
				.short('H')
				.long("host")
				.value_name("HOST")
				.global(true)
				.help("Repository host"),
		)
		.arg(
			Arg::new("protocol")
				.short('t')
				.long("protocol")
				.value_name("PROTOCOL")
				.global(true)
				.value_parser(["http", "https"])
				.help("Repository protocol"),
		)
		.arg(
			Arg::new("port")
				.short('p')
				.long("port")
				.value_name("PORT")
				.global(true)
				.value_parser(clap::value_parser!(u16))
				.help("Repository port"),
		)
		.arg(
			Arg::new("username")
				.short('u')
				.long("username")
				.value_name("USER")
				.global(true)
				.help("Repository user"),
		)
		.arg(
			Arg::new("password")
				.short('w')
				.long("password")
				.value_name("PASSWORD")
				.global(true)
				.help("Repository password"),
		)
		.arg(
			Arg::new("exclude")
				.short('x')
				.long("exclude")
				.value_name("GLOB")
				.global(true)
				.action(ArgAction::Append)
				.help("Exclude files matching this pattern (repeatable)"),
		)
		.subcommand(Command::new("sync").about("Watch the base directory and upload every change"))
}

/// Defaults, then the config file, then the environment, then the flags
fn load_config(matches: &ArgMatches) -> Result<Config, Box<dyn Error>> {
	let mut config = match matches.get_one::<String>("config") {
		Some(file) => Config::from_file(Path::new(file))?,
		None => Config::default(),
	};
	config.apply_env();

	if let Some(base) = matches.get_one::<String>("base") {
		config.base = PathBuf::from(base);
	}
	if let Some(host) = matches.get_one::<String>("host") {
		config.host = host.clone();
	}
	if let Some(protocol) = matches.get_one::<String>("protocol") {
		config.protocol = protocol.clone();
	}
	if let Some(port) = matches.get_one::<u16>("port") {
		config.port = *port;
	}
	if let Some(username) = matches.get_one::<String>("username") {
		config.username = username.clone();
	}
	if let Some(password) = matches.get_one::<String>("password") {
		config.password = password.clone();
	}
	if let Some(patterns) = matches.get_many::<String>("exclude") {
		config.exclude_patterns.extend(patterns.cloned());
	}

	config.validate()?;
	Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
	init_tracing();

	let matches = cli().get_matches();

	if let Some(sub_matches) = matches.subcommand_matches("sync") {
		let config = load_config(sub_matches)?;

		if !config.base.exists() {
			info!("Base folder {} doesn't exist", config.base.display());
			return Ok(());
		}

		let client = Arc::new(SlingClient::new(&config)?);
		watch::run(&config, client).await?;
	}

	Ok(())
}


// vim: ts=4
