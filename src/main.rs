use clap::{Arg, ArgAction, ArgMatches, Command};
use itertools::Itertools;
use log::{error, warn};
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use pin_reset::auth::password::{read_password, validate_password};
use pin_reset::auth::{FileUserDirectory, UserDirectory};
use pin_reset::delivery::{ConsoleDelivery, EmailDelivery, PinDelivery};
use pin_reset::reset::{ResetError, ResetTokenStore};
use pin_reset::utils::time::{format_remaining, utc_to_local, Clock, SystemClock};
use pin_reset::utils::initialize_logging;
use pin_reset::{DirectoryStorage, Settings, CONFIG_FILE};

type CliStore = ResetTokenStore<DirectoryStorage, FileUserDirectory, Box<dyn PinDelivery>>;

fn build_cli() -> Command {
    Command::new("pin-reset")
        .about("Issue and redeem password reset PINs")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("FILE")
                .help("Path to the JSON settings file")
                .default_value(CONFIG_FILE),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("add-user")
                .about("Create a user account")
                .arg(Arg::new("username").help("Name of the new user").required(true))
                .arg(
                    Arg::new("email")
                        .long("email")
                        .value_name("ADDRESS")
                        .help("Address reset PINs are mailed to"),
                ),
        )
        .subcommand(
            Command::new("start-reset")
                .about("Issue a reset PIN for a user")
                .arg(Arg::new("username").help("Account to reset").required(true))
                .arg(
                    Arg::new("trusted")
                        .long("trusted")
                        .action(ArgAction::SetTrue)
                        .help("The request comes from a trusted network"),
                )
                .arg(
                    Arg::new("yes")
                        .long("yes")
                        .short('y')
                        .action(ArgAction::SetTrue)
                        .help("Replace a pending request without asking"),
                ),
        )
        .subcommand(
            Command::new("redeem")
                .about("Redeem a reset PIN")
                .arg(
                    Arg::new("pin")
                        .long("pin")
                        .value_name("PIN")
                        .help("PIN to redeem; prompted for when omitted"),
                ),
        )
        .subcommand(Command::new("list").about("List outstanding reset requests"))
        .subcommand(Command::new("purge").about("Remove expired reset requests"))
}

fn main() {
    let matches = build_cli().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

    let settings = match Settings::load(&config_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    };

    if let Err(e) = initialize_logging(&settings.log_level, settings.log_file.as_deref()) {
        eprintln!("Warning: logging unavailable: {}", e);
    }

    if let Err(e) = run(&matches, &settings) {
        match e.downcast_ref::<ResetError>() {
            Some(ResetError::NoMatchingRequest) => {
                eprintln!("PIN incorrect or expired.");
            }
            Some(_) => {
                error!("Reset operation failed: {}", e);
                eprintln!("The reset service failed: {}", e);
            }
            None => eprintln!("Error: {}", e),
        }
        process::exit(1);
    }
}

fn run(matches: &ArgMatches, settings: &Settings) -> Result<(), Box<dyn Error>> {
    match matches.subcommand() {
        Some(("add-user", sub)) => add_user(sub, settings),
        Some(("start-reset", sub)) => start_reset(sub, settings),
        Some(("redeem", sub)) => redeem(sub, settings),
        Some(("list", _)) => list(settings),
        Some(("purge", _)) => purge(settings),
        _ => unreachable!("subcommand_required is set"),
    }
}

fn open_store(settings: &Settings, delivery: Box<dyn PinDelivery>) -> Result<CliStore, Box<dyn Error>> {
    let storage = DirectoryStorage::open(&settings.data_dir)?;
    let users = FileUserDirectory::open(&settings.users_file)?;
    Ok(ResetTokenStore::new(storage, users, delivery)
        .with_base_name(settings.record_base_name.clone())
        .with_ttl(settings.pin_ttl()))
}

fn add_user(matches: &ArgMatches, settings: &Settings) -> Result<(), Box<dyn Error>> {
    let username = required(matches, "username")?;
    let email = matches.get_one::<String>("email").cloned();

    let password = read_password("New password: ")?;
    validate_password(&password)?;
    if read_password("Confirm password: ")? != password {
        return Err("Passwords do not match".into());
    }

    let users = FileUserDirectory::open(&settings.users_file)?;
    let user = users.add_user(username, email, &password)?;
    println!("User {} created.", user.username);
    Ok(())
}

/// Ask a yes/no question; anything but an explicit yes declines
fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{} [y/N]: ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn start_reset(matches: &ArgMatches, settings: &Settings) -> Result<(), Box<dyn Error>> {
    let username = required(matches, "username")?;
    let is_trusted = matches.get_flag("trusted");

    let users = FileUserDirectory::open(&settings.users_file)?;
    let mut user = match users.lookup_by_name(username)? {
        Some(user) => user,
        None => {
            warn!("Reset requested for unknown account");
            println!("If an account exists with this name, a reset PIN has been issued.");
            return Ok(());
        }
    };

    // Mail the PIN when possible, otherwise show it to the operator
    let delivery: Box<dyn PinDelivery> = match (&settings.smtp, &user.email) {
        (Some(smtp), Some(_)) => Box::new(EmailDelivery::new(smtp.clone())?),
        _ => Box::new(ConsoleDelivery::stdout()),
    };
    let store = open_store(settings, delivery)?;

    let already_pending = store
        .pending_requests()?
        .iter()
        .any(|request| request.user_name == user.username);
    if already_pending
        && !matches.get_flag("yes")
        && !confirm(&format!(
            "A reset request is already pending for {}. Replace it?",
            user.username
        ))?
    {
        println!("Existing request kept.");
        return Ok(());
    }

    let result = store.start_reset(&mut user, is_trusted)?;
    println!(
        "Reset started for {}. The PIN expires at {}.",
        user.username,
        utc_to_local(&result.pin_expiration_date)
    );
    Ok(())
}

fn redeem(matches: &ArgMatches, settings: &Settings) -> Result<(), Box<dyn Error>> {
    let pin = match matches.get_one::<String>("pin") {
        Some(pin) => pin.trim().to_string(),
        None => read_password("Reset PIN: ")?.trim().to_string(),
    };

    let store = open_store(settings, Box::new(ConsoleDelivery::stdout()))?;
    let result = store.redeem_pin(&pin)?;

    for user in &result.users_reset {
        println!(
            "Password for {} has been reset to the PIN. Sign in and choose a new password.",
            user
        );
    }
    Ok(())
}

fn list(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let store = open_store(settings, Box::new(ConsoleDelivery::stdout()))?;
    let pending = store.pending_requests()?;

    if pending.is_empty() {
        println!("No outstanding reset requests.");
        return Ok(());
    }

    let now = SystemClock.now();
    for request in pending.iter().sorted_by_key(|request| request.expires_at) {
        println!(
            "{:<24} expires {} ({} left)",
            request.user_name,
            utc_to_local(&request.expires_at),
            format_remaining(&now, &request.expires_at)
        );
    }
    Ok(())
}

fn purge(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let store = open_store(settings, Box::new(ConsoleDelivery::stdout()))?;
    let purged = store.purge_expired()?;
    println!("Removed {} expired reset request(s).", purged);
    Ok(())
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a String, Box<dyn Error>> {
    matches
        .get_one::<String>(name)
        .ok_or_else(|| format!("missing argument: {}", name).into())
}
