//! `flightgroup` - CLI for the group flight client
//!
//! Connects to a relay, keeps the local replica in sync and offers a line
//! based chat. Also inspects the stored identity, chat history and
//! configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::BufRead;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;

use flightgroup::cli::{
    parse_line, Cli, Command, ConfigCommand, ConnectCommand, HistoryCommand, IdentityCommand,
    Input, HELP,
};
use flightgroup::protocol::GroupId;
use flightgroup::transport::TcpTransport;
use flightgroup::{
    init_logging, restore_client, ClientEvent, Config, PlanChange, Runtime, RuntimeHandle, Storage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    match cli.command {
        Command::Connect(connect_cmd) => handle_connect(config, connect_cmd).await,
        Command::Identity(identity_cmd) => handle_identity(&config, identity_cmd),
        Command::History(history_cmd) => handle_history(&config, &history_cmd),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

async fn handle_connect(mut config: Config, cmd: ConnectCommand) -> anyhow::Result<()> {
    if let Some(server) = cmd.server {
        config.server.address = server;
    }
    if let Some(secs) = cmd.status_poll {
        config.roster.status_poll_secs = secs;
    }

    let storage = Storage::open(config.database_path()).context("opening local store")?;
    let fallback_name = cmd
        .name
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "pilot".to_string());
    let mut client = restore_client(&storage, &config, &fallback_name)?;
    if let Some(invite) = cmd.invite {
        client.set_invite(invite);
    }

    println!("Connecting to {} as {}...", config.server.address, client.identity().name);
    let transport = TcpTransport::connect(&config.server.address).await?;

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let runtime = Runtime::new(client, transport)
        .with_storage(storage)
        .with_events(events_tx)
        .with_status_poll(config.status_poll_interval());
    let handle = runtime.handle();
    let task = tokio::spawn(runtime.run());

    let input = handle.clone();
    std::thread::spawn(move || read_input(&input));
    let ctrl_c = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.stop();
        }
    });

    while let Some(event) = events.recv().await {
        if let Some(line) = describe(&event) {
            println!("{line}");
        }
    }

    let client = task.await.context("client task failed")?;
    println!(
        "Disconnected. Group: {}, pilots known: {}",
        client.membership().group(),
        client.roster().len()
    );
    Ok(())
}

/// Feed stdin lines to the runtime until EOF or `/quit`. Blocking, so it
/// gets a plain thread rather than a runtime task.
fn read_input(handle: &RuntimeHandle) {
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };
        match parse_line(&line) {
            Some(Input::Command(command)) => {
                if handle.send(command).is_err() {
                    return;
                }
            }
            Some(Input::Quit) => break,
            Some(Input::Help) => println!("{HELP}"),
            None if line.trim().is_empty() => {}
            None => println!("Unknown command, try /help"),
        }
    }
    handle.stop();
}

fn describe(event: &ClientEvent) -> Option<String> {
    let line = match event {
        ClientEvent::SessionStateChanged(state) => format!("* session {state}"),
        ClientEvent::GroupChanged(group) if group.is_null() => "* flying solo".to_string(),
        ClientEvent::GroupChanged(group) => format!("* joined group {group}"),
        ClientEvent::VersionMismatch(check) => format!("! protocol version mismatch: {check:?}"),
        ClientEvent::RequestFailed { request, status } => {
            format!("! {request} failed: {status}")
        }
        ClientEvent::RequestTimedOut(request) => format!("! {request} timed out"),
        ClientEvent::RosterChanged => "* roster updated".to_string(),
        ClientEvent::PilotMovedGroup { pilot, group } => {
            format!("* {pilot} moved to group {group}")
        }
        ClientEvent::FlightPlanChanged(PlanChange::RolledBack(divergence)) => {
            format!("! flight plan edit undone ({divergence:?}), resyncing")
        }
        ClientEvent::FlightPlanChanged(_) => "* flight plan updated".to_string(),
        ClientEvent::ChatMessage(message) => format!("<{}> {}", message.pilot_id, message.text),
        ClientEvent::IdentityChanged(_) | ClientEvent::TelemetryUpdated(_) => return None,
    };
    Some(line)
}

fn handle_identity(config: &Config, cmd: IdentityCommand) -> anyhow::Result<()> {
    let storage = Storage::open(config.database_path()).context("opening local store")?;
    let saved = storage.load()?;

    match cmd {
        IdentityCommand::Show { json } => {
            let Some(saved) = saved else {
                println!("No identity stored yet. Run `flightgroup connect` to register.");
                return Ok(());
            };
            if json {
                let identity = serde_json::json!({
                    "pilot_id": saved.identity.public_id,
                    "name": saved.identity.name,
                    "avatar": saved.identity.avatar,
                    "registered": saved.identity.is_registered(),
                    "group_id": saved.group,
                });
                println!("{}", serde_json::to_string_pretty(&identity)?);
            } else {
                println!("Pilot id:    {}", saved.identity.public_id);
                println!("Name:        {}", saved.identity.name);
                println!(
                    "Avatar:      {}",
                    saved.identity.avatar.as_deref().unwrap_or("-")
                );
                println!("Registered:  {}", saved.identity.is_registered());
                println!("Group:       {}", saved.group);
            }
        }
        IdentityCommand::Invite { base } => match saved {
            Some(saved) if saved.identity.is_registered() => {
                println!("{}", saved.identity.invite_link(&base));
            }
            _ => println!("Not registered yet. Run `flightgroup connect` first."),
        },
        IdentityCommand::Reset { yes } => {
            if yes {
                if storage.clear_identity()? {
                    println!("Identity removed. The next connection registers a new pilot.");
                } else {
                    println!("No identity stored.");
                }
            } else {
                println!("This forgets your pilot credentials and group.");
                println!("Use --yes to confirm.");
            }
        }
    }
    Ok(())
}

fn handle_history(config: &Config, cmd: &HistoryCommand) -> anyhow::Result<()> {
    let storage = Storage::open(config.database_path()).context("opening local store")?;
    let group = match &cmd.group {
        Some(group) => GroupId::new(group.as_str()),
        None => storage.load()?.map(|saved| saved.group).unwrap_or_default(),
    };
    if group.is_null() {
        println!("Not in a group. Use --group to pick one.");
        return Ok(());
    }

    let Some(latest) = storage.latest_timestamp(&group)? else {
        println!("No messages stored for group {group}.");
        return Ok(());
    };
    println!(
        "Group {group}, last message {} ({} stored in total)",
        format_millis(latest),
        storage.message_count()?
    );

    for message in storage.messages_for_group(&group, cmd.limit)? {
        println!(
            "{} <{}> {}",
            format_millis(message.timestamp),
            message.pilot_id,
            message.text
        );
    }
    Ok(())
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Address:            {}", config.server.address);
                println!("  Request timeout:    {:?}", config.request_timeout());
                println!();
                println!("[Pilot]");
                println!("  Name:               {}", config.pilot.name);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Chat]");
                println!(
                    "  Replay window (min): {}",
                    config.chat.replay_window_minutes
                );
                println!("  History limit:      {}", config.chat.history_limit);
                println!("  Retention (days):   {}", config.chat.retention_days);
                println!();
                println!("[Roster]");
                println!(
                    "  Status poll:        {:?}",
                    config
                        .status_poll_interval()
                        .unwrap_or(Duration::ZERO)
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
