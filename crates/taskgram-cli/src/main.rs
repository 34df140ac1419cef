//! The `taskgram` binary: webhook server, event subscription, and the
//! administrative interface for the identity mapping store.

use anyhow::Result;
use clap::{Parser, Subcommand};
use reqwest::Client;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use taskgram_bridge::{
    run_webhook_server, subscribe_task_events, BridgeConfig, IdentityStore,
    OUTBOUND_CALL_TIMEOUT,
};

#[derive(Debug, Parser)]
#[command(
    name = "taskgram",
    about = "Bitrix24 task-webhook to Telegram notification bridge",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the webhook server.
    Serve,
    /// Register the handler URL for OnTaskAdd/OnTaskUpdate events.
    Subscribe,
    /// Administer the leader set and Telegram chat mappings.
    Mappings {
        #[command(subcommand)]
        action: MappingsAction,
    },
}

#[derive(Debug, Subcommand)]
enum MappingsAction {
    /// Print the whole mapping document.
    List,
    /// Print all leader user ids.
    Leaders,
    /// Add a user to the leader set.
    AddLeader { user_id: String },
    /// Remove a user from the leader set.
    RemoveLeader { user_id: String },
    /// Check whether a user is a leader.
    CheckLeader { user_id: String },
    /// Map a user to a Telegram chat id.
    AddChat { user_id: String, chat_id: String },
    /// Remove a user's Telegram chat mapping.
    RemoveChat { user_id: String },
    /// Print the Telegram chat id mapped to a user.
    GetChat { user_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = BridgeConfig::from_env()?;
    init_tracing(config.debug);

    match cli.command {
        Command::Serve => {
            config.validate_for_serve()?;
            run_webhook_server(config).await
        }
        Command::Subscribe => run_subscribe(&config).await,
        Command::Mappings { action } => run_mappings(&config, action),
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

async fn run_subscribe(config: &BridgeConfig) -> Result<()> {
    let client = Client::builder().timeout(OUTBOUND_CALL_TIMEOUT).build()?;
    let reports = subscribe_task_events(&client, config).await?;
    for report in &reports {
        if report.ok {
            println!("{}: subscribed, handler {}", report.event, config.webhook_url);
        } else {
            println!("{}: failed ({})", report.event, report.detail);
        }
    }
    if reports.iter().any(|report| !report.ok) {
        anyhow::bail!("one or more event subscriptions failed");
    }
    Ok(())
}

fn run_mappings(config: &BridgeConfig, action: MappingsAction) -> Result<()> {
    let store = IdentityStore::new(config.mappings_path.clone());
    match action {
        MappingsAction::List => {
            let snapshot = store.snapshot();
            println!("leaders: {:?}", snapshot.leaders);
            println!("telegram chats:");
            for (user_id, chat_id) in &snapshot.telegram_chats {
                println!("  {user_id} -> {chat_id}");
            }
        }
        MappingsAction::Leaders => {
            for leader in store.leaders() {
                println!("{leader}");
            }
        }
        MappingsAction::AddLeader { user_id } => {
            store.add_leader(&user_id)?;
            println!("added {user_id} to leaders");
        }
        MappingsAction::RemoveLeader { user_id } => {
            store.remove_leader(&user_id)?;
            println!("removed {user_id} from leaders");
        }
        MappingsAction::CheckLeader { user_id } => {
            if store.is_leader(&user_id) {
                println!("{user_id} is a leader");
            } else {
                println!("{user_id} is not a leader");
            }
        }
        MappingsAction::AddChat { user_id, chat_id } => {
            store.set_chat_mapping(&user_id, &chat_id)?;
            println!("mapped {user_id} -> chat {chat_id}");
        }
        MappingsAction::RemoveChat { user_id } => {
            store.remove_chat_mapping(&user_id)?;
            println!("removed chat mapping for {user_id}");
        }
        MappingsAction::GetChat { user_id } => match store.chat_id_for(&user_id) {
            Some(chat_id) => println!("{chat_id}"),
            None => println!("no chat mapping for {user_id}"),
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn unit_cli_arguments_are_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn unit_mappings_subcommands_parse() {
        let cli = Cli::parse_from(["taskgram", "mappings", "add-leader", "100"]);
        assert!(matches!(
            cli.command,
            Command::Mappings {
                action: MappingsAction::AddLeader { .. }
            }
        ));
        let cli = Cli::parse_from(["taskgram", "mappings", "add-chat", "200", "555"]);
        assert!(matches!(
            cli.command,
            Command::Mappings {
                action: MappingsAction::AddChat { .. }
            }
        ));
    }
}
