//! # hubchat
//!
//! Console front-end for the hubchat client.
//!
//! Inside `chat`, lines starting with `/` are commands (`/users`,
//! `/open <id>`, `/status`, `/logout`, `/quit`); anything else is sent to
//! the open conversation.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use hubchat_client::error::ApiError;
use hubchat_client::routes::{Navigator, Route};
use hubchat_client::views::{render, ChatPage, ChatView, PageEvent};
use hubchat_client::{init_tracing, ChatApp, ClientConfig};
use hubchat_shared::UserId;

#[derive(Parser)]
#[command(name = "hubchat")]
#[command(about = "One-to-one chat over the hubchat backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Sign in and store the session
    Login {
        username: String,
        password: String,
    },

    /// Create an account and sign in
    Register {
        username: String,
        password: String,
    },

    /// Forget the stored session
    Logout,

    /// Open the interactive chat
    Chat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // -----------------------------------------------------------------------
    // 1. Tracing and configuration
    // -----------------------------------------------------------------------
    init_tracing();

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    let app = ChatApp::new(config).context("Failed to initialise client")?;

    // -----------------------------------------------------------------------
    // 2. Dispatch the subcommand
    // -----------------------------------------------------------------------
    match cli.command {
        Command::Login { username, password } => {
            let session = app.auth().login(&username, &password).await?;
            println!("Signed in as {} (id {})", session.username, session.user_id);
        }
        Command::Register { username, password } => {
            let session = app.auth().register(&username, &password).await?;
            println!("Registered and signed in as {} (id {})", session.username, session.user_id);
        }
        Command::Logout => {
            app.auth().logout()?;
            println!("Signed out");
        }
        Command::Chat => run_chat(&app).await?,
    }

    Ok(())
}

async fn run_chat(app: &ChatApp) -> anyhow::Result<()> {
    let page = match ChatPage::mount(app).await {
        Ok(page) => page,
        Err(e) => bail!("{e}. Sign in with `hubchat login <username> <password>`."),
    };

    let _printer = page.on_change(print_event);

    let view = page.snapshot();
    println!("{}", render::status_line(view.connection_state()));
    print_lines(&render::user_list(&view));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, argument) = match line.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "/quit" => break,
            "/users" => match page.refresh_users().await {
                Ok(()) => print_lines(&render::user_list(&page.snapshot())),
                Err(ApiError::Unauthorized) => {
                    println!("Session expired; sign in again.");
                    break;
                }
                Err(e) => println!("Could not load users: {e}"),
            },
            "/open" => match argument.parse::<UserId>() {
                Ok(id) => {
                    if page.select_user(id).await {
                        let view = page.snapshot();
                        if let Some(user) = view.selected_user() {
                            println!("-- conversation with {} --", user.username);
                        }
                    } else {
                        println!("No user with id {id}; try /users");
                    }
                }
                Err(_) => println!("usage: /open <id>"),
            },
            "/status" => {
                let hub = app.hub();
                println!("{}", render::status_line(hub.connection_state()));
                let queued = hub.queue_len();
                if queued > 0 {
                    println!("{queued} message(s) waiting for the connection");
                }
            }
            "/logout" => {
                page.unmount().await;
                app.auth().logout()?;
                app.router().navigate(Route::Login);
                println!("Signed out");
                return Ok(());
            }
            _ if command.starts_with('/') => println!("Unknown command {command}"),
            _ => {
                if !page.send(line).await {
                    println!("Open a conversation first with /open <id>");
                }
            }
        }
    }

    page.unmount().await;
    Ok(())
}

fn print_event(event: &PageEvent, view: &ChatView) {
    match event {
        PageEvent::ThreadMessage(message) => println!("{}", render::message_line(view, message)),
        PageEvent::OtherMessage(message) => {
            let from = view
                .user(message.sender_id)
                .map(|u| u.username.clone())
                .unwrap_or_else(|| format!("user {}", message.sender_id));
            println!("  (new message from {from})");
        }
        PageEvent::History => print_lines(&render::thread_lines(view)),
        PageEvent::UserJoined(user) => println!("  {} joined (id {})", user.username, user.id),
        PageEvent::Connection(state) => println!("{}", render::status_line(*state)),
    }
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}
