//! Command-line client for the session service.
//!
//! The token pair is kept in a small JSON file between invocations so that
//! `login`, `check`, `refresh` and `logout` can be run one after another.

use anyhow::{Context, Result, bail};
use kiz_client::{ApiClient, session_file};
use kiz_session::auth::TokenId;
use pico_args::Arguments;
use std::path::PathBuf;

const HELP: &str = "\
Talk to a KIZ-SPACE session server

USAGE:
  kiz_client [OPTIONS] <COMMAND>

COMMANDS:
  login EMAIL PASSWORD  Start a session
  check                 Show the current user (refreshes once if needed)
  refresh               Rotate the token pair
  sessions              List active sessions of the current user
  revoke TOKEN_ID       Sign out one of your sessions
  logout                End the session

OPTIONS:
  --server URL          Server URL  [default: http://localhost:8080]
  --session-file PATH   Where the token pair is kept [default: .kiz_session.json]
  --device ID           Device id sent with login

FLAGS:
  --all                 With logout: end every session of the user
  -h, --help            Print help information
";

enum Command {
    Login { email: String, password: String },
    Check,
    Refresh,
    Sessions,
    Revoke(TokenId),
    Logout,
}

struct Args {
    server_url: String,
    session_file: PathBuf,
    device_id: Option<String>,
    logout_all: bool,
    command: Command,
}

fn parse_args(mut pargs: Arguments) -> Result<Args> {
    let server_url = pargs
        .opt_value_from_str("--server")?
        .unwrap_or_else(|| "http://localhost:8080".to_string());
    let session_file = pargs
        .opt_value_from_str("--session-file")?
        .unwrap_or_else(|| PathBuf::from(".kiz_session.json"));
    let device_id = pargs.opt_value_from_str("--device")?;
    let logout_all = pargs.contains("--all");

    let command = match pargs.subcommand()?.as_deref() {
        Some("login") => Command::Login {
            email: pargs.free_from_str().context("login needs EMAIL")?,
            password: pargs.free_from_str().context("login needs PASSWORD")?,
        },
        Some("check") => Command::Check,
        Some("refresh") => Command::Refresh,
        Some("sessions") => Command::Sessions,
        Some("revoke") => Command::Revoke(pargs.free_from_str().context("revoke needs TOKEN_ID")?),
        Some("logout") => Command::Logout,
        Some(other) => bail!("Unknown command '{other}'"),
        None => bail!("No command given, see --help"),
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        bail!("Unexpected arguments: {remaining:?}");
    }

    Ok(Args {
        server_url,
        session_file,
        device_id,
        logout_all,
        command,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::builder().format_target(false).init();

    let mut pargs = Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    run(parse_args(pargs)?).await
}

async fn run(args: Args) -> Result<()> {
    let mut client = ApiClient::new(args.server_url);
    if let Some(tokens) = session_file::load(&args.session_file)? {
        client = client.with_tokens(tokens);
    }

    let result = execute(&mut client, args.command, args.device_id, args.logout_all).await;
    session_file::save(&args.session_file, client.session().tokens())?;
    result
}

async fn execute(
    client: &mut ApiClient,
    command: Command,
    device_id: Option<String>,
    logout_all: bool,
) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let user = client
                .login(&email, &password, device_id.as_deref())
                .await?;
            println!("Logged in as {} <{}>", user.nickname, user.email);
        }
        Command::Check => match client.check().await? {
            Some(user) => println!("Authenticated as {} <{}>", user.nickname, user.email),
            None => println!("Not authenticated"),
        },
        Command::Refresh => {
            client.refresh().await?;
            println!("Tokens refreshed");
        }
        Command::Sessions => {
            let sessions = client.sessions().await?;
            if sessions.is_empty() {
                println!("No active sessions");
            }
            for session in sessions {
                println!(
                    "  {}  device={}  ip={}  created={}  expires={}",
                    session.token_id,
                    session.device_id.as_deref().unwrap_or("-"),
                    session.ip_address.as_deref().unwrap_or("-"),
                    session.created_at.format("%Y-%m-%d %H:%M"),
                    session.expires_at.format("%Y-%m-%d %H:%M"),
                );
            }
        }
        Command::Revoke(token_id) => {
            client.revoke_session(token_id).await?;
            println!("Session {token_id} revoked");
        }
        Command::Logout => match client.logout(logout_all).await {
            Some(revoked) => println!("Logged out ({revoked} session(s) revoked)"),
            None => println!("Logged out"),
        },
    }

    Ok(())
}
