//! Game Night command-line client
//!
//! Shows tonight's game night and lets a signed-in player vote and RSVP.
//!
//! Usage:
//!   gamenight login
//!   gamenight status
//!   gamenight vote 3 --yes
//!
//! `--demo` runs every command against a seeded in-memory backend.

use anyhow::{Context, Result, anyhow, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use gamenight_app::{
    ActionOutcome, Actions, AppConfig, GameNight, ProfileUpdate, RuntimeOptions, demo, report,
};
use gamenight_sync::supabase::{SupabaseClient, parse_redirect_fragment};
use gamenight_sync::{AuthClient, RemoteDataClient};
use gamenight_types::{ActivityId, Platform};
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "gamenight")]
#[command(about = "Vote and RSVP for game night from the terminal")]
struct Cli {
    #[command(flatten)]
    config: AppConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show tonight's game night once everything has loaded
    Status,
    /// Keep showing game night as it changes, until Ctrl-C
    Watch,
    /// Vote for an activity, or take your vote back
    Vote {
        activity: ActivityId,
        /// RSVP first without asking if you haven't yet
        #[arg(short, long)]
        yes: bool,
    },
    /// RSVP for tonight, or take your RSVP back
    Rsvp,
    /// Mark an activity as a favorite
    Favorite {
        activity: ActivityId,
        /// Clear the mark instead
        #[arg(long)]
        off: bool,
    },
    /// Mark an activity as installed and ready to play
    Setup {
        activity: ActivityId,
        /// Clear the mark instead
        #[arg(long)]
        off: bool,
    },
    /// Update your player profile
    Profile {
        #[arg(long)]
        name: String,
        /// windows, mac or mobile; repeat for several
        #[arg(long = "platform", value_parser = parse_platform)]
        platforms: Vec<Platform>,
    },
    /// Sign in through the OAuth provider
    Login {
        /// URL the provider redirected back to
        #[arg(long)]
        callback: Option<String>,
    },
    /// Sign out
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let (data, auth) = connect(&cli.config).await?;
    let actions = Actions::new(data.clone(), auth.clone(), cli.config.sign_in());

    match &cli.command {
        Command::Login { callback } => return login(&actions, callback.as_deref()).await,
        Command::Logout => return print_outcome(actions.sign_out().await),
        _ => {}
    }

    let options = RuntimeOptions {
        rule: cli.config.active_event_rule,
        ..RuntimeOptions::default()
    };
    let app = GameNight::start(data, auth, options);
    let view = app.settled().await;

    let result = match cli.command {
        Command::Status => {
            print!("{}", report::render(&view, &Local::now()));
            Ok(())
        }
        Command::Watch => watch(&app).await,
        Command::Vote { activity, yes } => match actions.toggle_vote(&view, activity).await {
            ActionOutcome::ConfirmRsvp { activity } if yes => {
                print_outcome(actions.confirm_rsvp_and_vote(&view, activity).await)
            }
            ActionOutcome::ConfirmRsvp { .. } => {
                println!("You need to RSVP for tonight before voting.");
                println!("Run again with --yes to RSVP and vote in one go.");
                Ok(())
            }
            outcome => print_outcome(outcome),
        },
        Command::Rsvp => print_outcome(actions.toggle_rsvp(&view).await),
        Command::Favorite { activity, off } => {
            print_outcome(actions.set_favorite(&view, activity, !off).await)
        }
        Command::Setup { activity, off } => {
            print_outcome(actions.set_setup(&view, activity, !off).await)
        }
        Command::Profile { name, platforms } => {
            let update = ProfileUpdate { name, platforms };
            print_outcome(actions.update_profile(&view, update).await)
        }
        Command::Login { .. } | Command::Logout => Ok(()),
    };
    app.shutdown().await;
    result
}

async fn connect(
    config: &AppConfig,
) -> Result<(Arc<dyn RemoteDataClient>, Arc<dyn AuthClient>)> {
    if config.demo {
        info!("using the demo backend");
        let client = Arc::new(demo::seeded_client(&Local::now()));
        let data: Arc<dyn RemoteDataClient> = client.clone();
        let auth: Arc<dyn AuthClient> = client;
        return Ok((data, auth));
    }

    config.validate()?;
    let client =
        Arc::new(SupabaseClient::new(config.backend()).context("creating backend client")?);
    if let Some(access_token) = &config.access_token {
        let user = client
            .auth()
            .restore_session(access_token, config.refresh_token.as_deref())
            .await
            .context("restoring session; run `gamenight login` again")?;
        info!(user = %user.id, "session restored");
        if let Some(tokens) = client.auth().tokens().await {
            if &tokens.access_token != access_token {
                println!("Session refreshed. Keep it with:\n");
                print_exports(&tokens.access_token, tokens.refresh_token.as_deref());
            }
        }
    }
    let data: Arc<dyn RemoteDataClient> = client.clone();
    let auth: Arc<dyn AuthClient> = client;
    Ok((data, auth))
}

async fn login(actions: &Actions, callback: Option<&str>) -> Result<()> {
    let Some(callback) = callback else {
        let url = actions.sign_in().await.map_err(|n| anyhow!(n.message))?;
        println!("Open this URL to sign in:\n\n  {url}\n");
        println!("Then run: gamenight login --callback '<the URL you were sent back to>'");
        return Ok(());
    };

    let (access_token, refresh_token) =
        parse_redirect_fragment(callback).context("callback URL carries no access token")?;
    let identity = actions
        .complete_sign_in(&access_token, refresh_token.as_deref())
        .await
        .map_err(|n| anyhow!(n.message))?;
    let name = identity
        .full_name
        .as_deref()
        .or(identity.email.as_deref())
        .unwrap_or("unknown user");
    println!("Signed in as {name}. Keep the session with:\n");
    print_exports(&access_token, refresh_token.as_deref());
    Ok(())
}

fn print_exports(access_token: &str, refresh_token: Option<&str>) {
    println!("  export GAMENIGHT_ACCESS_TOKEN={access_token}");
    if let Some(refresh_token) = refresh_token {
        println!("  export GAMENIGHT_REFRESH_TOKEN={refresh_token}");
    }
}

async fn watch(app: &GameNight) -> Result<()> {
    let mut rx = app.subscribe();
    loop {
        let view = rx.borrow_and_update().clone();
        if view.is_settled() {
            println!("{}", report::render(&view, &Local::now()));
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn print_outcome(outcome: ActionOutcome) -> Result<()> {
    match outcome {
        ActionOutcome::Completed(notification) => {
            println!("{}", notification.message);
            Ok(())
        }
        ActionOutcome::Failed(notification) | ActionOutcome::Blocked(notification) => {
            bail!("{}", notification.message)
        }
        ActionOutcome::ConfirmRsvp { .. } => bail!("an RSVP is needed first"),
        ActionOutcome::Unavailable => {
            bail!("nothing to act on: you need a player profile and a game night tonight")
        }
    }
}

fn parse_platform(raw: &str) -> Result<Platform, String> {
    Platform::ALL
        .into_iter()
        .find(|p| format!("{p:?}").eq_ignore_ascii_case(raw))
        .ok_or_else(|| format!("unknown platform `{raw}`; expected windows, mac or mobile"))
}
