//! Command handlers for the Chime CLI

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use chime_core::{
    credentials::{self, ACCOUNT_EMAIL},
    generate_device_token, provision_account, ClientBuilder, CredentialStore, Credentials,
    EntityKind, FileCredentialStore, RosterRow, ScriptedTransport, SessionState, SessionUpdate,
    TransportScript,
};

use crate::cli::{Cli, Commands};
use crate::config::CliAppConfig;
use crate::error::{CliError, Result};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: CliAppConfig) -> Result<()> {
        let credentials_path = config.credentials_path(cli.data_dir.as_deref())?;
        debug!(path = %credentials_path.display(), "Using credentials file");

        match cli.command {
            Commands::Login { email } => Self::handle_login_command(&credentials_path, &email),
            Commands::Logout => Self::handle_logout_command(&credentials_path),
            Commands::Status { json } => Self::handle_status_command(&credentials_path, json),
            Commands::Replay {
                script,
                username,
                password,
            } => {
                let login = match (username, password) {
                    (Some(username), Some(password)) => Some((username, password)),
                    (None, None) => None,
                    _ => {
                        return Err(CliError::Replay(
                            "--username and --password must be given together".to_string(),
                        ))
                    }
                };
                Self::handle_replay_command(&config, &credentials_path, &script, login).await
            }
        }
    }

    /// Handle the login command
    fn handle_login_command(path: &Path, email: &str) -> Result<()> {
        let mut store = FileCredentialStore::open(path)?;
        let credentials = provision_account(&mut store, email, generate_device_token)?;

        println!(
            "Logged in as {} (device {})",
            credentials.account_id.as_deref().unwrap_or(email),
            redact(credentials.device_token.as_deref())
        );
        Ok(())
    }

    /// Handle the logout command
    fn handle_logout_command(path: &Path) -> Result<()> {
        let mut store = FileCredentialStore::open(path)?;
        let account = store.get(ACCOUNT_EMAIL)?;
        credentials::sign_out(&mut store)?;

        match account {
            Some(account) => println!("Signed out {}", account),
            None => println!("No account was signed in"),
        }
        Ok(())
    }

    /// Handle the status command
    fn handle_status_command(path: &Path, json: bool) -> Result<()> {
        let store = FileCredentialStore::open(path)?;
        let report = StatusReport::new(path, &Credentials::load(&store)?);

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("Credentials file: {}", report.credentials_file.display());
            println!(
                "Account:          {}",
                report.account.as_deref().unwrap_or("(none)")
            );
            println!("Device token:     {}", report.device_token);
            println!("Session token:    {}", report.session_token);
        }
        Ok(())
    }

    /// Handle the replay command
    async fn handle_replay_command(
        config: &CliAppConfig,
        credentials_path: &Path,
        script_path: &Path,
        login: Option<(String, String)>,
    ) -> Result<()> {
        let script = TransportScript::load(script_path)?;
        let store = FileCredentialStore::open(credentials_path)?;
        info!(script = %script_path.display(), "Replaying transport script");

        let mut client = ClientBuilder::new()
            .with_config(config.core.clone())
            .with_store(store)
            .with_transport(ScriptedTransport::new(script))
            .build_and_start()
            .await?;
        let roster = client.roster();
        let mut updates = client.subscribe();

        client.connect()?;

        let timeout = Duration::from_secs(config.cli.replay_timeout_secs);
        let deadline = tokio::time::Instant::now() + timeout;
        let outcome = loop {
            let update = match tokio::time::timeout_at(deadline, updates.recv()).await {
                Ok(Ok(update)) => update,
                Ok(Err(RecvError::Lagged(skipped))) => {
                    warn!(skipped, "Missed session updates");
                    continue;
                }
                Ok(Err(RecvError::Closed)) => break client.snapshot().state,
                Err(_) => {
                    client.cancel()?;
                    client.shutdown().await?;
                    return Err(CliError::Replay(format!(
                        "session did not settle within {}s",
                        timeout.as_secs()
                    )));
                }
            };

            match update {
                SessionUpdate::Transition { record, state } => {
                    println!("{}", record);
                    match state {
                        SessionState::AwaitingCredentials => match &login {
                            Some((username, password)) => {
                                client.submit_credentials(username, password)?;
                            }
                            None => {
                                client.cancel()?;
                                client.shutdown().await?;
                                return Err(CliError::Replay(
                                    "credentials requested; pass --username and --password"
                                        .to_string(),
                                ));
                            }
                        },
                        SessionState::Connected { .. }
                        | SessionState::Disconnected { .. }
                        | SessionState::Failed { .. }
                        | SessionState::Idle => break state,
                        _ => {}
                    }
                }
                SessionUpdate::RetryScheduled { attempt, delay } => {
                    println!("retry {} scheduled in {:?}", attempt, delay);
                }
                SessionUpdate::Progress { percent, message } => {
                    println!("progress {}%: {}", percent, message);
                }
            }
        };

        let stats = client.shutdown().await?;
        debug!(?stats, "Replay finished");

        println!();
        println!("Final state: {}", outcome);
        print_roster(&roster.rows());

        match outcome {
            SessionState::Failed { error } => Err(CliError::SessionFailed(error.to_string())),
            _ => Ok(()),
        }
    }
}

// ----------------------------------------------------------------------------
// Output Helpers
// ----------------------------------------------------------------------------

/// Stored credential state with secrets reduced to a short prefix
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub credentials_file: PathBuf,
    pub account: Option<String>,
    pub device_token: String,
    pub session_token: String,
}

impl StatusReport {
    pub fn new(path: &Path, credentials: &Credentials) -> Self {
        Self {
            credentials_file: path.to_path_buf(),
            account: credentials.account_id.clone(),
            device_token: redact(credentials.device_token.as_deref()),
            session_token: redact(credentials.session_token.as_deref()),
        }
    }
}

fn redact(secret: Option<&str>) -> String {
    match secret {
        Some(secret) => {
            let prefix: String = secret.chars().take(8).collect();
            format!("{}…", prefix)
        }
        None => "(none)".to_string(),
    }
}

fn group_title(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Room => "Rooms",
        EntityKind::Conversation => "Conversations",
    }
}

fn print_roster(rows: &[RosterRow]) {
    if rows.is_empty() {
        println!("Roster: (empty)");
        return;
    }

    for row in rows {
        match row {
            RosterRow::Header(kind) => println!("{}", group_title(*kind)),
            RosterRow::Entry(entry) => match &entry.entity.topic {
                Some(topic) => println!("  {}  ({})", entry.entity.display_name, topic),
                None => println!("  {}", entry.entity.display_name),
            },
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
