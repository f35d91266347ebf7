//! Command handlers shared by one-shot invocations and the shell.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use backoffice_core::auth::{CredentialStore, MemoryStorage};
use backoffice_core::models::{ChangePasswordRequest, LoginRequest, ProfileUpdate, RegisterRequest};
use backoffice_core::{ApiClient, ApiError, Config, Navigator, Session, LOGIN_PATH};
use chrono::Local;
use clap::Parser;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cli::{split_line, Command, ShellLine};

/// Tells the user to log in again when the client ends the session.
struct PromptNavigator;

impl Navigator for PromptNavigator {
    fn navigate(&self, path: &str) {
        if path == LOGIN_PATH {
            eprintln!("Session expired. Please log in again with `backoffice login`.");
        } else {
            debug!(path, "Ignoring navigation request");
        }
    }
}

pub struct App {
    config: Config,
    session: Session,
    interactive: bool,
}

impl App {
    pub fn new(config: Config, base_url: String) -> Result<Self> {
        let durable = config
            .durable_storage()
            .context("Failed to open durable credential storage")?;
        // Lives as long as this process: the whole shell, or a single command
        let ephemeral = Arc::new(MemoryStorage::new());
        let store = Arc::new(CredentialStore::new(durable, ephemeral));

        let api = ApiClient::new(
            base_url,
            store,
            Arc::new(PromptNavigator),
            config.request_timeout(),
        )?;

        let mut session = Session::new(api);
        session.restore();

        Ok(Self {
            config,
            session,
            interactive: false,
        })
    }

    pub async fn run(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Login { email, remember } => self.login(email, remember).await,
            Command::Logout => {
                self.session.logout()?;
                println!("Logged out");
                Ok(())
            }
            Command::Whoami => {
                self.whoami();
                Ok(())
            }
            Command::Profile => {
                let user = self.session.refresh_profile().await?;
                print_json(user)
            }
            Command::UpdateProfile { fields } => {
                let update = parse_profile_fields(&fields)?;
                let user = self.session.update_profile(&update).await?;
                print_json(user)
            }
            Command::ChangePassword => self.change_password().await,
            Command::Register { file } => {
                let contents = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let registration: RegisterRequest = serde_json::from_str(&contents)
                    .context("Registration file is not a valid registration record")?;
                let response = self.session.register(&registration).await?;
                print_json(&response)
            }
            Command::ForgotPassword { email } => {
                self.session.reset_password(&email).await?;
                println!("If {} belongs to an account, a reset email is on its way.", email);
                Ok(())
            }
            Command::Get { endpoint } => {
                let response: serde_json::Value = self.session.api().get(&endpoint).await?;
                print_json(&response)
            }
            Command::Delete { endpoint } => {
                let response: serde_json::Value = self.session.api().delete(&endpoint).await?;
                print_json(&response)
            }
            Command::Post { endpoint, body } => {
                let body = parse_body(&body)?;
                let response: serde_json::Value = self.session.api().post(&endpoint, &body).await?;
                print_json(&response)
            }
            Command::Put { endpoint, body } => {
                let body = parse_body(&body)?;
                let response: serde_json::Value = self.session.api().put(&endpoint, &body).await?;
                print_json(&response)
            }
            Command::Shell => {
                if self.interactive {
                    bail!("Already in the shell");
                }
                self.shell().await
            }
        }
    }

    async fn login(&mut self, email: Option<String>, remember_me: bool) -> Result<()> {
        let email = match email.or_else(|| self.config.last_email.clone()) {
            Some(email) => email,
            None => prompt("Email: ")?,
        };
        let password = rpassword::prompt_password(format!("Password for {}: ", email))?;

        let request = LoginRequest {
            email: email.clone(),
            password,
            remember_me,
        };
        let data = self.session.login(&request).await?;

        println!(
            "Logged in as {} (roles: {})",
            data.user.display_name(),
            data.user.roles_display()
        );
        if let Some(expiry) = data.token_expiration {
            println!(
                "Token expires {}",
                expiry.with_timezone(&Local).format("%Y-%m-%d %H:%M")
            );
        }
        if !remember_me && !self.interactive {
            println!("Session not remembered; it ends when this command exits. Use --remember or `backoffice shell`.");
        }

        self.config.last_email = Some(email);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        Ok(())
    }

    fn whoami(&self) {
        if !self.session.is_authenticated() {
            println!("Not logged in");
            return;
        }
        if let Some(data) = &self.session.data {
            println!("{} <{}>", data.user.display_name(), data.user.email);
            println!("Roles: {}", data.user.roles_display());
            println!(
                "Session: {}",
                if data.remember_me { "remembered" } else { "this process only" }
            );
            if let Some(minutes) = data.minutes_until_expiry() {
                println!("Token expires in {} minutes", minutes);
            }
        }
    }

    async fn change_password(&mut self) -> Result<()> {
        let request = ChangePasswordRequest {
            current_password: rpassword::prompt_password("Current password: ")?,
            new_password: rpassword::prompt_password("New password: ")?,
            confirm_password: rpassword::prompt_password("Confirm new password: ")?,
        };
        if request.new_password != request.confirm_password {
            bail!("New passwords do not match");
        }
        self.session.change_password(&request).await?;
        println!("Password changed");
        Ok(())
    }

    async fn shell(&mut self) -> Result<()> {
        self.interactive = true;
        println!("backoffice shell. Type `help` for commands, `exit` to quit.");

        let stdin = io::stdin();
        loop {
            print!("backoffice> ");
            io::stdout().flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                break;
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if matches!(line, "exit" | "quit") {
                break;
            }

            let args = match split_line(line) {
                Ok(args) => args,
                Err(e) => {
                    eprintln!("{}", e);
                    continue;
                }
            };
            let parsed = match ShellLine::try_parse_from(args) {
                Ok(parsed) => parsed,
                Err(e) => {
                    // Includes `help` output
                    let _ = e.print();
                    continue;
                }
            };

            if let Err(e) = Box::pin(self.run(parsed.command)).await {
                report(&e);
            }
        }

        self.interactive = false;
        Ok(())
    }
}

pub fn report(e: &anyhow::Error) {
    match e.downcast_ref::<ApiError>() {
        // Already announced by the navigator
        Some(ApiError::AuthenticationFailed) => {}
        _ => eprintln!("Error: {:#}", e),
    }
}

/// Report a failed command and map it to the process exit status.
pub fn exit_code(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("No value entered");
    }
    Ok(value)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_body(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).context("Request body is not valid JSON")
}

fn parse_profile_fields(fields: &[String]) -> Result<ProfileUpdate> {
    let mut update = ProfileUpdate::default();
    for field in fields {
        let Some((name, value)) = field.split_once('=') else {
            bail!("Expected FIELD=VALUE, got `{}`", field);
        };
        if !update.set_field(name.trim(), value.to_string()) {
            bail!("Unknown profile field `{}`", name.trim());
        }
    }
    Ok(update)
}
