use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "backoffice")]
#[command(about = "Command-line client for the backoffice business-management API")]
#[command(version)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// API base URL (overrides config and BACKOFFICE_API_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// A line typed into `backoffice shell`.
#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_version_flag = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Log in with email and password
    Login {
        #[arg(short, long)]
        email: Option<String>,

        /// Keep the session after this process exits
        #[arg(short, long)]
        remember: bool,
    },

    /// End the session and clear stored credentials
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Fetch the current user's profile
    Profile,

    /// Update profile fields, e.g. `update-profile phoneNumber=555-0100 ciudad=Lima`
    UpdateProfile {
        #[arg(value_name = "FIELD=VALUE", required = true)]
        fields: Vec<String>,
    },

    /// Change the password of the logged-in user
    ChangePassword,

    /// Register a new account from a JSON file
    Register {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
    },

    /// Request a password reset email
    ForgotPassword { email: String },

    /// GET an endpoint, e.g. `get /Customers`
    Get { endpoint: String },

    /// POST a JSON body to an endpoint
    Post { endpoint: String, body: String },

    /// PUT a JSON body to an endpoint
    Put { endpoint: String, body: String },

    /// DELETE an endpoint
    Delete { endpoint: String },

    /// Interactive shell; a session that is not remembered lasts until exit
    Shell,
}

/// Split a shell line into arguments, honoring single and double quotes.
pub fn split_line(line: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(format!("Unterminated {} quote", q));
    }
    if in_token {
        args.push(current);
    }
    Ok(args)
}
