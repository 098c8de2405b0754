use pico_args::Arguments;
use std::ffi::OsString;
use std::fmt;

/// Errors that can occur during command-line parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No subcommand given.
    MissingCommand,
    /// Subcommand not recognised.
    UnrecognizedCommand(String),
    /// `unlock` without a username.
    MissingUsername,
    /// `--days` is not a number of days in range.
    InvalidDays(String),
    /// Leftover arguments after parsing.
    UnexpectedArguments(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCommand => write!(f, "No command given. Use --help to see commands"),
            Self::UnrecognizedCommand(cmd) => write!(
                f,
                "Unrecognized command '{}'. Use --help to see commands",
                cmd
            ),
            Self::MissingUsername => {
                write!(f, "unlock requires a username (e.g., 'unlock alice')")
            }
            Self::InvalidDays(value) => write!(
                f,
                "Invalid --days value '{}'. Must be between 0 and {} days",
                value, MAX_RETENTION_DAYS
            ),
            Self::UnexpectedArguments(args) => write!(f, "Unexpected arguments: {}", args),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parsed management command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Unlock an account, optionally resetting its durable failure counter.
    Unlock {
        username: String,
        clear_attempts: bool,
    },
    /// Print the security status report.
    Status { locked_only: bool, detailed: bool },
    /// Delete expired tokens, and revoked ones older than `days` if given.
    CleanupTokens { dry_run: bool, days: Option<i64> },
}

/// Parse the arguments that follow the program name.
///
/// # Examples
///
/// ```
/// use lab_admin::commands::{parse_args, Command};
///
/// let cmd = parse_args(vec!["unlock".into(), "alice".into()]).unwrap();
/// assert_eq!(cmd, Command::Unlock { username: "alice".into(), clear_attempts: false });
///
/// let cmd = parse_args(vec!["cleanup-tokens".into(), "--days".into(), "30".into()]).unwrap();
/// assert_eq!(cmd, Command::CleanupTokens { dry_run: false, days: Some(30) });
/// ```
pub fn parse_args(args: Vec<OsString>) -> Result<Command, ParseError> {
    let mut pargs = Arguments::from_vec(args);

    let subcommand = pargs
        .subcommand()
        .map_err(|e| ParseError::UnrecognizedCommand(e.to_string()))?
        .ok_or(ParseError::MissingCommand)?;

    let command = match subcommand.as_str() {
        "unlock" => {
            let clear_attempts = pargs.contains("--clear-attempts");
            let username = pargs
                .opt_free_from_str::<String>()
                .ok()
                .flatten()
                .filter(|name| !name.starts_with('-'))
                .ok_or(ParseError::MissingUsername)?;
            Command::Unlock {
                username,
                clear_attempts,
            }
        }
        "status" => Command::Status {
            locked_only: pargs.contains("--locked-only"),
            detailed: pargs.contains("--detailed"),
        },
        "cleanup-tokens" => {
            let dry_run = pargs.contains("--dry-run");
            let days = pargs
                .opt_value_from_fn("--days", parse_days)
                .map_err(|e| match e {
                    pico_args::Error::Utf8ArgumentParsingFailed { value, .. } => {
                        ParseError::InvalidDays(value)
                    }
                    other => ParseError::InvalidDays(other.to_string()),
                })?;
            Command::CleanupTokens { dry_run, days }
        }
        other => return Err(ParseError::UnrecognizedCommand(other.to_string())),
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        let joined: Vec<String> = remaining
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        return Err(ParseError::UnexpectedArguments(joined.join(" ")));
    }

    Ok(command)
}

/// Longest retention age `--days` accepts, about a century
pub const MAX_RETENTION_DAYS: i64 = 36_500;

fn parse_days(value: &str) -> Result<i64, &'static str> {
    match value.parse::<i64>() {
        Ok(days) if (0..=MAX_RETENTION_DAYS).contains(&days) => Ok(days),
        _ => Err("expected a number of days between 0 and 36500"),
    }
}
