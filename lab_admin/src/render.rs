//! Plain-text output for each command.

use crate::ops::{CleanupSummary, UnlockOutcome};
use labitory::security::{AccountState, CacheStatus, SecurityReport};
use std::fmt::Write;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Render the security status report.
///
/// `locked_only` hides accounts that are not locked; `detailed` appends the
/// cache check and the durable failure counters.
pub fn render_report(report: &SecurityReport, locked_only: bool, detailed: bool) -> String {
    let mut out = String::new();
    let settings = &report.settings;

    let _ = writeln!(out, "Security Status Report");
    let _ = writeln!(out, "{}", "=".repeat(50));

    let _ = writeln!(out);
    let _ = writeln!(out, "Security Configuration:");
    let _ = writeln!(out, "{}", "-".repeat(25));
    let _ = writeln!(out, "  Rate Limiting Enabled: {}", settings.rate_limit_enabled);
    let _ = writeln!(out, "  Max Failed Attempts: {}", settings.max_failed_attempts);
    let _ = writeln!(
        out,
        "  Lockout Duration: {} minutes",
        settings.lockout_duration_secs / 60
    );
    let _ = writeln!(
        out,
        "  Track Failed Attempts: {}",
        settings.track_failed_attempts
    );

    let _ = writeln!(out);
    let _ = writeln!(out, "Account Status:");
    let _ = writeln!(out, "{}", "-".repeat(15));
    for account in &report.accounts {
        match &account.state {
            AccountState::Locked { reason, until } => {
                let _ = writeln!(
                    out,
                    "  LOCKED: {} ({})",
                    account.username,
                    account.email.as_deref().unwrap_or("no email")
                );
                let _ = writeln!(out, "    Reason: {}", reason);
                let _ = writeln!(out, "    Until: {}", until.format(TIME_FORMAT));
            }
            _ if locked_only => {}
            AccountState::Warning { failed_attempts } => {
                let _ = writeln!(
                    out,
                    "  WARNING: {} - {} failed attempts",
                    account.username, failed_attempts
                );
            }
            AccountState::Ok => {
                let _ = writeln!(out, "  OK: {}", account.username);
            }
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Summary: {} locked accounts out of {} total users",
        report.locked_count, report.total_count
    );

    if detailed {
        render_details(&mut out, report);
    }

    out
}

fn render_details(out: &mut String, report: &SecurityReport) {
    let _ = writeln!(out);
    let _ = writeln!(out, "Detailed Security Information:");
    let _ = writeln!(out, "{}", "-".repeat(30));
    let _ = writeln!(out, "  Cache Backend: {}", report.cache_backend);
    let _ = match &report.cache_status {
        CacheStatus::Working => writeln!(out, "  Cache Status: Working"),
        CacheStatus::NotWorking => writeln!(out, "  Cache Status: Not working properly"),
        CacheStatus::Error(e) => writeln!(out, "  Cache Status: Error - {}", e),
    };

    if !report.users_with_failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Users with Recent Failed Attempts:");
        for summary in &report.users_with_failures {
            let _ = writeln!(
                out,
                "  {}: {} attempts",
                summary.username, summary.failed_login_attempts
            );
            if let Some(last) = summary.last_failed_login {
                let _ = writeln!(out, "    Last failed: {}", last.format(TIME_FORMAT));
            }
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Attempt Tracking:");
    let _ = writeln!(
        out,
        "  Login Attempts: {}/{}min",
        report.settings.max_failed_attempts,
        report.settings.attempt_window_secs / 60
    );
}

pub fn render_unlock(username: &str, outcome: UnlockOutcome) -> String {
    match outcome {
        UnlockOutcome::NotLocked => format!("User \"{}\" is not currently locked.", username),
        UnlockOutcome::Unlocked { cleared_attempts } => {
            let mut out = format!("Successfully unlocked user account: {}", username);
            if cleared_attempts {
                out.push_str("\nCleared failed login attempt counters");
            }
            out
        }
    }
}

pub fn render_cleanup(summary: &CleanupSummary) -> String {
    let mut out = String::new();

    if summary.dry_run {
        let _ = writeln!(
            out,
            "[DRY RUN] Would delete {} expired tokens",
            summary.expired
        );
    } else {
        let _ = writeln!(out, "Deleted {} expired tokens", summary.expired);
    }

    if let Some(revoked) = summary.revoked {
        if summary.dry_run {
            let _ = writeln!(out, "[DRY RUN] Would delete {} old revoked tokens", revoked);
        } else {
            let _ = writeln!(out, "Deleted {} old revoked tokens", revoked);
        }
    }

    let _ = write!(
        out,
        "Current tokens: {} total, {} active",
        summary.stats.total, summary.stats.active
    );
    out
}
