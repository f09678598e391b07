//! Status command - inspects the saved session without touching the network.

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Local};
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use tether_session::{CredentialStore, RestoreFailure};

use super::Context;

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {}

/// Status report for JSON output.
#[derive(Debug, Serialize)]
struct StatusOutput {
    session_file: String,
    exists: bool,
    /// Whether the next connect would try to restore this record.
    restorable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    problem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    permissions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    modified: Option<String>,
    /// A `.tmp` file left behind by an interrupted save.
    stale_temp_file: bool,
}

/// Run the status command.
pub async fn run(_args: StatusArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let store = CredentialStore::new(loaded.config.session_file_path()?);
    let expected_user = loaded.config.user_id().unwrap_or_default();
    let output = inspect(&store, expected_user);

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let green = Style::new().green();
    let yellow = Style::new().yellow();
    let red = Style::new().red();

    println!();
    println!("{}", style("Tether Session Status").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!("  {} {}", dim.apply_to("File:"), output.session_file);

    if !output.exists {
        println!(
            "  {} {}",
            dim.apply_to("Status:"),
            yellow.apply_to("● no saved session")
        );
        println!();
        println!(
            "  {}",
            dim.apply_to("The next 'tether connect' will log in with the password.")
        );
        println!();
        return Ok(());
    }

    let status = if output.restorable {
        green.apply_to("● restorable".to_string())
    } else {
        red.apply_to(format!(
            "● unusable ({})",
            output.problem.as_deref().unwrap_or("unknown")
        ))
    };
    println!("  {} {}", dim.apply_to("Status:"), status);
    if let Some(user) = &output.user_id {
        println!("  {} {}", dim.apply_to("User:"), user);
    }
    if let Some(device) = &output.device_id {
        println!("  {} {}", dim.apply_to("Device:"), device);
    }
    if let Some(token) = &output.access_token {
        println!("  {} {}", dim.apply_to("Token:"), token);
    }
    if let Some(mode) = &output.permissions {
        let shown = if mode == "600" {
            green.apply_to(mode.clone())
        } else {
            yellow.apply_to(format!("{} (expected 600)", mode))
        };
        println!("  {} {}", dim.apply_to("Mode:"), shown);
    }
    if let Some(modified) = &output.modified {
        println!("  {} {}", dim.apply_to("Saved:"), modified);
    }
    if output.stale_temp_file {
        println!();
        println!(
            "  {}",
            yellow.apply_to("A leftover .tmp file exists from an interrupted save; it is ignored.")
        );
    }
    println!();

    Ok(())
}

/// Read-only: the session file is only ever written by the session manager.
fn inspect(store: &CredentialStore, expected_user: &str) -> StatusOutput {
    let path = store.path();
    let mut output = StatusOutput {
        session_file: path.display().to_string(),
        exists: store.exists(),
        restorable: false,
        problem: None,
        user_id: None,
        device_id: None,
        access_token: None,
        permissions: None,
        modified: None,
        stale_temp_file: store.temp_path().exists(),
    };
    if !output.exists {
        return output;
    }

    output.permissions = permissions(path);
    output.modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(|t| DateTime::<Local>::from(t).to_rfc3339());

    match store.load(expected_user) {
        Ok(session) => {
            output.restorable = true;
            output.access_token = Some(session.masked_token());
            output.user_id = Some(session.user_id);
            output.device_id = Some(session.device_id);
        }
        Err(failure) => {
            if let RestoreFailure::UserMismatch { found, .. } = &failure {
                output.user_id = Some(found.clone());
            }
            output.problem = Some(failure.to_string());
        }
    }
    output
}

#[cfg(unix)]
fn permissions(path: &Path) -> Option<String> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .ok()
        .map(|m| format!("{:o}", m.permissions().mode() & 0o777))
}

#[cfg(not(unix))]
fn permissions(_path: &Path) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tether_client::Session;

    #[test]
    fn test_inspect_missing_file() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("session.json"));
        let output = inspect(&store, "@bot:example.org");
        assert!(!output.exists);
        assert!(!output.restorable);
        assert!(output.permissions.is_none());
    }

    #[test]
    fn test_inspect_saved_session_masks_token() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("session.json"));
        store
            .save(&Session::new("@bot:example.org", "DEV1", "syt_abcdefgh_1234"))
            .unwrap();

        let output = inspect(&store, "@bot:example.org");
        assert!(output.restorable);
        assert_eq!(output.device_id.as_deref(), Some("DEV1"));
        assert_eq!(output.access_token.as_deref(), Some("****1234"));
        #[cfg(unix)]
        assert_eq!(output.permissions.as_deref(), Some("600"));
        assert!(output.modified.is_some());

        let json = serde_json::to_string(&output).unwrap();
        assert!(!json.contains("syt_abcdefgh_1234"));
    }

    #[test]
    fn test_inspect_other_user() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("session.json"));
        store
            .save(&Session::new("@other:example.org", "DEV1", "syt_abcdefgh_1234"))
            .unwrap();

        let output = inspect(&store, "@bot:example.org");
        assert!(!output.restorable);
        assert_eq!(output.user_id.as_deref(), Some("@other:example.org"));
        assert!(output.problem.is_some());
        assert!(output.access_token.is_none());
    }

    #[test]
    fn test_inspect_reports_stale_temp_file() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("session.json"));
        std::fs::write(store.temp_path(), "{\"user_id\":").unwrap();

        let output = inspect(&store, "@bot:example.org");
        assert!(!output.exists);
        assert!(output.stale_temp_file);
    }

    #[test]
    fn test_inspect_never_rewrites_the_record() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("session.json"));
        std::fs::write(store.path(), "{\"user_id\": \"@bot:example.org\"}").unwrap();
        std::fs::write(store.temp_path(), "partial").unwrap();

        let output = inspect(&store, "@bot:example.org");
        assert!(output.exists);
        assert!(!output.restorable);

        // Broken records and leftovers are reported, not repaired.
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "{\"user_id\": \"@bot:example.org\"}"
        );
        assert_eq!(std::fs::read_to_string(store.temp_path()).unwrap(), "partial");
    }
}
