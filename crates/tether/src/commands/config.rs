//! Config command - configuration inspection and setup.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::Style;
use serde::Serialize;

use tether_config::{TetherConfig, secrets};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: Option<ConfigCommand>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration with secrets redacted (default)
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./tether.toml) instead of user config
        #[arg(long)]
        local: bool,
    },

    /// Show configuration file path
    Path,

    /// Store the homeserver password in the system keyring
    SetPassword,

    /// Remove the homeserver password from the system keyring
    DeletePassword,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command.unwrap_or(ConfigCommand::Show) {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Init { local } => cmd_init(local),
        ConfigCommand::Path => cmd_path(),
        ConfigCommand::SetPassword => cmd_set_password(ctx),
        ConfigCommand::DeletePassword => cmd_delete_password(ctx),
    }
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    sources: Vec<String>,
    config: TetherConfig,
    password_source: Option<String>,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    warnings: Vec<String>,
}

/// Copy of `config` safe to print.
fn redacted(config: &TetherConfig) -> TetherConfig {
    let mut config = config.clone();
    if let Some(homeserver) = config.homeserver.as_mut()
        && homeserver.password.is_some()
    {
        homeserver.password = Some("[redacted]".to_string());
    }
    config
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let config = &loaded.config;
    let validation = config.resolve().err().map(|e| e.to_string());
    let password_source = config.user_id().and_then(|user| {
        let file_value = config.homeserver.as_ref().and_then(|h| h.password.as_deref());
        secrets::lookup_password(user, file_value).map(|s| s.source.to_string())
    });

    let output = ShowOutput {
        sources: loaded
            .loaded_from()
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        config: redacted(config),
        password_source,
        valid: validation.is_none(),
        error: validation,
        warnings: loaded.warnings.clone(),
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let green = Style::new().green();
    let red = Style::new().red();

    println!("# Tether Configuration\n");

    if output.sources.is_empty() {
        println!("No config files loaded\n");
    } else {
        println!("Config files:");
        for source in &output.sources {
            println!("  {}", source);
        }
        println!();
    }

    println!("{}", output.config.to_toml()?);

    match &output.password_source {
        Some(source) => println!("Password: {} {}", green.apply_to("found"), dim.apply_to(source)),
        None => println!("Password: {}", red.apply_to("not found")),
    }
    match &output.error {
        None => println!("Valid:    {}", green.apply_to("yes")),
        Some(e) => println!("Valid:    {} {}", red.apply_to("no"), dim.apply_to(e)),
    }

    if !output.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for w in &output.warnings {
            println!("  ⚠ {}", w);
        }
    }
    println!();

    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;

    println!("Config file search order (later overrides earlier):\n");
    for source in &loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'tether config init' to create one.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }

    Ok(())
}

const TEMPLATE: &str = r#"# Tether Configuration

[homeserver]
url = "https://matrix.example.org"
user_id = "@bot:example.org"
# Prefer `tether config set-password` or TETHER_PASSWORD over this.
# password = ""
device_name = "tether"
request_timeout_secs = 30

[session]
session_file_path = "~/.config/tether/session.json"
validation_timeout_secs = 30   # 0 waits for whoami without a bound

[retry]
max_retries = 3
retry_backoff_seconds = [2, 4, 8]
call_timeout_secs = 60         # 0 disables the per-attempt timeout

[circuit_breaker]
failure_threshold = 5
circuit_open_timeout_seconds = 300

# [logging]
# directory = "~/.config/tether/logs"
# json = true
"#;

fn cmd_init(local: bool) -> Result<()> {
    let path = if local {
        tether_config::project_config_path(std::path::Path::new("."))
    } else {
        tether_config::xdg_config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    tether_config::write_config_file(&path, TEMPLATE)?;
    println!("✓ Created config file: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  edit the [homeserver] section");
    println!("  tether config set-password   # store the password in the keyring");
    println!("  tether connect               # log in and save the session");

    Ok(())
}

fn cmd_path() -> Result<()> {
    if let Some(path) = tether_config::xdg_config_path() {
        println!("{}", path.display());
    } else {
        eprintln!("Could not determine config directory");
    }
    Ok(())
}

fn configured_user(ctx: &Context) -> Result<String> {
    let loaded = ctx.load_config()?;
    loaded
        .config
        .user_id()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("no [homeserver] user_id configured"))
}

fn cmd_set_password(ctx: &Context) -> Result<()> {
    let user = configured_user(ctx)?;
    let password = rpassword::prompt_password(format!("Password for {}: ", user))?;
    if password.is_empty() {
        println!("No password provided, aborting.");
        return Ok(());
    }

    match secrets::store_in_keyring(&user, &password) {
        Ok(()) => println!("✓ Password stored in system keyring for {}", user),
        Err(e) => {
            eprintln!("Failed to store in keyring: {}", e);
            eprintln!(
                "Fallback: set the {} environment variable instead.",
                tether_config::PASSWORD_ENV_VAR
            );
        }
    }
    Ok(())
}

fn cmd_delete_password(ctx: &Context) -> Result<()> {
    let user = configured_user(ctx)?;
    match secrets::delete_from_keyring(&user) {
        Ok(()) => println!("✓ Password removed from keyring for {}", user),
        Err(e) => eprintln!("Failed to delete from keyring: {}", e),
    }
    Ok(())
}
