//! Connect command - restore or log in, confirm identity, disconnect.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use super::{Context, Stack};

/// Arguments for the connect command.
#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Skip the identity check after connecting
    #[arg(long)]
    pub no_verify: bool,
}

#[derive(Debug, Serialize)]
struct ConnectOutput {
    user_id: String,
    device_id: String,
    access_token: String,
    login_source: String,
    session_file: String,
    verified: bool,
}

/// Run the connect command.
pub async fn run(args: ConnectArgs, ctx: &Context) -> Result<()> {
    let stack = Stack::build(ctx)?;
    let result = connect_and_verify(&stack, args.no_verify).await;
    stack.connection.disconnect().await;
    let output = result?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let green = Style::new().green();

    println!();
    println!("{}", style("Tether Connection").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!("  {} {}", dim.apply_to("Status:"), green.apply_to("● connected"));
    println!("  {} {}", dim.apply_to("User:"), output.user_id);
    println!("  {} {}", dim.apply_to("Device:"), output.device_id);
    println!("  {} {}", dim.apply_to("Token:"), output.access_token);
    println!("  {} {}", dim.apply_to("Source:"), output.login_source);
    println!("  {} {}", dim.apply_to("Session:"), output.session_file);
    if !output.verified {
        println!();
        println!("  {}", dim.apply_to("Identity check skipped (--no-verify)"));
    }
    println!();

    Ok(())
}

async fn connect_and_verify(stack: &Stack, no_verify: bool) -> Result<ConnectOutput> {
    let session = stack.connection.connect().await?;
    let manager = stack.session_manager();

    if !no_verify {
        let client = manager.client();
        let identity = stack
            .handler
            .call_with_retry(move || client.whoami())
            .await?;
        if identity.user_id != manager.user_id() {
            anyhow::bail!(
                "homeserver reports identity {} but configured user is {}",
                identity.user_id,
                manager.user_id()
            );
        }
    }

    // A re-login during verification replaces the session.
    let session = manager.session().unwrap_or(session);
    Ok(ConnectOutput {
        user_id: session.user_id.clone(),
        device_id: session.device_id.clone(),
        access_token: session.masked_token(),
        login_source: manager
            .login_source()
            .map(|s| s.to_string())
            .unwrap_or_default(),
        session_file: manager.store().path().display().to_string(),
        verified: !no_verify,
    })
}
