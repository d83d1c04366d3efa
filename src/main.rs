// ABOUTME: Entry point for the sshexec CLI application.
// ABOUTME: Runs one command remotely and exits with the remote exit status.

mod cli;

use clap::Parser;
use cli::Cli;
use sshexec::config::Config;
use sshexec::error::{Error, Result};
use sshexec::output::{Output, OutputMode};
use sshexec::ssh::{ConnectionFactory, Target, TrustPolicy};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Exit status for local failures. A remote command exiting 255 looks the same.
const EXIT_LOCAL_FAILURE: i32 = 255;

const DEFAULT_HOST: &str = "localhost";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let mut output = Output::new(mode);
    output.start_timer();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            output.error(&e.to_string());
            std::process::exit(EXIT_LOCAL_FAILURE);
        }
    };

    init_tracing(cli.debug || config.debug);

    match run(cli, config, &output).await {
        Ok(exit_code) => std::process::exit(exit_code as i32),
        Err(e) => {
            output.error(&e.to_string());
            std::process::exit(EXIT_LOCAL_FAILURE);
        }
    }
}

/// Server banners are logged at info, so sshexec's own events stay visible at that level.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn,sshexec=info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load(path),
        None => {
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
            Config::discover(&home)
        }
    }
}

async fn run(cli: Cli, config: Config, output: &Output) -> Result<u32> {
    let mut factory_config = config.factory_config()?;
    if let Some(identity) = &cli.identity {
        factory_config = factory_config.identity(identity);
    }
    if let Some(var) = &cli.passphrase_env {
        let passphrase = std::env::var(var).map_err(|_| Error::MissingEnvVar(var.clone()))?;
        factory_config = factory_config.passphrase(passphrase);
    }
    if cli.accept_new_hosts {
        factory_config = factory_config.trust_policy(TrustPolicy::AcceptNew);
    }
    if let Some(secs) = cli.timeout {
        factory_config = factory_config.command_timeout(Duration::from_secs(secs));
    }

    let target = match &cli.host {
        Some(host) => Target::parse(host).map_err(Error::InvalidTarget)?,
        None => config
            .host
            .clone()
            .unwrap_or_else(|| Target::new(DEFAULT_HOST)),
    };

    let mut factory = ConnectionFactory::new(factory_config)?;
    for extra in &config.identities {
        factory.load_identity(extra, None)?;
    }
    if cli.debug || config.debug {
        factory.debug_on();
    }

    let command = cli.command_line();
    let mut session = factory.open_target(&target);

    let interrupt = session.interrupt_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.interrupt();
        }
    });

    output.progress(&format!("  → Running on {}...", session.id()));
    let result = if output.mode() == OutputMode::Json {
        session.exec_output(&command).await.map(|result| {
            output.result(&result);
            result.exit_code
        })
    } else {
        let mut captured = String::new();
        let exit_code = session.exec_capture(&command, &mut captured).await;
        output.stdout(&captured);
        exit_code
    };

    session.close().await;
    ctrl_c.abort();

    Ok(result?)
}
