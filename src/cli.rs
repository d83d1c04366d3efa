// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Takes a free-form remote command line plus connection options.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sshexec")]
#[command(about = "Run a single command on a remote host over SSH")]
#[command(version)]
#[command(
    after_help = "Exit status: the remote command's status, or 255 when sshexec itself fails.\n\
                  A remote command exiting 255 is indistinguishable from a local failure;\n\
                  use --json, which reports local failures as an \"error\" event on stderr."
)]
pub struct Cli {
    /// Remote target as [user@]host[:port]
    #[arg(long, short = 'H')]
    pub host: Option<String>,

    /// Identity file (relative paths resolve against the SSH directory)
    #[arg(long, short = 'i')]
    pub identity: Option<PathBuf>,

    /// Environment variable holding the identity's passphrase
    #[arg(long, value_name = "VAR")]
    pub passphrase_env: Option<String>,

    /// Accept host keys of hosts seen for the first time
    #[arg(long)]
    pub accept_new_hosts: bool,

    /// Abort the command after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Configuration file (default: ~/.config/sshexec/config.yml)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Enable diagnostic output
    #[arg(long, short = 'd', alias = "verbose")]
    pub debug: bool,

    /// Print only the command's output
    #[arg(long, short = 'q', conflicts_with = "json")]
    pub quiet: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Command to run; words are joined with spaces
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Cli {
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}
