//! `vaultsync completions <shell>` - prints a completion script to stdout
//!
//! The script covers every subcommand and flag of the binary, including the
//! `schedule` and `worker` commands. Typical install for bash:
//!
//! ```text
//! vaultsync completions bash > ~/.local/share/bash-completion/completions/vaultsync
//! ```

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::Shell;

use super::CommandContext;

const BIN_NAME: &str = "vaultsync";

#[derive(Debug, clap::Args)]
pub struct CompletionsCommand {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsCommand {
    pub async fn execute(&self, _ctx: &CommandContext) -> Result<()> {
        let mut stdout = io::stdout().lock();
        write_completions(self.shell, &mut stdout);
        stdout.flush().context("Failed to write completion script")
    }
}

fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut cmd = crate::Cli::command();
    clap_complete::generate(shell, &mut cmd, BIN_NAME, out);
}
