//! Shell completion generation for sqlsheet

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io::{self, Write};

use crate::cli::CliArgs;
use crate::error::Result;

/// Binary name completions are registered for
const BIN_NAME: &str = "sqlsheet";

/// Print the completion script for `shell` to stdout
///
/// # Arguments
/// * `shell` - Target shell
///
/// # Returns
/// * `Result<()>` - Success or error
pub fn generate_completion(shell: Shell) -> Result<()> {
    let mut stdout = io::stdout().lock();
    write_completion(shell, &mut stdout)?;
    stdout.flush()?;
    Ok(())
}

/// Write the completion script for `shell` into `out`
pub fn write_completion<W: Write>(shell: Shell, out: &mut W) -> Result<()> {
    let mut cmd = CliArgs::command();
    let mut buffer = Vec::new();
    generate(shell, &mut cmd, BIN_NAME, &mut buffer);
    out.write_all(&buffer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bash_completion_mentions_flags() {
        let mut out = Vec::new();
        write_completion(Shell::Bash, &mut out).unwrap();
        let script = String::from_utf8(out).unwrap();
        assert!(script.contains(BIN_NAME));
        assert!(script.contains("--batch-size"));
    }

    #[test]
    fn test_every_shell_generates() {
        for shell in [Shell::Bash, Shell::Zsh, Shell::Fish, Shell::PowerShell, Shell::Elvish] {
            let mut out = Vec::new();
            write_completion(shell, &mut out).unwrap();
            assert!(!out.is_empty(), "{shell}");
        }
    }
}
