use anyhow::{Context, Result};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Runs external programs to completion.
pub trait ProcessRunner {
    /// Ok only when the process exits with status 0.
    fn run(&mut self, argv: &[String]) -> Result<()>;
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for Box<R> {
    fn run(&mut self, argv: &[String]) -> Result<()> {
        (**self).run(argv)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&mut self, argv: &[String]) -> Result<()> {
        let (prog, args) = argv.split_first().context("empty command line")?;
        debug!("exec: {}", argv.join(" "));
        let status = Command::new(prog)
            .args(args)
            .stdin(Stdio::null())
            .status()
            .with_context(|| format!("spawn {}", prog))?;
        anyhow::ensure!(status.success(), "{} exited with {}", prog, status);
        Ok(())
    }
}

/// Ask the video service to re-read its config, trying each command in
/// order. Returns whether any of them succeeded.
pub fn reload_service<R: ProcessRunner + ?Sized>(runner: &mut R, commands: &[Vec<String>]) -> bool {
    for argv in commands {
        match runner.run(argv) {
            Ok(()) => {
                info!("reload: signalled via `{}`", argv.join(" "));
                return true;
            }
            Err(e) => debug!("reload: `{}` failed: {:#}", argv.join(" "), e),
        }
    }
    warn!("unable to signal video service; crop change may require manual restart");
    false
}
