use std::path::PathBuf;

use anyhow::{bail, Result};

pub const USAGE: &str = "usage: pg-s3-backup-daemon [--config <path>] [run-once]

  (no mode)   run the backup scheduler until Ctrl-C
  run-once    perform a single backup now and print the run as JSON";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Service,
    RunOnce,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub config_path: Option<PathBuf>,
    pub mode: Mode,
}

/// Parses everything after the program name. Nothing is built or connected
/// here, so a bad invocation fails before startup work begins.
pub fn parse_args<I>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut config_path: Option<PathBuf> = None;
    let mut mode: Option<Mode> = None;

    while let Some(arg) = args.next() {
        let next = match arg.as_str() {
            "--config" => {
                let Some(path) = args.next() else {
                    bail!("--config requires a path argument");
                };
                config_path = Some(PathBuf::from(path));
                continue;
            }
            "-h" | "--help" => Mode::Help,
            "run-once" => Mode::RunOnce,
            other if other.starts_with('-') => bail!("unknown option `{other}`\n\n{USAGE}"),
            other => bail!("unknown mode `{other}` (expected `run-once`)\n\n{USAGE}"),
        };
        match mode {
            Some(Mode::Help) => {}
            Some(_) if next != Mode::Help => bail!("only one mode may be given\n\n{USAGE}"),
            _ => mode = Some(next),
        }
    }

    Ok(Args {
        config_path,
        mode: mode.unwrap_or(Mode::Service),
    })
}
