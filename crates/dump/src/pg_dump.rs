use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};

use crate::{DatabaseConnectionInfo, DumpError, Dumper};

const STDERR_TAIL_BYTES: usize = 2048;

/// Runs `pg_dump` (or a compatible command) with stdout redirected into the staged file.
///
/// Connection parameters become individual argv entries and the password
/// travels only in the child's `PGPASSWORD`, so no value is ever seen by a shell.
#[derive(Debug, Clone)]
pub struct PgDump {
    program: PathBuf,
    leading_args: Vec<String>,
    connection: DatabaseConnectionInfo,
    timeout: Option<Duration>,
}

impl PgDump {
    /// `command` is the program followed by any fixed leading arguments,
    /// e.g. `["pg_dump"]` or `["docker", "exec", "-i", "pg", "pg_dump"]`.
    pub fn new(command: &[String], connection: DatabaseConnectionInfo) -> Result<Self, DumpError> {
        let (program, leading_args) = command.split_first().ok_or(DumpError::EmptyCommand)?;
        let resolved = which::which(program).map_err(|source| DumpError::ProgramNotFound {
            program: program.clone(),
            source,
        })?;
        debug!(program = %resolved.display(), "resolved dump program");
        Ok(Self {
            program: resolved,
            leading_args: leading_args.to_vec(),
            connection,
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Full argument vector passed after the program.
    pub fn args(&self) -> Vec<OsString> {
        let conn = &self.connection;
        let mut args: Vec<OsString> = self.leading_args.iter().map(OsString::from).collect();
        args.push("--host".into());
        args.push(conn.host.clone().into());
        if let Some(port) = conn.port {
            args.push("--port".into());
            args.push(port.to_string().into());
        }
        args.push("--username".into());
        args.push(conn.user.clone().into());
        args.push("--no-password".into());
        args.push("--dbname".into());
        args.push(conn.name.clone().into());
        args
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

#[async_trait::async_trait]
impl Dumper for PgDump {
    async fn dump(&self, dest: &Path) -> Result<(), DumpError> {
        let program = self.program_name();
        let output = tokio::fs::File::create(dest)
            .await
            .map_err(|source| DumpError::CreateOutput {
                path: dest.to_path_buf(),
                source,
            })?
            .into_std()
            .await;

        let mut cmd = Command::new(&self.program);
        cmd.args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::from(output))
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(password) = &self.connection.password {
            cmd.env("PGPASSWORD", password);
        }

        info!(
            %program,
            database = %self.connection.name,
            host = %self.connection.host,
            dest = %dest.display(),
            "starting database dump"
        );
        let child = cmd.spawn().map_err(|source| DumpError::Spawn {
            program: program.clone(),
            source,
        })?;

        let finished = child.wait_with_output();
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, finished)
                .await
                .map_err(|_| DumpError::TimedOut {
                    program: program.clone(),
                    limit,
                })?,
            None => finished.await,
        };
        let out = result.map_err(|source| DumpError::Wait {
            program: program.clone(),
            source,
        })?;

        if out.status.success() {
            return Ok(());
        }
        let stderr = stderr_tail(&out.stderr);
        match out.status.code() {
            Some(code) => Err(DumpError::Exited {
                program,
                code,
                stderr,
            }),
            None => Err(DumpError::Terminated { program, stderr }),
        }
    }
}

fn stderr_tail(raw: &[u8]) -> String {
    let start = raw.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&raw[start..]).trim().to_owned()
}
