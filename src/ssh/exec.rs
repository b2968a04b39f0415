// ABOUTME: Runs one remote command on an authenticated session.
// ABOUTME: Collects stdout, stderr and their interleaving until exit status and EOF.

use super::client::Session;
use super::error::{Error, Result};
use russh::ChannelMsg;

/// SSH_EXTENDED_DATA_STDERR.
const EXTENDED_DATA_STDERR: u32 = 1;

/// What a remote command produced.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
    /// Both streams in the order the server sent them.
    pub combined: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Default)]
struct Collector {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    combined: Vec<u8>,
    exit_code: Option<u32>,
    eof: bool,
}

impl Collector {
    fn stdout(&mut self, data: &[u8]) {
        self.stdout.extend_from_slice(data);
        self.combined.extend_from_slice(data);
    }

    fn stderr(&mut self, data: &[u8]) {
        self.stderr.extend_from_slice(data);
        self.combined.extend_from_slice(data);
    }

    /// Exit status and EOF may arrive in either order.
    fn finished(&self) -> bool {
        self.eof && self.exit_code.is_some()
    }

    fn into_output(self) -> Result<CommandOutput> {
        // A channel that closes without an exit status died underneath us.
        let exit_code = self.exit_code.ok_or(Error::ChannelClosed)?;
        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
            combined: String::from_utf8_lossy(&self.combined).into_owned(),
        })
    }
}

impl Session {
    /// Run `command` and wait for it, bounded by the configured command timeout.
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let limit = self.config.command_timeout;
        tokio::time::timeout(limit, self.run_command(command))
            .await
            .map_err(|_| Error::CommandTimeout(limit))?
    }

    async fn run_command(&self, command: &str) -> Result<CommandOutput> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::CommandFailed(format!("cannot open a session channel: {e}")))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::CommandFailed(format!("cannot start {command:?}: {e}")))?;
        tracing::debug!(%command, "remote command started");

        let mut collector = Collector::default();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => collector.stdout(&data),
                ChannelMsg::ExtendedData { data, ext } if ext == EXTENDED_DATA_STDERR => {
                    collector.stderr(&data)
                }
                ChannelMsg::ExitStatus { exit_status } => collector.exit_code = Some(exit_status),
                ChannelMsg::Eof => collector.eof = true,
                ChannelMsg::Close => break,
                _ => {}
            }
            if collector.finished() {
                break;
            }
        }

        collector.into_output()
    }
}
