//! External command execution.
//!
//! Every subprocess the pipeline starts goes through [`run`]: stdin is
//! closed so nothing can prompt and output is captured for the run report.
//! Each child leads its own process group. If the awaiting future is dropped
//! (which is how a stage timeout stops a hung tool) the whole group is
//! killed, including grandchildren such as `jekyll` under `sh -c` or `ssh`
//! under `rsync`.

use std::process::Stdio;

use sitesync_types::error::CommandError;
use tokio::process::Command;

/// Run `command` to completion and return its combined output.
///
/// The output is stdout followed by stderr, trimmed. A non-zero exit is an
/// error carrying that output verbatim.
pub async fn run(command: &mut Command) -> Result<String, CommandError> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    tracing::debug!(command = %command_line(command), "running command");

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let child = command.spawn().map_err(|source| CommandError::Spawn {
        program: program.clone(),
        source,
    })?;
    let group = GroupGuard::new(child.id());
    let output = child
        .wait_with_output()
        .await
        .map_err(|source| CommandError::Spawn {
            program: program.clone(),
            source,
        })?;
    group.disarm();

    let combined = combine(&output.stdout, &output.stderr);
    if output.status.success() {
        Ok(combined)
    } else {
        Err(CommandError::Exited {
            program,
            status: output.status.code(),
            output: combined,
        })
    }
}

/// Kills the child's process group unless disarmed after the child exits.
struct GroupGuard {
    pgid: Option<u32>,
}

impl GroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn disarm(mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        #[cfg(unix)]
        {
            let Ok(pgid) = libc::pid_t::try_from(pgid) else {
                return;
            };
            // SAFETY: killpg takes plain integers and touches no memory.
            if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
                tracing::debug!(pgid, "killed abandoned process group");
            }
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}

/// Render a command for logs: program and arguments, space separated.
pub fn command_line(command: &Command) -> String {
    let std = command.as_std();
    std::iter::once(std.get_program())
        .chain(std.get_args())
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

fn combine(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    match (stdout.trim_end(), stderr.trim_end()) {
        ("", err) => err.to_string(),
        (out, "") => out.to_string(),
        (out, err) => format!("{out}\n{err}"),
    }
}
