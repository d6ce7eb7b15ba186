//! Publishing via `rsync` over `ssh`.

use std::ffi::OsString;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use sitesync_core::pipeline::{Publisher, RemoteTarget};
use sitesync_types::config::Programs;
use sitesync_types::error::PublishError;
use tokio::process::Command;

use crate::command;

/// Mirrors the artifact onto the remote with `rsync -a --delete`.
///
/// Authentication uses only the configured key and never prompts: `ssh` runs
/// in batch mode with no other identities, and stdin is closed.
#[derive(Debug, Clone)]
pub struct RsyncPublisher {
    key: PathBuf,
    rsync: String,
    ssh: String,
}

impl RsyncPublisher {
    pub fn new(key: impl Into<PathBuf>, programs: &Programs) -> Self {
        Self {
            key: key.into(),
            rsync: programs.rsync.clone(),
            ssh: programs.ssh.clone(),
        }
    }

    /// The remote shell rsync is told to use.
    fn remote_shell(&self) -> String {
        format!(
            "{} -i {} -o BatchMode=yes -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
            self.ssh,
            quote(&self.key.to_string_lossy())
        )
    }

    fn rsync_command(&self, artifact: &Path, target: &RemoteTarget) -> Command {
        let mut cmd = Command::new(&self.rsync);
        cmd.args(["-a", "--delete", "-e"])
            .arg(self.remote_shell())
            .arg(contents_of(artifact))
            .arg(target.as_str());
        cmd
    }
}

impl Publisher for RsyncPublisher {
    async fn publish(&self, artifact: &Path, target: &RemoteTarget) -> Result<(), PublishError> {
        if !tokio::fs::metadata(artifact).await.is_ok_and(|m| m.is_dir()) {
            return Err(PublishError::MissingArtifact(artifact.to_path_buf()));
        }
        tokio::fs::File::open(&self.key)
            .await
            .map_err(|source| PublishError::Credentials {
                path: self.key.clone(),
                source,
            })?;

        tracing::info!(target = %target, "mirroring site to remote");
        let output = command::run(&mut self.rsync_command(artifact, target)).await?;
        if !output.is_empty() {
            tracing::debug!(output = %output, "rsync output");
        }
        Ok(())
    }
}

/// `dir` with exactly one trailing separator, so rsync copies the directory's
/// contents rather than the directory itself.
pub fn contents_of(dir: &Path) -> OsString {
    let mut path = dir.as_os_str().to_os_string();
    if !path.to_string_lossy().ends_with(MAIN_SEPARATOR) {
        path.push(MAIN_SEPARATOR.to_string());
    }
    path
}

/// Single-quote `value` for rsync's `-e` parser when it contains whitespace
/// or quotes.
fn quote(value: &str) -> String {
    if value.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
        format!("'{}'", value.replace('\'', "'\\''"))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesync_types::error::CommandError;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn target() -> RemoteTarget {
        RemoteTarget::new("wics@aviary.cs.umanitoba.ca:~/public_html")
    }

    /// A stand-in `rsync` that records its arguments, one per line.
    fn fake_rsync(dir: &Path, exit_code: i32) -> (String, PathBuf) {
        let log = dir.join("args.log");
        let script = dir.join("fake-rsync");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nfor a in \"$@\"; do echo \"$a\" >> '{}'; done\necho 'Permission denied (publickey).' >&2\nexit {exit_code}\n",
                log.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (script.display().to_string(), log)
    }

    fn fixture() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("_site");
        std::fs::create_dir(&artifact).unwrap();
        std::fs::write(artifact.join("index.html"), "home").unwrap();
        let key = dir.path().join("id_ed25519");
        std::fs::write(&key, "key material").unwrap();
        (dir, artifact, key)
    }

    #[test]
    fn contents_of_adds_exactly_one_separator() {
        assert_eq!(contents_of(Path::new("/tmp/run/_site")), OsString::from("/tmp/run/_site/"));
        assert_eq!(contents_of(Path::new("/tmp/run/_site/")), OsString::from("/tmp/run/_site/"));
    }

    #[test]
    fn remote_shell_uses_only_the_configured_key() {
        let publisher = RsyncPublisher::new("/etc/sitesync/deploy key", &Programs::default());
        assert_eq!(
            publisher.remote_shell(),
            "ssh -i '/etc/sitesync/deploy key' -o BatchMode=yes -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new"
        );
    }

    #[tokio::test]
    async fn publish_invokes_rsync_mirror() {
        let (dir, artifact, key) = fixture();
        let (rsync, log) = fake_rsync(dir.path(), 0);
        let programs = Programs {
            rsync,
            ..Programs::default()
        };
        let publisher = RsyncPublisher::new(&key, &programs);

        publisher.publish(&artifact, &target()).await.unwrap();

        let args: Vec<String> = std::fs::read_to_string(log)
            .unwrap()
            .lines()
            .map(String::from)
            .collect();
        assert_eq!(args[0], "-a");
        assert_eq!(args[1], "--delete");
        assert_eq!(args[2], "-e");
        assert!(args[3].contains("BatchMode=yes"));
        assert!(args[3].contains(&key.display().to_string()));
        assert_eq!(args[4], format!("{}/", artifact.display()));
        assert_eq!(args[5], "wics@aviary.cs.umanitoba.ca:~/public_html");
    }

    #[tokio::test]
    async fn publish_failure_carries_rsync_output() {
        let (dir, artifact, key) = fixture();
        let (rsync, _) = fake_rsync(dir.path(), 255);
        let programs = Programs {
            rsync,
            ..Programs::default()
        };
        let publisher = RsyncPublisher::new(&key, &programs);

        let err = publisher.publish(&artifact, &target()).await.unwrap_err();

        let PublishError::Command(CommandError::Exited { status, output, .. }) = &err else {
            panic!("expected command failure, got {err:?}");
        };
        assert_eq!(*status, Some(255));
        assert!(output.contains("Permission denied (publickey)."));
    }

    #[tokio::test]
    async fn unreadable_key_fails_before_transfer() {
        let (dir, artifact, _) = fixture();
        let (rsync, log) = fake_rsync(dir.path(), 0);
        let programs = Programs {
            rsync,
            ..Programs::default()
        };
        let publisher = RsyncPublisher::new(dir.path().join("no-such-key"), &programs);

        let err = publisher.publish(&artifact, &target()).await.unwrap_err();

        assert!(matches!(err, PublishError::Credentials { .. }));
        assert!(!log.exists());
    }

    fn rsync_installed() -> bool {
        std::process::Command::new("rsync")
            .arg("--version")
            .output()
            .is_ok_and(|out| out.status.success())
    }

    /// Relative path and contents of every file under `root`, sorted.
    fn tree(root: &Path) -> Vec<(PathBuf, String)> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    let contents = std::fs::read_to_string(&path).unwrap();
                    files.push((path.strip_prefix(root).unwrap().to_path_buf(), contents));
                }
            }
        }
        files.sort();
        files
    }

    #[tokio::test]
    async fn publish_mirrors_into_local_directory() {
        if !rsync_installed() {
            eprintln!("rsync not on PATH, skipping");
            return;
        }
        let (dir, artifact, key) = fixture();
        std::fs::create_dir(artifact.join("css")).unwrap();
        std::fs::write(artifact.join("css/site.css"), "body {}").unwrap();

        // A plain path is a local rsync destination, so no ssh is involved.
        let remote = dir.path().join("public_html");
        std::fs::create_dir_all(remote.join("old")).unwrap();
        std::fs::write(remote.join("stale.html"), "gone soon").unwrap();
        std::fs::write(remote.join("old/page.html"), "gone soon").unwrap();
        std::fs::write(remote.join("index.html"), "previous home").unwrap();
        let target = RemoteTarget::new(remote.display().to_string());
        let publisher = RsyncPublisher::new(&key, &Programs::default());

        publisher.publish(&artifact, &target).await.unwrap();
        let first = tree(&remote);

        assert_eq!(first, tree(&artifact));
        assert!(!remote.join("_site").exists());
        assert!(!remote.join("old").exists());

        publisher.publish(&artifact, &target).await.unwrap();
        assert_eq!(tree(&remote), first);
    }

    #[tokio::test]
    async fn missing_artifact_is_rejected() {
        let (dir, _, key) = fixture();
        let publisher = RsyncPublisher::new(&key, &Programs::default());

        let err = publisher
            .publish(&dir.path().join("nope"), &target())
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::MissingArtifact(_)));
    }
}
