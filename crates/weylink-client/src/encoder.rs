//! The external encoder process.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};
use weylink_protocol::WriterSink;

use crate::error::SessionError;

/// A running encoder fed through its stdin.
#[derive(Debug)]
pub struct EncoderProcess {
    child: Child,
    command: String,
}

impl EncoderProcess {
    /// Start `template` under `sh -c` with `{snapshot}` substituted.
    ///
    /// Returns the process and a sink writing into its stdin. The process
    /// is killed if the handle is dropped.
    pub fn spawn(
        template: &str,
        snapshot: &Path,
    ) -> Result<(Self, WriterSink<ChildStdin>), SessionError> {
        let command = render_command(template, snapshot);
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::Encoder(format!("failed to start `{command}`: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::Encoder("encoder stdin was not captured".to_string()))?;
        info!(pid = ?child.id(), %command, "encoder started");
        Ok((Self { child, command }, WriterSink::new(stdin)))
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Wait for the process to exit.
    pub async fn wait(&mut self) -> Result<ExitStatus, SessionError> {
        self.child
            .wait()
            .await
            .map_err(|e| SessionError::Encoder(format!("failed to wait for encoder: {e}")))
    }

    /// Kill the process if it is still running and reap it.
    pub async fn shutdown(mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => debug!(%status, "encoder already exited"),
            Ok(None) => {
                if let Err(e) = self.child.kill().await {
                    warn!(error = %e, "failed to kill encoder");
                } else {
                    info!("encoder stopped");
                }
            }
            Err(e) => warn!(error = %e, "failed to query encoder status"),
        }
    }
}

/// Substitute the shell-quoted snapshot path for every `{snapshot}`.
pub fn render_command(template: &str, snapshot: &Path) -> String {
    template.replace("{snapshot}", &shell_quote(&snapshot.to_string_lossy()))
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use weylink_protocol::BinarySink;

    #[test]
    fn render_quotes_the_path() {
        let rendered = render_command("ffmpeg -i - {snapshot}", Path::new("/run/user/1000/a b.bmp"));
        assert_eq!(rendered, "ffmpeg -i - '/run/user/1000/a b.bmp'");
    }

    #[test]
    fn render_escapes_single_quotes() {
        let rendered = render_command("cat > {snapshot}", Path::new("/tmp/it's.bmp"));
        assert_eq!(rendered, r"cat > '/tmp/it'\''s.bmp'");
    }

    #[test]
    fn template_without_placeholder_is_unchanged() {
        assert_eq!(render_command("true", Path::new("/x")), "true");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdin_reaches_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.bin");
        let (mut encoder, mut sink) = EncoderProcess::spawn("cat > {snapshot}", &out).unwrap();

        sink.write_frame(b"\x00\x00\x00\x18ftypmp42").await.unwrap();
        sink.write_frame(b"more").await.unwrap();
        sink.finish().await.unwrap();
        drop(sink);

        let status = encoder.wait().await.unwrap();
        assert!(status.success());
        assert_eq!(
            std::fs::read(&out).unwrap(),
            b"\x00\x00\x00\x18ftypmp42more"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shutdown_kills_a_running_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let (encoder, _sink) =
            EncoderProcess::spawn("sleep 30", &dir.path().join("unused")).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), encoder.shutdown())
            .await
            .unwrap();
    }
}
