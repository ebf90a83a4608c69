//! Tool supervisor: runs the native flash tool and leaves no residue.
//!
//! The supervisor is the only place decrypted firmware ever meets the
//! filesystem, and only because the native tools demand file paths. The
//! contract: materialize into a private staging directory, run the tool
//! with captured output, then overwrite every staged file with random
//! bytes before unlinking — on success, failure, and cancellation
//! alike.

use rand::RngCore;
use sha2::{Digest, Sha256};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use zeroize::Zeroize;

use flashlock_crypto::SecretBytes;

use crate::cancel::CancelToken;
use crate::error::FlashError;
use crate::progress::{ProgressEvent, ProgressSink};

pub struct ToolSupervisor {
    tools_dir: PathBuf,
    verify_tools: bool,
    tool_hashes: std::collections::HashMap<String, String>,
    overwrite_passes: u32,
}

impl ToolSupervisor {
    pub fn new(
        tools_dir: PathBuf,
        verify_tools: bool,
        tool_hashes: std::collections::HashMap<String, String>,
        overwrite_passes: u32,
    ) -> Self {
        Self {
            tools_dir,
            verify_tools,
            tool_hashes,
            overwrite_passes,
        }
    }

    /// Run `tool` against the decrypted artifact buffers.
    ///
    /// Returns `Ok(true)` on exit code 0, `Ok(false)` on any other exit
    /// code. Staged files are scrubbed on every path out of this
    /// function.
    pub async fn run(
        &self,
        tool: &str,
        args_template: &str,
        buffers: &[(String, SecretBytes)],
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<bool, FlashError> {
        let tool_path = self.locate(tool)?;
        self.verify_tool(tool, &tool_path)?;
        cancel.ensure_active()?;

        let mut staging = StagingDir::create()?;
        let result = self
            .run_staged(&tool_path, args_template, buffers, &mut staging, progress, cancel)
            .await;
        staging.scrub(self.overwrite_passes);
        result
    }

    fn locate(&self, tool: &str) -> Result<PathBuf, FlashError> {
        let path = self.tools_dir.join(tool);
        if path.is_file() {
            return Ok(path);
        }
        #[cfg(windows)]
        {
            let exe = self.tools_dir.join(format!("{tool}.exe"));
            if exe.is_file() {
                return Ok(exe);
            }
        }
        Err(FlashError::ToolMissing(tool.to_string()))
    }

    /// Hash the tool binary and compare against the allowlist. An empty
    /// allowlist logs the observed hash and passes — advisory mode, for
    /// development only.
    fn verify_tool(&self, tool: &str, path: &Path) -> Result<(), FlashError> {
        if !self.verify_tools {
            tracing::debug!(tool, "Tool integrity checking disabled");
            return Ok(());
        }

        let bytes = std::fs::read(path)?;
        let digest = hex::encode(Sha256::digest(&bytes));

        match self.tool_hashes.get(tool) {
            Some(expected) if expected.eq_ignore_ascii_case(&digest) => Ok(()),
            Some(_) => Err(FlashError::ToolUntrusted(format!(
                "{tool}: binary hash does not match the allowlist"
            ))),
            None if self.tool_hashes.is_empty() => {
                tracing::warn!(
                    tool,
                    sha256 = %digest,
                    "Tool allowlist is empty; accepting tool in advisory mode"
                );
                Ok(())
            }
            None => Err(FlashError::ToolUntrusted(format!(
                "{tool}: not present in the allowlist"
            ))),
        }
    }

    async fn run_staged(
        &self,
        tool_path: &Path,
        args_template: &str,
        buffers: &[(String, SecretBytes)],
        staging: &mut StagingDir,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<bool, FlashError> {
        let mut materialized: Vec<(String, PathBuf)> = Vec::with_capacity(buffers.len());
        for (name, buffer) in buffers {
            let path = staging.materialize(name, buffer)?;
            materialized.push((name.clone(), path));
        }

        let args = substitute_template(args_template, &materialized)?;
        cancel.ensure_active()?;

        tracing::info!(tool = %tool_path.display(), "Spawning flash tool");
        let mut command = Command::new(tool_path);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = command.spawn()?;

        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, line_tx.clone());
        }
        drop(line_tx);

        let mut lines_done = false;
        let status = loop {
            tokio::select! {
                line = line_rx.recv(), if !lines_done => {
                    match line {
                        Some(line) => progress.emit(ProgressEvent::ToolOutput(line)),
                        None => lines_done = true,
                    }
                }
                status = child.wait() => break status?,
                _ = cancel.cancelled_wait() => {
                    tracing::warn!("Cancellation observed; terminating flash tool");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    return Err(FlashError::Cancelled);
                }
            }
        };

        // Drain output that arrived after the process exited.
        while let Ok(line) = line_rx.try_recv() {
            progress.emit(ProgressEvent::ToolOutput(line));
        }

        let success = status.code() == Some(0);
        if success {
            tracing::info!("Flash tool exited successfully");
        } else {
            tracing::warn!(code = ?status.code(), "Flash tool exited with failure");
        }
        Ok(success)
    }
}

fn spawn_line_reader<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

/// Substitute `{artifact-name}` placeholders in a whitespace-split
/// argument template. Every placeholder must resolve; leftovers mean
/// the device table and the session manifest disagree.
fn substitute_template(
    template: &str,
    materialized: &[(String, PathBuf)],
) -> Result<Vec<String>, FlashError> {
    let mut args = Vec::new();
    for token in template.split_whitespace() {
        let mut arg = token.to_string();
        for (name, path) in materialized {
            let placeholder = format!("{{{name}}}");
            if arg.contains(&placeholder) {
                arg = arg.replace(&placeholder, &path.to_string_lossy());
            }
        }
        if arg.contains('{') && arg.contains('}') {
            return Err(FlashError::Template(token.to_string()));
        }
        args.push(arg);
    }
    Ok(args)
}

/// Private staging directory under the system temp path. Files carry a
/// random component next to the logical name and are created with
/// exclusive access.
struct StagingDir {
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl StagingDir {
    fn create() -> Result<Self, FlashError> {
        let suffix: [u8; 8] = flashlock_crypto::generate_random_bytes();
        let dir = std::env::temp_dir().join(format!(
            "flashlock-{}-{}",
            std::process::id(),
            hex::encode(suffix)
        ));
        std::fs::create_dir_all(&dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(Self {
            dir,
            files: Vec::new(),
        })
    }

    fn materialize(&mut self, name: &str, buffer: &SecretBytes) -> Result<PathBuf, FlashError> {
        let unique: [u8; 8] = flashlock_crypto::generate_random_bytes();
        let path = self.dir.join(format!("{}-{name}", hex::encode(unique)));

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&path)?;
        self.files.push(path.clone());
        file.write_all(buffer.as_slice())?;
        file.sync_all()?;
        Ok(path)
    }

    /// Overwrite every staged file with random bytes `passes` times,
    /// flushing between passes, then unlink. A file whose secure
    /// overwrite fails is still unlinked.
    fn scrub(&mut self, passes: u32) {
        for path in self.files.drain(..) {
            if let Err(error) = secure_erase(&path, passes) {
                tracing::warn!(
                    path = %path.display(),
                    %error,
                    "Secure overwrite failed; falling back to plain unlink"
                );
                let _ = std::fs::remove_file(&path);
            }
        }
        let _ = std::fs::remove_dir(&self.dir);
    }
}

fn secure_erase(path: &Path, passes: u32) -> std::io::Result<()> {
    let length = std::fs::metadata(path)?.len();
    let mut file = std::fs::OpenOptions::new().write(true).open(path)?;
    let mut scratch = vec![0u8; 64 * 1024];

    for _ in 0..passes {
        file.seek(SeekFrom::Start(0))?;
        let mut remaining = length;
        while remaining > 0 {
            let span = remaining.min(scratch.len() as u64) as usize;
            rand::rngs::OsRng.fill_bytes(&mut scratch[..span]);
            file.write_all(&scratch[..span])?;
            remaining -= span as u64;
        }
        file.sync_all()?;
    }

    scratch.zeroize();
    drop(file);
    std::fs::remove_file(path)
}
