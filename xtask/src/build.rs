use std::{
    ffi::OsString,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
    process::{ChildStdout, Command, ExitStatus, Stdio},
    sync::Arc,
};

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::{
    artifact::ArtifactRegistry,
    cancel::{CancelToken, SharedChild},
    config::{self, Firmware},
    error::{PipelineError, Result},
    event::{BuildEvent, EventStream},
};

/// How the compiler gets started: program, arguments, environment overlay on
/// top of the inherited environment, and working directory.
#[derive(Debug, Clone)]
pub struct CompilerInvocation {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub envs: Vec<(OsString, OsString)>,
    pub current_dir: PathBuf,
}

impl CompilerInvocation {
    pub fn firmware(root: &Path, firmware: Firmware) -> Self {
        // `cargo` from PATH (the rustup proxy): $CARGO points at a concrete
        // toolchain that does not understand `+nightly`.
        let args = [
            format!("+{}", config::TOOLCHAIN),
            "build".into(),
            "--target".into(),
            config::TARGET_TRIPLE.into(),
            "-r".into(),
            "-Z".into(),
            format!("build-std={}", config::BUILD_STD),
            "-Z".into(),
            format!("build-std-features={}", config::BUILD_STD_FEATURES),
            "--message-format".into(),
            config::MESSAGE_FORMAT.into(),
        ];

        Self {
            program: "cargo".into(),
            args: args.into_iter().map(OsString::from).collect(),
            envs: vec![("RUSTFLAGS".into(), firmware.rustflags().into())],
            current_dir: root.join(config::DUMPER_DIR),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .current_dir(&self.current_dir);
        command
    }
}

/// What the driver hands to the completion step.
#[derive(Debug)]
pub struct BuildOutcome {
    /// `success` flag of the build-finished message.
    pub success: bool,
    pub status: ExitStatus,
    pub target: String,
    pub artifact: Option<PathBuf>,
}

/// Why [`consume_events`] stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Finished { success: bool },
    Exhausted,
    Cancelled,
}

/// Feeds every line of `reader` through the parser and into `registry`,
/// stopping right after the first build-finished message.
pub fn consume_events<R: BufRead>(
    reader: R,
    registry: &mut ArtifactRegistry,
    cancel: &CancelToken,
) -> Result<StreamEnd> {
    let mut events = EventStream::new(reader);

    loop {
        let next = events.next();
        if cancel.is_cancelled() {
            return Ok(StreamEnd::Cancelled);
        }
        let Some(event) = next else {
            return Ok(StreamEnd::Exhausted);
        };

        let event = event?;
        registry.observe(&event)?;

        if let BuildEvent::BuildFinished { success } = event {
            debug!("build finished after {} messages", events.lines_read());
            return Ok(StreamEnd::Finished { success });
        }
    }
}

pub struct BuildDriver {
    invocation: CompilerInvocation,
    target: String,
}

impl BuildDriver {
    pub fn new(invocation: CompilerInvocation, target: impl Into<String>) -> Self {
        Self {
            invocation,
            target: target.into(),
        }
    }

    pub fn firmware(firmware: Firmware) -> Self {
        Self::new(
            CompilerInvocation::firmware(&config::project_root(), firmware),
            config::DUMPER_TARGET,
        )
    }

    /// Spawns the compiler once and follows its output until the build
    /// finishes.
    pub fn run(&self, cancel: &CancelToken) -> Result<BuildOutcome> {
        self.spawn()?.finish(cancel)
    }

    pub fn spawn(&self) -> Result<RunningBuild> {
        let program = self.invocation.program.to_string_lossy().into_owned();
        info!(
            "running {} {} in {}",
            program,
            self.invocation
                .args
                .iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" "),
            self.invocation.current_dir.display()
        );

        let mut child = self
            .invocation
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| PipelineError::ToolchainUnavailable {
                program: program.clone(),
                source,
            })?;
        let stdout = child.stdout.take();
        let child = Reaper(Arc::new(Mutex::new(child)));
        let stdout = stdout
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "compiler stdout not captured"))?;

        Ok(RunningBuild {
            child,
            stdout,
            program,
            target: self.target.clone(),
        })
    }
}

/// A spawned compiler whose output has not been consumed yet.
pub struct RunningBuild {
    child: Reaper,
    stdout: ChildStdout,
    program: String,
    target: String,
}

impl RunningBuild {
    pub fn finish(self, cancel: &CancelToken) -> Result<BuildOutcome> {
        let RunningBuild {
            child,
            stdout,
            program,
            target,
        } = self;

        let mut registry = ArtifactRegistry::new(target.as_str());
        // cancelling kills the compiler, which ends a blocked read with EOF
        cancel.attach(Arc::clone(&child.0));
        // stdout is closed when this returns, whatever is left unread
        let end = consume_events(BufReader::new(stdout), &mut registry, cancel);
        cancel.detach();

        match end? {
            StreamEnd::Finished { success } => {
                let status = child.wait()?;
                debug!("{} exited with {}", program, status);
                Ok(BuildOutcome {
                    success,
                    status,
                    target,
                    artifact: registry.into_resolved(),
                })
            }
            StreamEnd::Cancelled => {
                warn!("cancelled, stopping {}", program);
                child.stop();
                Err(PipelineError::Cancelled)
            }
            StreamEnd::Exhausted => {
                let status = child.wait()?;
                if cancel.is_cancelled() || interrupted(status) {
                    Err(PipelineError::Cancelled)
                } else {
                    Err(PipelineError::StreamEnded {
                        status: status.to_string(),
                    })
                }
            }
        }
    }
}

/// Kills and reaps the child unless it has already been waited on.
struct Reaper(SharedChild);

impl Reaper {
    fn wait(&self) -> io::Result<ExitStatus> {
        self.0.lock().wait()
    }

    fn stop(&self) {
        let mut child = self.0.lock();
        if let Ok(None) = child.try_wait() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(unix)]
fn interrupted(status: ExitStatus) -> bool {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use std::os::unix::process::ExitStatusExt;

    matches!(status.signal(), Some(SIGINT) | Some(SIGTERM))
}

#[cfg(not(unix))]
fn interrupted(_: ExitStatus) -> bool {
    false
}
