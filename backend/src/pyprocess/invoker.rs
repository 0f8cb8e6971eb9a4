use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::interpreter::InterpreterResolver;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

// Upper bound for collecting leftover output once the child is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    Script,
    Model,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Script => write!(f, "Classifier script"),
            Dependency::Model => write!(f, "Model file"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InvokerError {
    #[error("{kind} not found: {}", path.display())]
    MissingDependency { kind: Dependency, path: PathBuf },
    #[error("Failed to launch {}: {source}", interpreter.display())]
    Launch {
        interpreter: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed while waiting for the classifier: {0}")]
    Wait(#[source] std::io::Error),
}

/// Everything observed from one classifier run.
#[derive(Debug, Clone)]
pub struct ClassifierInvocation {
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    pub timed_out: bool,
}

#[derive(Clone, Debug)]
pub struct ClassifierInvoker {
    script_path: PathBuf,
    model_path: PathBuf,
    timeout: Duration,
    interpreter: Arc<InterpreterResolver>,
}

impl ClassifierInvoker {
    pub fn new(
        script_path: impl Into<PathBuf>,
        model_path: impl Into<PathBuf>,
        timeout: Duration,
        interpreter: InterpreterResolver,
    ) -> Self {
        Self {
            script_path: script_path.into(),
            model_path: model_path.into(),
            timeout,
            interpreter: Arc::new(interpreter),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interpreter(&self) -> &InterpreterResolver {
        &self.interpreter
    }

    pub fn check_dependencies(&self) -> Result<(), InvokerError> {
        if !self.script_path.exists() {
            return Err(InvokerError::MissingDependency {
                kind: Dependency::Script,
                path: self.script_path.clone(),
            });
        }
        if !self.model_path.exists() {
            return Err(InvokerError::MissingDependency {
                kind: Dependency::Model,
                path: self.model_path.clone(),
            });
        }
        Ok(())
    }

    /// Runs `<interpreter> <script> <image> <model>` and waits at most the
    /// configured timeout for it to exit. A child still running at the
    /// deadline is killed and reaped before returning, together with anything
    /// it spawned. Output is collected for at most `DRAIN_GRACE` after exit.
    pub async fn invoke(&self, image_path: &Path) -> Result<ClassifierInvocation, InvokerError> {
        self.check_dependencies()?;

        let interpreter = self.interpreter.resolve();
        log::info!(
            "🐍 Executing classifier: {} {} {} {}",
            interpreter.display(),
            self.script_path.display(),
            image_path.display(),
            self.model_path.display()
        );

        let started = Instant::now();
        let mut command = Command::new(&interpreter);
        command
            .arg(&self.script_path)
            .arg(image_path)
            .arg(&self.model_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // own group, so helpers the classifier forks can be killed with it
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                self.interpreter.invalidate();
            }
            InvokerError::Launch {
                interpreter: interpreter.clone(),
                source,
            }
        })?;

        // the classifier gets no input
        drop(child.stdin.take());

        let pid = child.id();
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let mut drains = Box::pin(async {
            let (out, err) = tokio::join!(
                drain(stdout_pipe.as_mut(), &mut stdout),
                drain(stderr_pipe.as_mut(), &mut stderr),
            );
            out.and(err)
        });
        let mut drained = None;

        // Only the child's own exit is bounded by the timeout. Pipes are
        // drained alongside so a chatty child never blocks on a full pipe.
        let waited = tokio::time::timeout(self.timeout, async {
            loop {
                tokio::select! {
                    status = child.wait() => break status,
                    result = &mut drains, if drained.is_none() => drained = Some(result),
                }
            }
        })
        .await;

        let (exit_code, timed_out) = match waited {
            Ok(Ok(status)) => {
                if kill_process_group(pid) {
                    log::warn!(
                        "Classifier {:?} exited but left processes behind, killed them",
                        pid
                    );
                }
                (status.code(), false)
            }
            Ok(Err(e)) => {
                kill_process_group(pid);
                return Err(InvokerError::Wait(e));
            }
            Err(_) => {
                log::error!(
                    "Classifier exceeded {}s, killing process {:?}",
                    self.timeout.as_secs_f64(),
                    pid
                );
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    log::error!("Failed to kill classifier process {:?}: {}", pid, e);
                }
                (None, true)
            }
        };

        if drained.is_none() {
            match tokio::time::timeout(DRAIN_GRACE, &mut drains).await {
                Ok(result) => drained = Some(result),
                Err(_) => log::warn!(
                    "Classifier {:?} output still open {}s after exit, keeping what was read",
                    pid,
                    DRAIN_GRACE.as_secs()
                ),
            }
        }
        drop(drains);

        match drained {
            Some(Err(e)) if !timed_out => return Err(InvokerError::Wait(e)),
            _ => {}
        }

        let invocation = ClassifierInvocation {
            pid,
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            elapsed: started.elapsed(),
            timed_out,
        };

        log::info!(
            "🔄 Classifier finished in {:.2}s: exit code {:?}, output length {}, stderr: {}",
            invocation.elapsed.as_secs_f64(),
            invocation.exit_code,
            invocation.stdout.len(),
            invocation.stderr.trim()
        );

        Ok(invocation)
    }
}

/// Sends SIGKILL to every process still in the classifier's group. Returns
/// whether anything was left to kill.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) -> bool {
    let Some(pgid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return false;
    };
    // SAFETY: kill(2) takes no pointers; a negative pid addresses the group.
    unsafe { libc::kill(-pgid, libc::SIGKILL) == 0 }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) -> bool {
    false
}

async fn drain<R>(pipe: Option<&mut R>, buf: &mut Vec<u8>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    match pipe {
        Some(pipe) => pipe.read_to_end(buf).await.map(|_| ()),
        None => Ok(()),
    }
}
