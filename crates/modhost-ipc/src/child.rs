use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use modhost_core::{KernelError, Logger, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex as AsyncMutex};

use crate::key::ChildKey;
use crate::wire::{is_ready_frame, RequestFrame, ResponseFrame};

/// What to spawn: the language loader builds this, the IPC manager owns
/// the resulting process and its streams.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl SpawnSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

enum Outcome {
    Result(serde_json::Value),
    Remote(String),
}

/// A running child process and the correlation table for requests awaiting
/// a response (spec.md §4.3's request/response lifecycle).
pub struct ChildHandle {
    key: ChildKey,
    stdin: AsyncMutex<tokio::process::ChildStdin>,
    pending: DashMap<i64, oneshot::Sender<Outcome>>,
    next_id: AtomicI64,
    dead: AtomicBool,
}

impl ChildHandle {
    /// Spawn the child, wait for its readiness handshake, and start the
    /// stdout/stderr tasks. `on_death` fires exactly once, when the reader
    /// task observes the child's stdout close or a read error.
    pub async fn spawn(
        key: ChildKey,
        spec: SpawnSpec,
        logger: Logger,
        startup_timeout: Duration,
        on_death: impl FnOnce(ChildKey) + Send + 'static,
    ) -> Result<Arc<ChildHandle>> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }

        let mut child: Child = command.spawn()?;
        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let mut stdout_lines = BufReader::new(stdout).lines();
        let ready = tokio::time::timeout(startup_timeout, async {
            loop {
                match stdout_lines.next_line().await {
                    Ok(Some(line)) if is_ready_frame(&line) => return true,
                    Ok(Some(_)) => continue,
                    _ => return false,
                }
            }
        })
        .await;

        match ready {
            Ok(true) => {}
            _ => {
                let _ = child.start_kill();
                return Err(KernelError::IpcStartupTimeout {
                    module: key.module_name.clone(),
                    elapsed_ms: startup_timeout.as_millis() as u64,
                });
            }
        }

        let handle = Arc::new(ChildHandle {
            key: key.clone(),
            stdin: AsyncMutex::new(stdin),
            pending: DashMap::new(),
            next_id: AtomicI64::new(1),
            dead: AtomicBool::new(false),
        });

        spawn_stdout_reader(Arc::clone(&handle), stdout_lines, key.clone(), on_death);
        spawn_stderr_forwarder(stderr, logger);

        Ok(handle)
    }

    pub fn key(&self) -> &ChildKey {
        &self.key
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    /// Issue one request and await its matching response, or a timeout /
    /// channel-closed error (spec.md §4.3 steps 2-5).
    pub async fn call(
        &self,
        method: &str,
        args: Vec<serde_json::Value>,
        deadline: Duration,
    ) -> Result<serde_json::Value> {
        if self.is_dead() {
            return Err(KernelError::IpcChannelClosed {
                module: self.key.module_name.clone(),
                id: None,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let frame = RequestFrame {
            id,
            method: method.to_string(),
            args,
        };
        let mut line = serde_json::to_vec(&frame)?;
        line.push(b'\n');

        {
            let mut stdin = self.stdin.lock().await;
            if let Err(err) = stdin.write_all(&line).await {
                self.pending.remove(&id);
                return Err(KernelError::Io(err));
            }
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(Outcome::Result(value))) => Ok(value),
            Ok(Ok(Outcome::Remote(message))) => Err(KernelError::IpcRemoteError {
                module: self.key.module_name.clone(),
                id,
                message,
            }),
            Ok(Err(_)) => Err(KernelError::IpcChannelClosed {
                module: self.key.module_name.clone(),
                id: Some(id),
            }),
            Err(_) => {
                self.pending.remove(&id);
                Err(KernelError::IpcTimeout {
                    module: self.key.module_name.clone(),
                    id,
                    elapsed_ms: deadline.as_millis() as u64,
                })
            }
        }
    }

    /// Complete every pending waiter with `IPC_CHANNEL_CLOSED` (invariant
    /// I5, property B2).
    fn fail_all_pending(&self) {
        self.dead.store(true, Ordering::SeqCst);
        let keys: Vec<i64> = self.pending.iter().map(|e| *e.key()).collect();
        for id in keys {
            if let Some((_, tx)) = self.pending.remove(&id) {
                // Dropping `tx` without sending completes the receiver with
                // a RecvError, which `call` maps to `IPC_CHANNEL_CLOSED`.
                drop(tx);
            }
        }
    }
}

fn spawn_stdout_reader(
    handle: Arc<ChildHandle>,
    mut lines: tokio::io::Lines<BufReader<tokio::process::ChildStdout>>,
    key: ChildKey,
    on_death: impl FnOnce(ChildKey) + Send + 'static,
) {
    tokio::spawn(async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Ok(response) = serde_json::from_str::<ResponseFrame>(&line) {
                        if let Some((_, tx)) = handle.pending.remove(&response.id) {
                            let outcome = if response.ok {
                                Outcome::Result(response.result)
                            } else {
                                Outcome::Remote(response.error.unwrap_or_default())
                            };
                            let _ = tx.send(outcome);
                        }
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
        handle.fail_all_pending();
        on_death(key);
    });
}

fn spawn_stderr_forwarder(
    stderr: tokio::process::ChildStderr,
    logger: Logger,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            logger.emit_child_log_line(&line);
        }
    });
}
