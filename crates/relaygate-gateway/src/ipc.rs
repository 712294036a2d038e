//! Adapter process management and request/response IPC.
//!
//! Each installed adapter runs as one warm child process speaking
//! newline-delimited JSON over stdin/stdout. Requests carry a correlation
//! id; a background reader task demultiplexes responses to waiting
//! callers, so responses may arrive out of order without cross-talk. A
//! per-process semaphore bounds in-flight calls (one by default, which
//! serializes the adapter).
//!
//! Timeouts are fatal to the process: a late response after the caller
//! gave up must not be delivered to a later request, so the process is
//! killed and respawned on next use.

use crate::error::{GatewayError, GatewayResult};
use crate::registry::AdapterManifest;
use dashmap::DashMap;
use relaygate_proto::{
    decode_line, encode_line, AdapterRequest, AdapterResponse, IpcMessage, IpcMessageKind,
};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle state of an adapter process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Starting,
    Ready,
    Busy,
    Dead,
}

type PendingMap = DashMap<String, oneshot::Sender<GatewayResult<AdapterResponse>>>;

/// One live adapter child process.
struct AdapterProcess {
    name: String,
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    /// Correlation id -> waiting caller.
    pending: Arc<PendingMap>,
    /// Bounds in-flight calls on this process.
    permits: Semaphore,
    state: std::sync::Mutex<ProcessState>,
    last_activity: std::sync::Mutex<Instant>,
}

impl AdapterProcess {
    fn state(&self) -> ProcessState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: ProcessState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        // Dead is terminal.
        if *state != ProcessState::Dead {
            *state = next;
        }
    }

    fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    /// Mark dead, fail every waiting caller, and kill the child.
    async fn mark_dead(&self, reason: &str) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state == ProcessState::Dead {
                return;
            }
            *state = ProcessState::Dead;
        }
        let ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(GatewayError::IpcProtocolError {
                    adapter: self.name.clone(),
                    reason: reason.to_string(),
                }));
            }
        }
        let mut child = self.child.lock().await;
        if let Err(e) = child.kill().await {
            debug!(adapter = %self.name, error = %e, "Kill after mark_dead failed");
        }
    }
}

type ProcessPool = Arc<DashMap<String, Arc<AdapterProcess>>>;

/// Tracks one in-flight call. Always removes the pending entry on drop;
/// while armed, a drop additionally means the caller stopped waiting
/// mid-call, so the process is evicted and killed rather than left to
/// finish unobserved.
struct CallGuard {
    process: Arc<AdapterProcess>,
    pool: ProcessPool,
    id: String,
    armed: bool,
}

impl CallGuard {
    /// The call completed (or failed) in an observed way; a later drop is
    /// ordinary cleanup.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.process.pending.remove(&self.id);
        if self.armed {
            self.pool
                .remove_if(&self.process.name, |_, p| Arc::ptr_eq(p, &self.process));
            let process = Arc::clone(&self.process);
            tokio::spawn(async move {
                process.mark_dead("caller cancelled mid-call").await;
            });
        }
    }
}

/// Spawns, pools and talks to adapter processes.
pub struct IpcHandler {
    processes: ProcessPool,
    /// Serializes cold spawns per adapter so concurrent first calls share
    /// one process.
    spawn_locks: DashMap<String, Arc<Mutex<()>>>,
    max_inflight: usize,
    shutdown_grace: Duration,
}

impl IpcHandler {
    pub fn new(max_inflight: usize, shutdown_grace: Duration) -> Self {
        Self {
            processes: Arc::new(DashMap::new()),
            spawn_locks: DashMap::new(),
            max_inflight: max_inflight.max(1),
            shutdown_grace,
        }
    }

    /// Drop a process from the pool, but only the exact instance this
    /// call used; a replacement another caller spawned stays.
    fn evict(&self, process: &Arc<AdapterProcess>) {
        self.processes
            .remove_if(&process.name, |_, p| Arc::ptr_eq(p, process));
    }

    /// Send one request to the adapter and wait for its response, all
    /// within `deadline`. The deadline is absolute so a caller can spread
    /// one budget over several calls.
    pub async fn call(
        &self,
        manifest: &AdapterManifest,
        request: AdapterRequest,
        deadline: Instant,
    ) -> GatewayResult<AdapterResponse> {
        let method = request.method_name();
        let process = self.ensure_process(manifest).await?;

        let permit = tokio::time::timeout_at(deadline, process.permits.acquire())
            .await
            .map_err(|_| GatewayError::IpcTimeout {
                adapter: manifest.name.clone(),
                method: method.to_string(),
            })?
            .map_err(|_| GatewayError::IpcProtocolError {
                adapter: manifest.name.clone(),
                reason: "adapter process is shutting down".to_string(),
            })?;

        if process.state() == ProcessState::Dead {
            return Err(GatewayError::IpcProtocolError {
                adapter: manifest.name.clone(),
                reason: "adapter process died before the call".to_string(),
            });
        }

        let message = IpcMessage::request(request);
        let id = message.id.clone();
        let (tx, rx) = oneshot::channel();
        process.pending.insert(id.clone(), tx);
        let mut guard = CallGuard {
            process: Arc::clone(&process),
            pool: Arc::clone(&self.processes),
            id: id.clone(),
            armed: false,
        };

        let line = encode_line(&message).map_err(|e| GatewayError::IpcProtocolError {
            adapter: manifest.name.clone(),
            reason: format!("failed to encode request: {e}"),
        })?;

        process.set_state(ProcessState::Busy);
        // From the first stdin byte the request is in flight; if the caller
        // stops polling now, the guard kills the process rather than leaving
        // it to finish unobserved.
        guard.armed = true;
        {
            let mut stdin = process.stdin.lock().await;
            let written = async {
                stdin.write_all(line.as_bytes()).await?;
                stdin.flush().await
            }
            .await;
            if let Err(e) = written {
                drop(stdin);
                guard.disarm();
                process.mark_dead("stdin write failed").await;
                self.evict(&process);
                return Err(GatewayError::IpcProtocolError {
                    adapter: manifest.name.clone(),
                    reason: format!("stdin write failed: {e}"),
                });
            }
        }
        debug!(adapter = %manifest.name, method, request_id = %id, "Dispatched adapter request");

        let outcome = match tokio::time::timeout_at(deadline, rx).await {
            Err(_) => {
                guard.disarm();
                warn!(adapter = %manifest.name, method, "Adapter call timed out, killing process");
                process.mark_dead("call timed out").await;
                self.evict(&process);
                Err(GatewayError::IpcTimeout {
                    adapter: manifest.name.clone(),
                    method: method.to_string(),
                })
            }
            Ok(Err(_)) => {
                guard.disarm();
                self.evict(&process);
                Err(GatewayError::IpcProtocolError {
                    adapter: manifest.name.clone(),
                    reason: "adapter closed the channel mid-call".to_string(),
                })
            }
            Ok(Ok(result)) => {
                guard.disarm();
                result
            }
        };

        drop(permit);
        process.touch();
        if process.pending.is_empty() && process.state() == ProcessState::Busy {
            process.set_state(ProcessState::Ready);
        }
        outcome
    }

    /// Get the warm process for an adapter, spawning it if absent or dead.
    /// Spawns for one adapter are serialized so concurrent cold calls end
    /// up sharing a single process.
    async fn ensure_process(&self, manifest: &AdapterManifest) -> GatewayResult<Arc<AdapterProcess>> {
        if let Some(existing) = self.processes.get(&manifest.name) {
            if existing.state() != ProcessState::Dead {
                return Ok(Arc::clone(&existing));
            }
        }

        let lock = Arc::clone(
            &self
                .spawn_locks
                .entry(manifest.name.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );
        let _spawning = lock.lock().await;

        // Re-check under the lock; a racing caller may have spawned already.
        if let Some(existing) = self.processes.get(&manifest.name) {
            if existing.state() != ProcessState::Dead {
                return Ok(Arc::clone(&existing));
            }
        }
        self.processes.remove(&manifest.name);

        // One retry on spawn failure, then give up.
        let process = match self.spawn(manifest).await {
            Ok(p) => p,
            Err(first) => {
                warn!(adapter = %manifest.name, error = %first, "Spawn failed, retrying once");
                self.spawn(manifest)
                    .await
                    .map_err(|e| GatewayError::AdapterSpawnFailure {
                        adapter: manifest.name.clone(),
                        reason: e.to_string(),
                    })?
            }
        };
        self.processes
            .insert(manifest.name.clone(), Arc::clone(&process));
        Ok(process)
    }

    async fn spawn(&self, manifest: &AdapterManifest) -> std::io::Result<Arc<AdapterProcess>> {
        let mut command = Command::new(&manifest.launch.command);
        command
            .args(&manifest.launch.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for entry in &manifest.launch.env {
            if let Some((key, value)) = entry.split_once('=') {
                command.env(key, value);
            }
        }

        let mut child = command.spawn()?;
        let stdin = child.stdin.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "child stdin not captured")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "child stdout not captured")
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "child stderr not captured")
        })?;

        info!(adapter = %manifest.name, command = %manifest.launch.command, "Spawned adapter process");

        let process = Arc::new(AdapterProcess {
            name: manifest.name.clone(),
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            pending: Arc::new(DashMap::new()),
            permits: Semaphore::new(self.max_inflight),
            state: std::sync::Mutex::new(ProcessState::Starting),
            last_activity: std::sync::Mutex::new(Instant::now()),
        });

        // Drain stderr into the log.
        let stderr_name = manifest.name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(adapter = %stderr_name, "adapter stderr: {line}");
            }
        });

        // Demultiplex stdout lines to waiting callers.
        let reader_process = Arc::clone(&process);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match decode_line(&line) {
                            Ok(IpcMessage {
                                id,
                                kind: IpcMessageKind::Response(response),
                            }) => match reader_process.pending.remove(&id) {
                                Some((_, tx)) => {
                                    let _ = tx.send(Ok(response));
                                }
                                None => {
                                    debug!(adapter = %reader_process.name, request_id = %id,
                                        "Dropping response with no waiting caller");
                                }
                            },
                            Ok(IpcMessage { id, .. }) => {
                                warn!(adapter = %reader_process.name, request_id = %id,
                                    "Adapter sent a request frame, killing process");
                                reader_process
                                    .mark_dead("adapter sent a request frame on stdout")
                                    .await;
                                break;
                            }
                            Err(e) => {
                                warn!(adapter = %reader_process.name, error = %e,
                                    "Unparseable adapter output, killing process");
                                reader_process.mark_dead("unparseable stdout frame").await;
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        debug!(adapter = %reader_process.name, "Adapter stdout closed");
                        reader_process.mark_dead("adapter exited").await;
                        break;
                    }
                    Err(e) => {
                        warn!(adapter = %reader_process.name, error = %e, "Adapter stdout read error");
                        reader_process.mark_dead("stdout read error").await;
                        break;
                    }
                }
            }
        });

        process.set_state(ProcessState::Ready);
        Ok(process)
    }

    /// Current state of an adapter's process, if one is pooled.
    pub fn process_state(&self, adapter: &str) -> Option<ProcessState> {
        self.processes.get(adapter).map(|p| p.state())
    }

    /// Kill processes idle longer than `ttl`. Returns how many were
    /// reaped.
    pub async fn reap_idle(&self, ttl: Duration) -> usize {
        let mut reaped = Vec::new();
        for entry in self.processes.iter() {
            let process = entry.value();
            if process.pending.is_empty() && process.idle_for() > ttl {
                reaped.push(entry.key().clone());
            }
        }
        for name in &reaped {
            if let Some((_, process)) = self.processes.remove(name) {
                info!(adapter = %name, "Reaping idle adapter process");
                process.mark_dead("idle timeout").await;
            }
        }
        reaped.len()
    }

    /// Graceful shutdown: ask each adapter to exit, wait out the grace
    /// period, then kill whatever is left.
    pub async fn shutdown(&self) {
        let names: Vec<String> = self.processes.iter().map(|e| e.key().clone()).collect();
        for name in names {
            let Some((_, process)) = self.processes.remove(&name) else {
                continue;
            };
            let message = IpcMessage::request(AdapterRequest::Shutdown);
            if let Ok(line) = encode_line(&message) {
                let mut stdin = process.stdin.lock().await;
                let _ = stdin.write_all(line.as_bytes()).await;
                let _ = stdin.flush().await;
            }
            let mut child = process.child.lock().await;
            match tokio::time::timeout(self.shutdown_grace, child.wait()).await {
                Ok(Ok(status)) => {
                    info!(adapter = %name, %status, "Adapter exited");
                }
                Ok(Err(e)) => {
                    warn!(adapter = %name, error = %e, "Wait failed during shutdown");
                }
                Err(_) => {
                    warn!(adapter = %name, "Adapter ignored shutdown, killing");
                    let _ = child.kill().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LaunchSpec;
    use relaygate_codec::ServiceKind;
    use relaygate_proto::ProtocolKind;

    fn manifest(command: &str, args: &[&str]) -> AdapterManifest {
        AdapterManifest {
            name: "fake".to_string(),
            shortcode: 'f',
            service: ServiceKind::Test,
            protocol: ProtocolKind::Event,
            launch: LaunchSpec {
                command: command.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
                env: vec![],
            },
            capabilities: Default::default(),
            schema_version: 1,
        }
    }

    #[tokio::test]
    async fn spawn_failure_is_reported_after_retry() {
        let handler = IpcHandler::new(1, Duration::from_secs(1));
        let m = manifest("/nonexistent/adapter-binary", &[]);
        let deadline = Instant::now() + Duration::from_secs(2);
        let err = handler
            .call(&m, AdapterRequest::GetManifest, deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AdapterSpawnFailure { .. }));
        assert!(handler.process_state("fake").is_none());
    }

    #[tokio::test]
    async fn silent_adapter_times_out_and_process_is_dropped() {
        // `sleep` ignores stdin and writes nothing back.
        let handler = IpcHandler::new(1, Duration::from_secs(1));
        let m = manifest("sleep", &["10"]);
        let deadline = Instant::now() + Duration::from_millis(200);
        let err = handler
            .call(&m, AdapterRequest::GetManifest, deadline)
            .await
            .unwrap_err();
        match err {
            GatewayError::IpcTimeout { adapter, method } => {
                assert_eq!(adapter, "fake");
                assert_eq!(method, "get_manifest");
            }
            other => panic!("expected IpcTimeout, got {other:?}"),
        }
        assert!(handler.process_state("fake").is_none());
    }

    #[tokio::test]
    async fn request_frame_echo_is_a_protocol_error() {
        // `cat` echoes our request frame back verbatim. The reader treats
        // a request frame on stdout as a protocol violation.
        let handler = IpcHandler::new(1, Duration::from_secs(1));
        let m = manifest("cat", &[]);
        let deadline = Instant::now() + Duration::from_secs(5);
        let err = handler
            .call(&m, AdapterRequest::GetManifest, deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::IpcProtocolError { .. }));
    }
}
