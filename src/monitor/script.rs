//! Event-hook command rendering and execution.
//!
//! On a role transition the monitor renders the configured command
//! template, substituting `$TOKEN` placeholders from its view of the
//! cluster, and hands the result to a runner thread. The runner spawns
//! the command with a timeout so a hung or crashing hook never delays a
//! monitor tick.

use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::observability::{Logger, MetricsRegistry};
use crate::server::Backend;

use super::events::MonitorEvent;

/// Substitution context: the transitioning backend and the monitor's
/// server list at dispatch time.
pub struct HookContext<'a> {
    pub event: MonitorEvent,
    pub initiator: &'a Backend,
    pub servers: &'a [Arc<Backend>],
    /// Monitor-wide probe credentials, used by `$CREDENTIALS` unless a
    /// backend carries an override.
    pub default_user: &'a str,
    pub default_password: &'a str,
}

/// A rendered command plus the tokens the renderer did not recognize.
#[derive(Debug, PartialEq, Eq)]
pub struct RenderedCommand {
    pub command: String,
    pub unknown_tokens: Vec<String>,
}

/// Substitute every known `$TOKEN` in the template. Unknown tokens are
/// left literal and reported so the caller can log them once.
pub fn render_command(template: &str, ctx: &HookContext<'_>) -> RenderedCommand {
    let mut out = String::with_capacity(template.len() + 64);
    let mut unknown = Vec::new();
    let mut rest = template;

    while let Some(dollar) = rest.find('$') {
        out.push_str(&rest[..dollar]);
        rest = &rest[dollar..];

        let token_len = rest[1..]
            .find(|c: char| !(c.is_ascii_uppercase() || c == '_'))
            .map(|p| p + 1)
            .unwrap_or(rest.len());
        let token = &rest[..token_len];

        match substitute(token, ctx) {
            Some(value) => out.push_str(&value),
            None => {
                out.push_str(token);
                if token.len() > 1 && !unknown.contains(&token.to_string()) {
                    unknown.push(token.to_string());
                }
            }
        }
        rest = &rest[token_len..];
    }
    out.push_str(rest);

    RenderedCommand {
        command: out,
        unknown_tokens: unknown,
    }
}

fn substitute(token: &str, ctx: &HookContext<'_>) -> Option<String> {
    match token {
        "$INITIATOR" => Some(ctx.initiator.endpoint()),
        "$EVENT" => Some(ctx.event.name().to_string()),
        "$PARENT" => Some(parent_endpoint(ctx)),
        "$CHILDREN" => Some(child_endpoints(ctx)),
        "$NODELIST" => Some(endpoints(ctx.servers, |b| b.status().is_running())),
        "$LIST" => Some(endpoints(ctx.servers, |_| true)),
        "$MASTERLIST" => Some(endpoints(ctx.servers, |b| b.status().is_master())),
        "$SLAVELIST" => Some(endpoints(ctx.servers, |b| b.status().is_slave())),
        "$SYNCEDLIST" => Some(endpoints(ctx.servers, |b| {
            b.status().contains(crate::server::StatusFlags::JOINED)
        })),
        "$CREDENTIALS" => Some(credential_list(ctx)),
        _ => None,
    }
}

fn endpoints(servers: &[Arc<Backend>], keep: impl Fn(&Backend) -> bool) -> String {
    servers
        .iter()
        .filter(|b| keep(b))
        .map(|b| b.endpoint())
        .collect::<Vec<_>>()
        .join(",")
}

/// Endpoint of the node the initiator replicates from, when known.
fn parent_endpoint(ctx: &HookContext<'_>) -> String {
    let master_id = ctx.initiator.master_id();
    if master_id <= 0 {
        return String::new();
    }
    ctx.servers
        .iter()
        .find(|b| b.node_id() == master_id)
        .map(|b| b.endpoint())
        .unwrap_or_default()
}

/// Endpoints of the nodes replicating from the initiator.
fn child_endpoints(ctx: &HookContext<'_>) -> String {
    let node_id = ctx.initiator.node_id();
    if node_id <= 0 {
        return String::new();
    }
    endpoints(ctx.servers, |b| b.master_id() == node_id)
}

fn credential_list(ctx: &HookContext<'_>) -> String {
    ctx.servers
        .iter()
        .map(|b| {
            let (user, password) = match b.probe_credentials() {
                Some(c) => (c.user, c.password),
                None => (
                    ctx.default_user.to_string(),
                    ctx.default_password.to_string(),
                ),
            };
            format!("{}:{}@{}", user, password, b.endpoint())
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// One queued hook invocation.
#[derive(Debug)]
pub struct HookJob {
    pub monitor: String,
    pub backend: String,
    pub event: &'static str,
    pub command: String,
    pub timeout: Duration,
}

/// Dedicated worker that executes hook commands off the monitor thread.
pub struct EventHookRunner {
    tx: Option<Sender<HookJob>>,
    worker: Option<JoinHandle<()>>,
}

impl EventHookRunner {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        let (tx, rx) = mpsc::channel::<HookJob>();
        let worker = thread::Builder::new()
            .name("event-hook-runner".to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    execute_hook(&job, &metrics);
                }
            })
            .ok();

        Self {
            tx: Some(tx),
            worker,
        }
    }

    /// Queue a hook. Never blocks; a runner that failed to start drops
    /// the job with an error log.
    pub fn enqueue(&self, job: HookJob) {
        let queued = self
            .tx
            .as_ref()
            .map(|tx| tx.send(job).is_ok())
            .unwrap_or(false);
        if !queued {
            Logger::error("HOOK_RUNNER_UNAVAILABLE", &[]);
        }
    }

    /// Drain queued hooks and join the worker.
    pub fn stop(&mut self) {
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for EventHookRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn execute_hook(job: &HookJob, metrics: &MetricsRegistry) {
    let argv: Vec<&str> = job.command.split_whitespace().collect();
    let Some((program, args)) = argv.split_first() else {
        Logger::error(
            "HOOK_EMPTY_COMMAND",
            &[("monitor", &job.monitor), ("event", job.event)],
        );
        return;
    };

    metrics.increment_hooks_launched();

    let spawned = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            metrics.increment_hook_failures();
            Logger::error(
                "HOOK_SPAWN_FAILED",
                &[
                    ("backend", &job.backend),
                    ("command", program),
                    ("error", &e.to_string()),
                    ("event", job.event),
                    ("monitor", &job.monitor),
                ],
            );
            return;
        }
    };

    let deadline = Instant::now() + job.timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if status.success() {
                    Logger::info(
                        "HOOK_EXECUTED",
                        &[
                            ("backend", &job.backend),
                            ("command", &job.command),
                            ("event", job.event),
                            ("monitor", &job.monitor),
                        ],
                    );
                } else {
                    metrics.increment_hook_failures();
                    Logger::error(
                        "HOOK_NONZERO_EXIT",
                        &[
                            ("backend", &job.backend),
                            ("command", program),
                            ("event", job.event),
                            ("exit", &status.code().map_or("signal".to_string(), |c| c.to_string())),
                            ("monitor", &job.monitor),
                        ],
                    );
                }
                return;
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    metrics.increment_hook_failures();
                    Logger::error(
                        "HOOK_TIMEOUT",
                        &[
                            ("backend", &job.backend),
                            ("command", program),
                            ("event", job.event),
                            ("monitor", &job.monitor),
                            ("timeout_secs", &job.timeout.as_secs().to_string()),
                        ],
                    );
                    return;
                }
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                metrics.increment_hook_failures();
                Logger::error(
                    "HOOK_WAIT_FAILED",
                    &[
                        ("backend", &job.backend),
                        ("error", &e.to_string()),
                        ("event", job.event),
                        ("monitor", &job.monitor),
                    ],
                );
                return;
            }
        }
    }
}
