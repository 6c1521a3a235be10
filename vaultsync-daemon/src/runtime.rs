use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::Instant;

use vaultsync_core::{settings, VaultConfig, VaultName};
use vaultsync_git::pipeline::{self, SyncReport, SyncScope};
use vaultsync_git::{GitRunner, SystemGit, VaultEntry};

use crate::error::{io_err, DaemonError};
use crate::log_rotation::{self, RotationPolicy};
use crate::paths::{logs_dir, run_dir, socket_path, vaults_dir, DEBOUNCE_WINDOW};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::scheduler::Scheduler;

/// Registered vaults as last read from disk.
pub type VaultCache = HashMap<VaultName, VaultConfig>;

/// Outcome of the most recent daemon-run sync, per vault name.
pub type SyncHistory = HashMap<String, SyncRecord>;

#[derive(Debug, Clone, Serialize)]
pub struct SyncRecord {
    pub finished_at_unix: u64,
    pub source: String,
    pub ok: bool,
    /// Report summary on success, error message on failure.
    pub message: String,
}

struct SyncJob {
    vault: VaultName,
    scope: SyncScope,
    source: &'static str,
    /// `None` for timer jobs, which nobody waits on.
    respond_to: Option<oneshot::Sender<Result<SyncReport, String>>>,
}

/// Front door of the sync processor.
///
/// Timer ticks go through [`SyncQueue::submit_background`], which drops a
/// tick when the same vault already has a sync queued or running.
#[derive(Clone)]
pub struct SyncQueue {
    tx: mpsc::Sender<SyncJob>,
    pending: Arc<Mutex<HashSet<VaultName>>>,
}

impl SyncQueue {
    fn new(tx: mpsc::Sender<SyncJob>) -> Self {
        Self {
            tx,
            pending: Arc::default(),
        }
    }

    /// Queue a whole-vault sync unless one is already pending.
    /// Returns whether a job was queued.
    pub fn submit_background(&self, vault: &VaultName, source: &'static str) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if !pending.insert(vault.clone()) {
            tracing::debug!(vault = %vault, source, "sync already pending, skipping trigger");
            return false;
        }
        let job = SyncJob {
            vault: vault.clone(),
            scope: SyncScope::Vault,
            source,
            respond_to: None,
        };
        if let Err(err) = self.tx.try_send(job) {
            pending.remove(vault);
            tracing::warn!(vault = %vault, error = %err, "could not queue sync");
            return false;
        }
        true
    }

    /// Queue a sync and wait for its report.
    async fn submit(
        &self,
        vault: VaultName,
        scope: SyncScope,
        source: &'static str,
    ) -> Result<SyncReport, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(SyncJob {
                vault,
                scope,
                source,
                respond_to: Some(tx),
            })
            .await
            .map_err(|_| DaemonError::ChannelClosed("sync queue"))?;
        rx.await
            .map_err(|_| DaemonError::ChannelClosed("sync response"))?
            .map_err(DaemonError::Protocol)
    }

    fn finished(&self, vault: &VaultName) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(vault);
    }
}

/// State shared by the socket server and the processor.
#[derive(Clone)]
struct Shared {
    home: PathBuf,
    cache: Arc<RwLock<VaultCache>>,
    history: Arc<RwLock<SyncHistory>>,
    queue: SyncQueue,
    reload_tx: mpsc::Sender<()>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    ensure_runtime_dirs(home)?;
    crate::logging::init_tracing(home);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon with the system `git`.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    run_with_runner(home, Arc::new(SystemGit::default())).await
}

/// Run the daemon until a `stop` request, ctrl-c or SIGTERM.
pub async fn run_with_runner(
    home: PathBuf,
    runner: Arc<dyn GitRunner>,
) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let cache = Arc::new(RwLock::new(load_vault_cache(&home)?));
    let (sync_tx, sync_rx) = mpsc::channel::<SyncJob>(64);
    let (reload_tx, reload_rx) = mpsc::channel::<()>(1);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let shared = Shared {
        home: home.clone(),
        cache,
        history: Arc::new(RwLock::new(SyncHistory::new())),
        queue: SyncQueue::new(sync_tx),
        reload_tx,
        shutdown_tx: shutdown_tx.clone(),
        started_at_unix: unix_seconds_now(),
    };
    tracing::info!(home = %home.display(), "vaultsync daemon starting");

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let dir = vaults_dir(&home);
        let reload_tx = shared.reload_tx.clone();
        tokio::spawn(async move {
            let result = watcher_task(dir, reload_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let scheduler_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        tokio::spawn(async move {
            let result = scheduler_task(shared, reload_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        tokio::spawn(async move {
            let result = sync_processor_task(shared, runner, sync_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        tokio::spawn(async move {
            let result = socket_server_task(shared, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(home, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move { signal_task(shutdown).await })
    };

    let (watcher, scheduler, processor, socket, rotation, signal) = tokio::join!(
        watcher_handle,
        scheduler_handle,
        processor_handle,
        socket_handle,
        rotation_handle,
        signal_handle
    );

    handle_join("watcher", watcher)?;
    handle_join("scheduler", scheduler)?;
    handle_join("sync_processor", processor)?;
    handle_join("socket_server", socket)?;
    handle_join("log_rotation", rotation)?;
    handle_join("signal_handler", signal)?;
    tracing::info!("vaultsync daemon stopped");
    Ok(())
}

/// Watch the settings directory and request a reload when a vault's
/// settings file changes.
async fn watcher_task(
    vaults: PathBuf,
    reload_tx: mpsc::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    if !vaults.exists() {
        fs::create_dir_all(&vaults).map_err(|e| io_err(&vaults, e))?;
    }
    // Events arrive with real paths (e.g. /private/var/... on macOS).
    let vaults = fs::canonicalize(&vaults).unwrap_or(vaults);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&vaults, RecursiveMode::NonRecursive)?;
    tracing::debug!(path = %vaults.display(), "watching vault settings");

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }

                let changed = event.paths.iter().any(|path| {
                    is_settings_file(path, &vaults)
                        && should_process_event(&mut debounce, path, Instant::now())
                });
                if changed {
                    // A full channel already holds a pending reload.
                    let _ = reload_tx.try_send(());
                }
            }
        }
    }

    Ok(())
}

/// Own one [`Scheduler`] per auto-syncing vault; re-arm on every reload.
async fn scheduler_task(
    shared: Shared,
    mut reload_rx: mpsc::Receiver<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut schedulers = HashMap::<VaultName, Scheduler>::new();
    {
        let cache = shared.cache.read().await;
        rearm(&mut schedulers, &cache, &shared.queue);
    }

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            reload = reload_rx.recv() => {
                if reload.is_none() {
                    break;
                }
                match refresh_cache(&shared.home, &shared.cache).await {
                    Ok(()) => {
                        let cache = shared.cache.read().await;
                        rearm(&mut schedulers, &cache, &shared.queue);
                    }
                    Err(err) => tracing::error!(error = %err, "settings reload failed"),
                }
            }
        }
    }

    for scheduler in schedulers.values_mut() {
        scheduler.stop();
    }
    Ok(())
}

/// Auto-sync period of a vault, or `None` when it should not be scheduled.
fn auto_sync_period(config: &VaultConfig) -> Option<Duration> {
    let settings = &config.settings;
    if !settings.auto_sync_enabled || !settings.has_url() {
        return None;
    }
    Some(Duration::from_secs(u64::from(settings.auto_sync_interval) * 60))
}

/// Bring `schedulers` in line with `cache`: start missing timers, restart
/// timers whose period changed, stop timers of vaults that no longer
/// auto-sync. Unchanged timers keep running.
fn rearm(schedulers: &mut HashMap<VaultName, Scheduler>, cache: &VaultCache, queue: &SyncQueue) {
    schedulers.retain(|name, _| cache.get(name).and_then(auto_sync_period).is_some());

    for (name, config) in cache {
        let Some(period) = auto_sync_period(config) else {
            continue;
        };
        let scheduler = schedulers.entry(name.clone()).or_default();
        if scheduler.is_running() && scheduler.period() == Some(period) {
            continue;
        }
        let queue = queue.clone();
        let vault = name.clone();
        scheduler.start(period, move || {
            queue.submit_background(&vault, "timer");
        });
        tracing::info!(vault = %name, minutes = period.as_secs() / 60, "auto-sync armed");
    }
}

async fn sync_processor_task(
    shared: Shared,
    runner: Arc<dyn GitRunner>,
    mut sync_rx: mpsc::Receiver<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = sync_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let SyncJob { vault, scope, source, respond_to } = job;
                let coalesced = respond_to.is_none();

                let home = shared.home.clone();
                let runner = runner.clone();
                let name = vault.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    pipeline::run(&home, runner.as_ref(), &name, scope)
                })
                .await;
                // A panicking sync fails that job only.
                let result: Result<SyncReport, String> = match joined {
                    Ok(outcome) => outcome.map_err(|err| err.to_string()),
                    Err(err) => Err(format!("sync task failed: {err}")),
                };

                if coalesced {
                    shared.queue.finished(&vault);
                }

                let record = match &result {
                    Ok(report) => {
                        tracing::info!(
                            vault = %vault,
                            source,
                            duration_ms = report.duration_ms,
                            "{}",
                            report.summary()
                        );
                        SyncRecord {
                            finished_at_unix: unix_seconds_now(),
                            source: source.to_string(),
                            ok: true,
                            message: report.summary(),
                        }
                    }
                    Err(message) => {
                        tracing::error!(vault = %vault, source, error = %message, "sync failed");
                        SyncRecord {
                            finished_at_unix: unix_seconds_now(),
                            source: source.to_string(),
                            ok: false,
                            message: message.clone(),
                        }
                    }
                };
                shared.history.write().await.insert(vault.to_string(), record);

                if let Some(respond_to) = respond_to {
                    let _ = respond_to.send(result);
                }
            }
        }
    }

    Ok(())
}

async fn socket_server_task(
    shared: Shared,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&shared.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let shared = shared.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, shared).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(stream: UnixStream, shared: Shared) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let stop = request.cmd == "stop";
        let response = dispatch(&shared, request).await;
        write_response(&mut writer, &response).await?;
        if stop {
            break;
        }
    }

    Ok(())
}

async fn dispatch(shared: &Shared, request: DaemonRequest) -> DaemonResponse {
    match request.cmd.as_str() {
        "status" => DaemonResponse::ok(build_status_payload(shared).await),
        "sync" => match handle_sync(shared, request.vault, request.path).await {
            Ok(payload) => DaemonResponse::ok(payload),
            Err(err) => DaemonResponse::error(err.to_string()),
        },
        "reload" => {
            let _ = shared.reload_tx.try_send(());
            DaemonResponse::ok(json!({ "reloading": true }))
        }
        "stop" => {
            let _ = shared.shutdown_tx.send(());
            DaemonResponse::ok(json!({ "stopping": true }))
        }
        other => DaemonResponse::error(format!("unknown command '{other}'")),
    }
}

/// Sync one vault (optionally one path inside it), or every vault that has
/// a URL configured when no vault is named.
async fn handle_sync(
    shared: &Shared,
    vault: Option<String>,
    path: Option<String>,
) -> Result<Value, DaemonError> {
    refresh_cache(&shared.home, &shared.cache).await?;

    let Some(vault) = vault else {
        let names: Vec<VaultName> = {
            let cache = shared.cache.read().await;
            let mut names: Vec<_> = cache
                .values()
                .filter(|config| config.settings.has_url())
                .map(|config| config.name.clone())
                .collect();
            names.sort();
            names
        };
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            let entry = match shared.queue.submit(name.clone(), SyncScope::Vault, "socket").await {
                Ok(report) => json!({ "vault": name.as_str(), "ok": true, "report": report }),
                Err(err) => json!({ "vault": name.as_str(), "ok": false, "error": err.to_string() }),
            };
            results.push(entry);
        }
        return Ok(json!({ "results": results }));
    };

    let name = VaultName::from(vault);
    let config = shared
        .cache
        .read()
        .await
        .get(&name)
        .cloned()
        .ok_or_else(|| DaemonError::UnknownVault(name.to_string()))?;

    let scope = match path {
        Some(path) => SyncScope::Entry(VaultEntry::from_fs(&config.path, Path::new(&path))?),
        None => SyncScope::Vault,
    };
    let report = shared.queue.submit(name, scope, "socket").await?;
    Ok(json!(report))
}

async fn build_status_payload(shared: &Shared) -> Value {
    let configs: Vec<VaultConfig> = {
        let cache = shared.cache.read().await;
        let mut configs: Vec<_> = cache.values().cloned().collect();
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        configs
    };
    let history = shared.history.read().await.clone();

    let vaults: Vec<Value> = configs
        .iter()
        .map(|config| {
            json!({
                "name": config.name.as_str(),
                "path": config.path.display().to_string(),
                "branch": config.branch().as_str(),
                "auto_sync": auto_sync_period(config).is_some(),
                "interval_minutes": config.settings.auto_sync_interval,
                "last_sync_time": config.settings.last_sync_time,
                "last_result": history.get(config.name.as_str()),
            })
        })
        .collect();

    json!({
        "running": true,
        "pid": std::process::id(),
        "started_at_unix": shared.started_at_unix,
        "vaults": vaults,
        "socket": socket_path(&shared.home).display().to_string(),
    })
}

async fn refresh_cache(home: &Path, cache: &RwLock<VaultCache>) -> Result<(), DaemonError> {
    let home = home.to_path_buf();
    let refreshed = tokio::task::spawn_blocking(move || load_vault_cache(&home))
        .await
        .map_err(|err| DaemonError::Protocol(format!("cache refresh join error: {err}")))??;
    *cache.write().await = refreshed;
    Ok(())
}

fn load_vault_cache(home: &Path) -> Result<VaultCache, DaemonError> {
    Ok(settings::list_at(home)?
        .into_iter()
        .map(|config| (config.name.clone(), config))
        .collect())
}

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(log_rotation::CHECK_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                // Failures are logged inside rotate_logs.
                let _ = tokio::task::spawn_blocking(move || {
                    log_rotation::rotate_logs(&home, RotationPolicy::default());
                })
                .await;
            }
        }
    }
    Ok(())
}

async fn signal_task(shutdown: broadcast::Sender<()>) -> Result<(), DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut shutdown_rx = shutdown.subscribe();
    let mut terminate = signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM handler", e))?;
    tokio::select! {
        _ = shutdown_rx.recv() => return Ok(()),
        result = tokio::signal::ctrl_c() => {
            result.map_err(|err| DaemonError::Protocol(format!("ctrl-c handler failed: {err}")))?;
            tracing::info!("received ctrl-c, shutting down daemon");
        }
        _ = terminate.recv() => {
            tracing::info!("received SIGTERM, shutting down daemon");
        }
    }
    let _ = shutdown.send(());
    Ok(())
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

fn is_settings_file(path: &Path, vaults: &Path) -> bool {
    path.parent() == Some(vaults)
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml"))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    if StdUnixStream::connect(socket).is_ok() {
        return Err(DaemonError::Protocol(format!(
            "daemon socket already in use: {}",
            socket.display()
        )));
    }
    tracing::warn!(socket = %socket.display(), "removing stale daemon socket before bind");

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [vaults_dir(home), run_dir(home), logs_dir(home)] {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    writer
        .write_all(&payload)
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}
