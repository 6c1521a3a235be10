use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use tempfile::TempDir;

fn vaultsync_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_vaultsync") {
        return PathBuf::from(path);
    }

    let this_test = std::env::current_exe().expect("current_exe");
    let deps_dir = this_test.parent().expect("deps dir");
    let debug_dir = deps_dir.parent().expect("debug dir");
    let direct = debug_dir.join("vaultsync");
    assert!(
        direct.exists(),
        "unable to locate vaultsync binary at {}",
        direct.display()
    );
    direct
}

fn cmd(binary: &Path, home: &Path) -> Command {
    let mut cmd = Command::new(binary);
    cmd.env("HOME", home).env("USERPROFILE", home);
    cmd
}

struct DaemonProcess {
    child: Child,
    binary: PathBuf,
    home: PathBuf,
}

impl DaemonProcess {
    fn start(binary: PathBuf, home: PathBuf) -> Self {
        let child = cmd(&binary, &home)
            .args(["daemon", "start"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");

        Self {
            child,
            binary,
            home,
        }
    }

    fn exited_within(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return true;
            }
            sleep(Duration::from_millis(50));
        }
        false
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        let _ = cmd(&self.binary, &self.home).args(["daemon", "stop"]).status();
        if !self.exited_within(Duration::from_secs(2)) {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn daemon_status(binary: &Path, home: &Path) -> Option<serde_json::Value> {
    let output = cmd(binary, home).args(["daemon", "status"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    serde_json::from_slice(&output.stdout).ok()
}

fn daemon_running(binary: &Path, home: &Path) -> bool {
    daemon_status(binary, home)
        .and_then(|value| value.get("running").and_then(|v| v.as_bool()))
        .unwrap_or(false)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

#[test]
fn daemon_picks_up_new_vault_and_stops_on_request() {
    let home = TempDir::new().expect("home");
    let workspace = TempDir::new().expect("workspace");
    let vault = workspace.path().join("notes");
    std::fs::create_dir_all(&vault).expect("mkdir vault");

    let binary = vaultsync_bin_path();
    assert!(!daemon_running(&binary, home.path()));

    let mut daemon = DaemonProcess::start(binary.clone(), home.path().to_path_buf());
    assert!(
        wait_until(Duration::from_secs(5), || daemon_running(&binary, home.path())),
        "daemon did not report running state in time",
    );

    let init = cmd(&binary, home.path())
        .arg("init")
        .arg(&vault)
        .args([
            "--url",
            "https://example.com/me/notes.git",
            "--auto-sync",
            "--interval",
            "15",
        ])
        .output()
        .expect("run init");
    assert!(
        init.status.success(),
        "init failed: {}",
        String::from_utf8_lossy(&init.stderr),
    );

    let seen = wait_until(Duration::from_secs(5), || {
        daemon_status(&binary, home.path())
            .and_then(|status| status.get("vaults").cloned())
            .and_then(|vaults| vaults.as_array().cloned())
            .map(|vaults| {
                vaults.iter().any(|v| {
                    v["name"] == "notes" && v["auto_sync"] == true && v["interval_minutes"] == 15
                })
            })
            .unwrap_or(false)
    });
    assert!(seen, "daemon did not pick up the new vault's settings");

    let reload = cmd(&binary, home.path())
        .args(["daemon", "reload"])
        .output()
        .expect("run reload");
    assert!(String::from_utf8_lossy(&reload.stdout).contains("reload requested"));

    let stop = cmd(&binary, home.path())
        .args(["daemon", "stop"])
        .output()
        .expect("run stop");
    assert!(String::from_utf8_lossy(&stop.stdout).contains("stop requested"));
    assert!(
        daemon.exited_within(Duration::from_secs(5)),
        "daemon did not exit after stop"
    );
    assert!(!daemon_running(&binary, home.path()));
}
