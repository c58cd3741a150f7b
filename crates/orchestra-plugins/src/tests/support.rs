//! Fake plugins backed by `/bin/sh` scripts.
//!
//! Each fake plugin lives in its own directory with a `plugin.json` whose
//! entry runs `plugin.sh` through `/bin/sh`. Every start appends a line to
//! `starts.log` in the plugin directory so tests can count spawns.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::manifest::{MANIFEST_FILE, PluginManifest};

/// Answers `ping`, `echo`, and `garbage`; exits 3 on `crash`; never answers
/// `hang`; reports any other method as not found.
pub(crate) const RESPONDER: &str = r#"echo start >> starts.log
echo "fake plugin ready" >&2
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  case "$line" in
    *'"method":"ping"'*)
      printf '{"jsonrpc":"2.0","result":"pong","id":%s}\n' "$id" ;;
    *'"method":"echo"'*)
      params=$(printf '%s\n' "$line" | sed -n 's/.*"params":\(.*\),"id":.*/\1/p')
      printf '{"jsonrpc":"2.0","result":%s,"id":%s}\n' "$params" "$id" ;;
    *'"method":"garbage"'*)
      echo 'this is not json'
      printf '{"jsonrpc":"2.0","result":"after-garbage","id":%s}\n' "$id" ;;
    *'"method":"crash"'*)
      exit 3 ;;
    *'"method":"hang"'*)
      ;;
    *)
      printf '{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"},"id":%s}\n' "$id" ;;
  esac
done
"#;

/// Never writes to stderr and stays alive.
pub(crate) const SILENT: &str = "echo start >> starts.log\nexec sleep 5\n";

/// Exits before becoming ready.
pub(crate) const EXITS_AT_ONCE: &str = "echo start >> starts.log\nexit 2\n";

/// Signals readiness and ignores SIGTERM.
pub(crate) const IGNORES_TERM: &str = r#"trap '' TERM
echo start >> starts.log
echo "stubborn plugin ready" >&2
while true; do sleep 1; done
"#;

/// Writes a fake plugin directory under `root` and returns its path.
pub(crate) fn write_script_plugin(root: &Path, id: &str, script: &str) -> PathBuf {
    let dir = root.join(id);
    fs::create_dir_all(&dir).expect("create plugin dir");
    let manifest = format!(
        r#"{{
  "metadata": {{"id": "{id}", "name": "{id}", "version": "1.0.0", "category": "test"}},
  "capabilities": ["echo"],
  "entry": {{"command": "/bin/sh", "args": ["plugin.sh"]}}
}}"#
    );
    fs::write(dir.join(MANIFEST_FILE), manifest).expect("write manifest");
    fs::write(dir.join("plugin.sh"), script).expect("write script");
    dir
}

/// Writes a fake plugin and loads its manifest.
pub(crate) fn script_manifest(root: &Path, id: &str, script: &str) -> PluginManifest {
    let dir = write_script_plugin(root, id, script);
    PluginManifest::load(&dir).expect("load fake manifest")
}

/// Number of times the plugin in `dir` has been started.
pub(crate) fn start_count(dir: &Path) -> usize {
    fs::read_to_string(dir.join("starts.log"))
        .map(|log| log.lines().count())
        .unwrap_or(0)
}

/// Polls `condition` until it holds or `timeout` elapses.
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}
