//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use terraformer_config::paths::{MAIN_FILE, TFVARS_FILE, VARIABLES_FILE};
use terraformer_config::{DEFAULT_FINALIZER, PathSet, TerraformerConfig};
use terraformer_core::{ChannelSignals, ObjectRefs, STATE_KEY, Terraformer};
use terraformer_kube::{ClusterObject, InMemoryStore, ObjectRef};

/// State the fake terraform writes on `apply` and `destroy`.
pub const WRITTEN_STATE_MARKER: &str = "\"serial\": 2";

/// Terraform version recorded in the seeded state.
pub const CURRENT_VERSION: &str = "1.5.7";

/// Shared in-memory log sink for a tracing subscriber.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }

    /// Number of occurrences of `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.contents().matches(needle).count()
    }

    /// Wait until `needle` has been logged at least `times` times.
    pub async fn wait_for_count(&self, needle: &str, times: usize) {
        let wait = async {
            while self.count(needle) < times {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(10), wait)
            .await
            .unwrap_or_else(|_| panic!("{needle:?} was not logged {times} times"));
    }

    /// Whether `needles` appear in this order.
    pub fn contains_in_order(&self, needles: &[&str]) -> bool {
        let contents = self.contents();
        let mut rest = contents.as_str();
        for needle in needles {
            match rest.find(needle) {
                Some(idx) => rest = &rest[idx + needle.len()..],
                None => return false,
            }
        }
        true
    }
}

pub struct LogWriter(Arc<Mutex<Vec<u8>>>);

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter(self.0.clone())
    }
}

/// Builder for a bash script standing in for the terraform binary.
///
/// Every invocation appends its arguments to an invocation log, prints some
/// output on stdout, sleeps, and exits with the configured code. Non-zero
/// exits also print an error on stderr. `apply` and `destroy` write a new
/// state file to the `-state=` path. SIGINT and SIGTERM are trapped and
/// reported on stdout.
#[derive(Debug, Clone)]
pub struct FakeTerraform {
    default_exit_code: i32,
    exit_codes: BTreeMap<String, i32>,
    sleep: String,
}

impl Default for FakeTerraform {
    fn default() -> Self {
        Self {
            default_exit_code: 0,
            exit_codes: BTreeMap::new(),
            sleep: "0.05".to_string(),
        }
    }
}

impl FakeTerraform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.default_exit_code = code;
        self
    }

    pub fn exit_code_for(mut self, command: &str, code: i32) -> Self {
        self.exit_codes.insert(command.to_string(), code);
        self
    }

    /// Sleep duration in seconds, as understood by `sleep(1)`.
    pub fn sleep(mut self, seconds: &str) -> Self {
        self.sleep = seconds.to_string();
        self
    }

    fn render(&self, invocations: &Path) -> String {
        let mut cases = String::new();
        for (command, code) in &self.exit_codes {
            cases.push_str(&format!("  {command}) code={code} ;;\n"));
        }

        format!(
            r#"#!/usr/bin/env bash
trap 'echo "fake terraform received signal: SIGINT"' INT
trap 'echo "fake terraform received signal: SIGTERM"' TERM

echo "$*" >> "{invocations}"
echo "some terraform output"
echo "output of terraform $1"

case "$1" in
{cases}  *) code={default} ;;
esac

if [ "$1" = apply ] || [ "$1" = destroy ]; then
  for arg in "$@"; do
    case "$arg" in
      -state=*) echo '{{"version": 4, "terraform_version": "{version}", "serial": 2, "resources": []}}' > "${{arg#-state=}}" ;;
    esac
  done
fi

echo "doing some long running IaaS ops"
sleep {sleep} >/dev/null 2>&1 &
sleeper=$!
# A trapped signal interrupts wait; keep waiting until the work is done.
while kill -0 "$sleeper" 2>/dev/null; do
  wait "$sleeper"
done

if [ "$code" != 0 ]; then
  echo "some terraform error" >&2
fi
exit "$code"
"#,
            invocations = invocations.display(),
            cases = cases,
            default = self.default_exit_code,
            version = CURRENT_VERSION,
            sleep = self.sleep,
        )
    }
}

/// A seeded in-memory cluster plus working directory for one run.
pub struct TestEnv {
    pub dir: TempDir,
    pub store: Arc<InMemoryStore>,
    pub signals: Arc<ChannelSignals>,
    pub config: TerraformerConfig,
    pub refs: ObjectRefs,
    pub logs: LogBuffer,
    _log_guard: DefaultGuard,
}

impl TestEnv {
    /// Environment whose state was written by a current terraform version.
    pub fn new() -> Self {
        Self::with_state_version(CURRENT_VERSION)
    }

    /// Environment whose state was written by terraform `version`.
    pub fn with_state_version(version: &str) -> Self {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let log_guard = tracing::subscriber::set_default(subscriber);

        let dir = TempDir::new().unwrap();
        let config = TerraformerConfig::new()
            .with_namespace("shoot--test")
            .with_object_names("infra.tf-config", "infra.tf-state", "infra.tf-vars")
            .with_terraform_binary(dir.path().join("bin/terraform"))
            .with_paths(PathSet::default().with_base_dir(dir.path().join("root")));
        let refs = ObjectRefs::from_config(&config);

        let store = Arc::new(InMemoryStore::new());
        store.insert(
            ClusterObject::new(&refs.configuration)
                .with_data(MAIN_FILE, "resource \"null_resource\" \"foo\" {}")
                .with_data(VARIABLES_FILE, "variable \"foo\" {}"),
        );
        store.insert(ClusterObject::new(&refs.variables).with_data(TFVARS_FILE, "foo = \"bar\""));
        store.insert(ClusterObject::new(&refs.state).with_data(STATE_KEY, seeded_state(version)));

        Self {
            dir,
            store,
            signals: Arc::new(ChannelSignals::new()),
            config,
            refs,
            logs,
            _log_guard: log_guard,
        }
    }

    /// Install `fake` as the terraform binary.
    pub fn install(&self, fake: FakeTerraform) {
        let bin = &self.config.terraform_binary;
        std::fs::create_dir_all(bin.parent().unwrap()).unwrap();
        std::fs::write(bin, fake.render(&self.invocations_path())).unwrap();
        std::fs::set_permissions(bin, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    pub fn terraformer(&self) -> Terraformer {
        Terraformer::new(self.config.clone(), self.store.clone(), self.signals.clone())
    }

    pub fn invocations_path(&self) -> PathBuf {
        self.dir.path().join("invocations.log")
    }

    /// Argument lines of every terraform invocation so far.
    pub fn invocations(&self) -> Vec<String> {
        std::fs::read_to_string(self.invocations_path())
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Subcommands invoked so far, e.g. `["init", "apply"]`.
    pub fn commands(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .filter_map(|line| line.split_whitespace().next().map(str::to_string))
            .collect()
    }

    /// Wait until terraform `command` has been started.
    pub async fn wait_for_command(&self, command: &str) {
        let wait = async {
            while !self.commands().iter().any(|c| c == command) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(10), wait)
            .await
            .unwrap_or_else(|_| panic!("terraform {command} was never started"));
    }

    pub fn termination_message(&self) -> String {
        std::fs::read_to_string(&self.config.paths.termination_message_path).unwrap()
    }

    pub fn object(&self, object: &ObjectRef) -> Option<ClusterObject> {
        self.store.snapshot(object)
    }

    /// Whether each of configuration, variables and state carries the
    /// finalizer.
    pub fn finalizers(&self) -> [bool; 3] {
        self.refs.all().map(|object| {
            self.store
                .snapshot(object)
                .is_some_and(|o| o.has_finalizer(DEFAULT_FINALIZER))
        })
    }

    pub fn stored_state(&self) -> Option<String> {
        self.object(&self.refs.state)
            .and_then(|o| o.get(STATE_KEY).map(str::to_string))
    }

    /// Replace the state object's data and put the finalizer on it.
    pub fn set_state_data(&self, data: &[(&str, &str)]) {
        let mut state = ClusterObject::new(&self.refs.state).with_finalizer(DEFAULT_FINALIZER);
        for (key, value) in data {
            state = state.with_data(*key, *value);
        }
        self.store.insert(state);
    }
}

fn seeded_state(version: &str) -> String {
    format!(
        r#"{{"version": 4, "terraform_version": "{version}", "serial": 1, "resources": [{{"mode": "managed", "type": "aws_vpc", "name": "vpc", "provider": "provider.aws"}}]}}"#
    )
}
