//! End-to-end tests: real watcher, real shell.

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dirwatch::watcher::{
    executor_for, Dispatcher, FileWatcher, RuleStore, ShellCommand, WatchConfig, WatchLoop,
};
use dirwatch::Config;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn config_for(watch_dir: &Path, out: &Path, execution: &str) -> Config {
    let toml = format!(
        r#"
shell = "/bin/sh"
execution = "{execution}"

[vars]
out = "{out}"

[[watchers]]
name = "text-files"
dirs = ["{dir}"]
events = ["write"]
matches = ["*.txt"]
exec = "echo {{{{ .Path }}}} >> {{{{ .Vars.out }}}}"
"#,
        dir = watch_dir.display(),
        out = out.display(),
    );
    Config::from_toml(&toml, Path::new("/etc/dirwatch.toml")).unwrap()
}

async fn wait_for(path: &Path, needle: &str) -> bool {
    for _ in 0..100 {
        if fs::read_to_string(path).is_ok_and(|c| c.contains(needle)) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

async fn run_scenario(execution: &str) {
    let watched = TempDir::new().unwrap();
    let dir = watched.path().canonicalize().unwrap();
    let results = TempDir::new().unwrap();
    let out = results.path().join("out.log");

    let config = config_for(&dir, &out, execution);
    let rules = Arc::new(RuleStore::from_configs(&config.watchers, config.resolution));
    let executor = executor_for(
        config.execution,
        ShellCommand::new(&config.shell, &config.shell_cmd),
        config.workers,
    );
    let dispatcher = Dispatcher::new(rules, Arc::new(config.vars.clone()), executor);

    let watch_config = WatchConfig {
        watch_dirs: config.watch_dirs(),
        ..Default::default()
    };
    let (watcher, stream) = FileWatcher::new(&watch_config).unwrap();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(WatchLoop::new(stream, dispatcher).run(shutdown.clone()));

    fs::write(dir.join("ignored.log"), "not a text file").unwrap();
    fs::write(dir.join("notes.txt"), "hello").unwrap();

    let expected = dir.join("notes.txt").display().to_string();
    assert!(wait_for(&out, &expected).await, "command did not run");

    shutdown.cancel();
    let snapshot = handle.await.unwrap();
    drop(watcher);

    let content = fs::read_to_string(&out).unwrap();
    assert!(!content.contains("ignored.log"));
    assert!(snapshot.executed >= 1);
    assert!(snapshot.dropped_filename >= 1 || snapshot.dropped_kind >= 1);
}

#[tokio::test]
async fn test_inline_execution_end_to_end() {
    run_scenario("inline").await;
}

#[tokio::test]
async fn test_pooled_execution_end_to_end() {
    run_scenario("pooled").await;
}

#[test]
fn test_dump_round_trip() {
    let config = config_for(Path::new("/w"), Path::new("/tmp/out.log"), "inline");
    let dumped = config.dump().unwrap();
    assert!(dumped.contains("text-files"));
    assert!(dumped.contains("execution = \"inline\""));
}
