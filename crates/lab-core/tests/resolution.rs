//! Suites resolving their scripts through filesystem and git sources.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use lab_core::fakes::ScriptedRuntime;
use lab_core::runtime::RuntimeError;
use lab_core::sources::{FileSystem, Git, Source};
use lab_core::{Params, Runner, RunnerOptions, Runtime};
use tokio_util::sync::CancellationToken;

const SUITE: &str = "query:\n  ref: ../c/query.fql\nassert:\n  ref: ./assert.fql\n";

fn write_tree(root: &Path) {
    for (name, content) in [
        ("a/b/suite.yaml", SUITE),
        ("a/b/assert.fql", "ASSERT"),
        ("a/c/query.fql", "QUERY"),
    ] {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn git_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    git(dir.path(), &["init"]);
    git(dir.path(), &["config", "user.name", "test-user"]);
    git(dir.path(), &["config", "user.email", "test@example.com"]);
    write_tree(dir.path());
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-m", "fixtures"]);
    dir
}

/// Query yields `[1,2,3]`; the assertion requires exactly that value.
fn runtime() -> Arc<ScriptedRuntime> {
    Arc::new(ScriptedRuntime::new(|query, params| match query {
        "QUERY" => Ok(b"[1,2,3]".to_vec()),
        "ASSERT" if params["lab"]["data"]["query"]["result"] == serde_json::json!([1, 2, 3]) => {
            Ok(Vec::new())
        }
        other => Err(RuntimeError::Query(format!("unexpected script {other}"))),
    }))
}

async fn run_suite(source: Arc<dyn Source>) -> Arc<ScriptedRuntime> {
    let rt = runtime();
    let runtime: Arc<dyn Runtime> = rt.clone();

    let (results, summary) = Runner::new(runtime, RunnerOptions::default())
        .unwrap()
        .run(CancellationToken::new(), Params::new(), source)
        .collect()
        .await
        .unwrap();

    // The referenced scripts are discovered as units too: the query passes,
    // the assertion fails without a data context.
    let suite = results
        .iter()
        .find(|r| r.filename.ends_with("suite.yaml"))
        .expect("suite was not discovered");
    assert!(suite.passed(), "{:?}", suite.error);
    assert_eq!(results.len(), 3);
    assert_eq!(summary.passed, 2);
    rt
}

#[tokio::test]
async fn filesystem_suite_resolves_relative_refs() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path());

    let source: Arc<dyn Source> = Arc::new(FileSystem::new(dir.path(), None).unwrap());
    let rt = run_suite(source).await;

    let queries: Vec<_> = rt.invocations().into_iter().map(|c| c.query).collect();
    assert!(queries.contains(&"QUERY".to_string()));
    assert!(queries.contains(&"ASSERT".to_string()));
}

#[tokio::test]
async fn git_suite_resolves_relative_refs() {
    let repo = git_repo();

    let source: Arc<dyn Source> =
        Arc::new(Git::new(repo.path().to_string_lossy(), None).unwrap());
    run_suite(source).await;
}

#[tokio::test]
async fn filter_limits_discovery_to_suites() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path());

    let source: Arc<dyn Source> =
        Arc::new(FileSystem::new(dir.path(), Some("**/*.yaml")).unwrap());
    let rt = runtime();
    let runtime: Arc<dyn Runtime> = rt.clone();

    let (results, summary) = Runner::new(runtime, RunnerOptions::default())
        .unwrap()
        .run(CancellationToken::new(), Params::new(), source)
        .collect()
        .await
        .unwrap();

    // References are resolved even though the filter hides them.
    assert_eq!(results.len(), 1);
    assert_eq!(summary.passed, 1);
    assert!(!summary.has_errors());
    assert_eq!(rt.calls(), 2);
}
