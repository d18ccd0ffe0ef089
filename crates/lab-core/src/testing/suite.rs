use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::runtime::Runtime;
use crate::sources::{self, Discovered, DiscoveryError, File};

use super::error::{CaseError, CaseResult};
use super::manifest::{Script, ScriptDescriptor, SuiteManifest};
use super::params::{DataContext, Params, QueryData, DATA_KEY};

/// A query script and an assertion script run against its output.
#[derive(Debug, Clone)]
pub struct Suite {
    file: File,
    manifest: SuiteManifest,
}

impl Suite {
    pub fn new(file: File) -> CaseResult<Self> {
        let manifest = SuiteManifest::parse(&file.content)?;
        Ok(Self { file, manifest })
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn manifest(&self) -> &SuiteManifest {
        &self.manifest
    }

    /// Resolve both scripts, run the query, then run the assertion with the
    /// query output available as `@lab.data.query.result`.
    #[instrument(skip_all, fields(file = %self.file.name))]
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        runtime: &dyn Runtime,
        params: Params,
    ) -> CaseResult<()> {
        let query = self.resolve_script(cancel, &self.manifest.query, "query").await?;
        let assertion = self
            .resolve_script(cancel, &self.manifest.assertion, "assert")
            .await?;

        let mut query_params = params.clone();
        query_params.merge_user_values(&self.manifest.query.params);

        let output = runtime
            .run(&query, &query_params.to_map())
            .await
            .map_err(CaseError::Query)?;
        let result = parse_output(&output)?;
        debug!(bytes = output.len(), "query script finished");

        let mut assert_params = params;
        assert_params.merge_user_values(&self.manifest.assertion.params);
        assert_params
            .set_system_value(
                DATA_KEY,
                &DataContext {
                    query: QueryData {
                        result,
                        params: query_params.user().clone(),
                    },
                },
            )
            .map_err(|e| CaseError::Output(e.to_string()))?;

        runtime
            .run(&assertion, &assert_params.to_map())
            .await
            .map_err(CaseError::Assertion)?;

        Ok(())
    }

    async fn resolve_script(
        &self,
        cancel: &CancellationToken,
        descriptor: &ScriptDescriptor,
        script: &'static str,
    ) -> CaseResult<String> {
        let reference = match &descriptor.script {
            Script::Text(text) => return Ok(text.clone()),
            Script::Ref(reference) => reference,
        };

        debug!(reference = %reference, script, "resolving script");

        let resolve_err = |source: DiscoveryError| CaseError::Resolve { script, source };

        let file = if reference.contains("://") {
            read_absolute(cancel, reference).await.map_err(resolve_err)?
        } else {
            self.file
                .resolve(cancel.clone(), reference)
                .single(reference)
                .await
                .map_err(resolve_err)?
        };

        Ok(file.text().into_owned())
    }
}

/// Read an absolute reference. It must name exactly one file: repositories
/// and directories are rejected.
async fn read_absolute(cancel: &CancellationToken, reference: &str) -> Result<File, DiscoveryError> {
    if reference.starts_with("git+") {
        return Err(DiscoveryError::new(
            reference,
            "repository locations cannot be referenced, use a path relative to the suite",
        ));
    }

    let source = sources::create(reference).map_err(|e| DiscoveryError::from_error(reference, e))?;

    // Stop the backend once a second file shows up.
    let cancel = cancel.child_token();
    let _guard = cancel.clone().drop_guard();
    let mut stream = source.read(cancel);

    let file = match stream.next().await {
        Some(Discovered::File(file)) => file,
        Some(Discovered::Error(err)) => return Err(err),
        None => return Err(DiscoveryError::new(reference, "file not found")),
    };

    if let Some(err) = &file.error {
        return Err(err.clone());
    }

    if matches!(stream.next().await, Some(Discovered::File(_))) {
        return Err(DiscoveryError::new(reference, "reference must name a single file"));
    }

    Ok(file)
}

/// Empty output means `null`.
fn parse_output(output: &[u8]) -> CaseResult<Value> {
    if output.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    serde_json::from_slice(output).map_err(|e| CaseError::Output(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{MemorySource, ScriptedRuntime};
    use crate::runtime::RuntimeError;
    use serde_json::json;

    fn suite_from(source: std::sync::Arc<dyn sources::Source>, manifest: &str) -> Suite {
        Suite::new(File::new(source, "suites/s.yaml", manifest.as_bytes().to_vec())).unwrap()
    }

    /// Query returns `[1,2,3]`; assertion fails unless it sees that value.
    fn checking_runtime(query_output: &'static [u8]) -> ScriptedRuntime {
        ScriptedRuntime::new(move |query, params| match query {
            "QUERY" => Ok(query_output.to_vec()),
            "ASSERT" => {
                if params["lab"]["data"]["query"]["result"] == json!([1, 2, 3]) {
                    Ok(Vec::new())
                } else {
                    Err(RuntimeError::Query("unexpected data".to_string()))
                }
            }
            other => Err(RuntimeError::Query(format!("unknown script {other}"))),
        })
    }

    #[test]
    fn parse_output_treats_empty_as_null() {
        assert_eq!(parse_output(b"").unwrap(), Value::Null);
        assert_eq!(parse_output(b" \n").unwrap(), Value::Null);
        assert_eq!(parse_output(br#"{"a":1}"#).unwrap(), json!({"a": 1}));
        assert!(matches!(parse_output(b"{oops"), Err(CaseError::Output(_))));
    }

    #[tokio::test]
    async fn assertion_sees_query_result() {
        let source = MemorySource::new().into_source();
        let suite = suite_from(source, "query: QUERY\nassert: ASSERT\n");

        let rt = checking_runtime(b"[1,2,3]");
        suite
            .run(&CancellationToken::new(), &rt, Params::new())
            .await
            .unwrap();
        assert_eq!(rt.calls(), 2);
    }

    #[tokio::test]
    async fn different_output_fails_assertion() {
        let source = MemorySource::new().into_source();
        let suite = suite_from(source, "query: QUERY\nassert: ASSERT\n");

        let rt = checking_runtime(b"[1,2]");
        let err = suite
            .run(&CancellationToken::new(), &rt, Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CaseError::Assertion(_)), "{err:?}");
    }

    #[tokio::test]
    async fn query_failure_skips_assertion() {
        let source = MemorySource::new().into_source();
        let suite = suite_from(source, "query: QUERY\nassert: ASSERT\n");

        let rt = ScriptedRuntime::failing("syntax error");
        let err = suite
            .run(&CancellationToken::new(), &rt, Params::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CaseError::Query(_)));
        assert_eq!(rt.calls(), 1);
    }

    #[tokio::test]
    async fn declared_params_apply_to_their_phase_only() {
        let source = MemorySource::new().into_source();
        let suite = suite_from(
            source,
            "query:\n  text: QUERY\n  params:\n    id: 2\nassert:\n  text: ASSERT\n  params:\n    expected: 3\n",
        );

        let rt = ScriptedRuntime::ok(b"3".to_vec());
        let mut params = Params::new();
        params.set_user_value("id", json!(1));

        suite
            .run(&CancellationToken::new(), &rt, params)
            .await
            .unwrap();

        let calls = rt.invocations();
        assert_eq!(calls[0].params["id"], 2);
        assert!(calls[0].params.get("expected").is_none());

        assert_eq!(calls[1].params["id"], 1);
        assert_eq!(calls[1].params["expected"], 3);
        assert_eq!(
            calls[1].params["lab"]["data"],
            json!({"query": {"result": 3, "params": {"id": 2}}})
        );
    }

    #[tokio::test]
    async fn refs_resolve_through_the_suite_source() {
        let source = MemorySource::new()
            .with_file("query.fql", "QUERY")
            .with_file("assert.fql", "ASSERT")
            .into_source();
        let suite = suite_from(source, "query:\n  ref: query.fql\nassert:\n  ref: assert.fql\n");

        let rt = checking_runtime(b"[1,2,3]");
        suite
            .run(&CancellationToken::new(), &rt, Params::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_ref_is_a_resolve_error() {
        let source = MemorySource::new().into_source();
        let suite = suite_from(source, "query:\n  ref: nope.fql\nassert: ASSERT\n");

        let rt = ScriptedRuntime::ok(Vec::new());
        let err = suite
            .run(&CancellationToken::new(), &rt, Params::new())
            .await
            .unwrap_err();

        assert!(
            matches!(&err, CaseError::Resolve { script: "query", .. }),
            "{err:?}"
        );
        assert_eq!(rt.calls(), 0);
    }

    #[tokio::test]
    async fn repository_ref_is_rejected() {
        let source = MemorySource::new().into_source();
        let suite = suite_from(
            source,
            "query:\n  ref: git+https://example.com/tests.git\nassert: ASSERT\n",
        );

        let rt = ScriptedRuntime::ok(Vec::new());
        let err = suite
            .run(&CancellationToken::new(), &rt, Params::new())
            .await
            .unwrap_err();

        match err {
            CaseError::Resolve { script, source } => {
                assert_eq!(script, "query");
                assert!(source.message.contains("repository"), "{source}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(rt.calls(), 0);
    }

    #[tokio::test]
    async fn absolute_file_ref_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let query = dir.path().join("query.fql");
        std::fs::write(&query, "QUERY").unwrap();

        let manifest = format!("query:\n  ref: file://{}\nassert: ASSERT\n", query.display());
        let suite = suite_from(MemorySource::new().into_source(), &manifest);

        let rt = checking_runtime(b"[1,2,3]");
        suite
            .run(&CancellationToken::new(), &rt, Params::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn directory_ref_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.fql"), "RETURN 1").unwrap();
        std::fs::write(dir.path().join("b.fql"), "RETURN 2").unwrap();

        let manifest = format!("query:\n  ref: file://{}\nassert: ASSERT\n", dir.path().display());
        let suite = suite_from(MemorySource::new().into_source(), &manifest);

        let rt = ScriptedRuntime::ok(Vec::new());
        let err = suite
            .run(&CancellationToken::new(), &rt, Params::new())
            .await
            .unwrap_err();

        match err {
            CaseError::Resolve { source, .. } => {
                assert!(source.message.contains("single file"), "{source}")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
