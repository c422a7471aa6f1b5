use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use ephemera_collector::{CollectorConfig, router};
use ephemera_coverage::{
    BoxFuture, CoverageToolchain, CoveroutResponse, ErrorResponse, ToolchainError, decode,
};

/// Copies every input file into the output and remembers where it merged to.
#[derive(Default)]
struct CopyToolchain {
    outputs: Mutex<Vec<PathBuf>>,
    fail: bool,
}

impl CoverageToolchain for CopyToolchain {
    fn merge<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
    ) -> BoxFuture<'a, Result<(), ToolchainError>> {
        Box::pin(async move {
            self.outputs.lock().unwrap().push(output.to_path_buf());
            if self.fail {
                return Err(ToolchainError::Failed {
                    subcommand: "merge",
                    status: "exit status: 1".to_string(),
                    stderr: "no profiles found".to_string(),
                });
            }
            for entry in std::fs::read_dir(input).unwrap() {
                let entry = entry.unwrap();
                std::fs::copy(entry.path(), output.join(entry.file_name())).unwrap();
            }
            Ok(())
        })
    }

    fn report<'a>(
        &'a self,
        _input: &'a Path,
        _output: &'a Path,
    ) -> BoxFuture<'a, Result<(), ToolchainError>> {
        Box::pin(async { Ok(()) })
    }
}

async fn start(coverdir: &Path, toolchain: Arc<CopyToolchain>) -> SocketAddr {
    let config = CollectorConfig {
        coverdir: coverdir.to_path_buf(),
        ..CollectorConfig::default()
    };
    let app = router(&config, toolchain);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn serves_the_merged_coverage_on_both_routes() {
    let coverdir = tempfile::tempdir().unwrap();
    std::fs::write(coverdir.path().join("covmeta.1"), "meta").unwrap();
    std::fs::write(coverdir.path().join("covcounters.1"), "counters").unwrap();
    let toolchain = Arc::new(CopyToolchain::default());
    let addr = start(coverdir.path(), toolchain.clone()).await;

    for path in ["/api/v1/coverout", "/coverout"] {
        let res = reqwest::get(format!("http://{addr}{path}")).await.unwrap();
        assert_eq!(res.status(), 200);
        let body: CoveroutResponse = res.json().await.unwrap();

        let dest = tempfile::tempdir().unwrap();
        decode(&body.merged, dest.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(dest.path().join("covmeta.1")).unwrap(),
            "meta"
        );
        assert_eq!(
            std::fs::read_to_string(dest.path().join("covcounters.1")).unwrap(),
            "counters"
        );
    }

    let outputs = toolchain.outputs.lock().unwrap().clone();
    assert_eq!(outputs.len(), 2);
    assert_ne!(outputs[0], outputs[1]);
    assert!(outputs.iter().all(|dir| !dir.exists()));
}

#[tokio::test]
async fn toolchain_failures_become_500_with_the_message() {
    let coverdir = tempfile::tempdir().unwrap();
    let toolchain = Arc::new(CopyToolchain {
        fail: true,
        ..CopyToolchain::default()
    });
    let addr = start(coverdir.path(), toolchain.clone()).await;

    let res = reqwest::get(format!("http://{addr}/api/v1/coverout"))
        .await
        .unwrap();
    assert_eq!(res.status(), 500);
    let body: ErrorResponse = res.json().await.unwrap();
    assert!(body.error.contains("no profiles found"), "{}", body.error);
    assert!(!toolchain.outputs.lock().unwrap()[0].exists());
}

#[tokio::test]
async fn concurrent_requests_merge_into_separate_directories() {
    let coverdir = tempfile::tempdir().unwrap();
    std::fs::write(coverdir.path().join("covmeta.1"), "meta").unwrap();
    let toolchain = Arc::new(CopyToolchain::default());
    let addr = start(coverdir.path(), toolchain.clone()).await;

    let url = format!("http://{addr}/api/v1/coverout");
    let (a, b) = tokio::join!(reqwest::get(&url), reqwest::get(&url));
    assert_eq!(a.unwrap().status(), 200);
    assert_eq!(b.unwrap().status(), 200);

    let outputs = toolchain.outputs.lock().unwrap().clone();
    assert_eq!(outputs.len(), 2);
    assert_ne!(outputs[0], outputs[1]);
}

#[test]
fn default_config_listens_on_the_collector_port() {
    let config = CollectorConfig::default();
    assert_eq!(config.listen.port(), 8080);
    assert_eq!(config.coverdir, PathBuf::from("/tmp/coverdir"));
}
