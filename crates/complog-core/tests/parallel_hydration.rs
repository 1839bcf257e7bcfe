//! Concurrent hydration of archived compiler calls.

use std::io::Cursor;
use std::sync::Arc;

use complog_core::{
    hydrate_all, hydrate_all_with, ArchiveBuilder, BuilderOptions, CompilerCall, CompilerCallKind,
    CompilerLogReader, ComplogError, Language, ParallelConfig, ReaderOptions,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const PROJECTS: usize = 12;

fn archive_of_many_projects() -> (TempDir, Arc<CompilerLogReader>) {
    let dir = TempDir::new().unwrap();
    let mut builder = ArchiveBuilder::new(Cursor::new(Vec::new()), BuilderOptions::default());
    for i in 0..PROJECTS {
        let project = dir.path().join(format!("p{i}"));
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("a.cs"), format!("class C{i} {{}}")).unwrap();
        std::fs::write(project.join("shared.cs"), "// shared").unwrap();
        let call = CompilerCall::new(
            project.join(format!("p{i}.csproj")),
            CompilerCallKind::Regular,
            Some("net8.0".to_string()),
            Language::CSharp,
            vec!["a.cs".to_string(), "shared.cs".to_string()],
        );
        assert!(builder.add(&call).unwrap());
    }
    let bytes = builder.finish().unwrap().into_inner();
    let reader =
        CompilerLogReader::from_reader(Cursor::new(bytes), ReaderOptions::default()).unwrap();
    (dir, Arc::new(reader))
}

/// Test: results come back in input order regardless of completion order
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hydrate_all_preserves_order() {
    let (_dir, reader) = archive_of_many_projects();
    let calls = reader.compiler_calls().unwrap();

    let data = hydrate_all(reader.clone(), calls, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(data.len(), PROJECTS);
    for (i, d) in data.iter().enumerate() {
        assert_eq!(d.call.index(), Some(i));
        assert_eq!(&*d.sources[0].text, format!("class C{i} {{}}"));
        assert_eq!(&*d.sources[1].text, "// shared");
    }

    // Every call has the same (empty) analyzer set, so one host serves all.
    assert!(data.windows(2).all(|w| w[0].host.same_host(&w[1].host)));
    drop(data);
    assert_eq!(reader.host_manager().live_hosts(), 0);
}

/// Test: a concurrency limit of one still hydrates everything
#[tokio::test]
async fn test_hydrate_with_single_worker() {
    let (_dir, reader) = archive_of_many_projects();
    let calls = reader.compiler_calls().unwrap();
    let config = ParallelConfig::default().with_max_concurrency(1);

    let data = hydrate_all_with(reader, calls, CancellationToken::new(), &config)
        .await
        .unwrap();
    assert_eq!(data.len(), PROJECTS);
}

/// Test: a cancelled token aborts the batch
#[tokio::test]
async fn test_cancelled_batch_returns_cancelled() {
    let (_dir, reader) = archive_of_many_projects();
    let calls = reader.compiler_calls().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = hydrate_all(reader, calls, cancel).await.unwrap_err();
    assert!(matches!(err, ComplogError::Cancelled));
}

/// Test: one foreign call fails the whole batch
#[tokio::test]
async fn test_foreign_call_fails_batch() {
    let (_dir, reader) = archive_of_many_projects();
    let mut calls = reader.compiler_calls().unwrap();
    calls.push(CompilerCall::new(
        "/elsewhere/x.csproj",
        CompilerCallKind::Regular,
        None,
        Language::CSharp,
        Vec::new(),
    ));

    let err = hydrate_all(reader, calls, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ComplogError::ForeignCompilerCall));
}
