//! Build events and log files converted into archives.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use complog_core::events::write_event_log;
use complog_core::{
    create_archive, create_archive_file, read_compiler_calls, BuildEvent, BuilderOptions,
    Collaborators, CompilerCallKind, CompilerLogReader, LogKind, LogSource, ReaderOptions,
};
use tempfile::TempDir;

fn project_events(project_file: &Path, context_id: i32) -> Vec<BuildEvent> {
    let project_file = project_file.display().to_string();
    vec![
        BuildEvent::ProjectStarted {
            context_id,
            parent_context_id: None,
            evaluation_id: Some(context_id * 10),
            project_file: project_file.clone(),
            global_properties: BTreeMap::new(),
        },
        BuildEvent::ProjectEvaluationFinished {
            evaluation_id: context_id * 10,
            project_file,
            properties: [("TargetFramework".to_string(), "net8.0".to_string())].into(),
        },
        BuildEvent::Message {
            text: "Restoring packages".to_string(),
        },
        BuildEvent::TargetStarted {
            context_id,
            target_id: 1,
            target_name: "CoreGenerateSatelliteAssemblies".to_string(),
            parent_target: None,
        },
        BuildEvent::TaskStarted {
            context_id,
            target_id: 1,
            task_id: 1,
            task_name: "Csc".to_string(),
        },
        BuildEvent::TaskCommandLine {
            context_id,
            target_id: 1,
            task_id: 1,
            command_line: "/usr/share/dotnet/dotnet exec csc.dll /target:library sat.cs"
                .to_string(),
        },
        BuildEvent::TargetStarted {
            context_id,
            target_id: 2,
            target_name: "CoreCompile".to_string(),
            parent_target: None,
        },
        BuildEvent::TaskStarted {
            context_id,
            target_id: 2,
            task_id: 2,
            task_name: "Csc".to_string(),
        },
        BuildEvent::TaskCommandLine {
            context_id,
            target_id: 2,
            task_id: 2,
            command_line: "/usr/share/dotnet/dotnet exec csc.dll /nologo a.cs".to_string(),
        },
        BuildEvent::ProjectFinished {
            context_id,
            succeeded: true,
        },
    ]
}

fn project(dir: &Path) -> std::path::PathBuf {
    std::fs::write(dir.join("a.cs"), "class A {}").unwrap();
    std::fs::write(dir.join("sat.cs"), "class Sat {}").unwrap();
    dir.join("app.csproj")
}

/// Test: events are correlated, archived, and read back regular-first
#[test]
fn test_create_archive_from_events() {
    let dir = TempDir::new().unwrap();
    let events = project_events(&project(dir.path()), 1);

    let mut out = Cursor::new(Vec::new());
    let summary = create_archive(
        &events,
        &mut out,
        BuilderOptions::default(),
        &Collaborators::default(),
    )
    .unwrap();
    assert_eq!(summary.archived, 2);
    assert!(summary.succeeded(), "{:?}", summary.diagnostics);

    let reader =
        CompilerLogReader::from_reader(Cursor::new(out.into_inner()), ReaderOptions::default())
            .unwrap();
    let calls = reader.compiler_calls().unwrap();
    let kinds: Vec<_> = calls.iter().map(|c| c.kind()).collect();
    assert_eq!(kinds, vec![CompilerCallKind::Regular, CompilerCallKind::Satellite]);
    assert_eq!(calls[0].target_framework(), Some("net8.0"));
    assert_eq!(calls[0].compiler_file_path(), Some("csc.dll"));
}

/// Test: an unreadable input surfaces as a summary diagnostic
#[test]
fn test_missing_source_is_reported_in_summary() {
    let dir = TempDir::new().unwrap();
    let project_file = project(dir.path());
    std::fs::remove_file(dir.path().join("sat.cs")).unwrap();
    let events = project_events(&project_file, 1);

    let mut out = Cursor::new(Vec::new());
    let summary = create_archive(
        &events,
        &mut out,
        BuilderOptions::default(),
        &Collaborators::default(),
    )
    .unwrap();
    assert_eq!(summary.archived, 1);
    assert_eq!(summary.diagnostics.len(), 1);
    assert!(summary.diagnostics[0].contains("sat.cs"));
}

/// Test: a host without `exec` fails that call and the rest are archived
#[test]
fn test_host_without_exec_is_reported_not_guessed() {
    let dir = TempDir::new().unwrap();
    let mut events = project_events(&project(dir.path()), 1);
    for event in &mut events {
        if let BuildEvent::TaskCommandLine {
            task_id: 2,
            command_line,
            ..
        } = event
        {
            *command_line = "/usr/share/dotnet/dotnet csc.dll /nologo a.cs".to_string();
        }
    }

    let mut out = Cursor::new(Vec::new());
    let summary = create_archive(
        &events,
        &mut out,
        BuilderOptions::default(),
        &Collaborators::default(),
    )
    .unwrap();
    assert_eq!(summary.archived, 1);
    assert_eq!(summary.diagnostics.len(), 1);
    assert!(summary.diagnostics[0].contains("app.csproj"));

    let reader =
        CompilerLogReader::from_reader(Cursor::new(out.into_inner()), ReaderOptions::default())
            .unwrap();
    let calls = reader.compiler_calls().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].kind(), CompilerCallKind::Satellite);
}

/// Test: an event log file converts to an archive file and sniffs back
#[test]
fn test_create_archive_file_from_event_log() {
    let dir = TempDir::new().unwrap();
    let events = project_events(&project(dir.path()), 7);
    let log = dir.path().join("build.eventlog");
    write_event_log(std::fs::File::create(&log).unwrap(), &events).unwrap();
    let output = dir.path().join("build.complog");

    let summary = create_archive_file(
        &log,
        &output,
        BuilderOptions::default(),
        &Collaborators::default(),
        |call| call.kind() == CompilerCallKind::Regular,
    )
    .unwrap();
    assert_eq!(summary.archived, 1);

    let source = LogSource::sniff(&output).unwrap();
    assert_eq!(source.kind(), LogKind::Archive);
    let result = read_compiler_calls(&source, ReaderOptions::default()).unwrap();
    assert_eq!(result.calls.len(), 1);
    assert_eq!(&*result.calls[0].arguments().unwrap(), ["/nologo", "a.cs"]);
}

/// Test: a response file converts to a one-call archive
#[test]
fn test_create_archive_file_from_response_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("Program.cs"), "class Program {}").unwrap();
    let rsp = dir.path().join("app.rsp");
    std::fs::write(&rsp, "# build app\n/target:exe Program.cs\n").unwrap();
    let output = dir.path().join("app.complog");

    let summary = create_archive_file(
        &rsp,
        &output,
        BuilderOptions::default(),
        &Collaborators::default(),
        |_| true,
    )
    .unwrap();
    assert_eq!(summary.archived, 1);

    let reader = CompilerLogReader::open(&output, ReaderOptions::default()).unwrap();
    let call = reader.compiler_call(0).unwrap();
    assert_eq!(call.project_file_path(), rsp);
    assert_eq!(reader.raw_contents(&call).unwrap().len(), 1);
}
