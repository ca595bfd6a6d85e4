//! End-to-end incremental builds driven through `BuildSession`.

use std::path::{Path, PathBuf};

use lathe_lib::build::{BuildLog, Production, ProductionSpec};
use lathe_lib::digest::{DepfileDigest, Diagnostic, DigestOutput, Severity};
use lathe_lib::execute::CommandStatus;
use lathe_lib::session::{Progress, SessionError, SessionOptions};

use crate::common::*;

fn verbose() -> SessionOptions {
  SessionOptions {
    verbose: true,
    ..SessionOptions::default()
  }
}

fn rebuild() -> SessionOptions {
  SessionOptions {
    rebuild: true,
    ..SessionOptions::default()
  }
}

fn single(output: &str, production: Production) -> ProductionSpec {
  let mut spec = ProductionSpec::new();
  spec.insert(PathBuf::from(output), Some(production));
  spec
}

// =============================================================================
// Incremental rebuilds
// =============================================================================

#[tokio::test]
async fn first_build_runs_everything_then_nothing() {
  let project = app_project();

  let (first, result, _) = project.build(&app_spec(), SessionOptions::default(), 4).await;
  result.unwrap();
  assert_eq!(first.executed_commands().len(), 3);
  assert_eq!(first.executed_commands().last().map(String::as_str), Some(LINK));
  assert_eq!(project.read("out/app"), "int a;\n#pragma once\nint b;\n#pragma once\n");
  assert!(project.exists(BUILD_LOG));

  let (second, result, progress) = project.build(&app_spec(), SessionOptions::default(), 4).await;
  result.unwrap();
  assert!(second.executed_commands().is_empty());
  assert_eq!(second.pending_tasks(), 0);
  assert!(progress.is_empty());
}

#[tokio::test]
async fn touching_one_source_reruns_only_its_chain() {
  let project = app_project();
  project.build(&app_spec(), SessionOptions::default(), 4).await.1.unwrap();

  project.write_source("b.c", "int bb;\n", 200);
  let (session, result, _) = project.build(&app_spec(), SessionOptions::default(), 4).await;

  result.unwrap();
  assert_eq!(session.executed_commands(), [COMPILE_B, LINK]);
  assert_eq!(project.read("out/app"), "int a;\n#pragma once\nint bb;\n#pragma once\n");
}

#[tokio::test]
async fn shared_header_invalidates_every_consumer() {
  let project = app_project();
  project.build(&app_spec(), SessionOptions::default(), 4).await.1.unwrap();

  project.touch("common.h", 300);
  let (session, result, _) = project.build(&app_spec(), SessionOptions::default(), 1).await;

  result.unwrap();
  assert_eq!(session.executed_commands(), [COMPILE_A, COMPILE_B, LINK]);
}

#[tokio::test]
async fn deleted_output_is_regenerated() {
  let project = app_project();
  project.build(&app_spec(), SessionOptions::default(), 4).await.1.unwrap();

  std::fs::remove_file(project.path("out/a.o")).unwrap();
  let (session, result, _) = project.build(&app_spec(), SessionOptions::default(), 4).await;

  result.unwrap();
  assert_eq!(session.executed_commands(), [COMPILE_A, LINK]);
  assert!(project.exists("out/a.o"));
}

#[tokio::test]
async fn missing_source_keeps_its_command_dirty() {
  let project = TestProject::new();
  let spec = single("out.txt", Production::new("echo hi > out.txt").source("optional.h"));

  let (first, result, _) = project.build(&spec, SessionOptions::default(), 1).await;
  result.unwrap();
  assert_eq!(first.executed_commands().len(), 1);

  let (second, result, _) = project.build(&spec, SessionOptions::default(), 1).await;
  result.unwrap();
  assert_eq!(second.executed_commands(), ["echo hi > out.txt"]);
}

#[tokio::test]
async fn rebuild_ignores_build_log() {
  let project = app_project();
  project.build(&app_spec(), SessionOptions::default(), 4).await.1.unwrap();

  let (session, result, _) = project.build(&app_spec(), rebuild(), 4).await;

  result.unwrap();
  assert_eq!(session.executed_commands().len(), 3);
}

#[tokio::test]
async fn corrupt_build_log_means_full_rebuild() {
  let project = app_project();
  project.build(&app_spec(), SessionOptions::default(), 4).await.1.unwrap();

  project.write(BUILD_LOG, "{ not json");
  let (session, result, _) = project.build(&app_spec(), SessionOptions::default(), 4).await;

  result.unwrap();
  assert_eq!(session.executed_commands().len(), 3);
  assert!(BuildLog::load(&project.path(BUILD_LOG)).unwrap().is_some());
}

#[tokio::test]
async fn empty_spec_builds_nothing() {
  let project = TestProject::new();

  let (session, result, progress) = project.build(&ProductionSpec::new(), verbose(), 4).await;

  result.unwrap();
  assert!(session.executed_commands().is_empty());
  assert!(progress.is_empty());
  assert!(BuildLog::load(&project.path(BUILD_LOG)).unwrap().unwrap().is_empty());
}

// =============================================================================
// Discovered dependencies
// =============================================================================

fn depfile_spec(project: &TestProject) -> ProductionSpec {
  let command = "cat a.c a.h > out/a.o && printf 'out/a.o: a.c \\\\\\n  a.h\\n' > out/a.d";
  single(
    "out/a.o",
    Production::new(command)
      .source("a.c")
      .with_digest(DepfileDigest::new(project.path("out/a.d"))),
  )
}

#[tokio::test]
async fn discovered_dependency_triggers_rebuild() {
  let project = TestProject::new();
  project.write_source("a.c", "#include \"a.h\"\n", 100);
  project.write_source("a.h", "int a;\n", 100);
  let spec = depfile_spec(&project);

  let (first, result, _) = project.build(&spec, SessionOptions::default(), 1).await;
  result.unwrap();
  assert_eq!(first.executed_commands().len(), 1);
  assert!(!project.exists("out/a.d"));

  let log = BuildLog::load(&project.path(BUILD_LOG)).unwrap().unwrap();
  let header = log.get(Path::new("a.h")).unwrap();
  assert!(header.is_source());
  assert_eq!(header.outputs(), &[PathBuf::from("out/a.o")]);
  assert!(header.timestamp.is_some());

  let (second, result, _) = project.build(&spec, SessionOptions::default(), 1).await;
  result.unwrap();
  assert!(second.executed_commands().is_empty());
  assert!(BuildLog::load(&project.path(BUILD_LOG)).unwrap().unwrap().contains(Path::new("a.h")));

  project.touch("a.h", 200);
  let (third, result, _) = project.build(&spec, SessionOptions::default(), 1).await;
  result.unwrap();
  assert_eq!(third.executed_commands().len(), 1);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn failing_command_halts_later_batches() {
  let project = TestProject::new();
  let spec = single(
    "out/app",
    Production::new("cat out/gen.txt > out/app").input("out/gen.txt", Production::new("exit 3")),
  );

  let (session, result, _) = project.build(&spec, SessionOptions::default(), 4).await;

  assert_eq!(result.unwrap_err().errors, 1);
  assert_eq!(session.executed_commands(), ["exit 3"]);
  match session.errors() {
    [SessionError::Diagnostic(diagnostic)] => {
      assert_eq!(diagnostic.message, "command exited with code 3");
      assert_eq!(diagnostic.command.as_deref(), Some("exit 3"));
    }
    other => panic!("unexpected errors: {other:?}"),
  }
  assert!(project.exists(BUILD_LOG));

  let (again, _, _) = project.build(&spec, SessionOptions::default(), 4).await;
  assert_eq!(again.executed_commands(), ["exit 3"]);
}

#[tokio::test]
async fn diagnostic_without_severity_is_an_error() {
  let project = TestProject::new();
  let spec = single(
    "out/app",
    Production::new("cat out/gen.txt > out/app").input(
      "out/gen.txt",
      Production::new("echo generated > out/gen.txt")
        .with_digest(|_: &CommandStatus, _: &str, _: &str| DigestOutput {
          dependencies: Vec::new(),
          diagnostics: vec![serde_json::from_str::<Diagnostic>(r#"{"message": "x"}"#).unwrap()],
        }),
    ),
  );

  let (session, result, _) = project.build(&spec, SessionOptions::default(), 4).await;

  assert!(result.is_err());
  assert_eq!(session.executed_commands(), ["echo generated > out/gen.txt"]);
  assert!(project.exists("out/gen.txt"));
  assert!(!project.exists("out/app"));
  assert!(matches!(session.errors(), [SessionError::Diagnostic(d)] if d.message == "x"));
}

#[tokio::test]
async fn stderr_becomes_the_diagnostic_message() {
  let project = TestProject::new();
  let spec = single("out.txt", Production::new("echo 'a.c:3: bad token' >&2; exit 1"));

  let (session, result, _) = project.build(&spec, SessionOptions::default(), 1).await;

  assert!(result.is_err());
  assert_eq!(session.diagnostics().len(), 1);
  assert_eq!(session.diagnostics()[0].message, "a.c:3: bad token");
  assert_eq!(session.diagnostics()[0].status, Severity::Error);
}

#[tokio::test]
async fn warnings_are_collected_without_failing() {
  let project = TestProject::new();
  let spec = single(
    "out.txt",
    Production::new("echo unused variable > out.txt; echo unused variable").with_digest(
      |_: &CommandStatus, stdout: &str, _: &str| DigestOutput {
        dependencies: Vec::new(),
        diagnostics: vec![Diagnostic::warning(stdout).at("main.c", Some(4), Some(9))],
      },
    ),
  );

  let (session, result, _) = project.build(&spec, SessionOptions::default(), 1).await;

  result.unwrap();
  assert!(session.errors().is_empty());
  let warning = &session.diagnostics()[0];
  assert_eq!(warning.status, Severity::Warning);
  assert_eq!(warning.command.as_deref(), Some("echo unused variable > out.txt; echo unused variable"));
  assert_eq!(warning.render(session.root(), project.root()), "main.c:4:9: warning: unused variable");
  assert_eq!(
    warning.render(session.root(), &project.root().join("tools")),
    "../main.c:4:9: warning: unused variable"
  );
}

#[tokio::test]
async fn source_modified_during_build_is_an_integrity_error() {
  let project = TestProject::new();
  project.write_source("a.c", "int a;\n", 100);
  let spec = single("out.txt", Production::new("touch a.c && cat a.c > out.txt").source("a.c"));

  let (session, result, _) = project.build(&spec, SessionOptions::default(), 1).await;

  assert!(result.is_err());
  assert!(
    matches!(session.errors(), [SessionError::Integrity { path }] if path == Path::new("a.c")),
    "{:?}",
    session.errors()
  );
}

#[tokio::test]
async fn blocked_output_directory_stops_the_session() {
  let project = app_project();
  project.write("out", "a file where a directory should be");

  let (session, result, _) = project.build(&app_spec(), SessionOptions::default(), 4).await;

  assert!(result.is_err());
  assert!(matches!(session.errors(), [SessionError::CreateDir { .. }]));
  assert!(session.executed_commands().is_empty());
}

// =============================================================================
// Progress and ordering
// =============================================================================

#[tokio::test]
async fn progress_counts_tasks() {
  let project = app_project();

  let (_, result, progress) = project.build(&app_spec(), SessionOptions::default(), 1).await;

  result.unwrap();
  let steps: Vec<_> = progress.iter().map(|p| (p.description.as_str(), p.step, p.total)).collect();
  assert_eq!(steps, vec![(COMPILE_A, 1, 3), (COMPILE_B, 2, 3), ("link app", 3, 3)]);
}

#[tokio::test]
async fn verbose_progress_reports_directories_and_completion() {
  let project = app_project();

  let (_, result, progress) = project.build(&app_spec(), verbose(), 1).await;

  result.unwrap();
  let expected = vec![
    Progress {
      description: "create out".to_string(),
      step: 1,
      total: 4,
    },
    Progress {
      description: COMPILE_A.to_string(),
      step: 2,
      total: 4,
    },
    Progress {
      description: format!("DONE: {COMPILE_A}"),
      step: 2,
      total: 4,
    },
    Progress {
      description: COMPILE_B.to_string(),
      step: 3,
      total: 4,
    },
    Progress {
      description: format!("DONE: {COMPILE_B}"),
      step: 3,
      total: 4,
    },
    Progress {
      description: "link app".to_string(),
      step: 4,
      total: 4,
    },
    Progress {
      description: "DONE: link app".to_string(),
      step: 4,
      total: 4,
    },
  ];
  assert_eq!(progress, expected);
}

#[tokio::test]
async fn single_job_never_overlaps_commands() {
  let project = TestProject::new();
  let mut spec = ProductionSpec::new();
  for n in 0..4 {
    let command = format!("mkdir running && sleep 0.05 && rmdir running && echo {n} > out{n}.txt");
    spec.insert(PathBuf::from(format!("out{n}.txt")), Some(Production::new(command)));
  }

  let (session, result, _) = project.build(&spec, SessionOptions::default(), 1).await;

  result.unwrap();
  assert_eq!(session.executed_commands().len(), 4);
  for n in 0..4 {
    assert_eq!(project.read(&format!("out{n}.txt")), format!("{n}\n"));
  }
}

#[tokio::test]
async fn parallelism_bounds_running_commands() {
  let project = TestProject::new();
  let mut spec = ProductionSpec::new();
  for n in 0..5 {
    let command = format!("echo start >> events.log && sleep 0.1 && echo end >> events.log && echo {n} > out{n}.txt");
    spec.insert(PathBuf::from(format!("out{n}.txt")), Some(Production::new(command)));
  }

  let (session, result, _) = project.build(&spec, SessionOptions::default(), 2).await;

  result.unwrap();
  assert_eq!(session.executed_commands().len(), 5);

  let mut running = 0i32;
  let mut peak = 0;
  for event in project.read("events.log").lines() {
    running += if event == "start" { 1 } else { -1 };
    peak = peak.max(running);
  }
  assert_eq!(running, 0);
  assert!(peak <= 2, "{peak} commands ran at once");
}

#[tokio::test]
async fn build_log_lists_sources_before_outputs() {
  let project = app_project();
  project.build(&app_spec(), SessionOptions::default(), 4).await.1.unwrap();

  let log = BuildLog::load(&project.path(BUILD_LOG)).unwrap().unwrap();
  let order: Vec<_> = log.ordered().into_iter().map(|(path, _)| path.clone()).collect();
  assert_eq!(
    order,
    ["a.c", "b.c", "common.h", "out/a.o", "out/app", "out/b.o"].map(PathBuf::from)
  );

  let json = project.read(BUILD_LOG);
  let position = |key: &str| json.find(&format!("\"{key}\": {{")).unwrap();
  assert!(position("common.h") < position("out/a.o"));
  assert!(position("out/a.o") < position("out/app"));

  let a = log.get(Path::new("a.c")).unwrap();
  assert_eq!(a.command, None);
  assert!(a.timestamp.is_some());
  assert_eq!(log.get(Path::new("out/app")).unwrap().command.as_deref(), Some(LINK));
}
