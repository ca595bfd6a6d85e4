//! Building configurations end to end through the `lathe` binary.

use predicates::prelude::*;

use crate::common::*;

#[test]
fn alias_builds_every_task_with_progress() {
  let env = TestEnv::from_fixture("hello.json");

  env
    .lathe_cmd()
    .arg("hello")
    .assert()
    .success()
    .stdout(predicate::str::contains(HELLO_CONFIG))
    .stdout(predicate::str::contains(format!(
      "(1/3) cat main.c > {HELLO_BUILD_DIR}/main.o"
    )))
    .stdout(predicate::str::contains(format!("(3/3) link {HELLO_CONFIG}")))
    .stdout(predicate::str::contains("DONE"));

  assert_eq!(env.read_file(&format!("{HELLO_BUILD_DIR}/app.txt")), "int main;\nint util;\nhello\n");
  assert!(env.path(&format!("build/.cache/{HELLO_CONFIG}/.buildlog")).exists());
}

#[test]
fn second_run_has_nothing_to_do() {
  let env = TestEnv::from_fixture("hello.json");
  env.lathe_cmd().arg("hello").assert().success();

  env
    .lathe_cmd()
    .arg("hello")
    .assert()
    .success()
    .stdout(predicate::str::contains("/3)").not())
    .stdout(predicate::str::contains("DONE"));
}

#[test]
fn edited_source_rebuilds_only_its_chain() {
  let env = TestEnv::from_fixture("hello.json");
  env.set_mtime("main.c", 1_000);
  env.set_mtime("util.c", 1_000);
  env.lathe_cmd().arg("hello").assert().success();

  env.write_file("util.c", "int util2;\n");
  env.set_mtime("util.c", 2_000);

  env
    .lathe_cmd()
    .arg("hello")
    .assert()
    .success()
    .stdout(predicate::str::contains("(1/2) cat util.c"))
    .stdout(predicate::str::contains(format!("(2/2) link {HELLO_CONFIG}")))
    .stdout(predicate::str::contains("cat main.c").not());

  assert_eq!(env.read_file(&format!("{HELLO_BUILD_DIR}/app.txt")), "int main;\nint util2;\nhello\n");
}

#[test]
fn rebuild_flag_runs_everything_again() {
  let env = TestEnv::from_fixture("hello.json");
  env.lathe_cmd().arg("hello").assert().success();

  env
    .lathe_cmd()
    .args(["-B", "hello"])
    .assert()
    .success()
    .stdout(predicate::str::contains("(3/3)"));
}

#[test]
fn verbose_reports_directories_and_completion() {
  let env = TestEnv::from_fixture("hello.json");

  env
    .lathe_cmd()
    .args(["-v", "-j", "1", HELLO_CONFIG])
    .assert()
    .success()
    .stdout(predicate::str::contains(format!("(1/4) create {HELLO_BUILD_DIR}")))
    .stdout(predicate::str::contains(format!("(4/4) DONE: link {HELLO_CONFIG}")));
}

#[test]
fn failing_command_prints_diagnostic_and_exits_nonzero() {
  let env = TestEnv::from_fixture("hello.json");

  env
    .lathe_cmd()
    .arg("hello.broken.linux.x86_64")
    .assert()
    .failure()
    .stderr(predicate::str::contains("error: main.c:1:5: undefined symbol"))
    .stderr(predicate::str::contains("1 error(s)"));
}

#[test]
fn later_configurations_still_build_after_a_failure() {
  let env = TestEnv::from_fixture("hello.json");

  env
    .lathe_cmd()
    .args(["hello.broken.linux.x86_64", "hello"])
    .assert()
    .failure()
    .stdout(predicate::str::contains(format!("link {HELLO_CONFIG}")));

  assert!(env.path(&format!("{HELLO_BUILD_DIR}/app.txt")).exists());
}

#[test]
fn buildfile_is_found_from_a_subdirectory() {
  let env = TestEnv::from_fixture("hello.json");
  std::fs::create_dir_all(env.path("src/nested")).unwrap();

  env
    .lathe_cmd_in(&env.path("src/nested"))
    .arg("hello")
    .assert()
    .success();

  assert!(env.path(&format!("{HELLO_BUILD_DIR}/app.txt")).exists());
}

#[test]
fn directory_and_file_flags_select_the_buildfile() {
  let env = TestEnv::from_fixture("hello.json");
  std::fs::rename(&env.buildfile, env.path("project.json")).unwrap();
  let elsewhere = tempfile::TempDir::new().unwrap();

  env
    .lathe_cmd_in(elsewhere.path())
    .arg("-C")
    .arg(env.temp.path())
    .args(["-f", "project.json", "hello"])
    .assert()
    .success();

  assert!(env.path(&format!("{HELLO_BUILD_DIR}/app.txt")).exists());
}

#[test]
fn missing_directory_is_an_error() {
  let env = TestEnv::from_fixture("hello.json");

  env
    .lathe_cmd()
    .args(["-C", "does-not-exist", "hello"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to change to directory"));
}

#[test]
fn shell_override_comes_from_environment() {
  let env = TestEnv::from_fixture("hello.json");

  env
    .lathe_cmd()
    .env("LATHE_SHELL", "/definitely/not/a/shell")
    .arg("hello")
    .assert()
    .failure()
    .stderr(predicate::str::contains("/definitely/not/a/shell"));
}

#[test]
fn invalid_buildfile_is_reported() {
  let env = TestEnv::empty();
  std::fs::write(&env.buildfile, fixture_content("invalid.json")).unwrap();

  env
    .lathe_cmd()
    .arg("hello")
    .assert()
    .failure()
    .stderr(predicate::str::contains("unexpected"));
}
