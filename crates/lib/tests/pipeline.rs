//! End-to-end runs of the engine with shell-backed filters against projects in
//! temporary directories.

use std::path::Path;
use std::time::Duration;

use packsmith_lib::engine::{Engine, EngineConfig, RunError, RunState, StepOutcome};
use packsmith_lib::export::PackKind;
use packsmith_lib::project::Project;
use packsmith_lib::{CancelToken, Phase};
use tempfile::TempDir;

const PROJECT: &str = r#"{
  "name": "pipeline",
  "packs": { "behaviorPack": "packs/BP", "resourcePack": "packs/RP" },
  "profiles": {
    "default": {
      "preShell": ["echo TEST_VAR=hello_from_preshell"],
      "filters": [
        {
          "filter": "env_writer",
          "command": "echo $TEST_VAR > pre_output.txt",
          "osCommands": { "windows": "Write-Output $env:TEST_VAR | Out-File -Encoding utf8 pre_output.txt" }
        },
        { "filter": "disabled_one", "command": "exit 1", "disabled": true }
      ],
      "postShell": [
        {
          "command": "echo $TEST_VAR > post_output.txt",
          "osCommands": { "windows": "Write-Output $env:TEST_VAR | Out-File -Encoding utf8 post_output.txt" }
        }
      ]
    },
    "broken_filter": {
      "filters": [{ "filter": "fails", "command": "exit 5" }],
      "postShell": ["echo never > post_output.txt"]
    },
    "slow": {
      "preShell": ["sleep 30"]
    },
    "os_specific": {
      "preShell": [
        { "osCommands": { "linux": "echo OS_NAME=Linux", "darwin": "echo OS_NAME=macOS", "windows": "echo OS_NAME=Windows" } }
      ],
      "postShell": [
        {
          "command": "echo $OS_NAME > post_os_output.txt",
          "osCommands": { "windows": "Write-Output $env:OS_NAME | Out-File post_os_output.txt" }
        }
      ]
    }
  }
}"#;

fn project_dir() -> TempDir {
  let temp = TempDir::new().unwrap();
  std::fs::write(temp.path().join("packsmith.json"), PROJECT).unwrap();
  for pack in ["BP", "RP"] {
    let dir = temp.path().join("packs").join(pack);
    std::fs::create_dir_all(dir.join("sub")).unwrap();
    std::fs::write(dir.join("manifest.json"), pack).unwrap();
    std::fs::write(dir.join("sub/data.json"), "{}").unwrap();
  }
  temp
}

fn engine(dir: &Path) -> Engine<packsmith_lib::filter::ShellFilterInvoker> {
  Engine::with_shell_filters(EngineConfig::for_project(dir))
}

#[tokio::test]
async fn preshell_export_reaches_filter_and_postshell() {
  let temp = project_dir();
  let project = Project::load(temp.path()).unwrap();
  let profile = project.profile("default").unwrap();

  let report = engine(temp.path())
    .run(&profile, Some(&project.export_descriptor()), &CancelToken::new())
    .await
    .unwrap();

  let pre = std::fs::read_to_string(temp.path().join("pre_output.txt")).unwrap();
  let post = std::fs::read_to_string(temp.path().join("post_output.txt")).unwrap();
  assert!(pre.contains("hello_from_preshell"), "{:?}", pre);
  assert!(post.contains("hello_from_preshell"), "{:?}", post);

  assert!(temp.path().join("build/pipeline_bp/sub/data.json").is_file());
  assert!(temp.path().join("build/pipeline_rp/manifest.json").is_file());

  assert_eq!(report.state(), RunState::Done);
  let skipped: Vec<_> = report
    .steps
    .iter()
    .filter(|s| s.outcome == StepOutcome::Skipped)
    .map(|s| s.label.as_str())
    .collect();
  assert_eq!(skipped, vec!["filter:disabled_one"]);
}

#[tokio::test]
async fn os_specific_hook_feeds_post_shell() {
  let temp = project_dir();
  let project = Project::load(temp.path()).unwrap();
  let profile = project.profile("os_specific").unwrap();

  engine(temp.path()).run(&profile, None, &CancelToken::new()).await.unwrap();

  // Windows PowerShell writes UTF-16LE with a BOM.
  let bytes = std::fs::read(temp.path().join("post_os_output.txt")).unwrap();
  let content = packsmith_lib::shell::encoding::decode(&bytes, Default::default());
  let expected = match std::env::consts::OS {
    "windows" => "Windows",
    "macos" => "macOS",
    _ => "Linux",
  };
  assert!(content.contains(expected), "{:?}", content);
}

#[tokio::test]
async fn repeated_runs_export_identical_trees() {
  let temp = project_dir();
  let project = Project::load(temp.path()).unwrap();
  let profile = project.profile("default").unwrap();
  let descriptor = project.export_descriptor();
  let engine = engine(temp.path());

  let first = engine.run(&profile, Some(&descriptor), &CancelToken::new()).await.unwrap();
  std::fs::write(temp.path().join("build/pipeline_bp/stale.txt"), "stale").unwrap();
  let second = engine.run(&profile, Some(&descriptor), &CancelToken::new()).await.unwrap();

  let first = first.exported.unwrap();
  let second = second.exported.unwrap();
  assert_eq!(
    first.get(PackKind::Behavior).unwrap().digest,
    second.get(PackKind::Behavior).unwrap().digest
  );
  assert!(!temp.path().join("build/pipeline_bp/stale.txt").exists());
}

#[tokio::test]
async fn filter_failure_stops_before_postshell_and_export() {
  let temp = project_dir();
  let project = Project::load(temp.path()).unwrap();
  let profile = project.profile("broken_filter").unwrap();

  let err = engine(temp.path())
    .run(&profile, Some(&project.export_descriptor()), &CancelToken::new())
    .await
    .unwrap_err();

  assert_eq!(err.phase(), Phase::Filters);
  assert_eq!(err.step_index(), Some(0));
  assert!(matches!(err, RunError::Filter { ref name, .. } if name == "fails"));
  assert!(!temp.path().join("post_output.txt").exists());
  assert!(!temp.path().join("build").exists());
}

#[tokio::test]
async fn host_environment_is_left_untouched() {
  let temp = project_dir();
  let project = Project::load(temp.path()).unwrap();
  let profile = project.profile("default").unwrap();

  engine(temp.path()).run(&profile, None, &CancelToken::new()).await.unwrap();

  assert!(std::env::var("TEST_VAR").is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn cancelling_stops_a_running_hook() {
  let temp = project_dir();
  let project = Project::load(temp.path()).unwrap();
  let profile = project.profile("slow").unwrap();
  let cancel = CancelToken::new();

  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(200)).await;
    trigger.cancel();
  });

  let result = tokio::time::timeout(
    Duration::from_secs(10),
    engine(temp.path()).run(&profile, Some(&project.export_descriptor()), &cancel),
  )
  .await
  .expect("cancelled run should finish promptly");

  assert!(matches!(
    result,
    Err(RunError::Cancelled {
      phase: Phase::PreShell,
      index: 0
    })
  ));
  assert!(!temp.path().join("build").exists());
}
