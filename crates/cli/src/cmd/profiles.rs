//! Implementation of the `packsmith profiles` command.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use packsmith_lib::project::Project;

use crate::output::{OutputFormat, print_info, print_json, print_stat};

#[derive(Serialize)]
struct ProfileSummary {
  name: String,
  pre_shell: usize,
  filters: usize,
  post_shell: usize,
}

pub fn cmd_profiles(project_dir: &Path, output: OutputFormat) -> Result<()> {
  let project = Project::load(project_dir).context("Failed to load project")?;

  let mut summaries = Vec::new();
  for name in project.profile_names() {
    let profile = project.profile(name)?;
    summaries.push(ProfileSummary {
      name: profile.name,
      pre_shell: profile.pre_shell.len(),
      filters: profile.steps.len(),
      post_shell: profile.post_shell.len(),
    });
  }

  if output.is_json() {
    return print_json(&summaries);
  }

  if summaries.is_empty() {
    print_info(&format!("Project '{}' defines no profiles", project.name));
    return Ok(());
  }

  println!("Profiles of {}:", project.name);
  for summary in &summaries {
    print_stat(
      &summary.name,
      &format!(
        "{} preShell, {} filters, {} postShell",
        summary.pre_shell, summary.filters, summary.post_shell
      ),
    );
  }
  Ok(())
}
