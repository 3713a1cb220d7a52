//! Ordered, resumable preparation pipeline.
//!
//! Stages run strictly one after another. Each stage checks for its own
//! output first and reports [`StepStatus::Skipped`] when there is nothing
//! to do, then a postcondition on disk is checked. The first failure stops
//! the run: later stages stay [`StepStatus::Pending`] and everything already
//! produced is left in place for the next invocation to pick up.
//!
//! ```text
//! [1/5] install-toolkit   vcpkg clone, bootstrap, install, verify
//! [2/5] acquire-source    extract archive, rename, check manifest
//! [3/5] sync-config       copy config.h, config_components.h
//! [4/5] compat-shim       <stdbit.h> fallback in ffmpeg_dec.c
//! [5/5] entry-rewrite     main -> ffmpeg_entry in src/ffmpeg_crt.c
//! ```

use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use tracing::{error, info};

use crate::config::PrepContext;
use crate::config_sync;
use crate::deps::{InstalledToolkit, VcpkgManager};
use crate::error::{exit_code_for, kind_for, ErrorKind, PrepError};
use crate::extract::SourceAcquirer;
use crate::fsutil;
use crate::patch::{self, entry, stdbit};
use crate::{Outcome, Timer};

/// A pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    InstallToolkit,
    AcquireSource,
    SyncConfig,
    CompatShim,
    EntryRewrite,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::InstallToolkit,
        Stage::AcquireSource,
        Stage::SyncConfig,
        Stage::CompatShim,
        Stage::EntryRewrite,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::InstallToolkit => "install-toolkit",
            Stage::AcquireSource => "acquire-source",
            Stage::SyncConfig => "sync-config",
            Stage::CompatShim => "compat-shim",
            Stage::EntryRewrite => "entry-rewrite",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Stage::InstallToolkit => "Installing FFmpeg through vcpkg",
            Stage::AcquireSource => "Preparing FFmpeg source tree",
            Stage::SyncConfig => "Copying generated configuration headers",
            Stage::CompatShim => "Applying stdbit.h compatibility shim",
            Stage::EntryRewrite => "Generating ffmpeg_entry source",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

/// One stage's slot in a run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStep {
    pub stage: Stage,
    /// 1-based position in the run.
    pub order: usize,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Class of the failure, when it is one the pipeline recognises.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl PipelineStep {
    fn new(stage: Stage, order: usize) -> Self {
        Self {
            stage,
            order,
            status: StepStatus::Pending,
            elapsed_secs: None,
            error: None,
            error_kind: None,
        }
    }
}

/// Resolved locations handed to the build that compiles the prepared tree.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub triplet: String,
    pub vcpkg_root: PathBuf,
    pub source_root: PathBuf,
    pub lib_dir: PathBuf,
    pub include_dir: PathBuf,
    pub entry_source: PathBuf,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_libraries: Vec<String>,
    /// Generated headers vcpkg did not produce; the tree builds with defaults.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_headers: Vec<String>,
}

impl BuildSummary {
    pub fn new(
        ctx: &PrepContext,
        toolkit: Option<&InstalledToolkit>,
        missing_headers: &[&str],
    ) -> Self {
        Self {
            triplet: ctx.triplet().to_string(),
            vcpkg_root: ctx.vcpkg_root().to_path_buf(),
            source_root: ctx.config.source_root.clone(),
            lib_dir: ctx.lib_dir(),
            include_dir: ctx.include_dir(),
            entry_source: ctx.config.entry_output.clone(),
            missing_libraries: toolkit
                .map(|t| t.missing.iter().cloned().collect())
                .unwrap_or_default(),
            missing_headers: missing_headers.iter().map(|h| h.to_string()).collect(),
        }
    }

    pub fn print(&self) {
        println!("  Triplet:      {}", self.triplet);
        println!("  vcpkg:        {}", self.vcpkg_root.display());
        println!("  Source:       {}", self.source_root.display());
        println!("  Libraries:    {}", self.lib_dir.display());
        println!("  Headers:      {}", self.include_dir.display());
        println!("  Entry source: {}", self.entry_source.display());
        if !self.missing_libraries.is_empty() {
            println!("  [WARN] missing libraries: {}", self.missing_libraries.join(", "));
        }
        if !self.missing_headers.is_empty() {
            println!("  [WARN] missing headers: {}", self.missing_headers.join(", "));
        }
    }
}

/// Outcome of a whole run.
#[derive(Debug)]
pub struct PipelineReport {
    pub steps: Vec<PipelineStep>,
    /// Present only when every step succeeded or was skipped.
    pub summary: Option<BuildSummary>,
    pub error: Option<anyhow::Error>,
}

#[derive(Serialize)]
struct ReportJson<'a> {
    ok: bool,
    steps: &'a [PipelineStep],
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a BuildSummary>,
}

impl PipelineReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn status_of(&self, stage: Stage) -> Option<StepStatus> {
        self.steps.iter().find(|s| s.stage == stage).map(|s| s.status)
    }

    /// True when the run changed nothing on disk.
    pub fn all_skipped(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Skipped)
    }

    /// Process exit status for this run.
    pub fn exit_code(&self) -> i32 {
        self.error.as_ref().map(exit_code_for).unwrap_or(0)
    }

    pub fn to_json(&self) -> Result<String> {
        let json = ReportJson {
            ok: self.is_ok(),
            steps: &self.steps,
            summary: self.summary.as_ref(),
        };
        Ok(serde_json::to_string_pretty(&json)?)
    }

    pub fn print_steps(&self) {
        let total = self.steps.len();
        for step in &self.steps {
            let status = match step.status {
                StepStatus::Succeeded => "[OK]",
                StepStatus::Skipped => "[SKIP]",
                StepStatus::Failed => "[FAIL]",
                StepStatus::Pending | StepStatus::Running => "[--]",
            };
            match step.elapsed_secs {
                Some(secs) if step.status == StepStatus::Succeeded => println!(
                    "{:<6} {}/{} {} ({:.1}s)",
                    status, step.order, total, step.stage, secs
                ),
                _ => println!("{:<6} {}/{} {}", status, step.order, total, step.stage),
            }
        }
    }

    /// Convert into a `Result`, dropping the per-step detail.
    pub fn into_result(self) -> Result<BuildSummary> {
        match (self.error, self.summary) {
            (Some(err), _) => Err(err),
            (None, Some(summary)) => Ok(summary),
            (None, None) => anyhow::bail!("pipeline finished without a summary"),
        }
    }
}

/// A sequence of stages bound to one context.
pub struct Pipeline<'a> {
    ctx: &'a PrepContext,
    stages: Vec<Stage>,
}

impl<'a> Pipeline<'a> {
    /// Every stage, starting with the vcpkg install.
    pub fn full(ctx: &'a PrepContext) -> Self {
        Self::with_stages(ctx, Stage::ALL.to_vec())
    }

    /// Every stage after the install; vcpkg must already have run.
    pub fn without_install(ctx: &'a PrepContext) -> Self {
        Self::with_stages(ctx, Stage::ALL[1..].to_vec())
    }

    pub fn with_stages(ctx: &'a PrepContext, stages: Vec<Stage>) -> Self {
        Self { ctx, stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub async fn run(&self) -> PipelineReport {
        let total = self.stages.len();
        let mut steps: Vec<PipelineStep> = self
            .stages
            .iter()
            .enumerate()
            .map(|(i, stage)| PipelineStep::new(*stage, i + 1))
            .collect();
        let mut toolkit = None;
        let mut missing_headers = Vec::new();
        let mut failure = None;

        for step in steps.iter_mut() {
            info!("[{}/{}] {}", step.order, total, step.stage.description());
            step.status = StepStatus::Running;
            let timer = Timer::start(step.stage.name());

            let result = match self
                .run_stage(step.stage, &mut toolkit, &mut missing_headers)
                .await
            {
                Ok(outcome) => self.check_postcondition(step.stage).map(|_| outcome),
                Err(err) => Err(err),
            };

            match result {
                Ok(Outcome::Skipped) => step.status = StepStatus::Skipped,
                Ok(Outcome::Done) => {
                    step.status = StepStatus::Succeeded;
                    step.elapsed_secs = Some(timer.finish());
                }
                Err(err) => {
                    let kind = kind_for(&err);
                    match kind {
                        Some(kind) => error!(
                            "step {}/{} ({}) failed [{}]: {:#}",
                            step.order, total, step.stage, kind, err
                        ),
                        None => error!(
                            "step {}/{} ({}) failed: {:#}",
                            step.order, total, step.stage, err
                        ),
                    }
                    step.status = StepStatus::Failed;
                    step.elapsed_secs = Some(timer.elapsed_secs());
                    step.error = Some(format!("{:#}", err));
                    step.error_kind = kind;
                    failure = Some(err);
                    break;
                }
            }
        }

        if let Some(err) = failure {
            return PipelineReport {
                steps,
                summary: None,
                error: Some(err),
            };
        }

        PipelineReport {
            summary: Some(BuildSummary::new(
                self.ctx,
                toolkit.as_ref(),
                &missing_headers,
            )),
            steps,
            error: None,
        }
    }

    async fn run_stage(
        &self,
        stage: Stage,
        toolkit: &mut Option<InstalledToolkit>,
        missing_headers: &mut Vec<&'static str>,
    ) -> Result<Outcome> {
        let ctx = self.ctx;
        match stage {
            Stage::InstallToolkit => {
                let (outcome, installed) = VcpkgManager::new(ctx).run().await?;
                *toolkit = Some(installed);
                Ok(outcome)
            }
            Stage::AcquireSource => {
                let (outcome, _tree) = SourceAcquirer::new(ctx).run().await?;
                Ok(outcome)
            }
            Stage::SyncConfig => {
                let report = config_sync::sync_config_headers(ctx)?;
                *missing_headers = report.missing();
                Ok(report.outcome())
            }
            Stage::CompatShim => {
                Ok(patch::apply_compat_shim(&ctx.config.source_root)?.outcome())
            }
            Stage::EntryRewrite => Ok(patch::generate_entry_source(&ctx.config)?.outcome()),
        }
    }

    /// On-disk state each stage guarantees once it has returned.
    fn check_postcondition(&self, stage: Stage) -> Result<()> {
        let ctx = self.ctx;
        match stage {
            Stage::InstallToolkit => {
                let lib_dir = ctx.lib_dir();
                if !lib_dir.is_dir() {
                    return Err(PrepError::LibraryDirMissing { path: lib_dir }.into());
                }
                Ok(())
            }
            Stage::AcquireSource => {
                SourceAcquirer::new(ctx).verify_manifest()?;
                Ok(())
            }
            Stage::SyncConfig => Ok(()),
            Stage::CompatShim => {
                let record = stdbit::record(&ctx.config.source_root);
                if !record.target.is_file() {
                    return Ok(());
                }
                let text = fsutil::read_text(&record.target)?;
                if text.contains(stdbit::STDBIT_INCLUDE) {
                    record.verify_applied()?;
                }
                Ok(())
            }
            Stage::EntryRewrite => entry::verify_generated(&ctx.config),
        }
    }
}
