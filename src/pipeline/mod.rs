//! The conversion job: input plugin, book construction, transform passes,
//! output plugin.
//!
//! ```no_run
//! use ebconv::pipeline::{Pipeline, UserOptions};
//! use ebconv::plugin::PluginRegistry;
//! use std::path::Path;
//!
//! let registry = PluginRegistry::builtin();
//! let mut pipeline = Pipeline::new(&registry);
//! let report = pipeline.run(
//!     Path::new("in.epub"),
//!     Path::new("out.epub"),
//!     &UserOptions::default(),
//! )?;
//! println!("{} passes", report.passes.len());
//! # Ok::<(), ebconv::Error>(())
//! ```

mod context;

pub use context::{DEFAULT_SPILL_THRESHOLD, JobContext};

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::book::Book;
use crate::error::{Error, Feedback, Result};
use crate::opf;
use crate::options::{OptionMerger, OptionSet, pipeline_options};
use crate::plugin::{
    BookSource, InputArtifacts, InputPlugin, OutputPlugin, PluginRegistry, extension_of,
};
use crate::transforms::{self, PassOutcome};

/// Output format used when the output path has no extension.
const DIRECTORY_OUTPUT: &str = "oeb";

/// Where a job is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Detecting,
    MergingOptions,
    Input,
    Building,
    Transforms,
    Output,
    Done,
    Failed(FailedStage),
}

/// The stage a failed job was in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStage {
    Detecting,
    MergingOptions,
    Input,
    Building,
    Transforms,
    Output,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Failed(stage) => write!(f, "failed during {stage:?}"),
            other => write!(f, "{other:?}"),
        }
    }
}

impl Stage {
    fn failed(self) -> Stage {
        let stage = match self {
            Stage::Detecting => FailedStage::Detecting,
            Stage::MergingOptions => FailedStage::MergingOptions,
            Stage::Input => FailedStage::Input,
            Stage::Building => FailedStage::Building,
            Stage::Transforms => FailedStage::Transforms,
            Stage::Output => FailedStage::Output,
            Stage::Done | Stage::Failed(_) => return self,
        };
        Stage::Failed(stage)
    }
}

/// Options given by the user, applied at the highest level.
#[derive(Debug, Clone, Default)]
pub struct UserOptions {
    /// Contents of an options file: a JSON object of name to value.
    pub file: Option<serde_json::Value>,
    /// `NAME=VALUE` pairs from the command line; they override the file.
    pub values: Vec<(String, String)>,
}

impl UserOptions {
    /// Parse `NAME=VALUE`. Dashes in the name are read as underscores.
    pub fn push_raw(&mut self, raw: &str) -> Result<()> {
        let (name, value) = raw
            .split_once('=')
            .ok_or_else(|| Error::invalid_option(raw, "expected NAME=VALUE"))?;
        self.values
            .push((name.trim().replace('-', "_"), value.to_string()));
        Ok(())
    }
}

/// Summary of a finished job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub stages: Vec<Stage>,
    pub passes: Vec<(String, PassOutcome)>,
    pub feedback: Vec<Feedback>,
}

/// Runs conversion jobs with the plugins of a registry.
pub struct Pipeline<'r> {
    registry: &'r PluginRegistry,
    stage: Stage,
    stages: Vec<Stage>,
    feedback: Vec<Feedback>,
    spill_threshold: usize,
}

impl<'r> Pipeline<'r> {
    pub fn new(registry: &'r PluginRegistry) -> Self {
        Self {
            registry,
            stage: Stage::Detecting,
            stages: Vec::new(),
            feedback: Vec::new(),
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
        }
    }

    /// Payloads above `bytes` are kept on disk instead of in memory.
    pub fn with_spill_threshold(mut self, bytes: usize) -> Self {
        self.spill_threshold = bytes;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Feedback raised by the last job, kept when it failed.
    pub fn feedback(&self) -> &[Feedback] {
        &self.feedback
    }

    fn enter(&mut self, stage: Stage) {
        log::info!("job: {stage}");
        self.stage = stage;
        self.stages.push(stage);
    }

    /// Convert `input` into `output`.
    ///
    /// The job's scratch directory is removed whether it succeeds or not.
    pub fn run(&mut self, input: &Path, output: &Path, user: &UserOptions) -> Result<JobReport> {
        self.stages.clear();
        self.feedback.clear();
        let mut ctx = JobContext::with_spill_threshold(self.spill_threshold)?;
        let mut passes = Vec::new();

        if let Err(e) = self.run_job(input, output, user, &mut ctx, &mut passes) {
            self.feedback = std::mem::take(&mut ctx.feedback);
            return Err(self.fail(e));
        }
        let closed = ctx.close();
        self.finish(closed, passes)
    }

    /// Wrap up a job whose output was written, once its scratch space is
    /// released.
    fn finish(
        &mut self,
        closed: Result<Vec<Feedback>>,
        passes: Vec<(String, PassOutcome)>,
    ) -> Result<JobReport> {
        let feedback = closed.map_err(|e| self.fail(e))?;
        self.feedback = feedback.clone();
        self.enter(Stage::Done);
        Ok(JobReport {
            stages: self.stages.clone(),
            passes,
            feedback,
        })
    }

    /// Record the current stage as failed.
    fn fail(&mut self, e: Error) -> Error {
        let failed = self.stage.failed();
        log::error!("job: {failed}: {e}");
        self.stage = failed;
        self.stages.push(failed);
        e
    }

    fn run_job(
        &mut self,
        input: &Path,
        output: &Path,
        user: &UserOptions,
        ctx: &mut JobContext,
        passes: &mut Vec<(String, PassOutcome)>,
    ) -> Result<()> {
        self.enter(Stage::Detecting);
        let input_ext = extension_of(input).ok_or_else(|| {
            Error::UnsupportedFormat(format!("{} has no extension", input.display()))
        })?;
        let output_ext = extension_of(output).unwrap_or_else(|| DIRECTORY_OUTPUT.to_string());
        let input_plugin = self.registry.input_for(&input_ext)?;
        let output_plugin = self.registry.output_for(&output_ext)?;
        log::info!(
            "job: {} ({}) -> {} ({})",
            input.display(),
            input_plugin.name(),
            output.display(),
            output_plugin.name()
        );

        self.enter(Stage::MergingOptions);
        let options = merge_options(input_plugin, output_plugin, user)?;

        self.enter(Stage::Input);
        let outcome = input_plugin.convert(input, &options, &input_ext, ctx)?;

        self.enter(Stage::Building);
        let mut book = match outcome.source {
            BookSource::Descriptor(path) => opf::read_book(&path, Some(ctx.spill_config()))?,
            BookSource::Book(book) => book,
        };
        book.check_consistency()?;
        let tracked = TrackedArtifacts::new(&book, &outcome.artifacts);

        self.enter(Stage::Transforms);
        for pass in transforms::passes() {
            let result = transforms::run(pass.as_ref(), &mut book, &options, ctx)?;
            passes.push((pass.name().to_string(), result));
        }
        let artifacts = tracked.current(&book);
        input_plugin.postprocess_book(&mut book, &options, &artifacts)?;
        book.check_consistency()?;

        self.enter(Stage::Output);
        output_plugin.convert(&mut book, output, &artifacts, &options, ctx)?;
        Ok(())
    }
}

/// Defaults, then the input plugin's recommendations, then the output
/// plugin's, then the user's (file before command line).
fn merge_options(
    input: &dyn InputPlugin,
    output: &dyn OutputPlugin,
    user: &UserOptions,
) -> Result<OptionSet> {
    let mut merger = OptionMerger::new(pipeline_options());
    for spec in input.options().into_iter().chain(output.options()) {
        merger.declare(spec);
    }
    merger.merge(input.name(), &input.recommendations())?;
    merger.merge(output.name(), &output.recommendations())?;
    if let Some(file) = &user.file {
        merger.user_json(file)?;
    }
    for (name, value) in &user.values {
        merger.user(name, value)?;
    }
    Ok(merger.resolve())
}

/// Input artifacts held by item id while passes may rename files.
struct TrackedArtifacts {
    removed_cover: Option<Tracked>,
    encrypted_fonts: Vec<Tracked>,
}

enum Tracked {
    Item(String),
    /// A path with no manifest item; passed on unchanged.
    Path(String),
}

impl TrackedArtifacts {
    fn new(book: &Book, artifacts: &InputArtifacts) -> Self {
        let track = |path: &String| match book.manifest.by_path(path) {
            Some(item) => Tracked::Item(item.id().to_string()),
            None => Tracked::Path(path.clone()),
        };
        Self {
            removed_cover: artifacts.removed_cover.as_ref().map(track),
            encrypted_fonts: artifacts.encrypted_fonts.iter().map(track).collect(),
        }
    }

    /// The artifacts with current paths; items removed by a pass drop out.
    fn current(&self, book: &Book) -> InputArtifacts {
        let paths: HashMap<&str, &str> = book.manifest.iter().map(|i| (i.id(), i.href())).collect();
        let resolve = |tracked: &Tracked| match tracked {
            Tracked::Item(id) => paths.get(id.as_str()).map(|p| p.to_string()),
            Tracked::Path(path) => Some(path.clone()),
        };
        InputArtifacts {
            removed_cover: self.removed_cover.as_ref().and_then(resolve),
            encrypted_fonts: self.encrypted_fonts.iter().filter_map(resolve).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionValue;
    use crate::plugin::{EpubOutput, TxtInput};

    #[test]
    fn test_user_options_override_recommendations() {
        let mut user = UserOptions {
            file: Some(serde_json::json!({"flow_size": 10, "epub_version": "3"})),
            values: Vec::new(),
        };
        user.push_raw("flow-size=20").unwrap();
        let options = merge_options(&TxtInput, &EpubOutput::new(), &user).unwrap();
        assert_eq!(options.int("flow_size"), Some(20));
        assert_eq!(options.text("epub_version"), Some("3"));
        assert_eq!(options.get("insert_cover"), Some(&OptionValue::Bool(true)));
        assert!(options.flag("upshift_markup"));
    }

    #[test]
    fn test_cleanup_failure_marks_output_failed() {
        let registry = PluginRegistry::empty();
        let mut pipeline = Pipeline::new(&registry);
        pipeline.enter(Stage::Output);
        let closed = Err(Error::Io(std::io::Error::other("busy")));
        assert!(pipeline.finish(closed, Vec::new()).is_err());
        assert_eq!(pipeline.stage(), Stage::Failed(FailedStage::Output));
        assert_eq!(pipeline.stages.last(), Some(&Stage::Failed(FailedStage::Output)));
    }

    #[test]
    fn test_unknown_user_option_is_rejected() {
        let mut user = UserOptions::default();
        user.push_raw("no_such_thing=1").unwrap();
        let err = merge_options(&TxtInput, &EpubOutput::new(), &user).unwrap_err();
        assert!(matches!(err, Error::InvalidOption { .. }));
        assert!(UserOptions::default().push_raw("novalue").is_err());
    }

    #[test]
    fn test_txt_to_oeb_stages() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("story.txt");
        std::fs::write(&input, "Once.\n\nTwice.\n").unwrap();
        let output = dir.path().join("story");

        let registry = PluginRegistry::builtin();
        let mut pipeline = Pipeline::new(&registry);
        let report = pipeline
            .run(&input, &output, &UserOptions::default())
            .unwrap();
        assert_eq!(pipeline.stage(), Stage::Done);
        assert_eq!(
            report.stages,
            [
                Stage::Detecting,
                Stage::MergingOptions,
                Stage::Input,
                Stage::Building,
                Stage::Transforms,
                Stage::Output,
                Stage::Done
            ]
        );
        assert_eq!(report.passes.len(), transforms::passes().len());
        assert!(output.join("content.opf").is_file());
        assert!(output.join("index.xhtml").is_file());
    }

    #[test]
    fn test_failure_records_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("missing.txt");
        let registry = PluginRegistry::builtin();
        let mut pipeline = Pipeline::new(&registry);
        assert!(pipeline
            .run(&input, &dir.path().join("out.epub"), &UserOptions::default())
            .is_err());
        assert_eq!(pipeline.stage(), Stage::Failed(FailedStage::Input));

        let err = pipeline
            .run(&dir.path().join("in.docx"), &dir.path().join("out.epub"), &UserOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        assert_eq!(pipeline.stage(), Stage::Failed(FailedStage::Detecting));
    }
}
