//! Build plan walking and per-step dispatch.
//! The executor iterates steps in manifest order, builds render contexts,
//! applies the shell-command safety gate, and drives the collaborators.

use crate::command::CommandGate;
use crate::convert::{
    ingest_attributes, Backend, ConversionJob, DocumentConverter, SiteBuilder, SiteGenerator,
    ATTRIBUTES_CONFIG_FILE,
};
use crate::datasource::DataSource;
use crate::error::{Error, Result};
use crate::migrate::{AssetMigrator, MissingSourcePolicy};
use crate::plan::{BuildPlan, BuildTarget, Step, StepDetail};
use crate::prompt::Prompter;
use crate::renderer::{MiniJinjaRenderer, TemplateEngine};
use crate::scope::{ScopedContext, DATA_SCOPE, ROOT_SCOPE, VARS_SCOPE};
use log::{debug, error, info, warn};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Process-wide settings, passed explicitly so the pipeline stays testable
/// in isolation and re-entrant.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory every relative manifest path is resolved against.
    pub base_dir: PathBuf,
    /// Safe mode keeps the include boundary and the execute gate on.
    pub safe_mode: bool,
    /// `key=value` variable overrides from the CLI, merged into `vars`.
    pub cli_vars: Map<String, Value>,
    /// `key=value` attribute overrides from the CLI for render steps.
    pub cli_attributes: Map<String, Value>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            safe_mode: true,
            cli_vars: Map::new(),
            cli_attributes: Map::new(),
        }
    }
}

/// Executor states. Any step failure transitions to `Failed` and aborts the
/// remaining steps; there is no retry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Validating,
    Dispatching,
    Parsing,
    Rendering,
    Migrating,
    Executing,
    Deploying,
    Failed,
}

/// Walks a validated plan and dispatches each step by kind.
pub struct PipelineExecutor<'a> {
    config: &'a RunConfig,
    engine: &'a MiniJinjaRenderer,
    prompter: &'a dyn Prompter,
    converter: &'a dyn DocumentConverter,
    generator: &'a dyn SiteBuilder,
    migrator: AssetMigrator,
    gate: CommandGate,
    state: State,
    last_render_output: Option<PathBuf>,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(
        config: &'a RunConfig,
        engine: &'a MiniJinjaRenderer,
        prompter: &'a dyn Prompter,
        converter: &'a dyn DocumentConverter,
        generator: &'a dyn SiteBuilder,
    ) -> Self {
        Self {
            config,
            engine,
            prompter,
            converter,
            generator,
            migrator: AssetMigrator::new(),
            gate: CommandGate::new(),
            state: State::Idle,
            last_render_output: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Runs the whole plan, fail-fast.
    ///
    /// In safe mode all execute-step commands are collected up front and
    /// confirmed once for the entire plan; declining aborts the run before
    /// any step executes.
    pub fn run(&mut self, plan: &BuildPlan) -> Result<()> {
        self.state = State::Validating;
        self.confirm_execute_commands(plan).inspect_err(|_| self.state = State::Failed)?;

        for (number, step) in plan.steps.iter().enumerate() {
            self.state = State::Dispatching;
            if let Err(err) = self.dispatch(step) {
                self.state = State::Failed;
                let stage = step
                    .stage
                    .as_deref()
                    .map(|s| format!(" (stage '{s}')"))
                    .unwrap_or_default();
                error!("Step {} [{}]{} failed", number + 1, step.kind.as_str(), stage);
                return Err(err);
            }
        }
        self.state = State::Idle;
        Ok(())
    }

    /// The single global gate for shell-command steps. One prompt lists
    /// every command in the plan; there is no per-step prompt.
    fn confirm_execute_commands(&self, plan: &BuildPlan) -> Result<()> {
        let commands = plan.execute_commands();
        if commands.is_empty() || !self.config.safe_mode {
            return Ok(());
        }
        println!("This build plan wants to run the following shell commands:");
        for command in &commands {
            println!("  $ {command}");
        }
        if !self.prompter.confirm("Run these commands?", false)? {
            return Err(Error::ExecutionDeclined);
        }
        Ok(())
    }

    fn dispatch(&mut self, step: &Step) -> Result<()> {
        if let Some(reason) = &step.reason {
            info!("{}", reason);
        }
        match &step.detail {
            StepDetail::Parse { data, builds } => {
                self.state = State::Parsing;
                self.run_parse(data, builds)
            }
            StepDetail::Migrate { source, target } => {
                self.state = State::Migrating;
                self.run_migrate(step, source, target)
            }
            StepDetail::Render { index, attribute_files, builds } => {
                self.state = State::Rendering;
                self.run_render(index, attribute_files, builds)
            }
            StepDetail::Execute { command } => {
                self.state = State::Executing;
                self.run_execute(step, command)
            }
            StepDetail::Deploy => {
                self.state = State::Deploying;
                self.run_deploy();
                Ok(())
            }
        }
    }

    /// Builds the scoped context for a parse step's data sources.
    ///
    /// With exactly one source the payload lands in the `data` scope (map
    /// payloads are also flat-merged into the root so unprefixed lookups
    /// work). With several sources each payload lands under its own name
    /// scope, one per source.
    fn build_context(&self, sources: &[DataSource]) -> Result<ScopedContext> {
        let mut context = ScopedContext::new();
        match sources {
            [] => {}
            [source] => {
                let payload = source.load(&self.config.base_dir)?;
                if payload.is_object() {
                    context.merge(&payload, ROOT_SCOPE);
                }
                context.merge(&payload, DATA_SCOPE);
            }
            many => {
                for source in many {
                    let payload = source.load(&self.config.base_dir)?;
                    context.merge(&payload, &source.name());
                }
            }
        }
        Ok(context)
    }

    fn run_parse(&self, sources: &[DataSource], builds: &[BuildTarget]) -> Result<()> {
        let base_context = self.build_context(sources)?;
        for target in builds {
            let mut context = base_context.clone();
            if !target.variables.is_empty() {
                context.merge(&Value::Object(target.variables.clone()), VARS_SCOPE);
            }
            // CLI variables win over target-level ones.
            if !self.config.cli_vars.is_empty() {
                context.merge(&Value::Object(self.config.cli_vars.clone()), VARS_SCOPE);
            }
            match &target.template {
                Some(template) => self.render_target(template, target, &context)?,
                None => self.convert_target(target, context)?,
            }
        }
        Ok(())
    }

    fn render_target(
        &self,
        template: &Path,
        target: &BuildTarget,
        context: &ScopedContext,
    ) -> Result<()> {
        let template_path = self.resolve(template);
        let source = std::fs::read_to_string(&template_path).map_err(|_| Error::InvalidInput {
            role: "template".to_string(),
            file: template_path.clone(),
        })?;
        let rendered = self.engine.render(&source, context)?;
        if target.writes_to_stdout() {
            println!("{rendered}");
        } else {
            let output = self.resolve(Path::new(&target.output));
            write_output(&output, &rendered)?;
            info!("File built: {}", output.display());
        }
        Ok(())
    }

    /// The template-less path: strip the `data`/`vars` scopes and write the
    /// merged root context re-serialized in the output's target format.
    fn convert_target(&self, target: &BuildTarget, mut context: ScopedContext) -> Result<()> {
        context.remove(DATA_SCOPE);
        context.remove(VARS_SCOPE);
        let payload = context.snapshot();
        // Console output has no extension to dispatch on; YAML is the
        // default representation.
        if target.writes_to_stdout() {
            println!("{}", serde_yaml::to_string(&payload)?);
            return Ok(());
        }
        let output = Path::new(&target.output);
        let serialized = match output.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => serde_yaml::to_string(&payload)?,
            Some("json") => {
                let mut text = serde_json::to_string_pretty(&payload)?;
                text.push('\n');
                text
            }
            other => {
                warn!(
                    "Converting data out to '{}' is not implemented; skipping {}",
                    other.unwrap_or(""),
                    target.output
                );
                return Ok(());
            }
        };
        let output = self.resolve(output);
        write_output(&output, &serialized)?;
        info!("File built: {}", output.display());
        Ok(())
    }

    fn run_migrate(&self, step: &Step, source: &Path, target: &Path) -> Result<()> {
        let inclusive = step.option("inclusive").and_then(Value::as_bool).unwrap_or(true);
        let missing =
            MissingSourcePolicy::from_option(step.option("missing").and_then(Value::as_str));
        self.migrator.copy(&self.resolve(source), &self.resolve(target), inclusive, missing)
    }

    fn run_render(
        &mut self,
        index: &Path,
        attribute_files: &[PathBuf],
        builds: &[BuildTarget],
    ) -> Result<()> {
        let index_path = self.resolve(index);
        if !index_path.exists() {
            return Err(Error::InvalidInput {
                role: "source".to_string(),
                file: index_path,
            });
        }
        let base_attributes = ingest_attributes(attribute_files, &self.config.base_dir)?;

        for target in builds {
            // A target declaring generator config files is a site build;
            // the converter is bypassed entirely.
            if !target.configs.is_empty() {
                let mut attributes = base_attributes.clone();
                attributes.extend(target.attributes.clone());
                attributes.extend(self.config.cli_attributes.clone());
                let attr_config = self.resolve(Path::new(ATTRIBUTES_CONFIG_FILE));
                SiteGenerator::write_attributes_config(&attr_config, &attributes)?;
                let mut config_files: Vec<PathBuf> =
                    target.configs.iter().map(|c| self.resolve(c)).collect();
                config_files.push(attr_config);
                self.generator.build(&config_files, &target.arguments)?;
                continue;
            }

            let output = self.resolve(Path::new(&target.output));
            let backend = Backend::derive(target.backend.as_deref(), &output)?;

            let mut attributes = base_attributes.clone();
            if let Some(style) = &target.style {
                let key = match backend {
                    Backend::Pdf => "pdf-style",
                    Backend::Html5 => "stylesheet",
                };
                attributes.insert(key.to_string(), Value::String(style.clone()));
            }
            attributes.extend(target.attributes.clone());
            attributes.extend(self.config.cli_attributes.clone());
            debug!("Final pre-convert attributes: {:?}", attributes);

            let doctype = target.doctype.as_deref().unwrap_or("article");
            let job = ConversionJob {
                index: &index_path,
                attributes: &attributes,
                backend,
                doctype,
                output: &output,
            };
            self.converter.convert(&job)?;
            self.last_render_output = Some(output);
        }
        Ok(())
    }

    fn run_execute(&self, step: &Step, command: &str) -> Result<()> {
        let outcome = self.gate.run(command)?;

        if let Some(outfile) = step.option("outfile") {
            let (path, prepend, append) = match outfile {
                Value::String(path) => (Some(PathBuf::from(path)), None, None),
                Value::Object(record) => (
                    record.get("path").and_then(Value::as_str).map(PathBuf::from),
                    record.get("prepend").and_then(Value::as_str),
                    record.get("append").and_then(Value::as_str),
                ),
                _ => (None, None, None),
            };
            if let Some(path) = path {
                outcome.write_outfile(&self.resolve(&path), prepend, append)?;
            }
        }
        if step.option("stdout").and_then(Value::as_bool).unwrap_or(false) {
            outcome.echo();
        }

        if !outcome.success {
            // Non-zero exit is fatal unless the step declares otherwise.
            match step.option("error.response").and_then(Value::as_str) {
                Some("warn") => {
                    warn!("Command `{}` failed with {}", outcome.command, outcome.status);
                    Ok(())
                }
                Some("ignore") => Ok(()),
                _ => Err(Error::CommandFailed {
                    command: outcome.command,
                    status: outcome.status,
                }),
            }
        } else {
            Ok(())
        }
    }

    fn run_deploy(&self) {
        warn!("Deploy steps are experimental.");
        match &self.last_render_output {
            Some(output) => info!(
                "A local preview server would serve {}; deploy carries no further contract.",
                output.display()
            ),
            None => info!("Nothing rendered yet; deploy step has no target."),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.base_dir.join(path)
        }
    }
}

fn write_output(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
