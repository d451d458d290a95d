use docpipe::convert::{ConversionJob, DocumentConverter, SiteBuilder};
use docpipe::error::{Error, Result};
use docpipe::executor::{PipelineExecutor, RunConfig, State};
use docpipe::include::IncludeResolver;
use docpipe::plan::BuildPlan;
use docpipe::prompt::Prompter;
use docpipe::renderer::MiniJinjaRenderer;
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scripted stand-in for the interactive confirmation gate.
struct ScriptedPrompter {
    answer: bool,
    calls: Cell<usize>,
}

impl ScriptedPrompter {
    fn new(answer: bool) -> Self {
        Self { answer, calls: Cell::new(0) }
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, _message: &str, _default: bool) -> Result<bool> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.answer)
    }
}

/// Records conversion handoffs instead of shelling out.
#[derive(Default)]
struct RecordingConverter {
    jobs: RefCell<Vec<(PathBuf, String, PathBuf, Value)>>,
}

impl DocumentConverter for RecordingConverter {
    fn convert(&self, job: &ConversionJob) -> Result<()> {
        self.jobs.borrow_mut().push((
            job.index.to_path_buf(),
            job.backend.as_str().to_string(),
            job.output.to_path_buf(),
            Value::Object(job.attributes.clone()),
        ));
        Ok(())
    }
}

/// Records site-generator handoffs instead of shelling out.
#[derive(Default)]
struct RecordingSiteBuilder {
    builds: RefCell<Vec<(Vec<PathBuf>, Vec<String>)>>,
}

impl SiteBuilder for RecordingSiteBuilder {
    fn build(&self, config_files: &[PathBuf], extra_args: &[String]) -> Result<()> {
        self.builds.borrow_mut().push((config_files.to_vec(), extra_args.to_vec()));
        Ok(())
    }
}

fn run_plan(base: &Path, manifest: &str, prompter: &ScriptedPrompter) -> Result<State> {
    let converter = RecordingConverter::default();
    let generator = RecordingSiteBuilder::default();
    run_plan_with(base, manifest, prompter, &converter, &generator, true)
}

fn run_plan_with(
    base: &Path,
    manifest: &str,
    prompter: &ScriptedPrompter,
    converter: &dyn DocumentConverter,
    generator: &dyn SiteBuilder,
    safe_mode: bool,
) -> Result<State> {
    let config = RunConfig { base_dir: base.to_path_buf(), safe_mode, ..Default::default() };
    let engine =
        MiniJinjaRenderer::new(IncludeResolver::new(vec![base.to_path_buf()], safe_mode));
    let plan = BuildPlan::parse(manifest)?;
    let mut executor =
        PipelineExecutor::new(&config, &engine, prompter, converter, generator);
    executor.run(&plan)?;
    Ok(executor.state())
}

#[test]
fn test_parse_step_renders_template_to_output() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("data.yml"), "name: World\n").unwrap();
    fs::write(temp_dir.path().join("hello.tpl"), "Hello {{ data.name }}").unwrap();

    let manifest = r#"
- action: parse
  data: data.yml
  builds:
    - template: hello.tpl
      output: out/hello.txt
"#;
    let prompter = ScriptedPrompter::new(true);
    let state = run_plan(temp_dir.path(), manifest, &prompter).unwrap();
    assert_eq!(state, State::Idle);
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("out/hello.txt")).unwrap(),
        "Hello World"
    );
    // no execute steps, so the gate never prompted
    assert_eq!(prompter.calls.get(), 0);
}

#[test]
fn test_parse_step_with_multiple_sources_uses_named_scopes() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("site.yml"), "title: Docs\n").unwrap();
    fs::write(temp_dir.path().join("nav.yml"), "items:\n  - home\n").unwrap();
    fs::write(
        temp_dir.path().join("page.tpl"),
        "{{ site.title }}/{{ nav.items[0] }}",
    )
    .unwrap();

    let manifest = r#"
- action: parse
  data:
    - site.yml
    - nav.yml
  builds:
    - template: page.tpl
      output: page.txt
"#;
    let prompter = ScriptedPrompter::new(true);
    run_plan(temp_dir.path(), manifest, &prompter).unwrap();
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("page.txt")).unwrap(),
        "Docs/home"
    );
}

#[test]
fn test_target_variables_land_in_vars_scope() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("data.yml"), "name: World\n").unwrap();
    fs::write(temp_dir.path().join("t.tpl"), "{{ vars.greeting }} {{ data.name }}").unwrap();

    let manifest = r#"
- action: parse
  data: data.yml
  builds:
    - template: t.tpl
      output: greet.txt
      variables:
        greeting: Howdy
"#;
    let prompter = ScriptedPrompter::new(true);
    run_plan(temp_dir.path(), manifest, &prompter).unwrap();
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("greet.txt")).unwrap(),
        "Howdy World"
    );
}

#[test]
fn test_templateless_target_reserializes_root_without_data_and_vars() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("data.yml"), "name: World\ncount: 2\n").unwrap();

    let manifest = r#"
- action: parse
  data: data.yml
  builds:
    - output: snapshot.json
      variables:
        hidden: yes
"#;
    let prompter = ScriptedPrompter::new(true);
    run_plan(temp_dir.path(), manifest, &prompter).unwrap();
    let written: Value =
        serde_json::from_str(&fs::read_to_string(temp_dir.path().join("snapshot.json")).unwrap())
            .unwrap();
    assert_eq!(written, json!({"name": "World", "count": 2}));
}

#[test]
fn test_migrate_step_copies_identical_bytes() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir(temp_dir.path().join("assets")).unwrap();
    let payload: Vec<u8> = (0u16..512).map(|b| (b % 251) as u8).collect();
    fs::write(temp_dir.path().join("assets/img.png"), &payload).unwrap();

    let manifest = r#"
- action: migrate
  source: assets/img.png
  target: out/img.png
"#;
    let prompter = ScriptedPrompter::new(true);
    run_plan(temp_dir.path(), manifest, &prompter).unwrap();
    assert_eq!(fs::read(temp_dir.path().join("out/img.png")).unwrap(), payload);
}

#[test]
fn test_migrate_directory_contents_when_not_inclusive() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("theme/fonts")).unwrap();
    fs::write(temp_dir.path().join("theme/fonts/a.ttf"), "aa").unwrap();

    let manifest = r#"
- action: migrate
  source: theme
  target: out
  options:
    inclusive: false
"#;
    let prompter = ScriptedPrompter::new(true);
    run_plan(temp_dir.path(), manifest, &prompter).unwrap();
    assert!(temp_dir.path().join("out/fonts/a.ttf").exists());
    assert!(!temp_dir.path().join("out/theme").exists());
}

#[test]
fn test_migrate_missing_source_default_policy_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let manifest = "- action: migrate\n  source: nope.txt\n  target: out.txt\n";
    let prompter = ScriptedPrompter::new(true);
    let err = run_plan(temp_dir.path(), manifest, &prompter).unwrap_err();
    assert!(matches!(err, Error::MigrateSourceMissing { .. }));
}

#[test]
fn test_migrate_missing_source_warn_policy_continues() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("data.yml"), "name: World\n").unwrap();
    fs::write(temp_dir.path().join("t.tpl"), "ok").unwrap();

    let manifest = r#"
- action: migrate
  source: nope.txt
  target: out.txt
  options:
    missing: warn
- action: parse
  data: data.yml
  builds:
    - template: t.tpl
      output: later.txt
"#;
    let prompter = ScriptedPrompter::new(true);
    run_plan(temp_dir.path(), manifest, &prompter).unwrap();
    assert!(temp_dir.path().join("later.txt").exists());
}

#[test]
fn test_execute_gate_prompts_once_for_all_commands() {
    let temp_dir = TempDir::new().unwrap();
    let manifest = format!(
        "- action: execute\n  command: touch {0}/first\n- action: execute\n  command: touch {0}/second\n",
        temp_dir.path().display()
    );
    let prompter = ScriptedPrompter::new(true);
    run_plan(temp_dir.path(), &manifest, &prompter).unwrap();
    assert_eq!(prompter.calls.get(), 1);
    assert!(temp_dir.path().join("first").exists());
    assert!(temp_dir.path().join("second").exists());
}

#[test]
fn test_declining_the_gate_aborts_before_any_step() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("data.yml"), "name: World\n").unwrap();
    fs::write(temp_dir.path().join("t.tpl"), "x").unwrap();

    // the parse step precedes both execute steps, yet declining stops it too
    let manifest = format!(
        "- action: parse\n  data: data.yml\n  builds:\n    - template: t.tpl\n      output: early.txt\n\
         - action: execute\n  command: touch {0}/first\n\
         - action: execute\n  command: touch {0}/second\n",
        temp_dir.path().display()
    );
    let prompter = ScriptedPrompter::new(false);
    let err = run_plan(temp_dir.path(), &manifest, &prompter).unwrap_err();
    assert!(matches!(err, Error::ExecutionDeclined));
    assert_eq!(prompter.calls.get(), 1);
    assert!(!temp_dir.path().join("early.txt").exists());
    assert!(!temp_dir.path().join("first").exists());
    assert!(!temp_dir.path().join("second").exists());
}

#[test]
fn test_unsafe_mode_skips_the_gate() {
    let temp_dir = TempDir::new().unwrap();
    let manifest =
        format!("- action: execute\n  command: touch {}/ran\n", temp_dir.path().display());
    let prompter = ScriptedPrompter::new(false);
    let converter = RecordingConverter::default();
    let generator = RecordingSiteBuilder::default();
    run_plan_with(temp_dir.path(), &manifest, &prompter, &converter, &generator, false)
        .unwrap();
    assert_eq!(prompter.calls.get(), 0);
    assert!(temp_dir.path().join("ran").exists());
}

#[test]
fn test_execute_failure_is_fatal_by_default_but_downgradable() {
    let temp_dir = TempDir::new().unwrap();
    let prompter = ScriptedPrompter::new(true);

    let fatal = "- action: execute\n  command: \"false\"\n";
    let err = run_plan(temp_dir.path(), fatal, &prompter).unwrap_err();
    assert!(matches!(err, Error::CommandFailed { .. }));

    let soft = "- action: execute\n  command: \"false\"\n  options:\n    error:\n      response: warn\n";
    run_plan(temp_dir.path(), soft, &prompter).unwrap();
}

#[test]
fn test_execute_outfile_captures_stdout() {
    let temp_dir = TempDir::new().unwrap();
    let manifest = r##"
- action: execute
  command: echo captured
  options:
    outfile:
      path: cmd.log
      prepend: "# log"
"##;
    let prompter = ScriptedPrompter::new(true);
    run_plan(temp_dir.path(), manifest, &prompter).unwrap();
    let log = fs::read_to_string(temp_dir.path().join("cmd.log")).unwrap();
    assert_eq!(log, "# log\ncaptured\n");
}

#[test]
fn test_render_step_hands_off_attributes_and_backend() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("index.adoc"), "= Title\n").unwrap();
    fs::write(temp_dir.path().join("attrs.yml"), "product: docpipe\n").unwrap();

    let manifest = r#"
- action: render
  source: index.adoc
  data: attrs.yml
  builds:
    - output: out/index.pdf
      style: theme.yml
    - output: out/index.html
      attributes:
        toc: left
"#;
    let prompter = ScriptedPrompter::new(true);
    let converter = RecordingConverter::default();
    let generator = RecordingSiteBuilder::default();
    run_plan_with(temp_dir.path(), manifest, &prompter, &converter, &generator, true).unwrap();

    let jobs = converter.jobs.borrow();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].1, "pdf");
    assert_eq!(jobs[0].3["product"], json!("docpipe"));
    assert_eq!(jobs[0].3["pdf-style"], json!("theme.yml"));
    assert_eq!(jobs[1].1, "html5");
    assert_eq!(jobs[1].3["toc"], json!("left"));
}

#[test]
fn test_render_target_with_configs_drives_the_site_builder() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("index.adoc"), "= Title\n").unwrap();
    fs::write(temp_dir.path().join("attrs.yml"), "product: docpipe\n").unwrap();
    fs::write(temp_dir.path().join("_config.yml"), "source: .\n").unwrap();

    let manifest = r#"
- action: render
  source: index.adoc
  data: attrs.yml
  builds:
    - output: site
      configs: _config.yml
      arguments: --trace
"#;
    let prompter = ScriptedPrompter::new(true);
    let converter = RecordingConverter::default();
    let generator = RecordingSiteBuilder::default();
    run_plan_with(temp_dir.path(), manifest, &prompter, &converter, &generator, true).unwrap();

    assert!(converter.jobs.borrow().is_empty());
    let builds = generator.builds.borrow();
    assert_eq!(builds.len(), 1);
    let (configs, args) = &builds[0];
    assert_eq!(configs.len(), 2);
    assert!(configs[0].ends_with("_config.yml"));
    assert!(configs[1].ends_with("_docpipe_attributes.yml"));
    assert_eq!(args, &vec!["--trace".to_string()]);
    let attrs = fs::read_to_string(&configs[1]).unwrap();
    assert!(attrs.contains("product: docpipe"));
}

#[test]
fn test_templateless_stdout_target_writes_no_file() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("data.yml"), "name: World\n").unwrap();

    let manifest = r#"
- action: parse
  data: data.yml
  builds:
    - output: stdout
"#;
    let prompter = ScriptedPrompter::new(true);
    let state = run_plan(temp_dir.path(), manifest, &prompter).unwrap();
    assert_eq!(state, State::Idle);
    assert!(!temp_dir.path().join("stdout").exists());
}

#[test]
fn test_unrecognized_backend_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("index.adoc"), "= Title\n").unwrap();

    let manifest = r#"
- action: render
  source: index.adoc
  builds:
    - output: out/index.xml
      backend: docbook
"#;
    let prompter = ScriptedPrompter::new(true);
    let err = run_plan(temp_dir.path(), manifest, &prompter).unwrap_err();
    assert!(matches!(err, Error::UnrecognizedBackend { .. }));
}

#[test]
fn test_validation_is_all_or_nothing() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("data.yml"), "name: World\n").unwrap();
    fs::write(temp_dir.path().join("t.tpl"), "x").unwrap();

    // step 1 is valid, step 2 is missing its target; nothing may run
    let manifest = r#"
- action: parse
  data: data.yml
  builds:
    - template: t.tpl
      output: step1.txt
- action: migrate
  source: assets
"#;
    let prompter = ScriptedPrompter::new(true);
    let err = run_plan(temp_dir.path(), manifest, &prompter).unwrap_err();
    assert!(matches!(err, Error::StepStruct { ref field, .. } if field == "target"));
    assert!(!temp_dir.path().join("step1.txt").exists());
}
