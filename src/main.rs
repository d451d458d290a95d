//! docpipe's main application entry point and orchestration logic.
//! Handles command-line argument parsing, manifest loading, and coordinates
//! the executor and its collaborators.

use std::path::PathBuf;

use docpipe::{
    cli::{get_args, parse_pairs, Args},
    convert::{AsciidoctorConverter, SiteGenerator},
    datasource::DataSource,
    error::{default_error_handler, Error, Result},
    executor::{PipelineExecutor, RunConfig},
    include::IncludeResolver,
    logger::init_logger,
    plan::{load_manifest, BuildPlan, BuildTarget, Step, StepDetail, StepKind},
    prompt::DialoguerPrompter,
    renderer::MiniJinjaRenderer,
};

/// Conventional include search directory, relative to the base directory.
const DEFAULT_INCLUDES_DIR: &str = "_templates";

/// Main application entry point.
fn main() {
    let args = get_args();
    init_logger(args.verbose);

    if let Err(err) = run(args) {
        default_error_handler(err);
    }
}

/// Main application logic execution.
///
/// # Flow
/// 1. Builds the run configuration from CLI arguments
/// 2. Assembles the include search path
/// 3. Loads the manifest (pre-rendering it when self-templating), or builds
///    a one-step plan from the direct --data/--template/--output arguments
/// 4. Hands the plan to the executor
fn run(args: Args) -> Result<()> {
    let config = RunConfig {
        base_dir: args.base.clone(),
        safe_mode: !args.unsafe_mode,
        cli_vars: parse_pairs(&args.vars),
        cli_attributes: parse_pairs(&args.attributes),
    };

    let mut search_path = vec![config.base_dir.join(DEFAULT_INCLUDES_DIR)];
    for dir in &args.include_dirs {
        search_path.push(if dir.is_absolute() { dir.clone() } else { config.base_dir.join(dir) });
    }

    let plan;
    let engine;
    match &args.config {
        Some(manifest) => {
            let manifest = if manifest.is_absolute() {
                manifest.clone()
            } else {
                config.base_dir.join(manifest)
            };
            // A manifest may include partials from its own directory.
            if let Some(dir) = manifest.parent() {
                search_path.push(dir.to_path_buf());
            }
            engine =
                MiniJinjaRenderer::new(IncludeResolver::new(search_path, config.safe_mode));
            plan = load_manifest(&manifest, &engine, &config.cli_vars)?;
        }
        None => {
            engine =
                MiniJinjaRenderer::new(IncludeResolver::new(search_path, config.safe_mode));
            plan = direct_plan(&args)?;
        }
    }

    let prompter = DialoguerPrompter::new();
    let converter = AsciidoctorConverter::new();
    let generator = SiteGenerator::new();
    let mut executor =
        PipelineExecutor::new(&config, &engine, &prompter, &converter, &generator);
    executor.run(&plan)?;

    log::info!("Build plan completed.");
    Ok(())
}

/// Builds a one-step parse plan from the direct CLI arguments, for runs
/// without a manifest.
fn direct_plan(args: &Args) -> Result<BuildPlan> {
    let (Some(data), Some(template)) = (&args.data, &args.template) else {
        return Err(Error::ConfigStruct(
            "a direct build needs --data, --template, and --output (or --stdout); \
             pass --config for manifest builds"
                .to_string(),
        ));
    };
    let output = if args.stdout {
        "stdout".to_string()
    } else {
        args.output
            .as_ref()
            .map(|p| p.display().to_string())
            .ok_or_else(|| {
                Error::ConfigStruct(
                    "a direct build needs --output (or --stdout)".to_string(),
                )
            })?
    };

    Ok(BuildPlan {
        steps: vec![Step {
            kind: StepKind::Parse,
            stage: None,
            reason: None,
            options: serde_json::Map::new(),
            detail: StepDetail::Parse {
                data: vec![DataSource::new(PathBuf::from(data))],
                builds: vec![BuildTarget {
                    template: Some(template.clone()),
                    output,
                    variables: serde_json::Map::new(),
                    attributes: serde_json::Map::new(),
                    backend: None,
                    doctype: None,
                    style: None,
                    configs: Vec::new(),
                    arguments: Vec::new(),
                }],
            },
        }],
    })
}
