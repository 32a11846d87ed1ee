//! CLI binary for validating and seeding CI pipeline definitions.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use seed_engine::{SeedConfig, Seeder, Severity};
use seed_types::{
    Attributes, DastProfileCatalog, PipelineContext, PipelineDefinition, PolicySet, Resource,
    SeedOutcome,
};

#[derive(Parser)]
#[command(name = "seed", version, about = "Decide which CI jobs a pipeline runs and how")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Lint a pipeline definition
    Validate {
        /// Path to the pipeline definition (JSON)
        pipeline: PathBuf,
    },

    /// Show stages and jobs of a pipeline definition
    Info {
        /// Path to the pipeline definition (JSON)
        pipeline: PathBuf,
    },

    /// Seed every job against a pipeline context
    Evaluate {
        /// Path to the pipeline definition (JSON)
        pipeline: PathBuf,

        /// Pipeline context (JSON)
        #[arg(short, long)]
        context: PathBuf,

        /// Policy fragments (JSON array)
        #[arg(long)]
        fragments: Option<PathBuf>,

        /// Materialized DAST site and scanner profiles (JSON)
        #[arg(long)]
        profiles: Option<PathBuf>,

        /// Seed configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the maximum number of needs per job
        #[arg(long)]
        max_needs: Option<usize>,

        /// Print results as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Merge security-policy jobs into a pipeline definition
    Inject {
        /// Path to the pipeline definition (JSON)
        pipeline: PathBuf,

        /// Policy jobs (JSON array of job objects)
        #[arg(long)]
        policy_jobs: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate { pipeline } => {
            cmd_validate(&pipeline)?;
        }
        Commands::Info { pipeline } => {
            cmd_info(&pipeline)?;
        }
        Commands::Evaluate {
            pipeline,
            context,
            fragments,
            profiles,
            config,
            max_needs,
            json,
        } => {
            let config = load_config(config.as_deref(), max_needs)?;
            cmd_evaluate(
                &pipeline,
                &context,
                fragments.as_deref(),
                profiles.as_deref(),
                config,
                json,
            )?;
        }
        Commands::Inject {
            pipeline,
            policy_jobs,
        } => {
            cmd_inject(&pipeline, &policy_jobs)?;
        }
    }

    Ok(())
}

fn load_pipeline(path: &Path) -> anyhow::Result<PipelineDefinition> {
    let definition = PipelineDefinition::load(path)
        .with_context(|| format!("failed to load pipeline definition {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        stages = definition.stages.len(),
        jobs = definition.jobs.len(),
        "Loaded pipeline definition"
    );
    Ok(definition)
}

fn load_config(path: Option<&Path>, max_needs: Option<usize>) -> anyhow::Result<SeedConfig> {
    let mut config = match path {
        Some(path) => SeedConfig::load(path)
            .with_context(|| format!("failed to load seed configuration {}", path.display()))?,
        None => SeedConfig::default(),
    };
    if let Some(max_needs) = max_needs {
        config.max_needs = max_needs;
    }
    Ok(config)
}

fn cmd_validate(path: &Path) -> anyhow::Result<()> {
    let definition = load_pipeline(path)?;
    let diagnostics = seed_engine::validate(&definition);

    if diagnostics.is_empty() {
        println!("Pipeline is valid");
        return Ok(());
    }

    let mut has_error = false;
    for diag in &diagnostics {
        let severity = match diag.severity {
            Severity::Error => {
                has_error = true;
                "ERROR"
            }
            Severity::Warning => "WARN",
            Severity::Info => "INFO",
        };
        println!("[{}] {}: {}", severity, diag.rule, diag.message);
        if let Some(fix) = &diag.fix {
            println!("        fix: {fix}");
        }
    }

    if has_error {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_info(path: &Path) -> anyhow::Result<()> {
    let definition = load_pipeline(path)?;

    let stages = definition.stage_order();
    println!("Stages: {}", stages.join(" -> "));
    println!("Jobs: {}", definition.jobs.len());

    for stage in &stages {
        let jobs: Vec<_> = definition.jobs.iter().filter(|j| &j.stage == stage).collect();
        if jobs.is_empty() {
            continue;
        }
        println!("\n{stage}:");
        for job in jobs {
            let policy = if job.uses_rules() {
                "rules"
            } else if job.uses_only_except() {
                "only/except"
            } else {
                "always"
            };
            let needs = job.needs.as_ref().map_or(0, Vec::len);
            println!(
                "  {} when={} policy={} needs={}",
                job.name,
                job.when.as_str(),
                policy,
                needs
            );
        }
    }

    Ok(())
}

fn cmd_evaluate(
    pipeline: &Path,
    context: &Path,
    fragments: Option<&Path>,
    profiles: Option<&Path>,
    config: SeedConfig,
    json: bool,
) -> anyhow::Result<()> {
    let definition = load_pipeline(pipeline)?;
    let context = PipelineContext::load(context)
        .with_context(|| format!("failed to load pipeline context {}", context.display()))?;
    let fragments = match fragments {
        Some(path) => PolicySet::load(path)
            .with_context(|| format!("failed to load policy fragments {}", path.display()))?,
        None => PolicySet::default(),
    };
    let profiles = match profiles {
        Some(path) => DastProfileCatalog::load(path)
            .with_context(|| format!("failed to load DAST profiles {}", path.display()))?,
        None => DastProfileCatalog::default(),
    };

    tracing::debug!(
        ref_name = %context.ref_name,
        max_needs = config.max_needs,
        "Seeding pipeline"
    );
    let seeder = Seeder::with_policies(config, fragments, profiles);
    let results = seeder.seed_pipeline(&definition, &context)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!("Ref: {} ({})", context.ref_name, context.source.as_str());
        for result in &results {
            let status = match &result.outcome {
                SeedOutcome::Included(Resource::Bridge(_)) => "bridge",
                SeedOutcome::Included(Resource::Build(_)) => "build",
                SeedOutcome::Excluded => "excluded",
            };
            println!("  {:<9} {}", status, result.name);
            for error in &result.errors {
                println!("            error: {error}");
            }
        }
    }

    let failing = results
        .iter()
        .filter(|r| r.is_included() && r.has_errors())
        .count();
    if failing > 0 {
        tracing::warn!(jobs = failing, "Included jobs carry errors");
        std::process::exit(2);
    }
    Ok(())
}

fn cmd_inject(pipeline: &Path, policy_jobs: &Path) -> anyhow::Result<()> {
    let mut definition = load_pipeline(pipeline)?;
    let source = std::fs::read_to_string(policy_jobs)
        .with_context(|| format!("failed to read policy jobs {}", policy_jobs.display()))?;
    let jobs: Vec<Attributes> = serde_json::from_str(&source)?;

    let before = definition.jobs.len();
    seed_engine::inject_policy_jobs(&mut definition, &jobs)
        .with_context(|| format!("failed to inject policy jobs {}", policy_jobs.display()))?;
    tracing::info!(
        policy_jobs = jobs.len(),
        appended = definition.jobs.len() - before,
        "Policy jobs injected"
    );
    println!("{}", serde_json::to_string_pretty(&definition)?);
    Ok(())
}
