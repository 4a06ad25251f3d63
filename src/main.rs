use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mealflow::config::{Config, ConfigOverrides};
use mealflow::evaluator::{best_result, EvaluationResult};
use mealflow::output::csv::{comparison_to_csv, plan_to_csv};
use mealflow::output::json::render_json;
use mealflow::output::table::{
    render_alternatives_table, render_changes_list, render_comparison_table, render_plan_table,
};
use mealflow::params::ParameterSet;
use mealflow::plan::DayPlanEntry;
use mealflow::report::{self, HttpRenderer, ReportFormat, ReportMetadata, ReportRenderer};
use mealflow::server::run_server;
use mealflow::session::WorkflowSession;
use mealflow::solver;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportFormatArg {
    Pdf,
    Xlsx,
}

impl From<ReportFormatArg> for ReportFormat {
    fn from(value: ReportFormatArg) -> Self {
        match value {
            ReportFormatArg::Pdf => ReportFormat::Pdf,
            ReportFormatArg::Xlsx => ReportFormat::Xlsx,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "mealflow", about = "Interactive meal-plan workflow runner")]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[arg(long = "solver-url")]
    solver_url: Option<String>,
    #[arg(long)]
    school: Option<String>,
    /// Fall back to the built-in deterministic solver when the HTTP solver
    /// is unreachable.
    #[arg(long)]
    mock: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Args, Clone, Default)]
struct ParamArgs {
    #[arg(long)]
    days: Option<u32>,
    #[arg(long)]
    budget: Option<f64>,
    #[arg(long)]
    kcal: Option<f64>,
}

impl ParamArgs {
    fn apply(&self, mut params: ParameterSet) -> ParameterSet {
        if let Some(days) = self.days {
            params.days = days;
        }
        if let Some(budget) = self.budget {
            params.budget_won = budget;
        }
        if let Some(kcal) = self.kcal {
            params.target_kcal = kcal;
        }
        params
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// End-to-end run: generate, evaluate, pick a strategy, show the plan.
    Plan {
        request: String,
        #[arg(long)]
        select: Option<u32>,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Generate the three candidate strategies for a request.
    Alternatives { request: String },
    /// Apply a natural-language parameter edit.
    Edit {
        instruction: String,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Evaluate all three strategies and compare them.
    Evaluate {
        request: String,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Run a single optimization with explicit parameters.
    Optimize {
        #[command(flatten)]
        params: ParamArgs,
        #[arg(long)]
        use_preset: bool,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Evaluate, pick a strategy and export the rendered report.
    Report {
        request: String,
        #[arg(long)]
        select: Option<u32>,
        #[arg(long, value_enum, default_value_t = ReportFormatArg::Pdf)]
        format: ReportFormatArg,
        #[arg(long = "out-dir")]
        out_dir: Option<PathBuf>,
    },
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 3001)]
        port: u16,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    config.apply_overrides(ConfigOverrides {
        solver_url: cli.solver_url.clone(),
        school_name: cli.school.clone(),
        mock_fallback: cli.mock.then_some(true),
    });

    if matches!(cli.command, Commands::Config { .. }) {
        return handle_config_command(&cli.command, &config, &config_path);
    }
    if let Commands::Serve { host, port } = &cli.command {
        let bind = format!("{host}:{port}");
        let addr: SocketAddr = bind
            .parse()
            .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
        let solver = solver::from_config(&config);
        return run_server(config, solver, addr).await;
    }

    let solver = solver::from_config(&config);
    let page_size = config.workflow.page_size;

    match &cli.command {
        Commands::Plan {
            request,
            select,
            page,
        } => {
            let mut session = WorkflowSession::new(solver);
            session.submit_request(request)?;
            session.evaluate().await?;
            let id = match select {
                Some(id) => *id,
                None => best_result(session.evaluation_results())
                    .map(|r| r.alternative_id)
                    .ok_or_else(|| anyhow!("no successful evaluation to select"))?,
            };
            session.select_alternative(id)?;
            session.finalize()?;
            info!(alternative = id, "plan finalized");
            let plan = session.final_plan().unwrap_or_default();
            print_plan(plan, page_size, page.saturating_sub(1), cli.output)?;
        }
        Commands::Alternatives { request } => {
            let mut session = WorkflowSession::new(solver);
            let alternatives = session.submit_request(request)?;
            match cli.output {
                OutputFormat::Json => println!("{}", render_json(alternatives)?),
                _ => println!("{}", render_alternatives_table(alternatives)),
            }
        }
        Commands::Edit {
            instruction,
            params,
        } => {
            let base = params.apply(defaults_from(&config));
            let (updated, changes) = mealflow::nl::apply_instruction(instruction, &base)?;
            match cli.output {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        render_json(&serde_json::json!({
                            "params": updated,
                            "changes": changes,
                        }))?
                    );
                }
                _ => {
                    println!("{}", render_changes_list(&changes));
                    println!("{}", render_json(&updated)?);
                }
            }
        }
        Commands::Evaluate { request, params } => {
            let mut session = WorkflowSession::new(solver);
            session.submit_request(request)?;
            let base = params.apply(session.params().clone());
            if &base != session.params() {
                session.set_params(base)?;
            }
            let results = session.evaluate().await?;
            print_comparison(results, cli.output)?;
        }
        Commands::Optimize {
            params,
            use_preset,
            page,
        } => {
            let effective = params.apply(defaults_from(&config));
            effective.validate()?;
            let outcome = solver.optimize(&effective, *use_preset).await?;
            print_plan(
                &outcome.entries,
                page_size,
                page.saturating_sub(1),
                cli.output,
            )?;
        }
        Commands::Report {
            request,
            select,
            format,
            out_dir,
        } => {
            let mut session = WorkflowSession::new(solver);
            session.submit_request(request)?;
            session.evaluate().await?;
            let id = match select {
                Some(id) => *id,
                None => best_result(session.evaluation_results())
                    .map(|r| r.alternative_id)
                    .ok_or_else(|| anyhow!("no successful evaluation to select"))?,
            };
            let chosen = session
                .evaluation_results()
                .iter()
                .find(|r| r.alternative_id == id)
                .ok_or_else(|| anyhow!("no alternative with id {id}"))?;
            let metadata = ReportMetadata {
                school_name: config.report.school_name.clone(),
                author: config.report.author.clone(),
                note: None,
            };
            let payload =
                report::build_payload(chosen, session.params(), metadata, (*format).into())?;
            if matches!(cli.output, OutputFormat::Json) {
                println!("{}", render_json(&payload)?);
                return Ok(());
            }
            let renderer = HttpRenderer::new(config.report.renderer_url.clone());
            let artifact = renderer.render(&payload).await?;
            let dir = out_dir
                .clone()
                .unwrap_or_else(|| config.resolved_output_dir());
            let path = report::save_artifact(&dir, &payload, &artifact)?;
            println!("Report saved to {}", path.display());
        }
        Commands::Serve { .. } | Commands::Config { .. } => unreachable!(),
    }

    Ok(())
}

fn defaults_from(config: &Config) -> ParameterSet {
    ParameterSet {
        days: config.defaults.days,
        budget_won: config.defaults.budget_won,
        target_kcal: config.defaults.target_kcal,
        ..ParameterSet::default()
    }
}

fn print_comparison(results: &[EvaluationResult], output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Table => println!("{}", render_comparison_table(results)),
        OutputFormat::Json => println!("{}", render_json(results)?),
        OutputFormat::Csv => println!("{}", comparison_to_csv(results)?),
    }
    Ok(())
}

fn print_plan(
    entries: &[DayPlanEntry],
    page_size: usize,
    page_index: usize,
    output: OutputFormat,
) -> Result<()> {
    match output {
        OutputFormat::Table => println!("{}", render_plan_table(entries, page_size, page_index)),
        OutputFormat::Json => println!("{}", render_json(entries)?),
        OutputFormat::Csv => println!("{}", plan_to_csv(entries)?),
    }
    Ok(())
}

fn handle_config_command(command: &Commands, config: &Config, path: &PathBuf) -> Result<()> {
    let Commands::Config { init, show } = command else {
        return Err(anyhow!("invalid config invocation"));
    };
    if *init {
        Config::write_template(path)?;
        println!("Wrote config template to {}", path.display());
        return Ok(());
    }
    if *show {
        println!("{}", toml::to_string_pretty(config)?);
        return Ok(());
    }
    Err(anyhow!("use --init to write a template or --show to print"))
}
