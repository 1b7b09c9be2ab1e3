use crate::cli::CronCommands;
use crate::config::Config;
use crate::cron::{CronJob, CronSchedule, CronService};
use crate::driver::{self, AgentDriver};
use crate::providers::MockProvider;
use crate::tools::ToolRegistry;
use crate::utils::get_workspace_path;
use anyhow::{Context, Result, bail};
use std::sync::Arc;

fn store_path(config: &Config) -> std::path::PathBuf {
    get_workspace_path(&config.paths.cron_store)
}

fn build_schedule(
    every_ms: Option<i64>,
    cron: Option<String>,
    tz: Option<String>,
    at_ms: Option<i64>,
) -> Result<CronSchedule> {
    match (every_ms, cron, at_ms) {
        (Some(every), None, None) => CronSchedule::every(every),
        (None, Some(expr), None) => Ok(CronSchedule::cron(expr, tz)),
        (None, None, Some(at)) => Ok(CronSchedule::at(at)),
        _ => bail!("exactly one of --every-ms, --cron, or --at-ms must be given"),
    }
}

pub async fn run(config: Config, cmd: CronCommands) -> Result<()> {
    let service = CronService::new(store_path(&config));

    match cmd {
        CronCommands::List { all } => {
            let jobs = service.list_jobs(all).await?;
            if jobs.is_empty() {
                println!("no cron jobs");
            }
            for job in jobs {
                println!(
                    "{}  {:<24}  enabled={:<5}  runs={:<4}  next_run_at_ms={:?}",
                    job.id, job.name, job.enabled, job.state.run_count, job.state.next_run_at_ms
                );
            }
        }
        CronCommands::Add { name, task, every_ms, cron, tz, at_ms, priority } => {
            let schedule = build_schedule(every_ms, cron, tz, at_ms)?;
            let job = CronJob::new(name, schedule, task, priority);
            let id = job.id.clone();
            service.add_job(job).await?;
            println!("added cron job {}", id);
        }
        CronCommands::Remove { id } => {
            let removed = service.remove_job(&id).await?;
            match removed {
                Some(job) => println!("removed '{}'", job.name),
                None => println!("no job with id {}", id),
            }
        }
        CronCommands::Enable { id } => {
            match service.enable_job(&id, true).await? {
                Some(job) => println!("enabled '{}'", job.name),
                None => println!("no job with id {}", id),
            }
        }
        CronCommands::Disable { id } => {
            match service.enable_job(&id, false).await? {
                Some(job) => println!("disabled '{}'", job.name),
                None => println!("no job with id {}", id),
            }
        }
        CronCommands::Run { id } => {
            let model = config.provider.model.clone();
            service
                .set_on_job(move |job| {
                    let model = model.clone();
                    Box::pin(async move { run_job_task(job, model).await })
                })
                .await;
            match service.run_job(&id, true).await? {
                Some(Some(result)) => println!("{}", result),
                Some(None) => println!("job ran, no output"),
                None => println!("no job with id {}", id),
            }
        }
    }

    Ok(())
}

async fn run_job_task(job: CronJob, model: String) -> Result<Option<String>> {
    let provider = Arc::new(MockProvider::text(format!("{} {}", job.task, driver::TERMINATE_SENTINEL)));
    let tools = Arc::new(ToolRegistry::new());
    let view = tools.subset(&driver::excluded_for_subagents());
    let worker = AgentDriver::headless(provider, view, driver::subagent_system_prompt(&job.task), driver::DEFAULT_SUBAGENT_MAX_ITERATIONS);
    let _ = model;
    let result = worker.run_task(job.task.clone()).await.with_context(|| format!("running cron job '{}'", job.name))?;
    Ok(Some(result))
}
