//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `critpath_core` linkage.
//! - Schedule a small demo project and print its critical path.
//!
//! Usage: `critpath_cli [db_path]`. Without a path the demo runs in memory.
//! Set `CRITPATH_LOG_DIR` to an absolute directory to enable file logs.

use chrono::NaiveDate;
use critpath_core::db::{open_db, open_db_in_memory};
use critpath_core::{
    init_logging, LoggingConfig, MilestoneDraft, Project, ScheduleService,
    SqliteMilestoneRepository,
};
use log::info;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    if let Some(log_dir) = std::env::var_os("CRITPATH_LOG_DIR") {
        init_logging(&LoggingConfig::new(log_dir))?;
    }

    println!("critpath_core ping={}", critpath_core::ping());
    println!("critpath_core version={}", critpath_core::core_version());

    let conn = match std::env::args().nth(1) {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };
    let repo = SqliteMilestoneRepository::try_new(&conn)?;
    let project = Project::new("demo", NaiveDate::from_ymd_opt(2024, 1, 1));
    repo.upsert_project(&project)?;
    info!("event=cli_demo module=cli status=start project={}", project.uuid);

    let service = ScheduleService::new(&repo);
    let design = service.create_milestone(
        project.uuid,
        &MilestoneDraft::new("design").with_duration(5),
    )?;
    let build = service.create_milestone(
        project.uuid,
        &MilestoneDraft::new("build")
            .with_duration(10)
            .with_dependencies([design.uuid]),
    )?;
    let docs = service.create_milestone(
        project.uuid,
        &MilestoneDraft::new("docs")
            .with_duration(3)
            .with_dependencies([design.uuid]),
    )?;
    service.create_milestone(
        project.uuid,
        &MilestoneDraft::new("release")
            .with_duration(1)
            .with_dependencies([build.uuid, docs.uuid]),
    )?;

    let report = service.recalculate_project(project.uuid)?;
    for milestone in &report.milestones {
        let Some(window) = milestone.schedule else {
            continue;
        };
        println!(
            "{:<8} es={} ef={} ls={} lf={} slack={} critical={}",
            milestone.name,
            window.earliest_start,
            window.earliest_finish,
            window.latest_start,
            window.latest_finish,
            window.slack_days,
            window.is_critical
        );
    }
    let critical: Vec<&str> = report
        .critical_sequence
        .iter()
        .filter_map(|id| {
            report
                .milestones
                .iter()
                .find(|milestone| milestone.uuid == *id)
                .map(|milestone| milestone.name.as_str())
        })
        .collect();
    println!("critical_path={}", critical.join(" -> "));
    Ok(())
}
