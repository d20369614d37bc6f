//! Command implementations for the sentinel watch CLI.
//!
//! Provides subcommands for listing the catalogue, incrementally syncing a
//! project's satellite series, and fetching the latest visual of a station.

use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use log::info;
use std::path::Path;

use sw_cache::CacheDomain;
use sw_core::gateway::GatewaySession;
use sw_core::geo::resolve_cells;
use sw_core::project::Catalogue;

pub mod config;
pub mod incremental;
pub mod pipeline;

use config::Config;
use pipeline::{latest_visual, Pipeline, ProjectReport};

#[derive(Subcommand)]
pub enum Command {
    /// List the configured projects
    Projects,

    /// List the analysis cells of a project with their bounding boxes
    Cells {
        /// Project id, e.g. `maggiore-lake`
        project: String,
    },

    /// Incrementally update the caches and write the daily series as JSON
    Sync {
        /// Project id
        project: String,

        /// Output path for the JSON report (stdout when omitted)
        #[arg(short = 'o', long)]
        output: Option<String>,

        /// Write only the lake-wide aggregate series
        #[arg(long)]
        aggregate: bool,
    },

    /// Sync a project and print the latest reading per station
    Kpi {
        /// Project id
        project: String,
    },

    /// Save the latest cloud-free true-colour image of a station
    Visual {
        /// Station id, e.g. `zermatt`
        station: String,

        /// Output path for the PNG
        #[arg(short = 'o', long)]
        output: String,
    },
}

pub async fn run(command: Command) -> anyhow::Result<()> {
    let catalogue = Catalogue::builtin().context("Invalid station catalogue")?;
    match command {
        Command::Projects => {
            for project in &catalogue.projects {
                println!(
                    "{:<20} {:<14} {:>3} stations  {}",
                    project.id,
                    project.kind.optical_index().name(),
                    project.stations.len(),
                    project.name
                );
            }
            Ok(())
        }
        Command::Cells { project } => {
            let project = catalogue.find(&project)?;
            for station in &project.stations {
                for cell in resolve_cells(station, project) {
                    let [min_x, min_y, max_x, max_y] = cell.bbox.as_array();
                    println!("{:<16} {min_x:.6},{min_y:.6},{max_x:.6},{max_y:.6}", cell.cell_id);
                }
            }
            Ok(())
        }
        Command::Sync {
            project,
            output,
            aggregate,
        } => {
            let report = sync_project(&catalogue, &project).await?;
            let body = if aggregate {
                let series = report
                    .aggregate
                    .as_ref()
                    .with_context(|| format!("Project {project} has no lake-wide aggregate"))?;
                serde_json::to_string_pretty(series)?
            } else {
                serde_json::to_string_pretty(&report)?
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, body)?;
                    info!("Report for {} written to {}", project, path);
                }
                None => println!("{body}"),
            }
            Ok(())
        }
        Command::Kpi { project } => {
            let report = sync_project(&catalogue, &project).await?;
            for kpi in &report.kpis {
                let fmt = |v: Option<f64>| v.map(|v| format!("{v:.3}")).unwrap_or_else(|| "-".into());
                println!(
                    "{:<16} {:<28} {:>8} {:>8} {:>11} {}",
                    kpi.station_id,
                    kpi.name,
                    fmt(kpi.latest_index_value),
                    fmt(kpi.latest_ndmi_value),
                    kpi.latest_date.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
                    kpi.spatial_coverage.map(|c| format!("{c:.0}%")).unwrap_or_default(),
                );
            }
            Ok(())
        }
        Command::Visual { station, output } => {
            let (_, point) = catalogue.find_station(&station)?;
            let config = load_config()?;
            let gateway = session(&config)?;
            let today = Utc::now().date_naive();
            match latest_visual(&gateway, point, today).await? {
                Some(png) => {
                    std::fs::write(Path::new(&output), png)?;
                    info!("Latest visual of {} written to {}", station, output);
                }
                None => info!("No recent cloud-free image for {}", station),
            }
            Ok(())
        }
    }
}

fn load_config() -> anyhow::Result<Config> {
    let config = config::load_from_env()?;
    config.log_config();
    Ok(config)
}

fn session(config: &Config) -> anyhow::Result<GatewaySession> {
    Ok(GatewaySession::new(
        config.http_client()?,
        config.credentials.clone(),
        config.endpoints.clone(),
    ))
}

async fn sync_project(catalogue: &Catalogue, project_id: &str) -> anyhow::Result<ProjectReport> {
    let project = catalogue.find(project_id)?;
    let config = load_config()?;
    let gateway = session(&config)?;
    let optical = config.open_store(CacheDomain::Optical)?;
    let radar = config.open_store(CacheDomain::Radar)?;
    let settings = config.sync_settings(Utc::now().date_naive());

    let report = Pipeline::new(&gateway, optical.as_ref(), radar.as_ref(), settings)
        .with_policy(config.gap_fill)
        .run_project(project)
        .await
        .with_context(|| format!("Pipeline run for {project_id} failed"))?;
    Ok(report)
}
