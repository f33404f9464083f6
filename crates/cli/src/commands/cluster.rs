//! Cluster lifecycle commands

use anyhow::Result;
use nano_lib::lifecycle::{ClusterListing, StopOutcome};
use nano_lib::{ClusterIdentity, ClusterInfo, ExecutionContext};
use std::path::Path;
use tabled::Tabled;

use crate::output::{color_status, format_timestamp, print_json, print_success, print_table, OutputFormat};
use crate::ClusterCommands;

/// Row for the cluster list table
#[derive(Tabled, serde::Serialize)]
struct ClusterRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "IMAGE")]
    image: String,
    #[tabled(rename = "IMAGE RELEASE")]
    image_release: String,
    #[tabled(rename = "IMAGE CREATION TIME")]
    image_created: String,
}

impl From<ClusterListing> for ClusterRow {
    fn from(listing: ClusterListing) -> Self {
        Self {
            name: listing.name,
            status: color_status(&listing.status),
            image: listing.image,
            image_release: listing.image_release,
            image_created: format_timestamp(&listing.image_created),
        }
    }
}

pub async fn run(cmd: ClusterCommands, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    match cmd {
        ClusterCommands::Start {
            name,
            work_dir,
            image,
            data,
            size,
            flavor,
            privileged,
        } => {
            let ctx = ExecutionContext {
                flavor,
                image: image.unwrap_or_default(),
                data,
                size,
                work_dir,
                privileged,
                debug: false,
                registry: super::registry(),
            };
            start(&ClusterIdentity::new(name), &ctx, config_path, format).await
        }
        ClusterCommands::Stop { name } => stop(&ClusterIdentity::new(name)).await,
        ClusterCommands::Restart { name } => {
            let info = super::manager()?.restart(&ClusterIdentity::new(name)).await?;
            show_info(&info, format);
            Ok(())
        }
        ClusterCommands::Status { name } => {
            let info = super::manager()?.status(&ClusterIdentity::new(name)).await?;
            show_info(&info, format);
            Ok(())
        }
        ClusterCommands::Purge {
            name,
            yes_i_am_sure,
            all,
        } => purge(&ClusterIdentity::new(name), yes_i_am_sure, all).await,
        ClusterCommands::Ls => list(format).await,
        ClusterCommands::Logs { name } => {
            let logs = super::manager()?.logs(&ClusterIdentity::new(name)).await?;
            if !logs.is_empty() {
                print!("{}", logs);
            }
            Ok(())
        }
        ClusterCommands::Enter { name } => {
            super::manager()?.enter(&ClusterIdentity::new(name)).await?;
            Ok(())
        }
    }
}

async fn start(
    identity: &ClusterIdentity,
    ctx: &ExecutionContext,
    config_path: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let config = crate::config::load(config_path)?;
    let report = super::manager()?.start(identity, ctx, &config).await?;
    show_info(&report.info, format);
    Ok(())
}

async fn stop(identity: &ClusterIdentity) -> Result<()> {
    if super::manager()?.stop(identity).await? == StopOutcome::Stopped {
        print_success(&format!("Cluster {} stopped", identity));
    }
    Ok(())
}

async fn purge(identity: &ClusterIdentity, confirmed: bool, delete_image: bool) -> Result<()> {
    let report = super::manager()?
        .purge(identity, confirmed, delete_image)
        .await?;

    if let Some(data) = &report.data_removed {
        print_success(&format!("Removed backing directory {}", data.display()));
    }
    if let Some(image) = &report.image_removed {
        print_success(&format!("Removed container image {}", image));
    }
    print_success(&format!("Cluster {} purged", identity));
    Ok(())
}

async fn list(format: OutputFormat) -> Result<()> {
    let listings = super::manager()?.list().await?;
    match format {
        OutputFormat::Json => print_json(&listings),
        OutputFormat::Table => {
            let rows: Vec<ClusterRow> = listings.into_iter().map(ClusterRow::from).collect();
            print_table(&rows, format);
        }
    }
    Ok(())
}

fn show_info(info: &ClusterInfo, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(info),
        OutputFormat::Table => println!("{}", info),
    }
}
