//! Container image commands

use anyhow::Result;
use nano_lib::config::{DEFAULT_IMAGE, REDHAT_IMAGE};
use nano_lib::lifecycle::ImageUpdate;
use nano_lib::NanoConfig;
use std::path::Path;
use tabled::Tabled;

use crate::output::{print_info, print_json, print_success, print_table, print_warning, OutputFormat};
use crate::registry::{RegistryClient, DOCKER_HUB_URL, REDHAT_REGISTRY_URL};
use crate::ImageCommands;

/// Row for the alias table
#[derive(Tabled, serde::Serialize)]
struct AliasRow {
    #[tabled(rename = "ALIAS")]
    alias: String,
    #[tabled(rename = "IMAGE_NAME")]
    image_name: String,
}

fn alias_rows(config: &NanoConfig) -> Vec<AliasRow> {
    config
        .aliases()
        .into_iter()
        .map(|(alias, image)| AliasRow {
            alias: alias.to_string(),
            image_name: image.to_string(),
        })
        .collect()
}

pub async fn run(cmd: ImageCommands, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    match cmd {
        ImageCommands::Update { image } => update(&image).await,
        ImageCommands::Ls { all } => list_tags(all, format).await,
        ImageCommands::ShowAliases => {
            let config = crate::config::load(config_path)?;
            print_table(&alias_rows(&config), format);
            Ok(())
        }
    }
}

async fn update(image: &str) -> Result<()> {
    match super::manager()?.update_image(image).await? {
        ImageUpdate::Downloaded => print_success(&format!("New image {} downloaded.", image)),
        ImageUpdate::UpToDate => print_info(&format!("Image {} is up to date.", image)),
        ImageUpdate::Unknown(Some(status)) => print_warning(&status),
        ImageUpdate::Unknown(None) => {}
    }
    Ok(())
}

async fn list_tags(all: bool, format: OutputFormat) -> Result<()> {
    let tags = if super::registry().as_deref() == Some("redhat") {
        let repository = REDHAT_IMAGE
            .split_once('/')
            .map(|(_, repo)| repo)
            .unwrap_or(REDHAT_IMAGE);
        RegistryClient::new(REDHAT_REGISTRY_URL)?
            .registry_v2_tags(repository)
            .await?
    } else {
        RegistryClient::new(DOCKER_HUB_URL)?
            .docker_hub_tags(DEFAULT_IMAGE, all)
            .await?
    };

    match format {
        OutputFormat::Json => print_json(&tags),
        OutputFormat::Table => {
            if tags.is_empty() {
                print_warning("No tags found");
            }
            for tag in tags {
                println!("{}", tag);
            }
        }
    }
    Ok(())
}
