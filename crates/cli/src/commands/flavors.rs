//! Flavor commands

use anyhow::Result;
use nano_lib::NanoConfig;
use std::path::Path;
use tabled::Tabled;

use crate::output::{print_json, print_table, OutputFormat};
use crate::FlavorsCommands;

/// Row for the flavor list table
#[derive(Tabled, serde::Serialize)]
struct FlavorRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "MEMORY_SIZE")]
    memory_size: String,
    #[tabled(rename = "CPU_COUNT")]
    cpu_count: String,
}

fn rows(config: &NanoConfig) -> Vec<FlavorRow> {
    config
        .flavors
        .iter()
        .map(|(name, spec)| FlavorRow {
            name: name.clone(),
            memory_size: spec.memory_size.clone().unwrap_or_default(),
            cpu_count: spec.cpu_count.map(|c| c.to_string()).unwrap_or_default(),
        })
        .collect()
}

pub fn run(cmd: FlavorsCommands, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = crate::config::load(config_path)?;
    match cmd {
        FlavorsCommands::Ls => print_table(&rows(&config), format),
        FlavorsCommands::Show { name } => match config.flavors.get(&name) {
            Some(spec) => {
                if matches!(format, OutputFormat::Table) {
                    println!("\nDetails of the flavor {}:", name);
                }
                print_json(spec);
            }
            // Unknown flavors show as an empty object
            None => println!("{{}}"),
        },
    }
    Ok(())
}
