use std::path::Path;

use peerbook_core::booking::ports::ServiceCatalog;
use peerbook_core::config::LoadOptions;
use peerbook_core::domain::service::Service;
use peerbook_db::fixtures::demo_services;
use peerbook_db::SqlStores;

use crate::commands::{
    build_runtime, load_config, open_database, read_json_file, CommandFailure, CommandResult,
    EXIT_REJECTED, EXIT_UNAVAILABLE,
};

/// Saves the demo catalog, or the services listed in `services_file`, into the configured
/// database. Saving is an upsert, so reruns leave the same rows behind.
pub fn run(options: &LoadOptions, services_file: Option<&Path>) -> CommandResult {
    match execute(options, services_file) {
        Ok(services) => {
            let lines: Vec<String> = services
                .iter()
                .map(|service| {
                    format!(
                        "  - {}: {} ({})",
                        service.id,
                        service.title,
                        service.service_type.as_str()
                    )
                })
                .collect();
            CommandResult::success(
                "seed",
                format!("seeded {} service(s):\n{}", services.len(), lines.join("\n")),
            )
        }
        Err(failure) => failure.into_result("seed"),
    }
}

fn execute(
    options: &LoadOptions,
    services_file: Option<&Path>,
) -> Result<Vec<Service>, CommandFailure> {
    let services = match services_file {
        Some(path) => read_json_file::<Vec<Service>>(path)?,
        None => demo_services(),
    };
    validate_services(&services)?;

    let config = load_config(options)?;
    let runtime = build_runtime()?;

    runtime.block_on(async {
        let pool = open_database(&config).await?;
        let stores = SqlStores::new(pool.clone());

        let mut outcome = Ok(());
        for service in &services {
            if let Err(error) = stores.services.save(service).await {
                outcome = Err(CommandFailure::new(
                    "persistence_failed",
                    format!("failed to save service {}: {error}", service.id),
                    EXIT_UNAVAILABLE,
                ));
                break;
            }
        }
        pool.close().await;
        outcome?;

        tracing::info!(
            event_name = "cli.seed.completed",
            services = services.len(),
            "catalog seeded"
        );
        Ok::<_, CommandFailure>(services)
    })
}

fn validate_services(services: &[Service]) -> Result<(), CommandFailure> {
    let failed: Vec<String> = services
        .iter()
        .filter_map(|service| {
            service.validate().err().map(|error| format!("{}: {error}", service.id))
        })
        .collect();

    if failed.is_empty() {
        Ok(())
    } else {
        Err(CommandFailure::new(
            "service_validation",
            format!("service validation failed for: {}", failed.join("; ")),
            EXIT_REJECTED,
        ))
    }
}
