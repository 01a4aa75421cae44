//! Dispatch engine CLI
//!
//! Thin JSON-in/JSON-out driver around the library: plans shipments,
//! searches run insertions and resolves single route legs.

mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dispatch_engine::config::AppConfig;
use dispatch_engine::services::dispatch::DispatchService;
use dispatch_engine::services::pricing::PricingEngine;
use dispatch_engine::services::routing::{create_routing_provider, RoutingClient};
use dispatch_engine::services::run_planner::RunPlanner;
use dispatch_engine::services::run_store::InMemoryRunStore;
use dispatch_engine::types::{ExtractionOutput, Run, Shipment};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::from_env()?;

    std::fs::create_dir_all(&config.logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.logs_dir, "dispatch.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Console logs go to stderr so stdout stays JSON
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,dispatch_engine=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    let provider = create_routing_provider(config.mapbox.clone())?;
    let routing = Arc::new(RoutingClient::new(provider, config.routing.clone()));
    info!(provider = routing.provider_name(), "routing provider ready");

    match cli.command {
        Command::Plan {
            shipment,
            extraction,
            now,
        } => {
            let mut shipment: Shipment = read_json(&shipment)?;
            let now = now.unwrap_or_else(|| chrono::Local::now().naive_local());
            let service = DispatchService::new(
                routing,
                PricingEngine::new(config.rules.pricing.clone()),
                config.rules.scheduling.clone(),
                config.default_yard.clone(),
            );

            let outcome = match extraction {
                Some(path) => {
                    let output: ExtractionOutput = read_json(&path)?;
                    service.plan_from_extraction(&mut shipment, &output, now).await?
                }
                None => service.plan_shipment(&mut shipment, now).await?,
            };
            print_json(&json!({ "shipment": shipment, "outcome": outcome }))?;
        }

        Command::Insert {
            shipment,
            runs,
            date,
            apply,
        } => {
            let mut shipment: Shipment = read_json(&shipment)?;
            let store = Arc::new(InMemoryRunStore::new());
            if let Some(path) = runs {
                let runs: Vec<Run> = read_json(&path)?;
                info!(count = runs.len(), "loaded runs");
                for run in runs {
                    store.insert(run);
                }
            }

            let planner = RunPlanner::new(
                routing,
                store,
                config.rules.planner.clone(),
                config.rules.scheduling.hos,
            );
            let day = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            let plan = planner.optimize_insertion_for_lead(&mut shipment, day).await;

            let run = match plan.options.first() {
                Some(best) if apply => Some(planner.apply_option(&mut shipment, best).await?),
                _ => None,
            };
            print_json(&json!({ "plan": plan, "run": run, "shipment": shipment }))?;
        }

        Command::Route { from, to } => {
            let result = match routing.route(&from, &to, None).await {
                Ok(leg) => json!({ "leg": leg, "warning": null }),
                Err(degraded) => json!({ "leg": degraded.estimate, "warning": degraded.warning }),
            };
            print_json(&result)?;
        }
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
