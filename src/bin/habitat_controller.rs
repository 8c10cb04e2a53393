// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use anyhow::Result;
use clap::{Parser, Subcommand};
use habitat_controller::config::ControllerConfig;
use habitat_controller::crds::ServiceGroup;
use habitat_controller::habitat_controller::run_controller;
use kube::{Client, CustomResourceExt};
use tracing::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "habitat-controller",
    version,
    about = "Runs Habitat service groups on Kubernetes"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the ServiceGroup custom resource definition as YAML.
    Export,
    /// Run the controller against the cluster of the current kubeconfig or service account.
    Run(ControllerConfig),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match Cli::parse().command {
        Command::Export => {
            info!("exporting custom resource definition");
            println!("{}", serde_yaml::to_string(&ServiceGroup::crd())?);
        }
        Command::Run(config) => {
            info!("running habitat-controller");
            let client = Client::try_default().await?;
            run_controller(client, config).await?;
        }
    }
    Ok(())
}
