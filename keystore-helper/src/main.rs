// Copyright (c) Microsoft. All rights reserved.

#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::default_trait_access,
    clippy::let_unit_value,
    clippy::missing_errors_doc,
    clippy::similar_names,
    clippy::too_many_lines
)]

use std::error::Error as StdError;
use std::path::PathBuf;

use clap::Parser;
use log::{error, info};

use keystore_helper::{Config, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(
    name = "keystore-helper",
    about = "Mirrors SPIFFE workload identity materials into keystore files"
)]
struct Args {
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    logger::try_init()
        .expect("cannot fail to initialize global logger from the process entrypoint");

    info!("Starting SPIFFE Keystore Helper");
    if let Err(err) = main_inner().await {
        error!("{}", err);

        let mut source = std::error::Error::source(&*err);
        while let Some(err) = source {
            error!("caused by: {}", err);
            source = std::error::Error::source(err);
        }

        std::process::exit(1);
    }
}

async fn main_inner() -> Result<(), Box<dyn StdError>> {
    let args = Args::parse();

    let config = Config::load_config(&args.config)?;
    keystore_helper::run(config).await?;

    Ok(())
}
