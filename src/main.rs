use clap::Parser;
use darkroom::configuration::config::{CliArgs, Config};
use darkroom::controller::controller_handler::Controller;
use log::{error, info};

#[tokio::main]
async fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .init();

    println!(
        "
==============================================================================
           darkroom v{}: session-scoped image transformation service
==============================================================================
",
        env!("CARGO_PKG_VERSION")
    );

    info!("Importing configuration");

    let args = CliArgs::parse();

    let config = Config::from_args(&args).unwrap_or_else(|e| {
        error!("Unable to import configuration: {}", e);
        std::process::exit(1);
    });

    info!("Configuration imported successfully");

    let mut controller = Controller::new(config).unwrap_or_else(|e| {
        error!("Unable to create a controller instance: {}, exiting...", e);
        std::process::exit(1);
    });

    let result = tokio::spawn(async move {
        info!("Spawning the controller");
        if let Err(e) = controller.run().await {
            error!("Error occured in the controller process: {}, exiting...", e);
            std::process::exit(1);
        }
    });

    if let Err(e) = result.await {
        error!("Error joining at the end of execution: {:?}", e);
        std::process::exit(1);
    }
}
