use std::process::ExitCode;

use layercfg::ConfigResolver;
use serde::Deserialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Server {
    host: String,
    port: u16,
    // Present in the file but never decoded.
    #[serde(skip)]
    enabled: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ConfigResolver::new();
    config.add_config_path("./demos/configs");
    config.add_config_path("$HOME/configs");
    config.set_config_name("env");

    if let Err(e) = config.read_in_config() {
        error!("error reading config file: {e}");
        return ExitCode::FAILURE;
    }
    if let Some(path) = config.config_file_used() {
        println!("Using config: {}", path.display());
    }

    match config.get("prod.port") {
        Some(port) => println!("Value: {port}, Type: {}", port.kind()),
        None => println!("Value: <unset>"),
    }

    if !config.is_set("prod.port") {
        error!("missing port number: prod.port");
        return ExitCode::FAILURE;
    }

    let prod = match config.sub("prod").and_then(|prod| prod.unmarshal::<Server>()) {
        Ok(prod) => prod,
        Err(e) => {
            error!("unable to decode into struct: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!("{}", prod.host);

    ExitCode::SUCCESS
}
