use std::error::Error;

use env_logger::Env;
use log::{error, info};

use upload_file_server::{Server, ServerConfig};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    let server = match Server::bind(config.clone()) {
        Ok(server) => server,
        Err(e) => {
            error!("could not bind to {}: {}", config.bind_address(), e);
            error!("ensure the port is free and {} is writable", config.upload_dir.display());
            return Err(e.into());
        }
    };

    info!("listening on http://{}", server.local_addr()?);
    info!("serving static files from {}", config.public_dir.display());
    info!("storing uploads in {}", config.upload_dir.display());
    info!(
        "upload limit {} bytes, allowed extensions {}",
        config.max_upload_size,
        config.allowed_extensions.join(" ")
    );

    server.run();
    Ok(())
}
