// bases/provisioner/src/main.rs
use clap::Parser;
use color_eyre::Result;

mod app;
mod args;
mod error;
mod output;
mod server;
mod workspace;

use app::App;
use args::{Args, Config};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "provisioner=info,deployment=info,cloud_client=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_args(args, std::env::var_os("HOME").map(Into::into))?;
    let app = App::new(config);

    if let Err(error) = app.run().await {
        app.print_error(&error);
        std::process::exit(1);
    }
    Ok(())
}
