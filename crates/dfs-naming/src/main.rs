use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use dfs_core::rmi::skeleton::Skeleton;
use dfs_naming::{NamingClientDispatch, NamingRegistrationDispatch, NamingService};
use log::info;

#[derive(Debug, clap::Parser)]
struct Cli {
    /// Address to serve client metadata operations on.
    #[arg(long, default_value = "0.0.0.0:8900")]
    client_addr: SocketAddr,

    /// Address storage servers register against.
    #[arg(long, default_value = "0.0.0.0:8901")]
    registration_addr: SocketAddr,
}

async fn naming_main(cli: Cli) -> Result<(), dfs_core::RemoteError> {
    let service = Arc::new(NamingService::new());

    let client_skeleton =
        Skeleton::with_default_hooks(NamingClientDispatch(Arc::clone(&service)), cli.client_addr)?;
    client_skeleton.start().await?;

    let registration_skeleton =
        Skeleton::with_default_hooks(NamingRegistrationDispatch(Arc::clone(&service)), cli.registration_addr)?;
    registration_skeleton.start().await?;

    info!(
        "naming server serving clients on {} and registrations on {}",
        client_skeleton.local_addr().await.unwrap(),
        registration_skeleton.local_addr().await.unwrap(),
    );

    tokio::signal::ctrl_c().await.ok();
    client_skeleton.stop().await;
    registration_skeleton.stop().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let exit_code = naming_main(Cli::parse()).await.map(|_| 0).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        2
    });

    std::process::exit(exit_code);
}
