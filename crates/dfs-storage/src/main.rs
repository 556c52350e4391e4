use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dfs_core::iface::naming::NamingRegistrationStub;
use dfs_core::iface::storage::{StorageClientStub, StorageCommandStub};
use dfs_core::path::Path;
use dfs_core::rmi::skeleton::Skeleton;
use dfs_storage::{StorageClientDispatch, StorageCommandDispatch, StorageService};
use log::{info, warn};

#[derive(Debug, clap::Parser)]
struct Cli {
    /// Address to serve client reads/writes on.
    #[arg(long, default_value = "0.0.0.0:0")]
    client_addr: SocketAddr,

    /// Address to serve naming-only commands on.
    #[arg(long, default_value = "0.0.0.0:0")]
    command_addr: SocketAddr,

    /// The naming server's registration port.
    #[arg(long)]
    naming_addr: SocketAddr,

    /// Local directory backing this storage server's files.
    root: PathBuf,
}

async fn storage_main(cli: Cli) -> Result<(), dfs_core::RemoteError> {
    tokio::fs::create_dir_all(&cli.root).await.map_err(dfs_core::RemoteError::from)?;

    let service = Arc::new(StorageService::new(cli.root.clone()));

    let client_skeleton = Skeleton::with_default_hooks(StorageClientDispatch(Arc::clone(&service)), cli.client_addr)?;
    client_skeleton.start().await?;
    let client_addr = client_skeleton.local_addr().await.unwrap();

    let command_skeleton =
        Skeleton::with_default_hooks(StorageCommandDispatch(Arc::clone(&service)), cli.command_addr)?;
    command_skeleton.start().await?;
    let command_addr = command_skeleton.local_addr().await.unwrap();

    let client_stub = StorageClientStub::new(client_addr)?;
    let command_stub = StorageCommandStub::new(command_addr)?;

    let offered = Path::list(service.root()).map_err(dfs_core::RemoteError::from)?;
    info!("offering {} local file(s) to the naming server", offered.len());

    let registration = NamingRegistrationStub::new(cli.naming_addr)?;
    let duplicates = registration.register(client_stub, command_stub, offered).await?;

    for path in &duplicates {
        let local = path.to_file(service.root());
        if let Err(e) = tokio::fs::remove_file(&local).await {
            warn!("failed to remove local duplicate {path}: {e}");
        }
    }
    info!(
        "registered with naming server at {}, serving clients on {} and commands on {}",
        cli.naming_addr, client_addr, command_addr
    );

    tokio::signal::ctrl_c().await.ok();
    client_skeleton.stop().await;
    command_skeleton.stop().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let exit_code = storage_main(Cli::parse()).await.map(|_| 0).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        2
    });

    std::process::exit(exit_code);
}
