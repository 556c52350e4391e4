use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dfs_client::{DfsInputStream, DfsOutputStream};
use dfs_core::iface::naming::NamingClientStub;
use dfs_core::path::Path;
use dfs_core::RemoteError;

#[derive(Debug, clap::Parser)]
struct Cli {
    /// Naming server's client-facing address. Falls back to the
    /// `DFSHOST` environment variable.
    #[arg(long)]
    host: Option<SocketAddr>,

    /// Current DFS directory used to resolve relative paths. Falls
    /// back to the `DFSCWD` environment variable, then `/`.
    #[arg(long)]
    cwd: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Prints the current DFS directory.
    Pwd,
    /// Extracts the host or path half of a `host:port/path` location.
    Parse {
        #[arg(value_enum)]
        which: ParseWhich,
        location: String,
    },
    /// Lists a directory's children (defaults to the current directory).
    Ls { path: Option<String> },
    /// Deletes one or more paths.
    Rm { paths: Vec<String> },
    /// Creates a directory.
    Mkdir { path: String },
    /// Uploads a local file to a remote path.
    Put { local: PathBuf, remote: String },
    /// Downloads a remote file to a local path.
    Get { remote: String, local: PathBuf },
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum ParseWhich {
    Host,
    Path,
}

/// Splits a `host:port/path` location string at its first `/`.
fn parse_location(location: &str) -> Result<(String, Path), RemoteError> {
    let slash = location
        .find('/')
        .ok_or_else(|| RemoteError::InvalidPath(format!("location has no path component: {location}")))?;
    let host = location[..slash].to_owned();
    let path = Path::parse(&location[slash..])?;
    Ok((host, path))
}

/// Resolves a CLI argument against `cwd`: absolute if it starts with
/// `/`, otherwise joined onto `cwd` component by component.
fn resolve(cwd: &Path, arg: &str) -> Result<Path, RemoteError> {
    if arg.starts_with('/') {
        return Path::parse(arg);
    }
    let mut path = cwd.clone();
    for component in arg.split('/').filter(|c| !c.is_empty()) {
        path = Path::join(&path, component)?;
    }
    Ok(path)
}

fn naming_stub(cli: &Cli) -> Result<NamingClientStub, RemoteError> {
    let addr = cli
        .host
        .or_else(|| std::env::var("DFSHOST").ok().and_then(|s| s.parse().ok()))
        .ok_or_else(|| RemoteError::IllegalArgument("no naming server address given (--host or DFSHOST)".into()))?;
    NamingClientStub::new(addr)
}

fn current_dir(cli: &Cli) -> Result<Path, RemoteError> {
    let raw = cli.cwd.clone().or_else(|| std::env::var("DFSCWD").ok()).unwrap_or_else(|| "/".to_owned());
    Path::parse(&raw)
}

async fn run(cli: Cli) -> Result<(), RemoteError> {
    match &cli.command {
        Command::Pwd => {
            println!("{}", current_dir(&cli)?);
            Ok(())
        }
        Command::Parse { which, location } => {
            let (host, path) = parse_location(location)?;
            match which {
                ParseWhich::Host => println!("{host}"),
                ParseWhich::Path => println!("{path}"),
            }
            Ok(())
        }
        Command::Ls { path } => {
            let naming = naming_stub(&cli)?;
            let cwd = current_dir(&cli)?;
            let target = match path {
                Some(p) => resolve(&cwd, p)?,
                None => cwd,
            };
            for name in naming.list(&target).await? {
                println!("{name}");
            }
            Ok(())
        }
        Command::Rm { paths } => {
            let naming = naming_stub(&cli)?;
            let cwd = current_dir(&cli)?;
            for p in paths {
                let target = resolve(&cwd, p)?;
                naming.delete(&target).await?;
            }
            Ok(())
        }
        Command::Mkdir { path } => {
            let naming = naming_stub(&cli)?;
            let cwd = current_dir(&cli)?;
            let target = resolve(&cwd, path)?;
            naming.create_directory(&target).await?;
            Ok(())
        }
        Command::Put { local, remote } => {
            let naming = naming_stub(&cli)?;
            let cwd = current_dir(&cli)?;
            let target = resolve(&cwd, remote)?;
            let data = tokio::fs::read(local).await.map_err(RemoteError::from)?;

            naming.create_file(&target).await?;
            let storage = naming.get_storage(&target).await?;
            let mut out = DfsOutputStream::new(storage, target);
            out.write(&data).await?;
            Ok(())
        }
        Command::Get { remote, local } => {
            let naming = naming_stub(&cli)?;
            let cwd = current_dir(&cli)?;
            let target = resolve(&cwd, remote)?;
            let storage = naming.get_storage(&target).await?;
            let mut input = DfsInputStream::new(storage, target);
            let data = input.read_to_end().await?;
            tokio::fs::write(local, data).await.map_err(RemoteError::from)?;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let exit_code = run(Cli::parse()).await.map(|_| 0).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        2
    });

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_location_splits_host_and_path() {
        let (host, path) = parse_location("localhost:8900/a/b").unwrap();
        assert_eq!(host, "localhost:8900");
        assert_eq!(path.as_string(), "/a/b");
    }

    #[test]
    fn parse_location_rejects_missing_path() {
        assert!(parse_location("localhost:8900").is_err());
    }

    #[test]
    fn resolve_absolute_ignores_cwd() {
        let cwd = Path::parse("/a").unwrap();
        let resolved = resolve(&cwd, "/b/c").unwrap();
        assert_eq!(resolved.as_string(), "/b/c");
    }

    #[test]
    fn resolve_relative_joins_onto_cwd() {
        let cwd = Path::parse("/a").unwrap();
        let resolved = resolve(&cwd, "b/c").unwrap();
        assert_eq!(resolved.as_string(), "/a/b/c");
    }
}
