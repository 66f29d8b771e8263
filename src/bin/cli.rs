//! AtlasFile CLI
//!
//! Inspect, back up, and check the lock status of store files.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use atlasfile::{FileStore, FileStoreError, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasFile CLI
#[derive(Parser, Debug)]
#[command(name = "atlasfile-cli")]
#[command(about = "Inspect and back up AtlasFile store files")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print size, encryption and lock information
    Info {
        /// Store file
        path: PathBuf,

        /// Encryption key, if the store is encrypted
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Copy the raw (still encrypted) bytes of a store under a shared lock
    Backup {
        /// Store file
        path: PathBuf,

        /// Destination file
        dest: PathBuf,
    },

    /// Check whether a writer could open the store right now
    Status {
        /// Store file
        path: PathBuf,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlasfile=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args.command) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Info { path, key } => {
            let mut store = FileStore::open(&path, true, key.as_deref().map(str::as_bytes))?;
            println!("path:       {}", store);
            println!("size:       {} bytes", store.size());
            println!("encrypted:  {}", store.is_encrypted());
            println!("lock:       {:?}", store.lock_mode());
            println!("retention:  {} ms", store.default_retention_time().as_millis());
            store.close()
        }

        Commands::Backup { path, dest } => {
            let mut store = FileStore::open(&path, true, None)?;
            let copied = copy_raw(&store, &dest)?;
            tracing::info!("Copied {} bytes from {} to {}", copied, store, dest.display());
            store.close()
        }

        Commands::Status { path } => {
            if !path.exists() {
                println!("{}: does not exist", path.display());
                return Ok(());
            }
            match FileStore::open(&path, false, None) {
                Ok(mut store) => {
                    println!("{}: available ({:?})", store, store.lock_mode());
                    store.close()
                }
                Err(e) if e.is_locked() => {
                    println!("{}: in use by another process", path.display());
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
    }
}

/// Copy the physical file byte for byte, bypassing decryption
fn copy_raw(store: &FileStore, dest: &Path) -> Result<u64> {
    let mut source: &File = store.raw_file()?;
    let mut out = File::create(dest).map_err(|e| FileStoreError::io("create", dest, e))?;

    let copied = io::copy(&mut source, &mut out)
        .map_err(|e| FileStoreError::io("copy", store.path(), e))?;
    out.sync_all()
        .map_err(|e| FileStoreError::io("sync", dest, e))?;

    Ok(copied)
}
