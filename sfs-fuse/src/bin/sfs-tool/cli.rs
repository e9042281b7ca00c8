use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Inspect and populate sfs volume images")]
pub struct Cli {
    /// Volume image on the host
    #[arg(long, short)]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a fresh, empty volume
    Format,
    /// Format the volume and copy every regular file of a host directory into it
    Pack {
        /// Host directory
        #[arg(long, short)]
        source: PathBuf,
    },
    /// List files with their sizes
    Ls,
    /// Print a file to stdout
    Cat { name: String },
    /// Append a host file to a file on the volume
    Put {
        file: PathBuf,
        /// Name on the volume, the host file name by default
        #[arg(long, short)]
        name: Option<String>,
    },
    /// Delete a file
    Rm { name: String },
    /// Show block usage
    Df,
}
