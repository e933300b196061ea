mod clone;
mod codec;
mod commands;
mod object;
mod pack;
mod pktline;
mod store;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version, about = "A minimal, content-addressed Git object store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty Git repository
    Init,

    /// Provide content or type and size information for repository objects
    CatFile {
        /// Show object type
        #[arg(short, conflicts_with = "size_only")]
        type_only: bool,

        /// Show object size
        #[arg(short, conflicts_with = "type_only")]
        size_only: bool,

        /// Pretty-print object's content
        #[arg(short, conflicts_with_all = ["size_only", "type_only"])]
        pretty_print: bool,

        /// Object hash
        #[arg(id = "object")]
        hash: String,
    },

    /// Compute object ID and optionally create an object from a file
    HashObject {
        /// Actually write the object into the object database
        #[arg(short)]
        write: bool,

        #[arg(id = "file")]
        file: PathBuf,
    },

    /// List the contents of a tree object
    LsTree {
        /// List only file names
        #[arg(long)]
        name_only: bool,

        #[arg(id = "tree-ish")]
        hash: String,
    },

    /// Create a tree object from the working directory
    WriteTree,

    /// Create a new commit object
    CommitTree {
        #[arg(id = "tree")]
        tree_hash: String,

        /// Commit message
        #[arg(short = 'm')]
        message: String,

        /// Parent commit
        #[arg(short = 'p')]
        parent_hash: Option<String>,
    },

    /// Clone a repository over the smart-HTTP transport
    Clone { url: String, dir: Option<PathBuf> },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    match args.command {
        Commands::Init => commands::init::invoke(),
        Commands::CatFile {
            type_only,
            size_only,
            pretty_print: _,
            hash,
        } => commands::cat_file::invoke(&hash, type_only, size_only),
        Commands::HashObject { write, file } => {
            commands::hash_object::invoke(&file, write).map(|_| ())
        }
        Commands::LsTree { name_only, hash } => commands::ls_tree::invoke(&hash, name_only),
        Commands::WriteTree => commands::write_tree::invoke(),
        Commands::CommitTree {
            tree_hash,
            message,
            parent_hash,
        } => commands::commit_tree::invoke(&tree_hash, &message, parent_hash).map(|_| ()),
        Commands::Clone { url, dir } => commands::clone::invoke(&url, dir),
    }
}
