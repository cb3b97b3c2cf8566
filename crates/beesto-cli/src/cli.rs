use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "beesto")]
#[command(about = "AI coding assistant for sandboxed web projects", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the agent loop for one request")]
    Run {
        #[arg(help = "What the agent should build or change")]
        request: String,

        #[arg(short, long, default_value = ".", help = "Project root directory")]
        project: PathBuf,

        #[arg(long, help = "Phase endpoint URL (overrides config)")]
        endpoint: Option<String>,
    },

    #[command(about = "Print the project tree")]
    Tree {
        #[arg(short, long, default_value = ".", help = "Project root directory")]
        project: PathBuf,

        #[arg(short, long, help = "Only show entries whose name contains this")]
        search: Option<String>,
    },

    #[command(about = "Write the starter project template")]
    Init {
        #[arg(short, long, default_value = ".", help = "Project root directory")]
        project: PathBuf,

        #[arg(long, help = "Run npm install afterwards")]
        install: bool,
    },
}

impl Commands {
    /// Project directory the command works on.
    pub fn project(&self) -> &Path {
        match self {
            Self::Run { project, .. } | Self::Tree { project, .. } | Self::Init { project, .. } => {
                project
            }
        }
    }
}
