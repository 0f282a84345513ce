mod app;
mod commands;
mod render;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "atelier-cli", about = "Browse and edit remote IDE workspaces", version)]
struct Cli {
    /// Config file (default: <config dir>/atelier/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, global = true)]
    server: Option<String>,

    /// Workspace to open
    #[arg(long, short = 'w', global = true)]
    workspace: Option<String>,

    /// Access token for the workspace
    #[arg(long, global = true)]
    token: Option<String>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Show the workspace tree
    Tree,

    /// Print a file
    Cat {
        /// File path inside the workspace
        path: String,
    },

    /// Create a file
    Touch {
        /// Path of the new file; the parent directory must exist
        path: String,
        /// Initial content (use "-" to read from stdin)
        #[arg(long)]
        content: Option<String>,
    },

    /// Create a directory, optionally filled from a zip archive
    Mkdir {
        /// Path of the new directory, or the parent directory with --archive
        path: String,
        /// Archive to unpack; the directory is named after it
        #[arg(long)]
        archive: Option<PathBuf>,
    },

    /// Upload local files into a directory. A single .zip is uploaded as a flat archive
    Upload {
        /// Target directory ("" for the workspace root)
        dir: String,
        /// Local files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Upload a local folder as a new directory
    UploadDir {
        /// Parent directory in the workspace
        dir: String,
        /// Local folder to upload
        local: PathBuf,
    },

    /// Delete a file, or a directory with --dir
    Rm {
        path: String,
        #[arg(long)]
        dir: bool,
    },

    /// Rename a file, or a directory with --dir
    Mv {
        path: String,
        /// New name (not a path)
        new_name: String,
        #[arg(long)]
        dir: bool,
    },

    /// Replace a file's content and save it
    Push {
        /// File path inside the workspace
        path: String,
        /// Local file with the new content (use "-" for stdin)
        source: String,
    },

    /// Download the workspace or one directory as a zip archive
    Download {
        /// Directory to download (default: whole workspace)
        dir: Option<String>,
        /// Output file (default: <workspace>.zip)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

/// Resolve "-" as stdin, anything else as a local file
fn read_source(source: &str) -> std::io::Result<Vec<u8>> {
    if source == "-" {
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut std::io::stdin(), &mut buf)?;
        Ok(buf)
    } else {
        std::fs::read(source)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let use_color = !cli.no_color && std::io::stdout().is_terminal();

    let overrides = app::Overrides {
        config: cli.config,
        server: cli.server,
        workspace: cli.workspace,
        token: cli.token,
    };
    let mut app = app::App::open(overrides).await?;

    match cli.command {
        Command::Tree => {
            commands::tree::run(&app, &cli.format, use_color)?;
        }
        Command::Cat { path } => {
            commands::cat::run(&app, &path, &cli.format)?;
        }
        Command::Touch { path, content } => {
            let content = content
                .map(|c| if c == "-" { read_source("-") } else { Ok(c.into_bytes()) })
                .transpose()?;
            commands::create::touch(&mut app, &path, content, &cli.format).await?;
        }
        Command::Mkdir { path, archive } => {
            commands::create::mkdir(&mut app, &path, archive.as_deref(), &cli.format).await?;
        }
        Command::Upload { dir, files } => {
            commands::create::upload(&mut app, &dir, &files, &cli.format).await?;
        }
        Command::UploadDir { dir, local } => {
            commands::create::upload_dir(&mut app, &dir, &local, &cli.format).await?;
        }
        Command::Rm { path, dir } => {
            commands::modify::remove(&mut app, &path, dir, &cli.format).await?;
        }
        Command::Mv { path, new_name, dir } => {
            commands::modify::rename(&mut app, &path, &new_name, dir, &cli.format).await?;
        }
        Command::Push { path, source } => {
            let content = read_source(&source)?;
            commands::modify::push(&mut app, &path, content, &cli.format).await?;
        }
        Command::Download { dir, output } => {
            commands::download::run(&app, dir.as_deref(), output, &cli.format)?;
        }
    }

    app.close();
    Ok(())
}
