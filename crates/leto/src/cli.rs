use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "leto",
    author,
    version,
    about = "Application shell driving one graphics context from a render thread"
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Configuration file; defaults to `leto.toml` in the config directory when present.
    #[arg(long, value_name = "PATH", env = "LETO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Asset root containing `Shaders/<name>/vertex.vs` and `fragment.fs`.
    #[arg(long, value_name = "DIR")]
    pub assets: Option<PathBuf>,

    /// Shader to load at startup; repeat to load several. The first one is bound.
    #[arg(long = "shader", value_name = "NAME")]
    pub shaders: Vec<String>,

    /// Close the window after this many frames.
    #[arg(long, value_name = "N")]
    pub frames: Option<u64>,

    /// Window title; the crate version is appended.
    #[arg(long, value_name = "TITLE")]
    pub title: Option<String>,

    /// Print fatal problems to stdout instead of sending a desktop notification.
    #[arg(long)]
    pub no_notify: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every problem the reporter can raise.
    Problems,
    /// Print the resolved configuration directory and file.
    Paths,
}

pub fn parse() -> Cli {
    Cli::parse()
}
