use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "lentra",
    about = "Serve one prompt to many local models and rank the answers",
    version
)]
pub struct CliArgs {
    /// Config file; defaults to ~/.config/lentra/config.toml
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
    /// Listen address, overriding [server] host and port
    #[arg(long, short = 'a')]
    pub addr: Option<String>,
    /// Log filter, overriding [logging] level
    #[arg(long)]
    pub log_level: Option<String>,
}
