use anyhow::Result;
use clap::Parser;

use crate::ArchiveBuilder;
use crate::cli::SubCommandExtend;
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct StatusCommand {}

impl SubCommandExtend for StatusCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let archive = ArchiveBuilder::new(opts.conf_dir.clone()).open().await?;
        let coverage = archive.coverage().await?;

        println!("Data directory: {}", opts.conf_dir.path().display());
        print!("{}", coverage);
        Ok(())
    }
}
