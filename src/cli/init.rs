use anyhow::Result;
use clap::Parser;
use log::info;

use crate::ArchiveBuilder;
use crate::cli::SubCommandExtend;
use crate::config::{ArchiveConfig, Opts};

#[derive(Parser, Debug, Clone)]
pub struct InitCommand {
    /// 覆盖已有的配置文件
    #[arg(long)]
    pub force: bool,
}

impl SubCommandExtend for InitCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let conf_dir = &opts.conf_dir;
        tokio::fs::create_dir_all(conf_dir.path()).await?;

        let config_file = conf_dir.config_file();
        if self.force || !config_file.exists() {
            tokio::fs::write(&config_file, ArchiveConfig::SAMPLE).await?;
            info!("已生成配置文件: {}", config_file.display());
        } else {
            info!("配置文件已存在，跳过: {}", config_file.display());
        }

        ArchiveBuilder::new(conf_dir.clone()).hash(opts.hash).open().await?;

        println!("Data directory: {}", conf_dir.path().display());
        println!("Config file:    {} (TOML)", config_file.display());
        println!("Metadata DB:    {}", conf_dir.metadata_db().display());
        println!("Embedding DB:   {}", conf_dir.embedding_db().display());
        Ok(())
    }
}
