use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::ArchiveBuilder;
use crate::cli::SubCommandExtend;
use crate::config::{ModelOptions, Opts};

#[derive(Parser, Debug, Clone)]
pub struct ExportCommand {
    #[command(flatten)]
    pub model: ModelOptions,
    /// 输出的 JSON 文件，默认输出到标准输出
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl SubCommandExtend for ExportCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let archive = ArchiveBuilder::new(opts.conf_dir.clone()).open().await?;
        let data = archive.export(&self.model.model).await?;
        let json = serde_json::to_string_pretty(&data)?;

        match &self.output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(path, json).await?;
                info!("已导出 {} 条嵌入到 {}", data.count, path.display());
            }
            None => println!("{}", json),
        }
        Ok(())
    }
}
