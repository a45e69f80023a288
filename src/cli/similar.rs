use anyhow::{Result, anyhow};
use clap::Parser;

use crate::ArchiveBuilder;
use crate::archive::SimilarImage;
use crate::cli::{OutputFormat, SubCommandExtend};
use crate::config::{ModelOptions, Opts};

#[derive(Parser, Debug, Clone)]
pub struct SimilarCommand {
    #[command(flatten)]
    pub model: ModelOptions,
    /// 图片哈希，可以只提供前缀
    #[arg(value_name = "HASH")]
    pub query: String,
    /// 显示的结果数量
    #[arg(short = 'k', long, value_name = "COUNT", default_value_t = 10)]
    pub count: usize,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SimilarCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let archive = ArchiveBuilder::new(opts.conf_dir.clone()).open().await?;
        let hash = archive
            .resolve_hash(&self.query)
            .await?
            .ok_or_else(|| anyhow!("找不到图片: {}", self.query))?;

        let result = archive.similar(&self.model.model, &hash, self.count).await?;
        print_result(&result, self.output_format)
    }
}

fn print_result(result: &[SimilarImage], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Table => {
            if result.is_empty() {
                println!("No similar images found");
            }
            for image in result {
                let path = image.path.as_ref().map(|p| p.display().to_string()).unwrap_or_default();
                println!("{:.4}\t{}\t{}", image.neighbor.distance, image.neighbor.hash, path);
            }
        }
    }
    Ok(())
}
