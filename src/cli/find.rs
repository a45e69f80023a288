use anyhow::Result;
use clap::Parser;

use crate::ArchiveBuilder;
use crate::archive::FoundImage;
use crate::cli::{OutputFormat, SubCommandExtend};
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct FindCommand {
    /// 哈希前缀，为空时列出全部图片
    #[arg(default_value = "")]
    pub prefix: String,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for FindCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let archive = ArchiveBuilder::new(opts.conf_dir.clone()).open().await?;
        let found = archive.find(&self.prefix).await?;
        print_result(&found, self.output_format)
    }
}

fn print_result(found: &[FoundImage], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(found)?),
        OutputFormat::Table => {
            if found.is_empty() {
                println!("No images found");
            }
            for image in found {
                let record = &image.record;
                let path = image.path.as_ref().map(|p| p.display().to_string()).unwrap_or_default();
                println!(
                    "{}\t{}x{}\t{}\t{}\t{}",
                    record.hash, record.width, record.height, record.size, record.mimetype, path
                );
            }
        }
    }
    Ok(())
}
