use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use indicatif::ProgressBar;
use log::warn;
use tokio::task::block_in_place;

use crate::ArchiveBuilder;
use crate::cli::{IssuesFound, SubCommandExtend};
use crate::config::{ArchiveConfig, EmbeddingOptions, Opts};
use crate::monitor::{PREVIEW_LIMIT, ScanTarget, preview_hashes};
use crate::provider::EmbeddingProvider;
use crate::utils::{confirm, pb_style};

#[derive(Parser, Debug, Clone)]
pub struct SyncCommand {
    #[command(flatten)]
    pub embedding: EmbeddingOptions,
    /// 监控配置文件，默认为数据目录下的 config.toml
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// 只显示将要进行的修改
    #[arg(short = 'n', long)]
    pub dry_run: bool,
    /// 删除图片时不再询问
    #[arg(short, long)]
    pub yes: bool,
}

fn confirm_deletion(removed: &[String]) -> bool {
    println!("\nThe following {} images will be removed from databases:", removed.len());
    println!("{}", preview_hashes(removed, PREVIEW_LIMIT));
    block_in_place(|| confirm("\nProceed with deletion? [y/N] ")).unwrap_or(false)
}

impl SubCommandExtend for SyncCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let config_file = self.config.clone().unwrap_or_else(|| opts.conf_dir.config_file());
        let config = ArchiveConfig::load(config_file)?;
        let provider = self.embedding.provider()?;
        let model = &self.embedding.model.model;

        let archive = ArchiveBuilder::new(opts.conf_dir.clone())
            .hash(opts.hash)
            .read_only(self.dry_run)
            .open()
            .await?;

        if !provider.health().await {
            warn!("嵌入服务不可用，新图片的嵌入将会失败");
        }
        for path in &config.paths {
            if !path.exists() {
                println!("Warning: Configured path does not exist: {}", path.display());
            }
        }
        if self.dry_run {
            println!("=== DRY RUN (no changes will be made) ===\n");
        }
        println!("Scanning {} configured path(s)...", config.paths.len());
        println!("Model: {}", model);

        let pb = ProgressBar::no_length().with_style(pb_style());
        let target = ScanTarget::new(config.paths, config.recursive, opts.hash);
        let engine = archive
            .sync_engine(target, &provider, model)
            .with_concurrency(self.embedding.concurrency)
            .with_progress(pb);

        let interactive = std::io::stdin().is_terminal();
        let report = engine
            .sync(self.dry_run, self.yes, |removed| interactive && confirm_deletion(removed))
            .await?;

        println!("\n=== Sync Report ===");
        println!("{}", report);

        if !report.new_images.is_empty() {
            println!("\nNew images:");
            println!("{}", preview_hashes(&report.new_images, PREVIEW_LIMIT));
        }
        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  {}", err);
            }
        }
        if !report.unconfirmed_removals.is_empty() {
            println!(
                "\n{} images missing from disk were kept, rerun with --yes to remove them:",
                report.unconfirmed_removals.len()
            );
            println!("{}", preview_hashes(&report.unconfirmed_removals, PREVIEW_LIMIT));
            return Err(IssuesFound.into());
        }
        Ok(())
    }
}
