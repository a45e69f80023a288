use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::ArchiveBuilder;
use crate::cli::{IssuesFound, SubCommandExtend};
use crate::config::{ArchiveConfig, ModelOptions, Opts};
use crate::monitor::{self, PREVIEW_LIMIT, ScanTarget, preview_hashes};
use crate::utils::short_hash;

#[derive(Parser, Debug, Clone)]
pub struct CheckCommand {
    #[command(flatten)]
    pub model: ModelOptions,
    /// 监控配置文件，默认为数据目录下的 config.toml
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl SubCommandExtend for CheckCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let config_file = self.config.clone().unwrap_or_else(|| opts.conf_dir.config_file());
        let config = ArchiveConfig::load(config_file)?;
        let model = &self.model.model;

        let archive = ArchiveBuilder::new(opts.conf_dir.clone())
            .hash(opts.hash)
            .read_only(true)
            .open()
            .await?;

        println!("Checking consistency for {} configured path(s)...", config.paths.len());
        println!("Model: {}\n", model);

        let target = ScanTarget::new(config.paths, config.recursive, opts.hash);
        let report = monitor::check(&target, archive.db(), archive.vectors(), model).await?;

        println!("=== Consistency Report ===");
        println!("{}", report);

        if !report.images_not_in_db.is_empty() {
            println!("\nImages on disk not in hash DB:");
            for (hash, path) in report.images_not_in_db.iter().take(PREVIEW_LIMIT) {
                println!("  {}...  {}", short_hash(hash, 16), path.display());
            }
            if report.images_not_in_db.len() > PREVIEW_LIMIT {
                println!("  ... and {} more", report.images_not_in_db.len() - PREVIEW_LIMIT);
            }
        }
        let sections = [
            ("Images in hash DB missing from disk", &report.images_missing_from_disk),
            ("Images in hash DB without embeddings", &report.missing_embeddings),
            ("Embeddings without corresponding hash DB entry", &report.orphan_embeddings),
        ];
        for (title, hashes) in sections {
            if !hashes.is_empty() {
                println!("\n{}:", title);
                println!("{}", preview_hashes(hashes, PREVIEW_LIMIT));
            }
        }

        if report.has_issues() {
            println!("\nRun 'sync' to fix these issues");
            return Err(IssuesFound.into());
        }
        Ok(())
    }
}
