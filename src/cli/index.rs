use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use indicatif::ProgressBar;

use crate::ArchiveBuilder;
use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct IndexCommand {
    /// 图片所在目录
    pub root: PathBuf,
    /// 记录相对于该目录的路径
    #[arg(long)]
    pub relative: bool,
    /// 不扫描子目录
    #[arg(long)]
    pub no_recursive: bool,
}

impl SubCommandExtend for IndexCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let archive = ArchiveBuilder::new(opts.conf_dir.clone())
            .hash(opts.hash)
            .read_only(true)
            .open()
            .await?;

        let index = archive.path_index().clone();
        let root = self.root.clone();
        let (recursive, relative) = (!self.no_recursive, self.relative);
        let pb = ProgressBar::no_length().with_style(pb_style());

        let snapshot = tokio::task::spawn_blocking(move || {
            let snapshot = index.build_and_persist(&root, recursive, relative, &pb);
            pb.finish_and_clear();
            snapshot
        })
        .await??;

        println!("Indexed {} images into {}", snapshot.len(), archive.path_index().file().display());
        if let Some(base_path) = &snapshot.base_path {
            println!("Base path: {}", base_path);
        }
        Ok(())
    }
}
