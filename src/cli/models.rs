use anyhow::Result;
use clap::Parser;

use crate::ArchiveBuilder;
use crate::cli::SubCommandExtend;
use crate::config::{EmbeddingOptions, Opts};
use crate::provider::EmbeddingProvider;
use crate::vector::VectorStore;

#[derive(Parser, Debug, Clone)]
pub struct ModelsCommand {
    #[command(flatten)]
    pub embedding: EmbeddingOptions,
}

impl SubCommandExtend for ModelsCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let provider = self.embedding.provider()?;
        let healthy = provider.health().await;
        println!("Provider: {}", if healthy { "healthy" } else { "unreachable" });
        if healthy {
            for model in provider.list_models().await {
                println!("  {}", model);
            }
        }

        let archive = ArchiveBuilder::new(opts.conf_dir.clone()).open().await?;
        let stored = archive.vectors().list_models().await?;
        println!("Stored models:");
        for model in stored {
            let count = archive.vectors().count(&model).await?;
            println!("  {}\t{}", model, count);
        }
        Ok(())
    }
}
