mod check;
mod export;
mod find;
mod index;
mod init;
mod models;
mod similar;
mod status;
mod sync;

pub use check::*;
pub use export::*;
pub use find::*;
pub use index::*;
pub use init::*;
pub use models::*;
pub use similar::*;
pub use status::*;
pub use sync::*;

use clap::ValueEnum;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// 命令执行完成，但结果需要以非零状态码退出
#[derive(Debug, thiserror::Error)]
#[error("存在未处理的问题")]
pub struct IssuesFound;

#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    Json,
    #[default]
    Table,
}
