use clap::Parser;
use imarchive::Opts;
use imarchive::cli::{IssuesFound, SubCommandExtend};
use imarchive::config::SubCommand;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();

    let result = match &opts.subcmd {
        SubCommand::Init(cmd) => cmd.run(&opts).await,
        SubCommand::Sync(cmd) => cmd.run(&opts).await,
        SubCommand::Check(cmd) => cmd.run(&opts).await,
        SubCommand::Index(cmd) => cmd.run(&opts).await,
        SubCommand::Find(cmd) => cmd.run(&opts).await,
        SubCommand::Similar(cmd) => cmd.run(&opts).await,
        SubCommand::Status(cmd) => cmd.run(&opts).await,
        SubCommand::Models(cmd) => cmd.run(&opts).await,
        SubCommand::Export(cmd) => cmd.run(&opts).await,
    };

    // 报告已经打印，只需要设置退出码
    if let Err(e) = &result {
        if e.downcast_ref::<IssuesFound>().is_some() {
            std::process::exit(1);
        }
    }
    result
}
