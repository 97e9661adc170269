use sora::config::AppConfig;
use sora::server::Bus;
use sora::{info, plugins};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    print_banner();

    let config = AppConfig::load("config.toml").await?;
    let registry = plugins::build(&config);

    let bus = Bus::new(config, registry);
    bus.run().await
}

fn print_banner() {
    let banner = r#"
     ____   ___  ____      _
    / ___| / _ \|  _ \    / \
    \___ \| | | | |_) |  / _ \
     ___) | |_| |  _ <  / ___ \
    |____/ \___/|_| \_\/_/   \_\
    "#;
    println!("{banner}");
    info!(target: "System", "Sora v{} 启动中", env!("CARGO_PKG_VERSION"));
}
