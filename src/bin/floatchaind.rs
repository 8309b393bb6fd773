use colored::*;

use floatchain::config::NodeConfig;
use floatchain::node;

fn banner() {
    println!("{}", " ███████╗██╗      ██████╗  █████╗ ████████╗".bright_cyan());
    println!("{}", " ██╔════╝██║     ██╔═══██╗██╔══██╗╚══██╔══╝".bright_cyan());
    println!("{}", " █████╗  ██║     ██║   ██║███████║   ██║   ".bright_cyan().bold());
    println!("{}", " ██╔══╝  ██║     ██║   ██║██╔══██║   ██║   ".bright_cyan().bold());
    println!("{}", " ██║     ███████╗╚██████╔╝██║  ██║   ██║   ".blue());
    println!("{}", " ╚═╝     ╚══════╝ ╚═════╝ ╚═╝  ╚═╝   ╚═╝   ".blue());
    println!();
    println!("{}", "        floatchain p2p blob-chain node       ".bright_green().bold());
    println!();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    banner();

    let config = NodeConfig::from_env();
    println!(
        "{} request port {} (TCP+UDP), ingest port {}, readback port {}",
        "[init]".bright_blue().bold(),
        config.request_port,
        config.ingest_port,
        config.readback_port
    );

    let node = node::run(config).await?;
    println!(
        "{} node_id {} online",
        "[init]".bright_blue().bold(),
        node.node_id
    );

    std::future::pending::<()>().await;
    Ok(())
}
