//! Provision Agent - asynchronous provisioning pipeline for a hosting
//! reseller control panel
//!
//! Usage:
//! - Normal mode: `provision-agent`
//! - With custom port: `provision-agent --port 19310`

use provision_agent::RuntimeConfig;

fn parse_args() -> RuntimeConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = RuntimeConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                config.port_override = args[i + 1].parse().ok();
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }

    config
}

fn print_help() {
    println!("Provision Agent - hosting reseller provisioning pipeline");
    println!();
    println!("USAGE:");
    println!("    provision-agent [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>    Override the listening port");
    println!("    -h, --help       Print help information");
    println!();
    println!("EXAMPLES:");
    println!("    provision-agent                 # Normal mode");
    println!("    provision-agent --port 19310    # Custom port");
}

fn main() {
    let config = parse_args();

    let rt = tokio::runtime::Runtime::new().expect("Failed to create runtime");
    rt.block_on(async {
        provision_agent::init_and_run(config).await;
    });
}
