/// imgenie command-line client entry point for native builds
#[cfg(not(target_arch = "wasm32"))]
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;
    use imgenie::native::{Cli, init_logging, run};

    let cli = Cli::parse();
    init_logging(cli.log_level());
    run(cli).await
}

// WASM doesn't use main(), it uses wasm_bindgen's start function
#[cfg(target_arch = "wasm32")]
fn main() {}
