use std::process;

use campus_market::{cli::run_cli, init};

#[tokio::main]
async fn main() {
    init();

    if let Err(err) = run_cli().await {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}
