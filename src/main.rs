// tandem - multi-target build orchestrator
// Entry point: all work happens in the library, the binary only maps the
// outcome to an exit status

use tandem::cli::CliHandler;

#[tokio::main]
async fn main() {
    let handler = CliHandler::new();

    match handler.run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
