use clap::Parser;
use tower_lsp::{LspService, Server};
use tracing::info;

use utility_css_language_server::logging::init_logger;
use utility_css_language_server::lsp::backend::{ServerOptions, UtilityCssBackend};

#[derive(Parser, Debug)]
#[command(author, version, about = "Utility CSS Language Server")]
struct Cli {
    /// Log level for stderr (overrides RUST_LOG), e.g. "debug" or
    /// "utility_css_language_server=trace"
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Disable ANSI colors in log output
    #[arg(long)]
    no_color: bool,

    /// Do not write a session log to the user cache directory
    #[arg(long)]
    no_file_logging: bool,

    /// External CSS formatter reading stdin and writing stdout, e.g. "prettier --parser css"
    #[arg(long, value_name = "COMMAND")]
    css_formatter: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let _guard = init_logger(args.no_color, args.log_level.as_deref(), !args.no_file_logging)?;
    info!("Starting {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let options = ServerOptions::with_formatter_command(args.css_formatter.as_deref());

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    let (service, socket) = LspService::new(|client| UtilityCssBackend::new(client, options));

    Server::new(stdin, stdout, socket).serve(service).await;
    info!("Server stopped");
    Ok(())
}
