use clap::Parser;
use containai_core::errors::CaiError;
use tokio_util::sync::CancellationToken;

mod cli;
mod commands;

#[tokio::main]
async fn main() {
    if let Err(e) = containai_core::logging::init() {
        eprintln!("failed to initialize logging: {e}");
    }

    let parsed = cli::Cli::parse();

    // One token cancels every in-flight child subtree.
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let code = match cli::dispatch(parsed, cancel).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err}");
            err.downcast_ref::<CaiError>()
                .map(CaiError::exit_code)
                .unwrap_or(1)
        }
    };
    std::process::exit(code);
}
