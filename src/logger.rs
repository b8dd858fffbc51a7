use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Transport-layer targets are capped at `warn` so a busy metrics pipeline
/// does not drown the worker's own lifecycle logs.
const DEFAULT_DIRECTIVES: &str = "info,hyper=warn,reqwest=warn";
const VERBOSE_DIRECTIVES: &str = "debug,hyper=info,reqwest=info";

/// Installs the global tracing subscriber for an embedding application.
///
/// `STAMPEDE_LOG` takes precedence, then `RUST_LOG`; with neither set,
/// `verbose` selects between the debug and info defaults. Safe to call more
/// than once: a subscriber that is already installed wins.
pub fn init_logging(verbose: bool) {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(resolve_filter(verbose))
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set global default subscriber: {}", err);
    }
}

fn resolve_filter(verbose: bool) -> EnvFilter {
    let fallback = if verbose {
        VERBOSE_DIRECTIVES
    } else {
        DEFAULT_DIRECTIVES
    };
    std::env::var("STAMPEDE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(fallback))
}
