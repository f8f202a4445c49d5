use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber. `IFRIT_LOG` wins over `RUST_LOG`.
pub fn init_tracing(component: &str) {
    let filter = resolve_filter(component, std::env::var("IFRIT_LOG").ok());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_span_events(FmtSpan::CLOSE)
        .compact()
        .try_init();
}

fn default_directives(component: &str) -> String {
    format!("info,ifrit=debug,{component}=debug")
}

fn resolve_filter(component: &str, override_value: Option<String>) -> EnvFilter {
    override_value
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_directives(component)))
}
