mod application;
mod presentation {
    pub mod cli;
}

use sitepack_core::Remediation;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = application::run().await {
        eprintln!("error: {e}");
        match e.remediation() {
            Remediation::FixInput => eprintln!("hint: check the input file and try again"),
            Remediation::RetryLater => eprintln!("hint: storage is unavailable, retry later"),
            Remediation::Internal => {}
        }
        std::process::exit(1);
    }
}
