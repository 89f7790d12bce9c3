/* src/cli/core/src/logging.rs */

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. `--verbose` wins over `RUST_LOG`; without
/// either only warnings are shown, since progress already goes through `ui`.
pub fn init(verbose: bool) {
  let filter = if verbose {
    EnvFilter::new("ssg_cli=debug,ssg_document=debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };

  let fmt_layer = fmt::layer().with_target(false).with_level(true).with_writer(std::io::stderr).compact();

  // A second init (tests, embedding) keeps the first subscriber.
  let _ = tracing_subscriber::registry().with(filter).with(fmt_layer).try_init();
}
