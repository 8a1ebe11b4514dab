//! Tracing setup.
//!
//! Logs always go to stderr; stdout is reserved for command output.

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{Result, RuntimeError};

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    build_subscriber(logging, env_filter, std::io::stderr)
        .try_init()
        .map_err(|e| RuntimeError::Telemetry(e.to_string()))
}

fn build_subscriber<W>(
    logging: &LoggingConfig,
    env_filter: EnvFilter,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.json {
        Box::new(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(writer),
            ),
        )
    } else {
        Box::new(registry.with(tracing_subscriber::fmt::layer().with_writer(writer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'w> MakeWriter<'w> for Captured {
        type Writer = Captured;

        fn make_writer(&'w self) -> Self::Writer {
            self.clone()
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    #[test]
    fn json_logs_use_the_configured_writer() {
        let out = Captured::default();
        let logging = LoggingConfig {
            level: "info".to_string(),
            json: true,
        };
        let subscriber = build_subscriber(&logging, EnvFilter::new("info"), out.clone());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(user_id = "u1", "gate opened");
        });

        let line: serde_json::Value = serde_json::from_str(out.text().trim()).unwrap();
        assert_eq!(line["fields"]["message"], "gate opened");
        assert_eq!(line["fields"]["user_id"], "u1");
    }

    #[test]
    fn pretty_logs_use_the_configured_writer() {
        let out = Captured::default();
        let logging = LoggingConfig {
            level: "info".to_string(),
            json: false,
        };
        let subscriber = build_subscriber(&logging, EnvFilter::new("info"), out.clone());
        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("filtered out");
            tracing::info!("gate opened");
        });

        let text = out.text();
        assert!(text.contains("gate opened"));
        assert!(!text.contains("filtered out"));
    }
}
