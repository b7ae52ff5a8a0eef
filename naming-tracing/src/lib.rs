use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

pub struct TracingBuilder {
    level: Level,
}

impl Default for TracingBuilder {
    fn default() -> Self {
        TracingBuilder {
            level: Level::INFO,
        }
    }
}

impl TracingBuilder {
    /// Sets the log level for the stderr layer. `RUST_LOG` still takes priority
    /// over this value if set.
    pub fn level(mut self, level: Level) -> TracingBuilder {
        self.level = level;
        self
    }

    /// Installs a global subscriber writing compact, leveled spans to stderr.
    pub fn build(self) -> Result<(), Error> {
        let subscriber = tracing_subscriber::registry()
            .with(
                EnvFilter::builder()
                    .with_default_directive(self.level.into())
                    .from_env()
                    .expect("invalid RUST_LOG"),
            )
            .with(tracing_subscriber::fmt::Layer::new().compact());

        subscriber.try_init()?;
        Ok(())
    }
}
