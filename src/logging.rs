use std::fmt::Debug;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

const LOG_MODULES: &[&str] = &["fcm_client"];

pub fn init_logging() {
    let mut env_filter = EnvFilter::default();

    for module in LOG_MODULES {
        env_filter = env_filter.add_directive(
            format!("{}=info", module)
                .parse()
                .expect("Could not parse logging directive"),
        );
    }

    if std::env::var("LOG_JSON").is_ok() {
        let stackdriver = tracing_stackdriver::layer();
        let subscriber = Registry::default().with(stackdriver).with(env_filter);

        tracing::subscriber::set_global_default(subscriber)
            .expect("Could not set up global logger");
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

/// Converts a failure at a component boundary into a logged `None`.
pub trait LogError<T> {
    fn log_error(self, context: &str) -> Option<T>;
}

impl<T, E> LogError<T> for Result<T, E>
where
    E: Debug,
{
    fn log_error(self, context: &str) -> Option<T> {
        match self {
            Ok(v) => Some(v),
            Err(error) => {
                tracing::error!(?error, "{}: {:?}", context, error);

                None
            }
        }
    }
}
