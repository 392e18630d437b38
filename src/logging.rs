use crate::config::Environment;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
fn default_directives(env: &Environment) -> &'static str {
    match env {
        // Model and image calls go through reqwest; keep its connection chatter out
        Environment::Dev => "roof_analysis=debug,sqlx=warn,reqwest=info,info",
        Environment::Staging => "roof_analysis=debug,sqlx=warn,info",
        Environment::Prod => "roof_analysis=info,sqlx=error,warn",
    }
}

/// Install the global tracing subscriber.
///
/// Returns `false` when a subscriber was already installed, in which case the
/// existing one is left alone.
pub fn init_logging(env: &Environment) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(env)));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(env.is_dev())
        .with_line_number(env.is_dev());

    // Report and attempt ids are span fields, so prod logs stay queryable as JSON
    let installed = if env.is_prod() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json().with_current_span(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.pretty())
            .try_init()
    };

    match installed {
        Ok(()) => {
            tracing::info!(environment = ?env, "Logging initialized");
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse() {
        for env in [Environment::Dev, Environment::Staging, Environment::Prod] {
            let directives = default_directives(&env);
            assert!(directives.starts_with("roof_analysis="));
            assert!(EnvFilter::try_new(directives).is_ok());
        }
    }

    #[test]
    fn test_second_init_is_ignored() {
        init_logging(&Environment::Dev);
        assert!(!init_logging(&Environment::Prod));
    }
}
