use std::sync::Arc;

use crate::core::Config;
use crate::subscribers::Subscribe;

use super::supervisor::Supervisor;

/// Collects the config and subscribers of a [`Supervisor`].
pub struct SupervisorBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl SupervisorBuilder {
    /// Starts from `cfg` with no subscribers.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Appends `subscribers`, keeping the ones added before.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers.extend(subscribers);
        self
    }

    /// Appends one subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Appends the built-in [`LogWriter`](crate::LogWriter).
    #[cfg(feature = "logging")]
    pub fn with_log_writer(self) -> Self {
        self.with_subscriber(Arc::new(crate::subscribers::LogWriter::new()))
    }

    /// Number of subscribers collected so far.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn build(self) -> Supervisor {
        Supervisor::new(self.cfg, self.subscribers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Noop;

    #[async_trait]
    impl Subscribe for Noop {
        async fn on_event(&self, _e: &Event) {}
    }

    #[test]
    fn test_subscribers_accumulate() {
        let builder = SupervisorBuilder::new(Config::default())
            .with_subscriber(Arc::new(Noop))
            .with_subscribers(vec![Arc::new(Noop), Arc::new(Noop)]);
        assert_eq!(builder.subscriber_count(), 3);
    }

    #[cfg(feature = "logging")]
    #[test]
    fn test_log_writer_is_a_subscriber() {
        let builder = SupervisorBuilder::new(Config::default()).with_log_writer();
        assert_eq!(builder.subscriber_count(), 1);
    }

    #[test]
    fn test_config_is_carried_over() {
        let cfg = Config {
            grace: Duration::from_millis(250),
            ..Config::default()
        };
        let sup = SupervisorBuilder::new(cfg).build();
        assert_eq!(sup.cfg.grace, Duration::from_millis(250));
    }
}
