//! Loop configuration.

/// Tunables of a [`Loop`](crate::Loop).
///
/// # Example
///
/// ```rust,ignore
/// let config = LoopConfig::default()
///     .with_max_drain_passes(8)
///     .with_warn_unknown_events(false);
/// let lp = Loop::with_config(config);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Number of reaction passes one flush may run before the remaining
    /// events are discarded as a runaway cycle.
    pub max_drain_passes: usize,
    /// Log a warning when a reaction connects to an event type that its
    /// target does not declare (connections starting with `!` never warn).
    pub warn_unknown_events: bool,
    /// Keep the events a component emits until the next flush starts, and
    /// replay them to reactions that connect in that window.
    pub capture_init_events: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_drain_passes: 64,
            warn_unknown_events: true,
            capture_init_events: true,
        }
    }
}

impl LoopConfig {
    /// Set the drain pass limit. Values below 1 are raised to 1.
    pub fn with_max_drain_passes(mut self, passes: usize) -> Self {
        self.max_drain_passes = passes.max(1);
        self
    }

    /// Enable or disable unknown-event-type warnings.
    pub fn with_warn_unknown_events(mut self, warn: bool) -> Self {
        self.warn_unknown_events = warn;
        self
    }

    /// Enable or disable replay of init events.
    pub fn with_capture_init_events(mut self, capture: bool) -> Self {
        self.capture_init_events = capture;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_builders() {
        let config = LoopConfig::default();
        assert_eq!(config.max_drain_passes, 64);
        assert!(config.warn_unknown_events);
        assert!(config.capture_init_events);

        let config = config.with_max_drain_passes(0).with_capture_init_events(false);
        assert_eq!(config.max_drain_passes, 1);
        assert!(!config.capture_init_events);
    }
}
