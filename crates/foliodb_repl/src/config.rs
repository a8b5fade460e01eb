//! Configuration for pull replication.

/// Configuration for the change-negotiation side of a pull replication.
#[derive(Debug, Clone)]
pub struct PullConfig {
    /// Maximum number of revisions that may be requested from the peer and
    /// not yet received. Messages arriving beyond this limit are queued.
    pub max_revs_in_flight: u64,
    /// Maximum revision-history depth advertised to the peer.
    pub max_history: u32,
    /// Advertise blob (attachment) support.
    pub blobs_enabled: bool,
    /// Advertise delta support; also makes ancestry lookups require stored
    /// bodies so they can serve as delta sources.
    pub deltas_enabled: bool,
    /// Reject plain `changes` messages: the peer must propose revisions so
    /// conflicts can be refused up front.
    pub conflict_free_mode: bool,
    /// Maximum number of candidate ancestors returned per document.
    pub max_ancestors: usize,
}

impl PullConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_revs_in_flight: 100,
            max_history: 20,
            blobs_enabled: true,
            deltas_enabled: true,
            conflict_free_mode: false,
            max_ancestors: 10,
        }
    }

    /// Sets the in-flight revision limit.
    #[must_use]
    pub fn with_max_revs_in_flight(mut self, limit: u64) -> Self {
        self.max_revs_in_flight = limit;
        self
    }

    /// Sets the advertised history depth.
    #[must_use]
    pub fn with_max_history(mut self, depth: u32) -> Self {
        self.max_history = depth;
        self
    }

    /// Enables or disables blob support.
    #[must_use]
    pub fn with_blobs(mut self, enabled: bool) -> Self {
        self.blobs_enabled = enabled;
        self
    }

    /// Enables or disables delta support.
    #[must_use]
    pub fn with_deltas(mut self, enabled: bool) -> Self {
        self.deltas_enabled = enabled;
        self
    }

    /// Enables conflict-free mode.
    #[must_use]
    pub fn with_conflict_free_mode(mut self, enabled: bool) -> Self {
        self.conflict_free_mode = enabled;
        self
    }

    /// Sets the ancestor-candidate cap.
    #[must_use]
    pub fn with_max_ancestors(mut self, cap: usize) -> Self {
        self.max_ancestors = cap;
        self
    }
}

impl Default for PullConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let config = PullConfig::new()
            .with_max_revs_in_flight(1)
            .with_max_history(50)
            .with_blobs(false)
            .with_deltas(false)
            .with_conflict_free_mode(true)
            .with_max_ancestors(3);
        assert_eq!(config.max_revs_in_flight, 1);
        assert_eq!(config.max_history, 50);
        assert!(!config.blobs_enabled);
        assert!(!config.deltas_enabled);
        assert!(config.conflict_free_mode);
        assert_eq!(config.max_ancestors, 3);
    }
}
