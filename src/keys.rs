//! Backing-store key naming.
//!
//! Every key a queue touches is derived from one configured prefix:
//!
//! - `{prefix}_pending_list`: ids awaiting delivery (list)
//! - `{prefix}_working_set`: ids checked out by consumers (list)
//! - `{prefix}_values_table`: id -> payload (hash)
//! - `{prefix}_delayed_set`: ids scheduled for re-delivery (sorted set)
//! - `{prefix}_msg_stats_table`: id -> serialized `MessageStats` (hash)
//! - `{prefix}_uuid_counter`: message id counter
//! - `{prefix}_distribution_pool_{pool}`: segment labels of a pool (set)
//! - `{prefix}_segment_counter_{pool}`: round-robin counter of a pool

/// The structures a queue is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Structure {
    PendingList,
    WorkingSet,
    ValuesTable,
    DelayedSet,
    StatsTable,
    SegmentCounter,
    DistributionPoolTable,
}

/// Derives key names from a queue prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNamespace {
    prefix: String,
}

impl KeyNamespace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn pending_list(&self) -> String {
        format!("{}_pending_list", self.prefix)
    }

    pub fn working_set(&self) -> String {
        format!("{}_working_set", self.prefix)
    }

    pub fn values_table(&self) -> String {
        format!("{}_values_table", self.prefix)
    }

    pub fn delayed_set(&self) -> String {
        format!("{}_delayed_set", self.prefix)
    }

    pub fn stats_table(&self) -> String {
        format!("{}_msg_stats_table", self.prefix)
    }

    pub fn id_counter(&self) -> String {
        format!("{}_uuid_counter", self.prefix)
    }

    /// Queue-level statistics table. Reserved; no operation writes it.
    pub fn queue_stats_table(&self) -> String {
        format!("{}_queue_stats_table", self.prefix)
    }

    pub fn distribution_pool(&self, pool: &str) -> String {
        format!("{}_distribution_pool_{}", self.prefix, pool)
    }

    pub fn segment_counter(&self, pool: &str) -> String {
        format!("{}_segment_counter_{}", self.prefix, pool)
    }

    /// Lock key guarding the stats record of one message in strict mode.
    pub fn stats_lock(&self, id: &str) -> String {
        format!("{}_msg_stats_lock_{}", self.prefix, id)
    }

    /// Key of a structure. Pool-scoped structures need the pool name.
    pub fn key_for(&self, structure: Structure, pool: Option<&str>) -> Option<String> {
        match structure {
            Structure::PendingList => Some(self.pending_list()),
            Structure::WorkingSet => Some(self.working_set()),
            Structure::ValuesTable => Some(self.values_table()),
            Structure::DelayedSet => Some(self.delayed_set()),
            Structure::StatsTable => Some(self.stats_table()),
            Structure::SegmentCounter => pool.map(|p| self.segment_counter(p)),
            Structure::DistributionPoolTable => pool.map(|p| self.distribution_pool(p)),
        }
    }

    /// The five keys wiped by a purge. The id counter and pool keys survive.
    pub fn queue_wide_keys(&self) -> Vec<String> {
        vec![
            self.pending_list(),
            self.working_set(),
            self.values_table(),
            self.delayed_set(),
            self.stats_table(),
        ]
    }
}
