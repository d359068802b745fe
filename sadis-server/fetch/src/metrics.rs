use bbsim_sadis_server_core::Kind;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct Metrics {
    attempts: Counter,
    results: Family<ResultLabels, Counter>,
    stored: Family<KindLabels, Counter>,
    dropped: Counter,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct ResultLabels {
    result: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct KindLabels {
    kind: &'static str,
}

// === impl Metrics ===

impl Metrics {
    pub fn register(reg: &mut Registry) -> Self {
        let attempts = Counter::default();
        reg.register(
            "attempts",
            "Total number of requests issued to BBSim instances",
            attempts.clone(),
        );

        let results = Family::<ResultLabels, Counter>::default();
        reg.register(
            "results",
            "Total number of completed fetches, by outcome",
            results.clone(),
        );

        let stored = Family::<KindLabels, Counter>::default();
        reg.register(
            "stored_entries",
            "Total number of entries written to the store, by kind",
            stored.clone(),
        );

        let dropped = Counter::default();
        reg.register(
            "dropped_entries",
            "Total number of subscriber entries that were neither OLTs nor ONUs",
            dropped.clone(),
        );

        Self {
            attempts,
            results,
            stored,
            dropped,
        }
    }

    pub(crate) fn attempt(&self) {
        self.attempts.inc();
    }

    pub(crate) fn ok(&self) {
        self.result("ok");
    }

    pub(crate) fn unreachable(&self) {
        self.result("unreachable");
    }

    pub(crate) fn bad_status(&self) {
        self.result("status");
    }

    pub(crate) fn malformed(&self) {
        self.result("malformed");
    }

    pub(crate) fn stored(&self, kind: Kind) {
        self.stored
            .get_or_create(&KindLabels {
                kind: kind.as_str(),
            })
            .inc();
    }

    pub(crate) fn dropped(&self) {
        self.dropped.inc();
    }

    fn result(&self, result: &'static str) {
        self.results.get_or_create(&ResultLabels { result }).inc();
    }

    #[cfg(test)]
    pub(crate) fn attempts(&self) -> u64 {
        self.attempts.get()
    }
}
