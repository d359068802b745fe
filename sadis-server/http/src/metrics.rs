use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct Metrics {
    requests: Family<RequestLabels, Counter>,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct RequestLabels {
    route: &'static str,
    result: &'static str,
}

// === impl Metrics ===

impl Metrics {
    pub fn register(reg: &mut Registry) -> Self {
        let requests = Family::<RequestLabels, Counter>::default();
        reg.register(
            "requests",
            "Total number of lookups served, by route and result",
            requests.clone(),
        );
        Self { requests }
    }

    pub(crate) fn found(&self, route: &'static str) {
        self.request(route, "found");
    }

    pub(crate) fn not_found(&self, route: &'static str) {
        self.request(route, "not_found");
    }

    fn request(&self, route: &'static str, result: &'static str) {
        self.requests
            .get_or_create(&RequestLabels { route, result })
            .inc();
    }

    #[cfg(test)]
    pub(crate) fn requests(&self, route: &'static str, result: &'static str) -> u64 {
        self.requests
            .get_or_create(&RequestLabels { route, result })
            .get()
    }
}
