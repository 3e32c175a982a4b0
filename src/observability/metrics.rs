use prometheus::{Counter, Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub tasks_started_total: IntCounter,
    pub tasks_cancelled_total: IntCounter,
    pub route_saves_total: IntCounter,
    pub view_inits_total: IntCounterVec,
    pub cod_collected_total: Counter,
    pub cod_deposited_total: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Task transitions by action and outcome"),
            &["action", "outcome"],
        )
        .expect("valid transitions_total metric");

        let tasks_started_total =
            IntCounter::new("tasks_started_total", "Tasks promoted from the pickup queue")
                .expect("valid tasks_started_total metric");

        let tasks_cancelled_total =
            IntCounter::new("tasks_cancelled_total", "Tasks cancelled by the rider")
                .expect("valid tasks_cancelled_total metric");

        let route_saves_total =
            IntCounter::new("route_saves_total", "Manual route orders persisted")
                .expect("valid route_saves_total metric");

        let view_inits_total = IntCounterVec::new(
            Opts::new("view_inits_total", "View initializations by view"),
            &["view"],
        )
        .expect("valid view_inits_total metric");

        let cod_collected_total = Counter::new(
            "cod_collected_total",
            "Cash collected on delivery, in currency units",
        )
        .expect("valid cod_collected_total metric");

        let cod_deposited_total = Counter::new(
            "cod_deposited_total",
            "Cash handed over to the operator, in currency units",
        )
        .expect("valid cod_deposited_total metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(tasks_started_total.clone()))
            .expect("register tasks_started_total");
        registry
            .register(Box::new(tasks_cancelled_total.clone()))
            .expect("register tasks_cancelled_total");
        registry
            .register(Box::new(route_saves_total.clone()))
            .expect("register route_saves_total");
        registry
            .register(Box::new(view_inits_total.clone()))
            .expect("register view_inits_total");
        registry
            .register(Box::new(cod_collected_total.clone()))
            .expect("register cod_collected_total");
        registry
            .register(Box::new(cod_deposited_total.clone()))
            .expect("register cod_deposited_total");

        Self {
            registry,
            transitions_total,
            tasks_started_total,
            tasks_cancelled_total,
            route_saves_total,
            view_inits_total,
            cod_collected_total,
            cod_deposited_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
