use prometheus::{
    core::{Atomic, AtomicU64, GenericCounter, GenericCounterVec, GenericGauge, GenericGaugeVec},
    Histogram, HistogramOpts, HistogramVec, Opts,
};

pub mod outcome {
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
    pub const SKIPPED: &str = "skipped";
}

pub type UIntGauge = GenericGauge<AtomicU64>;
pub type UIntGaugeVec = GenericGaugeVec<AtomicU64>;
pub type UIntCounter = GenericCounter<AtomicU64>;
pub type UIntCounterVec = GenericCounterVec<AtomicU64>;

pub struct Metrics {
    pub pipeline: Pipeline,
    pub services: Services,
}

pub struct Pipeline {
    pub eras_processed: UIntCounterVec,
    pub rows_inserted: UIntCounterVec,
    pub block_decode_errors: UIntCounter,
    pub last_completed_era: UIntGauge,
    pub era_processing_seconds: Histogram,
}

#[derive(Clone)]
pub struct Service {
    pub call_count: UIntCounterVec,
    pub retry_count: UIntGaugeVec,
    pub execution_time_seconds: HistogramVec,
}

pub struct Services {
    pub discovery: Service,
    pub download: Service,
}

fn gauge<TVal: Atomic>(namespace: &str, name: &str, help: &str) -> GenericGauge<TVal> {
    let opts = Opts::new(name, help).namespace(namespace.to_string());
    GenericGauge::with_opts(opts).unwrap()
}

fn gauge_vec<TVal: Atomic>(namespace: &str, name: &str, help: &str, labels: &[&str]) -> GenericGaugeVec<TVal> {
    let opts = Opts::new(name, help).namespace(namespace.to_string());
    GenericGaugeVec::new(opts, labels).unwrap()
}

fn counter<TVal: Atomic>(namespace: &str, name: &str, help: &str) -> GenericCounter<TVal> {
    let opts = Opts::new(name, help).namespace(namespace.to_string());
    GenericCounter::with_opts(opts).unwrap()
}

fn counter_vec<TVal: Atomic>(namespace: &str, name: &str, help: &str, labels: &[&str]) -> GenericCounterVec<TVal> {
    let opts = Opts::new(name, help).namespace(namespace.to_string());
    GenericCounterVec::new(opts, labels).unwrap()
}

fn histogram(namespace: &str, name: &str, help: &str) -> Histogram {
    let opts = HistogramOpts::new(name, help).namespace(namespace.to_string());
    Histogram::with_opts(opts).unwrap()
}

fn histogram_vec(namespace: &str, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let opts = HistogramOpts::new(name, help).namespace(namespace.to_string());
    HistogramVec::new(opts, labels).unwrap()
}

impl Metrics {
    pub fn new(namespace: &str) -> Self {
        let pipeline = Pipeline {
            eras_processed: counter_vec(
                namespace,
                "pipeline__eras_processed",
                "Eras by outcome",
                &["outcome"],
            ),
            rows_inserted: counter_vec(
                namespace,
                "pipeline__rows_inserted",
                "Rows inserted per dataset",
                &["dataset"],
            ),
            block_decode_errors: counter(
                namespace,
                "pipeline__block_decode_errors",
                "Blocks skipped due to decode failures",
            ),
            last_completed_era: gauge(namespace, "pipeline__last_completed_era", "Most recent completed era"),
            era_processing_seconds: histogram(
                namespace,
                "pipeline__era_processing_seconds",
                "Wall-clock seconds per era attempt",
            ),
        };

        fn build_service_metrics(namespace: &str, component: &str) -> Service {
            Service {
                call_count: counter_vec(
                    namespace,
                    &format!("external__{component}__call_count"),
                    "Total call count",
                    &["operation"],
                ),
                retry_count: gauge_vec(
                    namespace,
                    &format!("external__{component}__retry_count"),
                    "Retry count",
                    &["operation"],
                ),
                execution_time_seconds: histogram_vec(
                    namespace,
                    &format!("{component}_execution_time_seconds"),
                    "Execution time in seconds",
                    &["operation"],
                ),
            }
        }

        let services = Services {
            discovery: build_service_metrics(namespace, "discovery"),
            download: build_service_metrics(namespace, "download"),
        };

        Metrics { pipeline, services }
    }
}
