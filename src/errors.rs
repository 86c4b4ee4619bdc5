use thiserror::Error;

/// A configuration that cannot be run. Always detected before any thread starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ticks per second must be positive")]
    NoTick,
    #[error("{0} ticks per second gives a tick interval below 1 ms")]
    TickTooShort(u64),
    #[error("cannot have more flow simulators ({simulators}) than flows per tick ({flows_per_tick})")]
    TooManySimulators { simulators: usize, flows_per_tick: u64 },
    #[error("cannot have more export workers ({workers}) than flows per tick ({flows_per_tick})")]
    TooManyWorkers { workers: usize, flows_per_tick: u64 },
    #[error("at least one {0} is required")]
    Empty(&'static str),
    #[error("invalid network \"{network}\": {reason}")]
    Network { network: String, reason: String },
    #[error("maximum message size must be between {min} and {max} bytes, got {got}")]
    MessageSize { got: usize, min: usize, max: usize },
    #[error("fill ratio threshold must be in (0, 1], got {0}")]
    Threshold(f64),
    #[error("invalid {name} distribution: {reason}")]
    Distribution { name: &'static str, reason: String },
    #[error("cannot read the configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("ill-formed configuration file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Errors raised by a protocol exporter session
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("no information element named \"{0}\"")]
    UnknownElement(String),
    #[error("a template is already registered on this session")]
    TemplateAlreadyRegistered,
    #[error("unknown template {0}")]
    UnknownTemplate(u16),
    #[error("record has {got} values but the template has {expected} fields")]
    FieldCount { expected: usize, got: usize },
    #[error("value {value} does not fit element \"{element}\"")]
    TypeMismatch { element: &'static str, value: String },
    #[error("cannot reach the collector: {0}")]
    Connect(std::io::Error),
    #[error("cannot send the message: {0}")]
    Send(std::io::Error),
    #[error("the exporter session is closed")]
    Closed,
}

/// Errors that prevent the pipeline from starting
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("exporter session {worker} cannot start: {source}")]
    Exporter {
        worker: usize,
        #[source]
        source: ExporterError,
    },
    #[error("cannot spawn thread: {0}")]
    Spawn(std::io::Error),
}
