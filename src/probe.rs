use derive_more::Display;

/// The tracing target used for machine-parseable probe events.
pub const TARGET: &str = "suilens_probe";

/// The Kind of the Probe.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// When the Lifecycle of the Relayer changes, like starting or shutting down.
    #[display(fmt = "lifecycle")]
    Lifecycle,
    /// A transaction got sponsored (or a sponsorship was rejected).
    #[display(fmt = "sponsorship")]
    Sponsorship,
    /// A sponsored transaction got submitted for execution.
    #[display(fmt = "execution")]
    Execution,
    /// Fee-payer gas pool state changes.
    #[display(fmt = "gas_pool")]
    GasPool,
    /// The expiry sweep reclaimed unexecuted sponsorships.
    #[display(fmt = "sweep")]
    Sweep,
}
