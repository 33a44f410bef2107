use std::time::Duration;

/// Default requeue delay when a record's own interval cannot be parsed.
pub const DEFAULT_REQUEUE: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct IntervalError {
    raw: String,
    source: humantime::DurationError,
}

impl std::fmt::Display for IntervalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid duration {:?}: {}", self.raw, self.source)
    }
}

impl std::error::Error for IntervalError {}

/// Parses the duration strings carried by records (`checkInterval`,
/// `firingInterval`, `condition.for`), e.g. `30s`, `5m`, `1h 30m`.
pub fn parse_interval(raw: &str) -> Result<Duration, IntervalError> {
    humantime::parse_duration(raw).map_err(|source| IntervalError {
        raw: raw.to_string(),
        source,
    })
}
