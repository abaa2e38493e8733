//! Error types for oracle operations

use thiserror::Error;

/// Result type alias for oracle operations
pub type Result<T> = std::result::Result<T, OracleError>;

/// Errors raised by the golden model, the checkers and the testbench
#[derive(Debug, Error)]
pub enum OracleError {
    /// Observed output diverged from the predicted value
    #[error(
        "{checker} mismatch at cycle {cycle}: expected {expected:#x}, observed {observed:#x} \
         (previous {previous:#x}, pending {pending:x?})"
    )]
    Mismatch {
        /// Checker that detected the divergence
        checker: &'static str,
        /// Edge index at which the comparison failed
        cycle: u64,
        /// Value leaving the delay queue
        expected: u128,
        /// Value reported by the device
        observed: u128,
        /// Last value that compared equal
        previous: u128,
        /// Predictions still in flight, oldest first
        pending: Vec<u128>,
    },

    /// A driving call supplied the wrong number of values
    #[error("Incorrect number of {what}, given: {given}, expected: {expected}")]
    LengthMismatch {
        /// What was being supplied
        what: &'static str,
        /// Supplied length
        given: usize,
        /// Required length
        expected: usize,
    },

    /// A driving call supplied a value that does not fit its bus
    #[error("{what} value {value} does not fit in {width} bits")]
    OutOfRange {
        /// Bus or operand name
        what: &'static str,
        /// Offending value
        value: i128,
        /// Declared width
        width: u32,
    },

    /// The device did not report a required output signal
    #[error("Signal '{signal}' missing from observed outputs")]
    MissingSignal {
        /// Signal name
        signal: String,
    },

    /// Width or shape configuration rejected
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected
        reason: String,
    },

    /// I/O error while reading or writing configuration
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed
    #[error("Config parse error: {source}")]
    ConfigParse {
        /// Underlying TOML error
        #[from]
        source: toml::de::Error,
    },

    /// Configuration could not be serialized
    #[error("Config write error: {source}")]
    ConfigWrite {
        /// Underlying TOML error
        #[from]
        source: toml::ser::Error,
    },
}

impl OracleError {
    /// Create a length mismatch error
    pub fn length_mismatch(what: &'static str, given: usize, expected: usize) -> Self {
        Self::LengthMismatch {
            what,
            given,
            expected,
        }
    }

    /// Create an out of range error
    pub fn out_of_range(what: &'static str, value: i128, width: u32) -> Self {
        Self::OutOfRange { what, value, width }
    }

    /// Create a missing signal error
    pub fn missing_signal(signal: impl Into<String>) -> Self {
        Self::MissingSignal {
            signal: signal.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// True for cycle-accuracy failures, as opposed to misuse of the API
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::Mismatch { .. })
    }
}
