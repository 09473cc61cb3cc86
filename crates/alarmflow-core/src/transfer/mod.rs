//! Transfer function abstraction.
//!
//! A transfer function is the user-supplied computation hosted by a
//! computing element: given the current inputs and the prior output it
//! produces the next output. Implementations are synchronous and run on
//! the owning DASU's serialization task; they signal failure by
//! returning an error, never by unwinding.
//!
//! Functions are instantiated through the [`TransferFunctionRegistry`]:
//! the configuration references registered factory names, and an unknown
//! name is a configuration error caught when the DASU is built.

mod min_max_threshold;
mod multiplicity;
mod registry;

pub use min_max_threshold::MinMaxThresholdTf;
pub use multiplicity::MultiplicityTf;
pub use registry::{TransferFactory, TransferFunctionRegistry};

use fxhash::{FxHashMap, FxHashSet};

use alarmflow_types::value::ValueError;
use alarmflow_types::IasValue;

/// Errors raised by transfer functions.
///
/// The owning computing element interprets every variant the same way:
/// the function is broken and will not be executed again.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// A required configuration property is missing.
    #[error("missing property: {0}")]
    MissingProperty(String),

    /// A configuration property does not parse or is out of range.
    #[error("invalid property '{name}' = '{value}': {reason}")]
    InvalidProperty {
        /// Property name.
        name: String,
        /// Rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The set of properties is incoherent (e.g. crossed thresholds).
    #[error("misconfigured properties: {0}")]
    PropsMisconfigured(String),

    /// The function received a different number of inputs than it
    /// supports.
    #[error("unexpected number of inputs: got {got}, expected {expected}")]
    UnexpectedNumberOfInputs {
        /// How many inputs arrived.
        got: usize,
        /// How many the function supports.
        expected: usize,
    },

    /// An input or the output has a type the function cannot work with.
    #[error("type mismatch on '{0}'")]
    TypeMismatch(String),

    /// A value operation failed while assembling the output.
    #[error(transparent)]
    Value(#[from] ValueError),

    /// Initialization failed for a function-specific reason.
    #[error("initialization failed: {0}")]
    InitFailed(String),

    /// Evaluation failed for a function-specific reason.
    #[error("evaluation failed: {0}")]
    EvalFailed(String),

    /// No factory is registered under the requested name.
    #[error("unknown transfer function: {0}")]
    UnknownFunction(String),
}

/// String properties handed to a transfer function, with typed access.
#[derive(Debug, Clone, Default)]
pub struct PropertyBag {
    properties: FxHashMap<String, String>,
}

impl PropertyBag {
    /// An empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A bag from `(name, value)` pairs; later pairs win.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            properties: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Sets a property.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Gets a property.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Gets a required property.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::MissingProperty`] when absent.
    pub fn require(&self, name: &str) -> Result<&str, TransferError> {
        self.get(name)
            .ok_or_else(|| TransferError::MissingProperty(name.to_string()))
    }

    /// Gets a property parsed as `T`, or `default` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidProperty`] when present but
    /// unparseable.
    pub fn get_parsed_or<T: std::str::FromStr>(
        &self,
        name: &str,
        default: T,
    ) -> Result<T, TransferError>
    where
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e| TransferError::InvalidProperty {
                name: name.to_string(),
                value: raw.to_string(),
                reason: format!("{e}"),
            }),
        }
    }

    /// Gets a required property parsed as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::MissingProperty`] when absent and
    /// [`TransferError::InvalidProperty`] when unparseable.
    pub fn require_parsed<T: std::str::FromStr>(&self, name: &str) -> Result<T, TransferError>
    where
        T::Err: std::fmt::Display,
    {
        let raw = self.require(name)?;
        raw.parse().map_err(|e| TransferError::InvalidProperty {
            name: name.to_string(),
            value: raw.to_string(),
            reason: format!("{e}"),
        })
    }
}

/// Everything a transfer function learns at initialization time.
#[derive(Debug, Clone)]
pub struct TransferSetup {
    /// Id of the owning computing element.
    pub asce_id: String,
    /// Running id of the owning computing element.
    pub asce_running_id: String,
    /// The age threshold the owning element applies to input validity,
    /// milliseconds.
    pub validity_time_frame_ms: u64,
    /// Configuration properties.
    pub props: PropertyBag,
    /// Instance number when the owning element comes from a template.
    pub template_instance: Option<usize>,
}

/// The outcome of one evaluation.
#[derive(Debug, Clone)]
pub struct TransferResult {
    /// The produced output value.
    pub value: IasValue,
    /// When set and non-empty, only these input ids determine the
    /// output's validity; the owning element fails if any id is not one
    /// of its inputs.
    pub validity_constraint: Option<FxHashSet<String>>,
}

impl TransferResult {
    /// A result whose validity depends on every input.
    #[must_use]
    pub fn new(value: IasValue) -> Self {
        Self {
            value,
            validity_constraint: None,
        }
    }

    /// Restricts the validity computation to the given input ids.
    #[must_use]
    pub fn with_validity_constraint(mut self, ids: FxHashSet<String>) -> Self {
        self.validity_constraint = if ids.is_empty() { None } else { Some(ids) };
        self
    }
}

/// A user-supplied computation hosted by a computing element.
///
/// All three hooks run on the owning DASU's serialization task.
/// `initialize` may allocate resources; `eval` must be pure with respect
/// to element state; `shutdown` must be fast and idempotent.
pub trait TransferFunction: Send {
    /// Called once before the first evaluation.
    ///
    /// # Errors
    ///
    /// A failure makes the owning element broken: `eval` is never
    /// called.
    fn initialize(&mut self, setup: &TransferSetup) -> Result<(), TransferError>;

    /// Computes the next output from the inputs and the prior output.
    ///
    /// `inputs` maps plain input ids to their latest values; every
    /// accepted input is present by the time this is called.
    ///
    /// # Errors
    ///
    /// A failure makes the owning element broken: the prior output is
    /// kept and `eval` is never called again.
    fn eval(
        &mut self,
        inputs: &FxHashMap<String, IasValue>,
        prior_output: &IasValue,
    ) -> Result<TransferResult, TransferError>;

    /// Called once at shutdown. Idempotent.
    fn shutdown(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_bag_typed_access() {
        let bag = PropertyBag::from_pairs([("threshold", "3"), ("bad", "x")]);
        assert_eq!(bag.require_parsed::<usize>("threshold").unwrap(), 3);
        assert_eq!(bag.get_parsed_or("absent", 7usize).unwrap(), 7);
        assert!(matches!(
            bag.require_parsed::<usize>("bad"),
            Err(TransferError::InvalidProperty { .. })
        ));
        assert!(matches!(
            bag.require("missing"),
            Err(TransferError::MissingProperty(_))
        ));
    }

    #[test]
    fn test_empty_validity_constraint_means_all_inputs() {
        let value = alarmflow_types::IasValue::new(
            "Out",
            alarmflow_types::Payload::Long(1),
            alarmflow_types::OperationalMode::Operational,
            alarmflow_types::Validity::Reliable,
        )
        .unwrap();
        let result =
            TransferResult::new(value).with_validity_constraint(FxHashSet::default());
        assert!(result.validity_constraint.is_none());
    }
}
