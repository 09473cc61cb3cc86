//! In-memory working copy of a value inside a computing element.
//!
//! An [`InOut`] is either an *input* (fed from the bus) or an *output*
//! (fed from the transfer function). The role is identified by which of
//! the two validity fields is populated: inputs carry a *from-bus*
//! validity observed when the value was merged, outputs carry a
//! *from-inputs* validity computed from the contributing inputs. The two
//! are mutually exclusive by construction, so no separate role flag
//! exists.

use crate::identifier::Identifier;
use crate::validity::{TimedValidity, Validity};
use crate::value::{IasValue, IasValueType, Payload, ValueError};
use crate::OperationalMode;

/// The role-discriminating validity of an [`InOut`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoleValidity {
    /// The validity read from the bus, with its observation instant.
    FromBus(TimedValidity),
    /// The validity computed from the inputs of the owning element.
    FromInputs(Validity),
}

/// Working copy of a value owned by a computing element.
#[derive(Debug, Clone)]
pub struct InOut {
    identifier: Identifier,
    value_type: IasValueType,
    validity: RoleValidity,
    /// The last full record merged from the bus (inputs) or assembled
    /// by an evaluation (outputs). `None` until the first merge/eval.
    value: Option<IasValue>,
}

impl InOut {
    /// A fresh input, unreliable until the first bus value arrives.
    #[must_use]
    pub fn input(identifier: Identifier, value_type: IasValueType) -> Self {
        Self {
            identifier,
            value_type,
            validity: RoleValidity::FromBus(TimedValidity::new(Validity::Unreliable, 0)),
            value: None,
        }
    }

    /// A fresh output, unreliable until the first evaluation.
    #[must_use]
    pub fn output(identifier: Identifier, value_type: IasValueType) -> Self {
        Self {
            identifier,
            value_type,
            validity: RoleValidity::FromInputs(Validity::Unreliable),
            value: None,
        }
    }

    /// `true` when this is an input (from-bus validity populated).
    #[must_use]
    pub fn is_input(&self) -> bool {
        matches!(self.validity, RoleValidity::FromBus(_))
    }

    /// `true` when this is an output (from-inputs validity populated).
    #[must_use]
    pub fn is_output(&self) -> bool {
        matches!(self.validity, RoleValidity::FromInputs(_))
    }

    /// The identifier of the underlying IASIO.
    #[must_use]
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// The declared type tag.
    #[must_use]
    pub fn value_type(&self) -> IasValueType {
        self.value_type
    }

    /// `true` once a payload has been merged or produced.
    #[must_use]
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// The last merged or produced record.
    #[must_use]
    pub fn value(&self) -> Option<&IasValue> {
        self.value.as_ref()
    }

    /// The from-bus validity of an input, `None` on outputs.
    #[must_use]
    pub fn from_bus_validity(&self) -> Option<TimedValidity> {
        match self.validity {
            RoleValidity::FromBus(tv) => Some(tv),
            RoleValidity::FromInputs(_) => None,
        }
    }

    /// The from-inputs validity of an output, `None` on inputs.
    #[must_use]
    pub fn from_inputs_validity(&self) -> Option<Validity> {
        match self.validity {
            RoleValidity::FromBus(_) => None,
            RoleValidity::FromInputs(v) => Some(v),
        }
    }

    /// The production timestamp of the last merged/produced record.
    #[must_use]
    pub fn production_timestamp(&self) -> Option<u64> {
        self.value.as_ref().and_then(IasValue::production_timestamp)
    }

    /// Merges a bus value into an input, replacing payload, mode and
    /// validity. The observation instant of the new from-bus validity is
    /// `now_ms`.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::TypeMismatch`] when the value's tag differs
    /// from the declared one.
    pub fn update_from_value(&mut self, value: &IasValue, now_ms: u64) -> Result<(), ValueError> {
        if value.value_type != self.value_type {
            return Err(ValueError::TypeMismatch {
                expected: self.value_type,
                got: value.value_type,
            });
        }
        self.validity = RoleValidity::FromBus(TimedValidity::new(value.validity, now_ms));
        self.value = Some(value.clone());
        Ok(())
    }

    /// Replaces the output record after an evaluation and stores the
    /// validity computed from the inputs.
    pub fn update_output(&mut self, value: IasValue, from_inputs: Validity) {
        self.validity = RoleValidity::FromInputs(from_inputs);
        self.value = Some(value);
    }

    /// The record handed to the transfer function as the prior output:
    /// the last produced record, or a neutral one (default payload,
    /// unknown mode, unreliable) before the first evaluation.
    #[must_use]
    pub fn as_prior_output(&self) -> IasValue {
        self.value.clone().unwrap_or_else(|| {
            IasValue::new(
                self.identifier.full_running_id(),
                Payload::default_for(self.value_type),
                OperationalMode::Unknown,
                Validity::Unreliable,
            )
            .expect("identifier running ids are never empty")
        })
    }
}
