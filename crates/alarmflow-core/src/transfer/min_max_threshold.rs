//! Min/max threshold transfer function.
//!
//! Raises an alarm when its single numeric input leaves the nominal
//! range, with hysteresis: the alarm activates at `highOn`/`lowOn` and
//! only deactivates once the value comes back past `highOff`/`lowOff`.
//! The same alarm fires for both too-high and too-low; deployments that
//! need to tell the two apart configure two elements on the same input.

use fxhash::FxHashMap;

use alarmflow_types::{IasValue, IasValueType, Payload, Priority};

use super::{TransferError, TransferFunction, TransferResult, TransferSetup};

/// Property naming the activation threshold of the high alarm.
pub const HIGH_ON_PROP: &str = "highOn";
/// Property naming the deactivation threshold of the high alarm.
pub const HIGH_OFF_PROP: &str = "highOff";
/// Property naming the deactivation threshold of the low alarm.
pub const LOW_OFF_PROP: &str = "lowOff";
/// Property naming the activation threshold of the low alarm.
pub const LOW_ON_PROP: &str = "lowOn";
/// Property naming the priority of the raised alarm.
pub const PRIORITY_PROP: &str = "alarmPriority";

/// Property recording the numeric value that produced the output.
pub const ACTUAL_VALUE_PROP: &str = "actualValue";

/// Threshold function with hysteresis over one numeric input.
#[derive(Debug)]
pub struct MinMaxThresholdTf {
    high_on: f64,
    high_off: f64,
    low_off: f64,
    low_on: f64,
    priority: Priority,
}

impl MinMaxThresholdTf {
    /// A function with unset thresholds (nothing triggers) and the
    /// default priority; `initialize` loads the configured values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            high_on: f64::MAX,
            high_off: f64::MAX,
            low_off: f64::MIN,
            low_on: f64::MIN,
            priority: Priority::default_set(),
        }
    }
}

impl Default for MinMaxThresholdTf {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferFunction for MinMaxThresholdTf {
    fn initialize(&mut self, setup: &TransferSetup) -> Result<(), TransferError> {
        self.high_on = setup.props.get_parsed_or(HIGH_ON_PROP, f64::MAX)?;
        self.high_off = setup.props.get_parsed_or(HIGH_OFF_PROP, f64::MAX)?;
        self.low_off = setup.props.get_parsed_or(LOW_OFF_PROP, f64::MIN)?;
        self.low_on = setup.props.get_parsed_or(LOW_ON_PROP, f64::MIN)?;
        if let Some(raw) = setup.props.get(PRIORITY_PROP) {
            self.priority =
                Priority::parse(raw).ok_or_else(|| TransferError::InvalidProperty {
                    name: PRIORITY_PROP.to_string(),
                    value: raw.to_string(),
                    reason: "not an alarm priority".to_string(),
                })?;
        }

        if self.high_on < self.high_off {
            return Err(TransferError::PropsMisconfigured(format!(
                "{HIGH_ON_PROP} ({}) < {HIGH_OFF_PROP} ({})",
                self.high_on, self.high_off
            )));
        }
        if self.low_off < self.low_on {
            return Err(TransferError::PropsMisconfigured(format!(
                "{LOW_OFF_PROP} ({}) < {LOW_ON_PROP} ({})",
                self.low_off, self.low_on
            )));
        }
        if self.low_off > self.high_off {
            return Err(TransferError::PropsMisconfigured(format!(
                "{LOW_OFF_PROP} ({}) > {HIGH_OFF_PROP} ({})",
                self.low_off, self.high_off
            )));
        }
        Ok(())
    }

    fn eval(
        &mut self,
        inputs: &FxHashMap<String, IasValue>,
        prior_output: &IasValue,
    ) -> Result<TransferResult, TransferError> {
        if inputs.len() != 1 {
            return Err(TransferError::UnexpectedNumberOfInputs {
                got: inputs.len(),
                expected: 1,
            });
        }
        if prior_output.value_type != IasValueType::Alarm {
            return Err(TransferError::TypeMismatch(
                prior_output.full_running_id.clone(),
            ));
        }
        let input = inputs.values().next().expect("exactly one input");
        let value = input
            .payload
            .as_f64()
            .ok_or_else(|| TransferError::TypeMismatch(input.full_running_id.clone()))?;

        let was_set = prior_output
            .payload
            .as_alarm()
            .is_some_and(Priority::is_set);
        let set = value >= self.high_on
            || value <= self.low_on
            || was_set && (value >= self.high_off || value <= self.low_off);

        let payload = if set {
            Payload::Alarm(self.priority)
        } else {
            Payload::Alarm(Priority::Cleared)
        };

        let mut props = prior_output.props.clone().unwrap_or_default();
        props.insert(ACTUAL_VALUE_PROP.to_string(), value.to_string());

        let value = prior_output
            .clone()
            .with_payload(payload)?
            .with_mode(input.mode)
            .with_props(props);
        Ok(TransferResult::new(value))
    }

    fn shutdown(&mut self) {}
}
