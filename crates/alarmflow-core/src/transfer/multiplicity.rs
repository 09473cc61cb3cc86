//! Multiplicity transfer function.
//!
//! Counts how many of its alarm inputs are set and raises its own alarm
//! when the count reaches a configured threshold. Typical use: "alert
//! when at least N pumps of the farm are failing".

use fxhash::FxHashMap;

use alarmflow_types::{IasValue, IasValueType, OperationalMode, Payload, Priority};

use super::min_max_threshold::ACTUAL_VALUE_PROP;
use super::{TransferError, TransferFunction, TransferResult, TransferSetup};

/// Property naming the minimum number of set inputs that raises the
/// alarm.
pub const THRESHOLD_PROP: &str = "threshold";
/// Property naming the priority of the raised alarm.
pub const PRIORITY_PROP: &str = "alarmPriority";

/// Alarm-counting function over any number of alarm inputs.
#[derive(Debug)]
pub struct MultiplicityTf {
    threshold: usize,
    priority: Priority,
}

impl MultiplicityTf {
    /// A function with threshold 1 and the default priority;
    /// `initialize` loads the configured values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            threshold: 1,
            priority: Priority::default_set(),
        }
    }
}

impl Default for MultiplicityTf {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferFunction for MultiplicityTf {
    fn initialize(&mut self, setup: &TransferSetup) -> Result<(), TransferError> {
        self.threshold = setup.props.require_parsed(THRESHOLD_PROP)?;
        if self.threshold < 1 {
            return Err(TransferError::InvalidProperty {
                name: THRESHOLD_PROP.to_string(),
                value: self.threshold.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(raw) = setup.props.get(PRIORITY_PROP) {
            self.priority =
                Priority::parse(raw).ok_or_else(|| TransferError::InvalidProperty {
                    name: PRIORITY_PROP.to_string(),
                    value: raw.to_string(),
                    reason: "not an alarm priority".to_string(),
                })?;
        }
        Ok(())
    }

    fn eval(
        &mut self,
        inputs: &FxHashMap<String, IasValue>,
        prior_output: &IasValue,
    ) -> Result<TransferResult, TransferError> {
        if prior_output.value_type != IasValueType::Alarm {
            return Err(TransferError::TypeMismatch(
                prior_output.full_running_id.clone(),
            ));
        }

        let mut set_count = 0usize;
        let mut modes: Vec<OperationalMode> = Vec::with_capacity(inputs.len());
        for input in inputs.values() {
            let alarm = input
                .payload
                .as_alarm()
                .ok_or_else(|| TransferError::TypeMismatch(input.full_running_id.clone()))?;
            if alarm.is_set() {
                set_count += 1;
            }
            modes.push(input.mode);
        }

        let payload = if set_count >= self.threshold {
            Payload::Alarm(self.priority)
        } else {
            Payload::Alarm(Priority::Cleared)
        };

        // The output mode is the unanimous input mode, unknown otherwise.
        let mode = match modes.split_first() {
            Some((first, rest)) if rest.iter().all(|m| m == first) => *first,
            _ => OperationalMode::Unknown,
        };

        let mut props = prior_output.props.clone().unwrap_or_default();
        props.insert(ACTUAL_VALUE_PROP.to_string(), set_count.to_string());

        let value = prior_output
            .clone()
            .with_payload(payload)?
            .with_mode(mode)
            .with_props(props);
        Ok(TransferResult::new(value))
    }

    fn shutdown(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use alarmflow_types::Validity;

    fn setup(threshold: &str) -> TransferSetup {
        TransferSetup {
            asce_id: "Mult".to_string(),
            asce_running_id: "D:Mult".to_string(),
            validity_time_frame_ms: 4_000,
            props: super::super::PropertyBag::from_pairs([(THRESHOLD_PROP, threshold)]),
            template_instance: None,
        }
    }

    fn initialized(threshold: &str) -> MultiplicityTf {
        let mut tf = MultiplicityTf::new();
        tf.initialize(&setup(threshold)).unwrap();
        tf
    }

    fn alarms(states: &[Priority]) -> FxHashMap<String, IasValue> {
        states
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let id = format!("In{i}");
                let v = IasValue::new(
                    id.clone(),
                    Payload::Alarm(*p),
                    OperationalMode::Operational,
                    Validity::Reliable,
                )
                .unwrap();
                (id, v)
            })
            .collect()
    }

    fn prior() -> IasValue {
        IasValue::new(
            "Out",
            Payload::Alarm(Priority::Cleared),
            OperationalMode::Operational,
            Validity::Reliable,
        )
        .unwrap()
    }

    #[test]
    fn test_threshold_is_required_and_positive() {
        let mut tf = MultiplicityTf::new();
        assert!(matches!(
            tf.initialize(&TransferSetup {
                props: super::super::PropertyBag::new(),
                ..setup("1")
            }),
            Err(TransferError::MissingProperty(_))
        ));
        let mut tf = MultiplicityTf::new();
        assert!(matches!(
            tf.initialize(&setup("0")),
            Err(TransferError::InvalidProperty { .. })
        ));
    }

    #[test]
    fn test_below_threshold_is_cleared() {
        let mut tf = initialized("3");
        let inputs = alarms(&[Priority::Cleared, Priority::Cleared, Priority::SetMedium]);
        let result = tf.eval(&inputs, &prior()).unwrap();
        assert_eq!(result.value.payload.as_alarm(), Some(Priority::Cleared));
        assert_eq!(result.value.props.as_ref().unwrap()[ACTUAL_VALUE_PROP], "1");
    }

    #[test]
    fn test_at_threshold_is_set() {
        let mut tf = initialized("3");
        let inputs = alarms(&[
            Priority::SetMedium,
            Priority::SetHigh,
            Priority::SetLow,
            Priority::Cleared,
            Priority::SetCritical,
        ]);
        let result = tf.eval(&inputs, &prior()).unwrap();
        assert_eq!(result.value.payload.as_alarm(), Some(Priority::SetMedium));
        assert_eq!(result.value.props.as_ref().unwrap()[ACTUAL_VALUE_PROP], "4");
    }

    #[test]
    fn test_rejects_non_alarm_input() {
        let mut tf = initialized("1");
        let mut inputs = alarms(&[Priority::SetLow]);
        inputs.insert(
            "Num".to_string(),
            IasValue::new("Num", Payload::Long(1), OperationalMode::Operational, Validity::Reliable)
                .unwrap(),
        );
        assert!(matches!(
            tf.eval(&inputs, &prior()),
            Err(TransferError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_mixed_modes_yield_unknown() {
        let mut tf = initialized("1");
        let mut inputs = alarms(&[Priority::SetLow, Priority::SetLow]);
        if let Some(v) = inputs.get_mut("In1") {
            *v = v.clone().with_mode(OperationalMode::Maintenance);
        }
        let result = tf.eval(&inputs, &prior()).unwrap();
        assert_eq!(result.value.mode, OperationalMode::Unknown);
    }
}
