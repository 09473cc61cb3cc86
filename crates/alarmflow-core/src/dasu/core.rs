//! Synchronous state of a distributed unit.
//!
//! [`DasuCore`] owns the computing elements, the topology, the
//! pending-input buffer and the last-published memo. It has no notion of
//! tasks or timers: the actor in the parent module drives it, and tests
//! drive it directly with explicit clocks.

use std::collections::BTreeSet;
use std::sync::Arc;

use fxhash::FxHashMap;
use tracing::{debug, error, info};

use alarmflow_cdb::DasuDefinition;
use alarmflow_types::{
    IasValue, Identifier, IdentifierKind, InOut, Validity,
};

use crate::asce::{AsceState, ComputingElement};
use crate::topology::{AsceTopoEntry, AsceTopology};
use crate::transfer::TransferFunctionRegistry;
use crate::PropertyBag;

use super::DasuError;

/// The computing elements and buffers of one DASU.
#[derive(Debug)]
pub struct DasuCore {
    identifier: Identifier,
    topology: AsceTopology,
    asces: FxHashMap<String, ComputingElement>,
    /// Latest value per input id, coalesced until the next propagation.
    pending: FxHashMap<String, IasValue>,
    /// Plain input id -> full running id, for dependents reporting.
    contributors: FxHashMap<String, String>,
    last_published: Option<IasValue>,
    /// Age threshold of the published output: refresh period plus
    /// tolerance, milliseconds.
    validity_threshold_ms: u64,
}

impl DasuCore {
    /// Builds the topology and every computing element of a DASU and
    /// initializes their transfer functions.
    ///
    /// # Errors
    ///
    /// Returns a [`DasuError`] on an invalid topology, an unknown
    /// transfer function name, an invalid identifier chain, or a
    /// function whose initialization failed.
    pub fn new(
        identifier: Identifier,
        definition: &DasuDefinition,
        registry: &TransferFunctionRegistry,
        validity_threshold_ms: u64,
    ) -> Result<Self, DasuError> {
        let entries: Vec<AsceTopoEntry> = definition
            .asces
            .iter()
            .map(|a| AsceTopoEntry {
                asce_id: a.id.clone(),
                input_ids: a.inputs.iter().map(|i| i.id.clone()).collect(),
                output_id: a.output.id.clone(),
            })
            .collect();
        let topology = AsceTopology::new(&entries, &definition.output_id)?;
        info!(dasu = %identifier, "{topology}");

        let dasu_ident = Arc::new(identifier.clone());
        let mut asces = FxHashMap::default();
        for def in &definition.asces {
            let asce_ident = Identifier::new(
                def.id.clone(),
                IdentifierKind::Asce,
                Some(Arc::clone(&dasu_ident)),
            )?;
            let output_ident = Identifier::new(
                def.output.id.clone(),
                IdentifierKind::Iasio,
                Some(Arc::new(asce_ident.clone())),
            )?;
            let output = InOut::output(output_ident, def.output.ias_type);
            let inputs = def
                .inputs
                .iter()
                .map(|i| {
                    Identifier::new(i.id.clone(), IdentifierKind::Iasio, None)
                        .map(|ident| InOut::input(ident, i.ias_type))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let tf = registry.create(&def.function)?;
            let props =
                PropertyBag::from_pairs(def.props.iter().map(|p| (&*p.name, &*p.value)));
            let element = ComputingElement::new(
                asce_ident,
                output,
                inputs,
                tf,
                validity_threshold_ms,
                props,
                def.template_instance,
            )?;
            asces.insert(def.id.clone(), element);
        }

        let mut core = Self {
            identifier,
            topology,
            asces,
            pending: FxHashMap::default(),
            contributors: FxHashMap::default(),
            last_published: None,
            validity_threshold_ms,
        };
        core.initialize_asces()?;
        Ok(core)
    }

    /// Initializes every transfer function; building the DASU fails if
    /// any element ends up broken.
    fn initialize_asces(&mut self) -> Result<(), DasuError> {
        for (id, element) in &mut self.asces {
            if element.initialize() == AsceState::TfBroken {
                return Err(DasuError::TransferFunctionInit {
                    asce_id: id.clone(),
                });
            }
        }
        Ok(())
    }

    /// The DASU identifier.
    #[must_use]
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// The external input ids of the DASU.
    #[must_use]
    pub fn dasu_inputs(&self) -> fxhash::FxHashSet<String> {
        self.topology.dasu_inputs().clone()
    }

    /// The last value this DASU published.
    #[must_use]
    pub fn last_published(&self) -> Option<&IasValue> {
        self.last_published.as_ref()
    }

    /// `true` when inputs are buffered and waiting for a propagation.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Coalesces a batch into the pending buffer, keeping only ids the
    /// topology consumes and only the latest value per id. Returns how
    /// many values were accepted.
    pub fn buffer_inputs(&mut self, values: Vec<IasValue>) -> usize {
        let mut accepted = 0;
        for value in values {
            let id = value.id().to_string();
            if !self.topology.dasu_inputs().contains(&id) {
                debug!(dasu = %self.identifier, id = %id, "ignoring foreign input");
                continue;
            }
            self.contributors
                .insert(id.clone(), value.full_running_id.clone());
            self.pending.insert(id, value);
            accepted += 1;
        }
        accepted
    }

    /// Drains the buffer, propagates through the topology levels and
    /// returns the output to publish, or `None` when nothing changed.
    ///
    /// Returns `(publish_candidate, drained_inputs)`.
    pub fn process(&mut self, now_ms: u64) -> (Option<IasValue>, usize) {
        let drained = std::mem::take(&mut self.pending);
        if drained.is_empty() {
            return (None, 0);
        }
        let drained_ids: Vec<String> = drained.keys().cloned().collect();
        let mut flowing = drained;

        // Fold over the levels: each element sees the subset of the
        // accumulated values matching its accepted inputs, and its
        // output joins the accumulator for the levels below.
        for level in self.topology.levels() {
            for asce_id in level {
                let Some(element) = self.asces.get_mut(asce_id) else {
                    continue;
                };
                let subset: Vec<IasValue> = element
                    .accepted_input_ids()
                    .filter_map(|id| flowing.get(id).cloned())
                    .collect();
                if subset.is_empty() {
                    continue;
                }
                match element.update(&subset, now_ms) {
                    Ok((Some(output), _state)) => {
                        flowing.insert(output.id().to_string(), output);
                    }
                    Ok((None, state)) => {
                        debug!(asce = %asce_id, ?state, "no output yet");
                    }
                    Err(e) => {
                        // Per-element errors stay isolated: the rest of
                        // the graph keeps evaluating.
                        error!(dasu = %self.identifier, asce = %asce_id, error = %e, "update failed");
                    }
                }
            }
        }

        let Some(output) = flowing.remove(self.topology.output_id()) else {
            return (None, drained_ids.len());
        };

        let dependents: BTreeSet<String> = drained_ids
            .iter()
            .filter_map(|id| self.contributors.get(id))
            .cloned()
            .collect();
        let candidate = match self.finish_output(output, dependents, now_ms) {
            Ok(v) => v,
            Err(e) => {
                error!(dasu = %self.identifier, error = %e, "cannot stamp output");
                return (None, drained_ids.len());
            }
        };

        if self.changed_since_last_publish(&candidate) {
            self.last_published = Some(candidate.clone());
            (Some(candidate), drained_ids.len())
        } else {
            debug!(dasu = %self.identifier, "output unchanged, not publishing");
            (None, drained_ids.len())
        }
    }

    /// Recomputes the validity of the last output by age and returns it
    /// for unconditional re-publication, stamped with a fresh
    /// production instant. `None` when the DASU never produced.
    pub fn refresh(&mut self, now_ms: u64) -> Option<IasValue> {
        self.last_published.as_ref()?;
        let terminal = self
            .topology
            .asce_producing_output(self.topology.output_id())?;
        let current = self
            .asces
            .get(terminal)
            .and_then(ComputingElement::output)
            .cloned()
            .or_else(|| self.last_published.clone())?;

        let dependents = self
            .last_published
            .as_ref()
            .and_then(|v| v.dependents.clone())
            .unwrap_or_default();
        match self.finish_output(current, dependents, now_ms) {
            Ok(value) => {
                self.last_published = Some(value.clone());
                Some(value)
            }
            Err(e) => {
                error!(dasu = %self.identifier, error = %e, "cannot stamp refresh");
                None
            }
        }
    }

    /// Applies the DASU-level validity age rule, attaches dependents
    /// and stamps the production instant.
    fn finish_output(
        &self,
        output: IasValue,
        dependents: BTreeSet<String>,
        now_ms: u64,
    ) -> Result<IasValue, alarmflow_types::value::ValueError> {
        let produced_at = output.dasu_production.unwrap_or(now_ms);
        let age_validity = if now_ms.saturating_sub(produced_at) > self.validity_threshold_ms {
            Validity::Unreliable
        } else {
            Validity::Reliable
        };
        let validity = age_validity.min(output.validity);
        let mut value = output
            .with_validity(validity)
            .with_dependents(dependents);
        value.dasu_production = None;
        value.with_dasu_production(now_ms)
    }

    /// A candidate is published only when something observable changed.
    fn changed_since_last_publish(&self, candidate: &IasValue) -> bool {
        match &self.last_published {
            None => true,
            Some(last) => {
                last.payload != candidate.payload
                    || last.mode != candidate.mode
                    || last.validity != candidate.validity
                    || last.props != candidate.props
                    || last.dependents != candidate.dependents
            }
        }
    }

    /// Shuts every computing element down. Idempotent.
    pub fn shutdown(&mut self) {
        for element in self.asces.values_mut() {
            element.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alarmflow_cdb::{AsceDefinition, IasioConfig, Property};
    use alarmflow_types::{IasValueType, OperationalMode, Payload, Priority};

    const THRESHOLD_MS: u64 = 4_000;

    fn iasio(id: &str, ias_type: IasValueType) -> IasioConfig {
        IasioConfig {
            id: id.to_string(),
            ias_type,
            template_id: None,
        }
    }

    fn threshold_definition() -> DasuDefinition {
        DasuDefinition {
            id: "TempDasu".to_string(),
            output_id: "TempAlarm".to_string(),
            asces: vec![AsceDefinition {
                id: "TempAsce".to_string(),
                function: "MinMaxThreshold".to_string(),
                output: iasio("TempAlarm", IasValueType::Alarm),
                inputs: vec![iasio("Temperature", IasValueType::Double)],
                props: vec![
                    Property { name: "highOn".into(), value: "50".into() },
                    Property { name: "highOff".into(), value: "25".into() },
                ],
                template_instance: None,
            }],
        }
    }

    fn core() -> DasuCore {
        let ident = Identifier::new("TempDasu", IdentifierKind::Dasu, None).unwrap();
        DasuCore::new(
            ident,
            &threshold_definition(),
            &TransferFunctionRegistry::with_defaults(),
            THRESHOLD_MS,
        )
        .unwrap()
    }

    fn temperature(v: f64, ts: u64) -> IasValue {
        IasValue::new(
            "(Conv:CONVERTER)@(Temperature:IASIO)",
            Payload::Double(v),
            OperationalMode::Operational,
            Validity::Reliable,
        )
        .unwrap()
        .with_plugin_production(ts)
        .unwrap()
    }

    #[test]
    fn test_unknown_function_fails_construction() {
        let mut definition = threshold_definition();
        definition.asces[0].function = "Mystery".to_string();
        let ident = Identifier::new("D", IdentifierKind::Dasu, None).unwrap();
        let err = DasuCore::new(
            ident,
            &definition,
            &TransferFunctionRegistry::with_defaults(),
            THRESHOLD_MS,
        )
        .unwrap_err();
        assert!(matches!(err, DasuError::Transfer(_)));
    }

    #[test]
    fn test_broken_init_fails_construction() {
        let mut definition = threshold_definition();
        // highOn < highOff breaks MinMaxThreshold initialization.
        definition.asces[0].props = vec![
            Property { name: "highOn".into(), value: "10".into() },
            Property { name: "highOff".into(), value: "20".into() },
        ];
        let ident = Identifier::new("D", IdentifierKind::Dasu, None).unwrap();
        let err = DasuCore::new(
            ident,
            &definition,
            &TransferFunctionRegistry::with_defaults(),
            THRESHOLD_MS,
        )
        .unwrap_err();
        assert!(matches!(err, DasuError::TransferFunctionInit { .. }));
    }

    #[test]
    fn test_first_batch_publishes_cleared_then_set() {
        let mut core = core();

        assert_eq!(core.buffer_inputs(vec![temperature(0.0, 1_000)]), 1);
        let (out, drained) = core.process(1_000);
        assert_eq!(drained, 1);
        let out = out.unwrap();
        assert_eq!(out.payload.as_alarm(), Some(Priority::Cleared));
        assert_eq!(out.validity, Validity::Reliable);
        assert_eq!(out.dasu_production, Some(1_000));
        assert!(out
            .dependents
            .as_ref()
            .unwrap()
            .contains("(Conv:CONVERTER)@(Temperature:IASIO)"));

        core.buffer_inputs(vec![temperature(100.0, 2_000)]);
        let (out, _) = core.process(2_000);
        assert_eq!(out.unwrap().payload.as_alarm(), Some(Priority::SetMedium));
    }

    #[test]
    fn test_unchanged_output_is_not_republished() {
        let mut core = core();
        core.buffer_inputs(vec![temperature(10.0, 1_000)]);
        assert!(core.process(1_000).0.is_some());

        // Same payload, same mode, same validity: no publish. The
        // actualValue property changes with the input, so feed the same
        // reading again.
        core.buffer_inputs(vec![temperature(10.0, 1_500)]);
        assert!(core.process(1_500).0.is_none());
    }

    #[test]
    fn test_foreign_inputs_are_filtered() {
        let mut core = core();
        let foreign = IasValue::new(
            "Pressure",
            Payload::Double(1.0),
            OperationalMode::Operational,
            Validity::Reliable,
        )
        .unwrap();
        assert_eq!(core.buffer_inputs(vec![foreign]), 0);
        assert!(!core.has_pending());
        assert_eq!(core.process(0), (None, 0));
    }

    #[test]
    fn test_coalescing_keeps_the_latest_value() {
        let mut core = core();
        core.buffer_inputs(vec![temperature(0.0, 1_000)]);
        core.buffer_inputs(vec![temperature(100.0, 1_100)]);
        let (out, drained) = core.process(1_100);
        assert_eq!(drained, 1, "two values for one id coalesce");
        assert_eq!(out.unwrap().payload.as_alarm(), Some(Priority::SetMedium));
    }

    #[test]
    fn test_refresh_before_first_output_does_nothing() {
        let mut core = core();
        assert!(core.refresh(1_000).is_none());
    }

    #[test]
    fn test_refresh_republishes_with_fresh_stamp_and_aged_validity() {
        let mut core = core();
        core.buffer_inputs(vec![temperature(10.0, 1_000)]);
        core.process(1_000);

        // Within the threshold: reliable, fresh stamp.
        let refreshed = core.refresh(2_000).unwrap();
        assert_eq!(refreshed.payload.as_alarm(), Some(Priority::Cleared));
        assert_eq!(refreshed.dasu_production, Some(2_000));
        assert_eq!(refreshed.validity, Validity::Reliable);

        // Past the threshold measured from the last evaluation (1000):
        // unreliable, even though the tag was reliable.
        let refreshed = core.refresh(1_000 + THRESHOLD_MS + 500).unwrap();
        assert_eq!(refreshed.validity, Validity::Unreliable);
        assert_eq!(refreshed.payload.as_alarm(), Some(Priority::Cleared));
    }
}
