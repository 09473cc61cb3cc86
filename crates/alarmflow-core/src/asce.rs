//! The computing element (ASCE).
//!
//! A computing element binds one transfer function to one declared
//! output and a fixed set of accepted inputs, and tracks the health of
//! the function through a small state machine:
//!
//! ```text
//! Initializing ── init ok ──> InputsUndefined ── all inputs seen ──> Healthy
//!      │                                                              │  ↑
//!      └─ init failed ──> TfBroken <── sustained slowness ── Slow ────┘  │
//!                             ↑            (per-evaluation timing) ──────┘
//!                             └─ eval failed / bad validity constraint
//! any ──> Closing ──> Closed on shutdown
//! ```
//!
//! `TfBroken` is terminal for evaluation: the function is never executed
//! again, but the element keeps forwarding its last output so the
//! downstream validity age rule can degrade it honestly.

use std::fmt;
use std::time::Instant;

use fxhash::FxHashMap;
use tracing::{debug, error, warn};

use alarmflow_types::value::ValueError;
use alarmflow_types::{IasValue, Identifier, InOut, Validity};

use crate::transfer::{TransferFunction, TransferSetup};
use crate::PropertyBag;

/// Property overriding the per-evaluation time budget, milliseconds.
pub const MAX_TF_TIME_PROP: &str = "tfMaxExecTimeMs";
/// Property overriding the sustained-slowness budget, milliseconds.
pub const MAX_SLOW_DURATION_PROP: &str = "tfMaxSlownessMs";

/// Default per-evaluation time budget.
const DEFAULT_MAX_TF_TIME_MS: u64 = 1_000;
/// Default sustained-slowness budget.
const DEFAULT_MAX_SLOW_DURATION_MS: u64 = 30_000;

/// Lifecycle state of a computing element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsceState {
    /// Built, transfer function not yet initialized.
    Initializing,
    /// Initialized; at least one accepted input has never arrived.
    InputsUndefined,
    /// Fully fed and evaluating on time.
    Healthy,
    /// Evaluating, but over the per-evaluation time budget.
    Slow,
    /// The transfer function failed or stayed slow too long; it is
    /// never executed again.
    TfBroken,
    /// Shutdown in progress.
    Closing,
    /// Shut down.
    Closed,
}

/// Errors raised by computing element construction and contract
/// violations.
#[derive(Debug, thiserror::Error)]
pub enum AsceError {
    /// Two initial inputs share the same id.
    #[error("duplicate input '{0}'")]
    DuplicateInput(String),

    /// An initial input is not in the input role, or the output is not
    /// in the output role.
    #[error("'{id}' is not an {expected}")]
    RoleMismatch {
        /// The offending IASIO id.
        id: String,
        /// The expected role.
        expected: &'static str,
    },

    /// An update carried a value whose id is not an accepted input.
    /// The DASU routes by topology, so this is a caller bug.
    #[error("'{asce_id}' received unexpected input '{input_id}'")]
    UnexpectedInput {
        /// The element that rejected the batch.
        asce_id: String,
        /// The stray id.
        input_id: String,
    },

    /// A value operation failed.
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// A computing element hosting one transfer function.
pub struct ComputingElement {
    identifier: Identifier,
    output: InOut,
    inputs: FxHashMap<String, InOut>,
    tf: Box<dyn TransferFunction>,
    setup: TransferSetup,
    validity_time_frame_ms: u64,
    max_tf_time_ms: u64,
    max_slow_duration_ms: u64,
    state: AsceState,
    slow_since: Option<Instant>,
    last_eval_duration_ms: Option<u64>,
}

impl fmt::Debug for ComputingElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputingElement")
            .field("identifier", &self.identifier)
            .field("output", &self.output)
            .field("inputs", &self.inputs)
            .field("setup", &self.setup)
            .field("validity_time_frame_ms", &self.validity_time_frame_ms)
            .field("max_tf_time_ms", &self.max_tf_time_ms)
            .field("max_slow_duration_ms", &self.max_slow_duration_ms)
            .field("state", &self.state)
            .field("slow_since", &self.slow_since)
            .field("last_eval_duration_ms", &self.last_eval_duration_ms)
            .finish()
    }
}

impl ComputingElement {
    /// Builds a computing element in the `Initializing` state.
    ///
    /// `validity_time_frame_ms` is the refresh period plus tolerance:
    /// inputs older than this are unreliable regardless of their tag.
    ///
    /// # Errors
    ///
    /// Returns [`AsceError::DuplicateInput`] when two inputs share an
    /// id and [`AsceError::RoleMismatch`] when an [`InOut`] is passed in
    /// the wrong role.
    pub fn new(
        identifier: Identifier,
        output: InOut,
        initial_inputs: Vec<InOut>,
        tf: Box<dyn TransferFunction>,
        validity_time_frame_ms: u64,
        props: PropertyBag,
        template_instance: Option<usize>,
    ) -> Result<Self, AsceError> {
        if !output.is_output() {
            return Err(AsceError::RoleMismatch {
                id: output.identifier().id().to_string(),
                expected: "output",
            });
        }
        let mut inputs = FxHashMap::default();
        for input in initial_inputs {
            if !input.is_input() {
                return Err(AsceError::RoleMismatch {
                    id: input.identifier().id().to_string(),
                    expected: "input",
                });
            }
            let id = input.identifier().id().to_string();
            if inputs.insert(id.clone(), input).is_some() {
                return Err(AsceError::DuplicateInput(id));
            }
        }

        let max_tf_time_ms = props
            .get_parsed_or(MAX_TF_TIME_PROP, DEFAULT_MAX_TF_TIME_MS)
            .unwrap_or(DEFAULT_MAX_TF_TIME_MS);
        let max_slow_duration_ms = props
            .get_parsed_or(MAX_SLOW_DURATION_PROP, DEFAULT_MAX_SLOW_DURATION_MS)
            .unwrap_or(DEFAULT_MAX_SLOW_DURATION_MS);
        let setup = TransferSetup {
            asce_id: identifier.id().to_string(),
            asce_running_id: identifier.running_id(),
            validity_time_frame_ms,
            props,
            template_instance,
        };

        Ok(Self {
            identifier,
            output,
            inputs,
            tf,
            setup,
            validity_time_frame_ms,
            max_tf_time_ms,
            max_slow_duration_ms,
            state: AsceState::Initializing,
            slow_since: None,
            last_eval_duration_ms: None,
        })
    }

    /// Initializes the transfer function; the element becomes
    /// `InputsUndefined` on success and `TfBroken` on failure.
    pub fn initialize(&mut self) -> AsceState {
        match self.tf.initialize(&self.setup) {
            Ok(()) => {
                debug!(asce = %self.identifier, "transfer function initialized");
                self.state = AsceState::InputsUndefined;
            }
            Err(e) => {
                error!(asce = %self.identifier, error = %e, "transfer function init failed");
                self.state = AsceState::TfBroken;
            }
        }
        self.state
    }

    /// Merges a batch of inputs and runs the transfer function when the
    /// element is fed and healthy.
    ///
    /// Returns the current output (absent only while inputs are still
    /// undefined) and the state after the update. Evaluation failures do
    /// not surface as `Err`: they break the element, which keeps
    /// forwarding its last output.
    ///
    /// # Errors
    ///
    /// Returns [`AsceError::UnexpectedInput`] when the batch carries an
    /// id outside the accepted set — a routing bug in the caller.
    pub fn update(
        &mut self,
        values: &[IasValue],
        now_ms: u64,
    ) -> Result<(Option<IasValue>, AsceState), AsceError> {
        for value in values {
            if !self.inputs.contains_key(value.id()) {
                return Err(AsceError::UnexpectedInput {
                    asce_id: self.identifier.id().to_string(),
                    input_id: value.id().to_string(),
                });
            }
        }
        for value in values {
            let slot = self
                .inputs
                .get_mut(value.id())
                .expect("checked just above");
            if let Err(e) = slot.update_from_value(value, now_ms) {
                // A payload not matching the declared type is a data
                // error, not a caller bug: the element breaks like on
                // any evaluation failure.
                error!(asce = %self.identifier, error = %e, "input type mismatch");
                self.state = AsceState::TfBroken;
                return Ok((self.output.value().cloned(), self.state));
            }
        }

        if self.state == AsceState::InputsUndefined
            && self.inputs.values().all(InOut::has_value)
        {
            debug!(asce = %self.identifier, "all inputs defined");
            self.state = AsceState::Healthy;
        }

        if matches!(self.state, AsceState::Healthy | AsceState::Slow) {
            self.run_transfer_function(now_ms);
        }

        Ok((self.output.value().cloned(), self.state))
    }

    fn run_transfer_function(&mut self, now_ms: u64) {
        let input_values: FxHashMap<String, IasValue> = self
            .inputs
            .iter()
            .filter_map(|(id, slot)| slot.value().map(|v| (id.clone(), v.clone())))
            .collect();
        let prior = self.output.as_prior_output();

        let started = Instant::now();
        let outcome = self.tf.eval(&input_values, &prior);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_eval_duration_ms = Some(elapsed_ms);

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                error!(asce = %self.identifier, error = %e, "transfer function failed");
                self.state = AsceState::TfBroken;
                return;
            }
        };

        // Timing health: late evaluations demote to Slow; staying slow
        // beyond the slowness budget breaks the element.
        if elapsed_ms > self.max_tf_time_ms {
            match self.slow_since {
                None => {
                    // First late evaluation: record when the slowness
                    // started.
                    self.slow_since = Some(started);
                    warn!(asce = %self.identifier, elapsed_ms, "slow transfer function");
                    self.state = AsceState::Slow;
                }
                Some(since) => {
                    let slow_for =
                        u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX);
                    if slow_for > self.max_slow_duration_ms {
                        warn!(
                            asce = %self.identifier,
                            slow_for_ms = slow_for,
                            "transfer function slow for too long"
                        );
                        self.state = AsceState::TfBroken;
                    } else {
                        warn!(asce = %self.identifier, elapsed_ms, "slow transfer function");
                        self.state = AsceState::Slow;
                    }
                }
            }
        } else {
            self.slow_since = None;
            self.state = AsceState::Healthy;
        }
        // Even when slowness just broke the element, the evaluation
        // itself succeeded: apply it so the last output reflects the
        // last run.

        // Validity of the output: the min over the considered inputs,
        // each first downgraded by the age rule.
        let considered: Vec<&str> = match &result.validity_constraint {
            Some(constraint) => {
                for id in constraint {
                    if !self.inputs.contains_key(id) {
                        error!(
                            asce = %self.identifier,
                            constraint = %id,
                            "validity constraint references an unknown input"
                        );
                        self.state = AsceState::TfBroken;
                        return;
                    }
                }
                constraint.iter().map(String::as_str).collect()
            }
            None => self.inputs.keys().map(String::as_str).collect(),
        };

        let validity = Validity::min_of(considered.iter().map(|id| {
            let slot = &self.inputs[*id];
            let timed = slot
                .from_bus_validity()
                .unwrap_or_else(|| alarmflow_types::TimedValidity::new(Validity::Unreliable, 0));
            let produced_at = slot.production_timestamp().unwrap_or(timed.observed_at);
            timed.aged(produced_at, now_ms, self.validity_time_frame_ms)
        }));

        match assemble_output(result.value, validity, now_ms) {
            Ok(value) => self.output.update_output(value, validity),
            Err(e) => {
                error!(asce = %self.identifier, error = %e, "cannot assemble output");
                self.state = AsceState::TfBroken;
            }
        }
    }

    /// Shuts the transfer function down; idempotent.
    pub fn shutdown(&mut self) {
        if matches!(self.state, AsceState::Closed) {
            return;
        }
        self.state = AsceState::Closing;
        self.tf.shutdown();
        self.state = AsceState::Closed;
    }

    /// The element identifier.
    #[must_use]
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> AsceState {
        self.state
    }

    /// The last produced output, if any evaluation succeeded.
    #[must_use]
    pub fn output(&self) -> Option<&IasValue> {
        self.output.value()
    }

    /// The working copy of the output, including its from-inputs
    /// validity.
    #[must_use]
    pub fn output_inout(&self) -> &InOut {
        &self.output
    }

    /// The accepted input ids.
    pub fn accepted_input_ids(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    /// Wall-clock duration of the last evaluation, milliseconds.
    #[must_use]
    pub fn last_eval_duration_ms(&self) -> Option<u64> {
        self.last_eval_duration_ms
    }
}

/// Stamps the DASU production instant and the computed validity on the
/// value returned by the transfer function.
fn assemble_output(
    value: IasValue,
    validity: Validity,
    now_ms: u64,
) -> Result<IasValue, ValueError> {
    let mut value = value.with_validity(validity);
    value.plugin_production = None;
    value.dasu_production = None;
    value.with_dasu_production(now_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use fxhash::FxHashSet;

    use alarmflow_types::{
        IasValueType, IdentifierKind, OperationalMode, Payload, Priority,
    };

    use crate::transfer::{TransferError, TransferResult};

    const TIME_FRAME_MS: u64 = 4_000;

    fn ident(id: &str, kind: IdentifierKind) -> Identifier {
        Identifier::new(id, kind, None).unwrap()
    }

    /// Transfer function double: counts calls, optionally fails,
    /// optionally sleeps, optionally constrains validity.
    struct ScriptedTf {
        evals: Arc<AtomicUsize>,
        fail_init: bool,
        fail_eval: bool,
        sleep: Option<Duration>,
        constraint: Option<FxHashSet<String>>,
    }

    impl ScriptedTf {
        fn ok(evals: &Arc<AtomicUsize>) -> Box<Self> {
            Box::new(Self {
                evals: Arc::clone(evals),
                fail_init: false,
                fail_eval: false,
                sleep: None,
                constraint: None,
            })
        }
    }

    impl TransferFunction for ScriptedTf {
        fn initialize(&mut self, _setup: &TransferSetup) -> Result<(), TransferError> {
            if self.fail_init {
                return Err(TransferError::InitFailed("scripted".into()));
            }
            Ok(())
        }

        fn eval(
            &mut self,
            inputs: &FxHashMap<String, IasValue>,
            prior_output: &IasValue,
        ) -> Result<TransferResult, TransferError> {
            self.evals.fetch_add(1, Ordering::SeqCst);
            if let Some(d) = self.sleep {
                std::thread::sleep(d);
            }
            if self.fail_eval {
                return Err(TransferError::EvalFailed("scripted".into()));
            }
            let set = inputs
                .values()
                .filter_map(|v| v.payload.as_f64())
                .any(|v| v >= 50.0);
            let payload = if set {
                Payload::Alarm(Priority::default_set())
            } else {
                Payload::Alarm(Priority::Cleared)
            };
            let mut result = TransferResult::new(prior_output.clone().with_payload(payload)?);
            if let Some(c) = &self.constraint {
                result = result.with_validity_constraint(c.clone());
            }
            Ok(result)
        }

        fn shutdown(&mut self) {}
    }

    fn element_with(tf: Box<dyn TransferFunction>, input_ids: &[&str]) -> ComputingElement {
        let inputs = input_ids
            .iter()
            .map(|id| InOut::input(ident(id, IdentifierKind::Iasio), IasValueType::Double))
            .collect();
        ComputingElement::new(
            ident("Asce", IdentifierKind::Asce),
            InOut::output(ident("Out", IdentifierKind::Iasio), IasValueType::Alarm),
            inputs,
            tf,
            TIME_FRAME_MS,
            PropertyBag::new(),
            None,
        )
        .unwrap()
    }

    fn double(id: &str, v: f64, produced_at: u64) -> IasValue {
        IasValue::new(
            id,
            Payload::Double(v),
            OperationalMode::Operational,
            Validity::Reliable,
        )
        .unwrap()
        .with_plugin_production(produced_at)
        .unwrap()
    }

    #[test]
    fn test_duplicate_inputs_rejected() {
        let evals = Arc::default();
        let inputs = vec![
            InOut::input(ident("In", IdentifierKind::Iasio), IasValueType::Double),
            InOut::input(ident("In", IdentifierKind::Iasio), IasValueType::Double),
        ];
        let err = ComputingElement::new(
            ident("Asce", IdentifierKind::Asce),
            InOut::output(ident("Out", IdentifierKind::Iasio), IasValueType::Alarm),
            inputs,
            ScriptedTf::ok(&evals),
            TIME_FRAME_MS,
            PropertyBag::new(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, AsceError::DuplicateInput(_)));
    }

    #[test]
    fn test_init_success_and_failure() {
        let evals = Arc::default();
        let mut ce = element_with(ScriptedTf::ok(&evals), &["In"]);
        assert_eq!(ce.state(), AsceState::Initializing);
        assert_eq!(ce.initialize(), AsceState::InputsUndefined);

        let mut ce = element_with(
            Box::new(ScriptedTf {
                fail_init: true,
                ..*ScriptedTf::ok(&evals)
            }),
            &["In"],
        );
        assert_eq!(ce.initialize(), AsceState::TfBroken);
    }

    #[test]
    fn test_healthy_exactly_when_all_inputs_defined() {
        let evals: Arc<AtomicUsize> = Arc::default();
        let mut ce = element_with(ScriptedTf::ok(&evals), &["A", "B"]);
        ce.initialize();

        let (out, state) = ce.update(&[double("A", 1.0, 100)], 100).unwrap();
        assert_eq!(state, AsceState::InputsUndefined);
        assert!(out.is_none());
        assert_eq!(evals.load(Ordering::SeqCst), 0);

        let (out, state) = ce.update(&[double("B", 2.0, 100)], 100).unwrap();
        assert_eq!(state, AsceState::Healthy);
        assert!(out.is_some());
        assert_eq!(evals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stray_input_is_a_contract_violation() {
        let evals = Arc::default();
        let mut ce = element_with(ScriptedTf::ok(&evals), &["A"]);
        ce.initialize();
        assert!(matches!(
            ce.update(&[double("Nope", 1.0, 0)], 0),
            Err(AsceError::UnexpectedInput { .. })
        ));
    }

    #[test]
    fn test_eval_failure_breaks_and_never_reinvokes() {
        let evals: Arc<AtomicUsize> = Arc::default();
        let mut ce = element_with(
            Box::new(ScriptedTf {
                fail_eval: true,
                ..*ScriptedTf::ok(&evals)
            }),
            &["A"],
        );
        ce.initialize();

        let (out1, state) = ce.update(&[double("A", 1.0, 0)], 0).unwrap();
        assert_eq!(state, AsceState::TfBroken);
        assert_eq!(evals.load(Ordering::SeqCst), 1);

        let (out2, state) = ce.update(&[double("A", 2.0, 0)], 0).unwrap();
        assert_eq!(state, AsceState::TfBroken);
        assert_eq!(evals.load(Ordering::SeqCst), 1, "TF must not run again");
        assert_eq!(out1, out2);
    }

    #[test]
    fn test_output_validity_is_min_over_inputs() {
        let evals: Arc<AtomicUsize> = Arc::default();
        let mut ce = element_with(ScriptedTf::ok(&evals), &["A", "B"]);
        ce.initialize();

        let unreliable = double("B", 2.0, 100).with_validity(Validity::Unreliable);
        let (out, _) = ce
            .update(&[double("A", 1.0, 100), unreliable], 100)
            .unwrap();
        assert_eq!(out.unwrap().validity, Validity::Unreliable);

        let (out, _) = ce
            .update(&[double("B", 2.0, 200)], 200)
            .unwrap();
        assert_eq!(out.unwrap().validity, Validity::Reliable);
    }

    #[test]
    fn test_age_rule_downgrades_stale_inputs() {
        let evals: Arc<AtomicUsize> = Arc::default();
        let mut ce = element_with(ScriptedTf::ok(&evals), &["A"]);
        ce.initialize();

        let (out, _) = ce.update(&[double("A", 1.0, 1_000)], 1_000).unwrap();
        assert_eq!(out.unwrap().validity, Validity::Reliable);

        // Same stored tag, evaluated past the time frame: unreliable.
        let (out, _) = ce
            .update(&[double("A", 1.0, 1_000)], 1_000 + TIME_FRAME_MS + 1)
            .unwrap();
        assert_eq!(out.unwrap().validity, Validity::Unreliable);
    }

    #[test]
    fn test_validity_constraint_restricts_considered_inputs() {
        let evals: Arc<AtomicUsize> = Arc::default();
        let constraint: FxHashSet<String> = ["A".to_string()].into_iter().collect();
        let mut ce = element_with(
            Box::new(ScriptedTf {
                constraint: Some(constraint),
                ..*ScriptedTf::ok(&evals)
            }),
            &["A", "B"],
        );
        ce.initialize();

        // B is unreliable but not part of the constraint.
        let unreliable = double("B", 2.0, 100).with_validity(Validity::Unreliable);
        let (out, state) = ce
            .update(&[double("A", 1.0, 100), unreliable], 100)
            .unwrap();
        assert_eq!(state, AsceState::Healthy);
        assert_eq!(out.unwrap().validity, Validity::Reliable);
    }

    #[test]
    fn test_unknown_constraint_id_breaks_the_element() {
        let evals: Arc<AtomicUsize> = Arc::default();
        let constraint: FxHashSet<String> = ["Ghost".to_string()].into_iter().collect();
        let mut ce = element_with(
            Box::new(ScriptedTf {
                constraint: Some(constraint),
                ..*ScriptedTf::ok(&evals)
            }),
            &["A"],
        );
        ce.initialize();
        let (_, state) = ce.update(&[double("A", 1.0, 0)], 0).unwrap();
        assert_eq!(state, AsceState::TfBroken);
    }

    #[test]
    fn test_output_is_stamped_as_dasu_produced() {
        let evals: Arc<AtomicUsize> = Arc::default();
        let mut ce = element_with(ScriptedTf::ok(&evals), &["A"]);
        ce.initialize();
        let (out, _) = ce.update(&[double("A", 99.0, 500)], 500).unwrap();
        let out = out.unwrap();
        assert_eq!(out.dasu_production, Some(500));
        assert_eq!(out.plugin_production, None);
        assert_eq!(out.payload.as_alarm(), Some(Priority::SetMedium));
    }

    #[test]
    fn test_slow_eval_demotes_then_breaks() {
        let evals: Arc<AtomicUsize> = Arc::default();
        let tf = Box::new(ScriptedTf {
            sleep: Some(Duration::from_millis(30)),
            ..*ScriptedTf::ok(&evals)
        });
        let inputs = vec![InOut::input(
            ident("A", IdentifierKind::Iasio),
            IasValueType::Double,
        )];
        let props = PropertyBag::from_pairs([
            (MAX_TF_TIME_PROP, "5"),
            (MAX_SLOW_DURATION_PROP, "20"),
        ]);
        let mut ce = ComputingElement::new(
            ident("Asce", IdentifierKind::Asce),
            InOut::output(ident("Out", IdentifierKind::Iasio), IasValueType::Alarm),
            inputs,
            tf,
            TIME_FRAME_MS,
            props,
            None,
        )
        .unwrap();
        ce.initialize();

        let (_, state) = ce.update(&[double("A", 1.0, 0)], 0).unwrap();
        assert_eq!(state, AsceState::Slow);
        assert!(ce.last_eval_duration_ms().unwrap() >= 30);

        // Still slow past the slowness budget: broken.
        let (_, state) = ce.update(&[double("A", 2.0, 0)], 0).unwrap();
        assert_eq!(state, AsceState::TfBroken);
    }

    #[test]
    fn test_fast_eval_recovers_from_slow() {
        let evals: Arc<AtomicUsize> = Arc::default();
        struct FlipTf {
            inner: ScriptedTf,
            slow_once: bool,
        }
        impl TransferFunction for FlipTf {
            fn initialize(&mut self, s: &TransferSetup) -> Result<(), TransferError> {
                self.inner.initialize(s)
            }
            fn eval(
                &mut self,
                inputs: &FxHashMap<String, IasValue>,
                prior: &IasValue,
            ) -> Result<TransferResult, TransferError> {
                if self.slow_once {
                    self.slow_once = false;
                    std::thread::sleep(Duration::from_millis(30));
                }
                self.inner.eval(inputs, prior)
            }
            fn shutdown(&mut self) {}
        }
        let tf = Box::new(FlipTf {
            inner: *ScriptedTf::ok(&evals),
            slow_once: true,
        });
        let inputs = vec![InOut::input(
            ident("A", IdentifierKind::Iasio),
            IasValueType::Double,
        )];
        let props = PropertyBag::from_pairs([
            (MAX_TF_TIME_PROP, "5"),
            (MAX_SLOW_DURATION_PROP, "60000"),
        ]);
        let mut ce = ComputingElement::new(
            ident("Asce", IdentifierKind::Asce),
            InOut::output(ident("Out", IdentifierKind::Iasio), IasValueType::Alarm),
            inputs,
            tf,
            TIME_FRAME_MS,
            props,
            None,
        )
        .unwrap();
        ce.initialize();

        let (_, state) = ce.update(&[double("A", 1.0, 0)], 0).unwrap();
        assert_eq!(state, AsceState::Slow);
        let (_, state) = ce.update(&[double("A", 2.0, 0)], 0).unwrap();
        assert_eq!(state, AsceState::Healthy);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let evals = Arc::default();
        let mut ce = element_with(ScriptedTf::ok(&evals), &["A"]);
        ce.initialize();
        ce.shutdown();
        assert_eq!(ce.state(), AsceState::Closed);
        ce.shutdown();
        assert_eq!(ce.state(), AsceState::Closed);
    }
}
