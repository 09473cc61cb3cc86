//! End-to-end scenarios of a single distributed unit over an in-memory
//! bus: input-driven publication, auto-refresh, multi-level propagation,
//! broken transfer functions and throttling.

use std::sync::Arc;
use std::time::Duration;

use fxhash::FxHashMap;

use alarmflow_bus::memory::InMemoryBus;
use alarmflow_cdb::{AsceDefinition, DasuDefinition, IasioConfig, Property};
use alarmflow_core::dasu::{Dasu, DasuOptions};
use alarmflow_core::stats::NullStats;
use alarmflow_core::transfer::{
    TransferError, TransferFunction, TransferResult, TransferSetup,
};
use alarmflow_core::TransferFunctionRegistry;
use alarmflow_types::clock::now_millis;
use alarmflow_types::{
    IasValue, IasValueType, Identifier, IdentifierKind, OperationalMode, Payload, Priority,
    Validity,
};

fn iasio(id: &str, ias_type: IasValueType) -> IasioConfig {
    IasioConfig {
        id: id.to_string(),
        ias_type,
        template_id: None,
    }
}

fn prop(name: &str, value: &str) -> Property {
    Property {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn threshold_asce(id: &str, input: &str, output: &str) -> AsceDefinition {
    AsceDefinition {
        id: id.to_string(),
        function: "MinMaxThreshold".to_string(),
        output: iasio(output, IasValueType::Alarm),
        inputs: vec![iasio(input, IasValueType::Double)],
        props: vec![prop("highOn", "50"), prop("highOff", "25")],
        template_instance: None,
    }
}

fn multiplicity_asce(id: &str, inputs: &[&str], output: &str, threshold: usize) -> AsceDefinition {
    AsceDefinition {
        id: id.to_string(),
        function: "Multiplicity".to_string(),
        output: iasio(output, IasValueType::Alarm),
        inputs: inputs
            .iter()
            .map(|i| iasio(i, IasValueType::Alarm))
            .collect(),
        props: vec![prop("threshold", &threshold.to_string())],
        template_instance: None,
    }
}

fn single_threshold_definition() -> DasuDefinition {
    DasuDefinition {
        id: "TempDasu".to_string(),
        output_id: "TempAlarm".to_string(),
        asces: vec![threshold_asce("TempAsce", "Temperature", "TempAlarm")],
    }
}

fn temperature(id: &str, v: f64) -> IasValue {
    IasValue::new(
        format!("(Conv:CONVERTER)@({id}:IASIO)"),
        Payload::Double(v),
        OperationalMode::Operational,
        Validity::Reliable,
    )
    .unwrap()
    .with_plugin_production(now_millis())
    .unwrap()
}

async fn start_dasu(
    bus: &InMemoryBus,
    definition: &DasuDefinition,
    options: DasuOptions,
    registry: &TransferFunctionRegistry,
) -> Arc<Dasu> {
    let ident = Identifier::new(definition.id.clone(), IdentifierKind::Dasu, None).unwrap();
    let dasu = Arc::new(
        Dasu::new(
            ident,
            definition,
            options,
            registry,
            Arc::new(bus.clone()),
            Arc::new(bus.clone()),
            Arc::new(NullStats),
        )
        .unwrap(),
    );
    dasu.start().await.unwrap();
    dasu
}

/// Pushing a nominal then an out-of-range temperature publishes exactly
/// one cleared and one set alarm.
#[tokio::test(start_paused = true)]
async fn cleared_then_set_with_no_extra_publishes() {
    let bus = InMemoryBus::new();
    let dasu = start_dasu(
        &bus,
        &single_threshold_definition(),
        DasuOptions::default(),
        &TransferFunctionRegistry::with_defaults(),
    )
    .await;

    bus.inject(vec![temperature("Temperature", 0.0)]);
    tokio::time::sleep(Duration::from_millis(300)).await;
    bus.inject(vec![temperature("Temperature", 100.0)]);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let published = bus.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].payload.as_alarm(), Some(Priority::Cleared));
    assert_eq!(published[1].payload.as_alarm(), Some(Priority::SetMedium));
    assert_eq!(published[0].id(), "TempAlarm");
    assert!(published[1]
        .dependents
        .as_ref()
        .unwrap()
        .contains("(Conv:CONVERTER)@(Temperature:IASIO)"));
    dasu.cleanup().await;
}

/// With auto-refresh at one second and a single input, the last output
/// is re-published every period with the same payload and mode and
/// fresh production stamps. Runs on the real clock because the stamps
/// come from the wall clock.
#[tokio::test(flavor = "multi_thread")]
async fn auto_refresh_republishes_the_last_output() {
    let bus = InMemoryBus::new();
    let options = DasuOptions {
        auto_send_period: Duration::from_millis(200),
        tolerance: Duration::from_millis(100),
        ..DasuOptions::default()
    };
    let dasu = start_dasu(
        &bus,
        &single_threshold_definition(),
        options,
        &TransferFunctionRegistry::with_defaults(),
    )
    .await;
    dasu.enable_auto_refresh(true);

    bus.inject(vec![temperature("Temperature", 0.0)]);
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let published = bus.published();
    assert!(
        published.len() >= 4,
        "expected >= 4 publications, got {}",
        published.len()
    );
    for value in &published {
        assert_eq!(value.payload.as_alarm(), Some(Priority::Cleared));
        assert_eq!(value.mode, OperationalMode::Operational);
        assert!(value.dasu_production.is_some());
    }
    // Production stamps move forward on every re-publication.
    assert!(published
        .windows(2)
        .all(|w| w[0].dasu_production <= w[1].dasu_production));
    // The first publication is fresh relative to its inputs.
    assert_eq!(published[0].validity, Validity::Reliable);
    dasu.cleanup().await;
}

/// With no new inputs, re-published outputs degrade to unreliable once
/// the last real evaluation ages past the threshold.
#[tokio::test(flavor = "multi_thread")]
async fn refreshed_outputs_degrade_to_unreliable() {
    let bus = InMemoryBus::new();
    let options = DasuOptions {
        auto_send_period: Duration::from_millis(150),
        tolerance: Duration::from_millis(50),
        ..DasuOptions::default()
    };
    let dasu = start_dasu(
        &bus,
        &single_threshold_definition(),
        options,
        &TransferFunctionRegistry::with_defaults(),
    )
    .await;
    dasu.enable_auto_refresh(true);

    bus.inject(vec![temperature("Temperature", 0.0)]);
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    let published = bus.published();
    assert!(published.len() >= 3);
    assert_eq!(published[0].validity, Validity::Reliable);
    // Well past auto_send_period + tolerance: the refreshed copies are
    // stale and say so.
    assert_eq!(
        published.last().unwrap().validity,
        Validity::Unreliable,
        "stale refresh must be unreliable"
    );
    dasu.cleanup().await;
}

/// Seven elements over three levels: four thresholds feeding two
/// multiplicities feeding a final multiplicity.
#[tokio::test(start_paused = true)]
async fn multi_level_propagation() {
    let definition = DasuDefinition {
        id: "FarmDasu".to_string(),
        output_id: "FarmAlarm".to_string(),
        asces: vec![
            threshold_asce("Th1", "T1", "A1"),
            threshold_asce("Th2", "T2", "A2"),
            threshold_asce("Th3", "T3", "A3"),
            threshold_asce("Th4", "T4", "A4"),
            multiplicity_asce("MultA", &["A1", "A2"], "MA", 2),
            multiplicity_asce("MultB", &["A3", "A4"], "MB", 1),
            multiplicity_asce("Final", &["MA", "MB"], "FarmAlarm", 2),
        ],
    };
    let bus = InMemoryBus::new();
    let dasu = start_dasu(
        &bus,
        &definition,
        DasuOptions::default(),
        &TransferFunctionRegistry::with_defaults(),
    )
    .await;

    bus.inject(vec![
        temperature("T1", 5.0),
        temperature("T2", 6.0),
        temperature("T3", 7.0),
        temperature("T4", 8.0),
    ]);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let published = bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].id(), "FarmAlarm");
    assert_eq!(published[0].payload.as_alarm(), Some(Priority::Cleared));

    bus.inject(vec![
        temperature("T1", 100.0),
        temperature("T2", 100.0),
        temperature("T3", 100.0),
        temperature("T4", 8.0),
    ]);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let published = bus.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[1].payload.as_alarm(), Some(Priority::SetMedium));
    dasu.cleanup().await;
}

/// A transfer function that always fails at evaluation.
struct AlwaysFailingTf;

impl TransferFunction for AlwaysFailingTf {
    fn initialize(&mut self, _setup: &TransferSetup) -> Result<(), TransferError> {
        Ok(())
    }

    fn eval(
        &mut self,
        _inputs: &FxHashMap<String, IasValue>,
        _prior_output: &IasValue,
    ) -> Result<TransferResult, TransferError> {
        Err(TransferError::EvalFailed("broken on purpose".into()))
    }

    fn shutdown(&mut self) {}
}

/// A broken transfer function never kills the DASU: nothing is
/// published, and later batches are still accepted without panicking.
#[tokio::test(start_paused = true)]
async fn broken_transfer_function_is_isolated() {
    let registry = TransferFunctionRegistry::with_defaults();
    registry.register("AlwaysFailing", Arc::new(|| Box::new(AlwaysFailingTf)));

    let definition = DasuDefinition {
        id: "BrokenDasu".to_string(),
        output_id: "Out".to_string(),
        asces: vec![AsceDefinition {
            id: "Broken".to_string(),
            function: "AlwaysFailing".to_string(),
            output: iasio("Out", IasValueType::Alarm),
            inputs: vec![iasio("Temperature", IasValueType::Double)],
            props: vec![],
            template_instance: None,
        }],
    };
    let bus = InMemoryBus::new();
    let dasu = start_dasu(&bus, &definition, DasuOptions::default(), &registry).await;

    bus.inject(vec![temperature("Temperature", 1.0)]);
    tokio::time::sleep(Duration::from_millis(300)).await;
    bus.inject(vec![temperature("Temperature", 2.0)]);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(bus.published().is_empty());
    dasu.cleanup().await;
}

/// A thousand values for the same id inside one throttling window
/// produce at most two publishes.
#[tokio::test(start_paused = true)]
async fn burst_of_one_thousand_coalesces() {
    let bus = InMemoryBus::new();
    let dasu = start_dasu(
        &bus,
        &single_threshold_definition(),
        DasuOptions::default(),
        &TransferFunctionRegistry::with_defaults(),
    )
    .await;

    for i in 0..1_000u32 {
        bus.inject(vec![temperature("Temperature", f64::from(i % 20))]);
    }
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert!(
        bus.published().len() <= 2,
        "got {} publishes",
        bus.published().len()
    );
    dasu.cleanup().await;
}
