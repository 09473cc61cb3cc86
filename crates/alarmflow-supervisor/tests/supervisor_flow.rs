//! Supervisor flow over an in-memory bus and a file-based CDB: fan-out
//! to the hosted DASUs, pass-through publication, heartbeats and
//! orderly shutdown.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use alarmflow_bus::memory::InMemoryBus;
use alarmflow_bus::HEARTBEAT_TOPIC;
use alarmflow_cdb::JsonCdbReader;
use alarmflow_core::dasu::DasuOptions;
use alarmflow_core::TransferFunctionRegistry;
use alarmflow_supervisor::{Settings, Supervisor, SupervisorError};
use alarmflow_types::clock::now_millis;
use alarmflow_types::heartbeat::{Heartbeat, HeartbeatStatus};
use alarmflow_types::{
    IasValue, Identifier, IdentifierKind, OperationalMode, Payload, Priority, Validity,
};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Two single-element DASUs: one watching a temperature, one a
/// pressure.
fn sample_cdb() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "ias.json",
        r#"{"log_level":"DEBUG","refresh_rate_secs":2,"validity_threshold_secs":1,
            "hb_frequency_secs":1,"bsdb_url":"localhost:9092"}"#,
    );
    write(
        root,
        "Supervisor/SupTest.json",
        r#"{"id":"SupTest","dasus_to_deploy":[{"dasu_id":"TempDasu"},{"dasu_id":"PressDasu"}]}"#,
    );
    write(
        root,
        "DASU/TempDasu.json",
        r#"{"id":"TempDasu","output_id":"TempAlarm","asce_ids":["TempAsce"]}"#,
    );
    write(
        root,
        "DASU/PressDasu.json",
        r#"{"id":"PressDasu","output_id":"PressAlarm","asce_ids":["PressAsce"]}"#,
    );
    write(
        root,
        "ASCE/TempAsce.json",
        r#"{"id":"TempAsce","transfer_function_id":"Threshold","output_id":"TempAlarm",
            "input_ids":["Temperature"],
            "props":[{"name":"highOn","value":"50"},{"name":"highOff","value":"25"}]}"#,
    );
    write(
        root,
        "ASCE/PressAsce.json",
        r#"{"id":"PressAsce","transfer_function_id":"Threshold","output_id":"PressAlarm",
            "input_ids":["Pressure"],
            "props":[{"name":"highOn","value":"10"},{"name":"highOff","value":"5"}]}"#,
    );
    write(root, "TF/Threshold.json", r#"{"id":"Threshold","function":"MinMaxThreshold"}"#);
    write(root, "IASIO/Temperature.json", r#"{"id":"Temperature","ias_type":"DOUBLE"}"#);
    write(root, "IASIO/Pressure.json", r#"{"id":"Pressure","ias_type":"DOUBLE"}"#);
    write(root, "IASIO/TempAlarm.json", r#"{"id":"TempAlarm","ias_type":"ALARM"}"#);
    write(root, "IASIO/PressAlarm.json", r#"{"id":"PressAlarm","ias_type":"ALARM"}"#);
    dir
}

fn settings() -> Settings {
    Settings {
        dasu_options: DasuOptions {
            auto_send_period: Duration::from_secs(2),
            tolerance: Duration::from_secs(1),
            throttling_min_interval: Duration::from_millis(250),
        },
        brokers: String::new(),
        hb_period: Duration::from_secs(1),
        stats_period: Duration::ZERO,
    }
}

fn sample(id: &str, v: f64) -> IasValue {
    IasValue::new(
        format!("(Conv:CONVERTER)@({id}:IASIO)"),
        Payload::Double(v),
        OperationalMode::Operational,
        Validity::Reliable,
    )
    .unwrap()
    .with_plugin_production(now_millis())
    .unwrap()
    .with_sent_to_bsdb(now_millis())
}

fn build_supervisor(cdb_root: &Path, bus: &InMemoryBus) -> Supervisor {
    let cdb = JsonCdbReader::new(cdb_root);
    let ident = Identifier::new("SupTest", IdentifierKind::Supervisor, None).unwrap();
    Supervisor::new(
        ident,
        &cdb,
        Arc::new(bus.clone()),
        Arc::new(bus.clone()),
        &TransferFunctionRegistry::with_defaults(),
        &settings(),
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn global_inputs_are_the_union_of_dasu_inputs() {
    let dir = sample_cdb();
    let bus = InMemoryBus::new();
    let supervisor = build_supervisor(dir.path(), &bus);

    let mut inputs: Vec<&String> = supervisor.global_inputs().iter().collect();
    inputs.sort();
    assert_eq!(inputs, ["Pressure", "Temperature"]);
    assert_eq!(supervisor.dasus().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn fan_out_routes_each_dasu_its_own_inputs() {
    let dir = sample_cdb();
    let bus = InMemoryBus::new();
    let supervisor = build_supervisor(dir.path(), &bus);
    supervisor.start().await.unwrap();
    bus.clear_recorded();

    // One batch carrying both monitor points plus a foreign id.
    bus.inject(vec![
        sample("Temperature", 100.0),
        sample("Pressure", 1.0),
        sample("Humidity", 0.5),
    ]);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let published = bus.published();
    assert_eq!(published.len(), 2);
    let temp = published.iter().find(|v| v.id() == "TempAlarm").unwrap();
    let press = published.iter().find(|v| v.id() == "PressAlarm").unwrap();
    assert_eq!(temp.payload.as_alarm(), Some(Priority::SetMedium));
    assert_eq!(press.payload.as_alarm(), Some(Priority::Cleared));
    supervisor.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn second_start_fails() {
    let dir = sample_cdb();
    let bus = InMemoryBus::new();
    let supervisor = build_supervisor(dir.path(), &bus);
    supervisor.start().await.unwrap();
    assert!(matches!(
        supervisor.start().await,
        Err(SupervisorError::AlreadyStarted)
    ));
    supervisor.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn heartbeat_runs_while_started_and_ends_shut_down() {
    let dir = sample_cdb();
    let bus = InMemoryBus::new();
    let supervisor = build_supervisor(dir.path(), &bus);
    supervisor.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    let beats: Vec<Heartbeat> = bus
        .raw_messages()
        .iter()
        .filter(|(topic, _, _)| topic == HEARTBEAT_TOPIC)
        .map(|(_, _, payload)| Heartbeat::decode(payload).unwrap())
        .collect();
    assert!(beats.len() >= 3, "got {} beats", beats.len());
    assert!(beats.iter().any(|b| b.status == HeartbeatStatus::Running));
    assert_eq!(beats[0].id, "(SupTest:SUPERVISOR)");

    supervisor.cleanup().await;
    let beats: Vec<Heartbeat> = bus
        .raw_messages()
        .iter()
        .filter(|(topic, _, _)| topic == HEARTBEAT_TOPIC)
        .map(|(_, _, payload)| Heartbeat::decode(payload).unwrap())
        .collect();
    assert_eq!(beats.last().unwrap().status, HeartbeatStatus::ShutDown);
}

#[tokio::test(start_paused = true)]
async fn cleanup_is_idempotent() {
    let dir = sample_cdb();
    let bus = InMemoryBus::new();
    let supervisor = build_supervisor(dir.path(), &bus);
    supervisor.start().await.unwrap();
    supervisor.cleanup().await;
    supervisor.cleanup().await;
}

/// With no inputs at all, auto-refresh keeps re-publishing the last
/// outputs. Runs on the real clock because validity ages against the
/// wall clock.
#[tokio::test(flavor = "multi_thread")]
async fn silent_bus_keeps_refreshing_with_degrading_validity() {
    let dir = sample_cdb();
    let bus = InMemoryBus::new();
    let cdb = JsonCdbReader::new(dir.path());
    let ident = Identifier::new("SupTest", IdentifierKind::Supervisor, None).unwrap();
    let fast = Settings {
        dasu_options: DasuOptions {
            auto_send_period: Duration::from_millis(150),
            tolerance: Duration::from_millis(50),
            throttling_min_interval: Duration::from_millis(20),
        },
        brokers: String::new(),
        hb_period: Duration::from_secs(10),
        stats_period: Duration::ZERO,
    };
    let supervisor = Supervisor::new(
        ident,
        &cdb,
        Arc::new(bus.clone()),
        Arc::new(bus.clone()),
        &TransferFunctionRegistry::with_defaults(),
        &fast,
    )
    .unwrap();
    supervisor.start().await.unwrap();

    bus.inject(vec![sample("Temperature", 10.0)]);
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    let temp_alarms: Vec<IasValue> = bus
        .published()
        .into_iter()
        .filter(|v| v.id() == "TempAlarm")
        .collect();
    assert!(temp_alarms.len() >= 3, "got {}", temp_alarms.len());
    assert_eq!(temp_alarms[0].validity, Validity::Reliable);
    // Older than auto_send_period + tolerance: degraded on refresh.
    assert_eq!(temp_alarms.last().unwrap().validity, Validity::Unreliable);
    supervisor.cleanup().await;
}
