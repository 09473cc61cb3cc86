//! Document models of the configuration store.
//!
//! The `*Config` structs mirror the JSON documents on disk and keep
//! children as string references. The `*Definition` structs are the
//! resolved counterparts handed to the runtime, with every reference
//! inlined and template instances already applied.

use serde::{Deserialize, Serialize};

use alarmflow_types::identifier::{TEMPLATE_PREFIX, TEMPLATE_SUFFIX};
use alarmflow_types::IasValueType;

/// A named string property, as carried by ASCE and global configs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Property name.
    pub name: String,
    /// Property value.
    pub value: String,
}

/// Global settings (`ias.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IasConfig {
    /// Default log level for every tool (overridable per process).
    #[serde(default)]
    pub log_level: Option<String>,
    /// Refresh rate of the core, seconds: DASUs re-publish their last
    /// output at this period when auto-refresh is enabled.
    pub refresh_rate_secs: u64,
    /// Tolerance added to the refresh rate by the validity age rule,
    /// seconds.
    pub validity_threshold_secs: u64,
    /// Heartbeat period, seconds.
    pub hb_frequency_secs: u64,
    /// URL of the message bus brokers.
    pub bsdb_url: String,
    /// Free-form global properties.
    #[serde(default)]
    pub props: Vec<Property>,
}

/// A supervisor document (`Supervisor/<ID>.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// The supervisor id.
    pub id: String,
    /// The DASUs this supervisor deploys.
    pub dasus_to_deploy: Vec<DasuToDeploy>,
}

/// One DASU deployment entry inside a supervisor document.
///
/// Concrete DASUs carry only `dasu_id`; templated deployments add the
/// template reference and the instance number to materialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DasuToDeploy {
    /// Id of the DASU document.
    pub dasu_id: String,
    /// Template to instantiate, when the DASU is templated.
    #[serde(default)]
    pub template_id: Option<String>,
    /// Instance number, required together with `template_id`.
    #[serde(default)]
    pub instance: Option<usize>,
}

/// A DASU document (`DASU/<ID>.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DasuConfig {
    /// The DASU id.
    pub id: String,
    /// Id of the IASIO this DASU publishes.
    pub output_id: String,
    /// The ASCEs composing the DASU.
    pub asce_ids: Vec<String>,
    /// Template this DASU belongs to, when templated.
    #[serde(default)]
    pub template_id: Option<String>,
}

/// An ASCE document (`ASCE/<ID>.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsceConfig {
    /// The ASCE id.
    pub id: String,
    /// Id of the transfer function document to run.
    pub transfer_function_id: String,
    /// Id of the IASIO this ASCE produces.
    pub output_id: String,
    /// Ids of the IASIOs this ASCE consumes.
    pub input_ids: Vec<String>,
    /// Properties handed to the transfer function.
    #[serde(default)]
    pub props: Vec<Property>,
    /// Template this ASCE belongs to, when templated.
    #[serde(default)]
    pub template_id: Option<String>,
}

/// An IASIO catalog entry (`IASIO/<ID>.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IasioConfig {
    /// The IASIO id.
    pub id: String,
    /// The type tag of values flowing through this IASIO.
    pub ias_type: IasValueType,
    /// Template this IASIO belongs to, when templated.
    #[serde(default)]
    pub template_id: Option<String>,
}

/// A transfer function catalog entry (`TF/<ID>.json`).
///
/// `function` names a factory registered in the transfer function
/// registry; it is *not* a class to load dynamically. An unknown name
/// is a configuration error at DASU construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferFunctionConfig {
    /// The document id referenced by ASCEs.
    pub id: String,
    /// Registered factory name, e.g. `MinMaxThreshold`.
    pub function: String,
}

/// A template document (`Template/<ID>.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// The template id.
    pub id: String,
    /// Lowest allowed instance number.
    pub min: usize,
    /// Highest allowed instance number.
    pub max: usize,
}

/// A fully resolved ASCE, ready to instantiate.
#[derive(Debug, Clone)]
pub struct AsceDefinition {
    /// The (possibly instantiated) ASCE id.
    pub id: String,
    /// Registered name of the transfer function to run.
    pub function: String,
    /// Output IASIO id and type.
    pub output: IasioConfig,
    /// Input IASIO ids and types.
    pub inputs: Vec<IasioConfig>,
    /// Transfer function properties.
    pub props: Vec<Property>,
    /// Instance number when the ASCE comes from a template.
    pub template_instance: Option<usize>,
}

/// A fully resolved DASU, ready to instantiate.
#[derive(Debug, Clone)]
pub struct DasuDefinition {
    /// The (possibly instantiated) DASU id.
    pub id: String,
    /// Id of the IASIO this DASU publishes.
    pub output_id: String,
    /// The resolved ASCEs.
    pub asces: Vec<AsceDefinition>,
}

/// Appends the template instance marker to an id: `base` becomes
/// `base[!#N!]`.
#[must_use]
pub(crate) fn instantiate_id(base: &str, instance: usize) -> String {
    format!("{base}{TEMPLATE_PREFIX}{instance}{TEMPLATE_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instantiate_id_marker() {
        assert_eq!(instantiate_id("Thresh", 4), "Thresh[!#4!]");
    }

    #[test]
    fn test_dasu_config_parses_without_optionals() {
        let json = r#"{"id":"D1","output_id":"Out","asce_ids":["A1","A2"]}"#;
        let cfg: DasuConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.id, "D1");
        assert!(cfg.template_id.is_none());
    }

    #[test]
    fn test_iasio_config_uses_wire_type_tags() {
        let json = r#"{"id":"Temp","ias_type":"DOUBLE"}"#;
        let cfg: IasioConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.ias_type, IasValueType::Double);
    }
}
