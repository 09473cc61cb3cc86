//! Readers of the configuration store.
//!
//! [`CdbReader`] is the backend-independent contract; the resolution of
//! a DASU with all its transitive children (including template
//! instantiation) is a provided method so every backend shares it.
//! [`JsonCdbReader`] reads the JSON file layout:
//!
//! ```text
//! <root>/ias.json
//! <root>/Supervisor/<ID>.json
//! <root>/DASU/<ID>.json
//! <root>/ASCE/<ID>.json
//! <root>/IASIO/<ID>.json
//! <root>/TF/<ID>.json
//! <root>/Template/<ID>.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::CdbError;
use crate::models::{
    instantiate_id, AsceConfig, AsceDefinition, DasuConfig, DasuDefinition, DasuToDeploy,
    IasConfig, IasioConfig, SupervisorConfig, TemplateConfig, TransferFunctionConfig,
};

/// Backend-independent access to the configuration store.
pub trait CdbReader: Send + Sync {
    /// Reads the global settings.
    ///
    /// # Errors
    ///
    /// Returns a [`CdbError`] when the document is missing or malformed.
    fn ias_config(&self) -> Result<IasConfig, CdbError>;

    /// Reads a supervisor document.
    ///
    /// # Errors
    ///
    /// Returns [`CdbError::NotFound`] for an unknown id.
    fn supervisor(&self, id: &str) -> Result<SupervisorConfig, CdbError>;

    /// Reads a DASU document.
    ///
    /// # Errors
    ///
    /// Returns [`CdbError::NotFound`] for an unknown id.
    fn dasu(&self, id: &str) -> Result<DasuConfig, CdbError>;

    /// Reads an ASCE document.
    ///
    /// # Errors
    ///
    /// Returns [`CdbError::NotFound`] for an unknown id.
    fn asce(&self, id: &str) -> Result<AsceConfig, CdbError>;

    /// Reads an IASIO catalog entry.
    ///
    /// # Errors
    ///
    /// Returns [`CdbError::NotFound`] for an unknown id.
    fn iasio(&self, id: &str) -> Result<IasioConfig, CdbError>;

    /// Reads a transfer function catalog entry.
    ///
    /// # Errors
    ///
    /// Returns [`CdbError::NotFound`] for an unknown id.
    fn transfer_function(&self, id: &str) -> Result<TransferFunctionConfig, CdbError>;

    /// Reads a template document.
    ///
    /// # Errors
    ///
    /// Returns [`CdbError::NotFound`] for an unknown id.
    fn template(&self, id: &str) -> Result<TemplateConfig, CdbError>;

    /// Resolves a deployment entry into a [`DasuDefinition`] with every
    /// transitive child inlined and template instances applied.
    ///
    /// Ids of documents belonging to the deployed template get the
    /// instance marker appended; ids of concrete documents referenced by
    /// a templated DASU are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CdbError::IncompleteTemplateRef`] when only one of
    /// template id and instance is present,
    /// [`CdbError::InstanceOutOfBounds`] when the instance falls outside
    /// the template bounds, and [`CdbError::NotFound`] for any dangling
    /// reference.
    fn resolved_dasu(&self, deploy: &DasuToDeploy) -> Result<DasuDefinition, CdbError> {
        let instance = match (&deploy.template_id, deploy.instance) {
            (Some(template_id), Some(instance)) => {
                let template = self.template(template_id)?;
                if instance < template.min || instance > template.max {
                    return Err(CdbError::InstanceOutOfBounds {
                        template_id: template_id.clone(),
                        instance,
                        min: template.min,
                        max: template.max,
                    });
                }
                Some(instance)
            }
            (None, None) => None,
            _ => {
                return Err(CdbError::IncompleteTemplateRef {
                    dasu_id: deploy.dasu_id.clone(),
                })
            }
        };

        let dasu = self.dasu(&deploy.dasu_id)?;
        let in_template = |template_id: &Option<String>| {
            instance.filter(|_| template_id.is_some() && *template_id == deploy.template_id)
        };

        let mut asces = Vec::with_capacity(dasu.asce_ids.len());
        for asce_id in &dasu.asce_ids {
            let asce = self.asce(asce_id)?;
            let function = self.transfer_function(&asce.transfer_function_id)?.function;

            let output = self.resolved_iasio(&asce.output_id, deploy, instance)?;
            let mut inputs = Vec::with_capacity(asce.input_ids.len());
            for input_id in &asce.input_ids {
                inputs.push(self.resolved_iasio(input_id, deploy, instance)?);
            }

            let asce_instance = in_template(&asce.template_id);
            asces.push(AsceDefinition {
                id: asce_instance.map_or_else(|| asce.id.clone(), |n| instantiate_id(&asce.id, n)),
                function,
                output,
                inputs,
                props: asce.props,
                template_instance: asce_instance,
            });
        }

        let dasu_instance = in_template(&dasu.template_id);
        let id = dasu_instance.map_or_else(|| dasu.id.clone(), |n| instantiate_id(&dasu.id, n));
        let output_iasio = self.resolved_iasio(&dasu.output_id, deploy, instance)?;
        debug!(dasu = %id, asces = asces.len(), "resolved DASU definition");
        Ok(DasuDefinition {
            id,
            output_id: output_iasio.id,
            asces,
        })
    }

    /// Reads an IASIO and applies the deployed template instance when
    /// the entry belongs to that template.
    ///
    /// # Errors
    ///
    /// Returns [`CdbError::NotFound`] for an unknown id.
    fn resolved_iasio(
        &self,
        id: &str,
        deploy: &DasuToDeploy,
        instance: Option<usize>,
    ) -> Result<IasioConfig, CdbError> {
        let mut iasio = self.iasio(id)?;
        if let Some(n) =
            instance.filter(|_| iasio.template_id.is_some() && iasio.template_id == deploy.template_id)
        {
            iasio.id = instantiate_id(&iasio.id, n);
        }
        Ok(iasio)
    }
}

/// File-based configuration store reader.
pub struct JsonCdbReader {
    root: PathBuf,
}

impl JsonCdbReader {
    /// A reader rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read<T: DeserializeOwned>(&self, path: &Path, kind: &'static str, id: &str) -> Result<T, CdbError> {
        if !path.exists() {
            return Err(CdbError::NotFound {
                kind,
                id: id.to_string(),
            });
        }
        let text = fs::read_to_string(path).map_err(|source| CdbError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| CdbError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn doc_path(&self, folder: &str, id: &str) -> PathBuf {
        self.root.join(folder).join(format!("{id}.json"))
    }
}

impl CdbReader for JsonCdbReader {
    fn ias_config(&self) -> Result<IasConfig, CdbError> {
        let path = self.root.join("ias.json");
        self.read(&path, "ias", "ias")
    }

    fn supervisor(&self, id: &str) -> Result<SupervisorConfig, CdbError> {
        self.read(&self.doc_path("Supervisor", id), "Supervisor", id)
    }

    fn dasu(&self, id: &str) -> Result<DasuConfig, CdbError> {
        self.read(&self.doc_path("DASU", id), "DASU", id)
    }

    fn asce(&self, id: &str) -> Result<AsceConfig, CdbError> {
        self.read(&self.doc_path("ASCE", id), "ASCE", id)
    }

    fn iasio(&self, id: &str) -> Result<IasioConfig, CdbError> {
        self.read(&self.doc_path("IASIO", id), "IASIO", id)
    }

    fn transfer_function(&self, id: &str) -> Result<TransferFunctionConfig, CdbError> {
        self.read(&self.doc_path("TF", id), "TF", id)
    }

    fn template(&self, id: &str) -> Result<TemplateConfig, CdbError> {
        self.read(&self.doc_path("Template", id), "Template", id)
    }
}
