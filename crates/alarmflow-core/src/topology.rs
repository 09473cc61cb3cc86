//! Topology of the computing elements of one DASU.
//!
//! The topology is a pure value computed once from the ASCE definitions:
//! it validates the graph (unique outputs, a single producer of the DASU
//! output, no orphan outputs, no cycles) and derives the structural
//! indexes the DASU needs at runtime — the external inputs, the
//! input/consumer maps, and the ordered evaluation levels. Level 0 holds
//! the elements fed only by external inputs; level *k* holds the
//! elements whose inputs are satisfied by the external inputs plus the
//! outputs of levels below *k*.

use std::fmt;

use fxhash::{FxHashMap, FxHashSet};

/// Errors raised while validating a DASU topology.
///
/// All of them are configuration errors: the DASU refuses to start.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// The DASU has no computing elements.
    #[error("empty topology: no computing elements")]
    Empty,

    /// Two computing elements declare the same output.
    #[error("output '{output_id}' produced by both '{first}' and '{second}'")]
    DuplicateOutput {
        /// The doubly-produced output id.
        output_id: String,
        /// The element that declared it first.
        first: String,
        /// The element that declared it again.
        second: String,
    },

    /// No computing element produces the DASU output.
    #[error("DASU output '{0}' is not produced by any computing element")]
    UnproducedOutput(String),

    /// An element output other than the DASU output is consumed by
    /// nobody.
    #[error("output '{output_id}' of '{asce_id}' is not consumed by any computing element")]
    OrphanOutput {
        /// The unconsumed output id.
        output_id: String,
        /// The element producing it.
        asce_id: String,
    },

    /// The graph contains a cycle involving the given id.
    #[error("cycle detected involving '{0}'")]
    CycleDetected(String),

    /// An element could not be assigned to an evaluation level.
    #[error("computing element '{0}' cannot be assigned to any level")]
    Unassignable(String),
}

/// The slice of an ASCE definition the topology needs: who it is, what
/// it consumes, what it produces.
#[derive(Debug, Clone)]
pub struct AsceTopoEntry {
    /// The element id.
    pub asce_id: String,
    /// Accepted input ids.
    pub input_ids: FxHashSet<String>,
    /// The produced output id.
    pub output_id: String,
}

/// Validated structural index of one DASU.
#[derive(Debug)]
pub struct AsceTopology {
    output_id: String,
    dasu_inputs: FxHashSet<String>,
    inputs_of: FxHashMap<String, FxHashSet<String>>,
    consumers_of: FxHashMap<String, FxHashSet<String>>,
    producer_of: FxHashMap<String, String>,
    levels: Vec<Vec<String>>,
}

impl AsceTopology {
    /// Builds and validates the topology of one DASU.
    ///
    /// # Errors
    ///
    /// Returns a [`TopologyError`] when the definitions violate any of
    /// the structural rules; a DASU with an invalid topology never
    /// starts.
    pub fn new(entries: &[AsceTopoEntry], output_id: &str) -> Result<Self, TopologyError> {
        if entries.is_empty() {
            return Err(TopologyError::Empty);
        }

        let mut producer_of: FxHashMap<String, String> = FxHashMap::default();
        let mut inputs_of: FxHashMap<String, FxHashSet<String>> = FxHashMap::default();
        let mut consumers_of: FxHashMap<String, FxHashSet<String>> = FxHashMap::default();

        for entry in entries {
            if let Some(first) = producer_of.get(&entry.output_id) {
                return Err(TopologyError::DuplicateOutput {
                    output_id: entry.output_id.clone(),
                    first: first.clone(),
                    second: entry.asce_id.clone(),
                });
            }
            producer_of.insert(entry.output_id.clone(), entry.asce_id.clone());
            inputs_of.insert(entry.asce_id.clone(), entry.input_ids.clone());
            for input in &entry.input_ids {
                consumers_of
                    .entry(input.clone())
                    .or_default()
                    .insert(entry.asce_id.clone());
            }
        }

        if !producer_of.contains_key(output_id) {
            return Err(TopologyError::UnproducedOutput(output_id.to_string()));
        }

        // External inputs: consumed ids never produced internally.
        let dasu_inputs: FxHashSet<String> = consumers_of
            .keys()
            .filter(|id| !producer_of.contains_key(*id))
            .cloned()
            .collect();

        // Every internal output except the DASU output must feed someone.
        for (produced, asce_id) in &producer_of {
            if produced != output_id && !consumers_of.contains_key(produced) {
                return Err(TopologyError::OrphanOutput {
                    output_id: produced.clone(),
                    asce_id: asce_id.clone(),
                });
            }
        }

        check_acyclic(&dasu_inputs, &consumers_of, entries)?;
        let levels = assign_levels(&dasu_inputs, entries)?;

        Ok(Self {
            output_id: output_id.to_string(),
            dasu_inputs,
            inputs_of,
            consumers_of,
            producer_of,
            levels,
        })
    }

    /// The id of the output the DASU publishes.
    #[must_use]
    pub fn output_id(&self) -> &str {
        &self.output_id
    }

    /// The external inputs: ids consumed by elements but produced by
    /// none of them.
    #[must_use]
    pub fn dasu_inputs(&self) -> &FxHashSet<String> {
        &self.dasu_inputs
    }

    /// The accepted inputs of an element.
    #[must_use]
    pub fn inputs_of_asce(&self, asce_id: &str) -> Option<&FxHashSet<String>> {
        self.inputs_of.get(asce_id)
    }

    /// The elements consuming the given id.
    #[must_use]
    pub fn asces_of_input(&self, input_id: &str) -> Option<&FxHashSet<String>> {
        self.consumers_of.get(input_id)
    }

    /// The element producing the given output id.
    #[must_use]
    pub fn asce_producing_output(&self, output_id: &str) -> Option<&str> {
        self.producer_of.get(output_id).map(String::as_str)
    }

    /// The ordered evaluation levels; each level lists element ids
    /// sorted for deterministic traversal.
    #[must_use]
    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    /// The number of evaluation levels.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.levels.len()
    }
}

impl fmt::Display for AsceTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "topology producing '{}'", self.output_id)?;
        let mut inputs: Vec<&String> = self.dasu_inputs.iter().collect();
        inputs.sort();
        writeln!(f, "  external inputs: {inputs:?}")?;
        for (depth, level) in self.levels.iter().enumerate() {
            writeln!(f, "  level {depth}: {level:?}")?;
        }
        Ok(())
    }
}

/// Walks input -> consuming elements -> their outputs, failing when an
/// id repeats on the current path.
fn check_acyclic(
    dasu_inputs: &FxHashSet<String>,
    consumers_of: &FxHashMap<String, FxHashSet<String>>,
    entries: &[AsceTopoEntry],
) -> Result<(), TopologyError> {
    let output_of: FxHashMap<&str, &str> = entries
        .iter()
        .map(|e| (e.asce_id.as_str(), e.output_id.as_str()))
        .collect();

    fn visit<'a>(
        id: &'a str,
        consumers_of: &'a FxHashMap<String, FxHashSet<String>>,
        output_of: &FxHashMap<&'a str, &'a str>,
        path: &mut FxHashSet<&'a str>,
    ) -> Result<(), TopologyError> {
        if !path.insert(id) {
            return Err(TopologyError::CycleDetected(id.to_string()));
        }
        if let Some(consumers) = consumers_of.get(id) {
            for asce in consumers {
                if let Some(out) = output_of.get(asce.as_str()) {
                    visit(out, consumers_of, output_of, path)?;
                }
            }
        }
        path.remove(id);
        Ok(())
    }

    for input in dasu_inputs {
        let mut path = FxHashSet::default();
        visit(input, consumers_of, &output_of, &mut path)?;
    }
    Ok(())
}

/// Assigns every element to the first level at which all of its inputs
/// are known.
fn assign_levels(
    dasu_inputs: &FxHashSet<String>,
    entries: &[AsceTopoEntry],
) -> Result<Vec<Vec<String>>, TopologyError> {
    let mut known: FxHashSet<&str> = dasu_inputs.iter().map(String::as_str).collect();
    let mut remaining: Vec<&AsceTopoEntry> = entries.iter().collect();
    let mut levels = Vec::new();

    while !remaining.is_empty() {
        let (ready, pending): (Vec<&AsceTopoEntry>, Vec<&AsceTopoEntry>) = remaining
            .into_iter()
            .partition(|e| e.input_ids.iter().all(|i| known.contains(i.as_str())));

        if ready.is_empty() {
            // Unreachable after the cycle check, but the topology must
            // never report a partial level assignment.
            let stuck = pending
                .first()
                .map_or_else(String::new, |e| e.asce_id.clone());
            return Err(TopologyError::Unassignable(stuck));
        }

        let mut level: Vec<String> = ready.iter().map(|e| e.asce_id.clone()).collect();
        level.sort();
        for entry in &ready {
            known.insert(entry.output_id.as_str());
        }
        levels.push(level);
        remaining = pending;
    }

    Ok(levels)
}
