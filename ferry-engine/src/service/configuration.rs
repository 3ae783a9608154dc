//! Configuration store
//!
//! Holds parameter overrides per environment on top of the defaults the
//! directory declares for each flow. Edits are local until saved; a revision
//! counter keeps the store dirty when an edit lands while a save is in flight.

use ferry_client::{ArtifactDirectory, ArtifactTransport};
use ferry_core::domain::catalog::{FlowId, FlowRef, Parameter};
use ferry_core::domain::environment::{
    Environment, EnvironmentConfig, IssueSeverity, Overrides, ValidationIssue, ValidationReport,
};
use ferry_core::domain::tenant::Tenant;
use ferry_core::dto::configuration::SaveConfiguration;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time;
use tracing::{debug, info, warn};

use crate::error::{FerryError, Result};
use crate::service::call::bounded;

/// What happens to unsaved edits of the environment being left
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SwitchPolicy {
    /// Drop them
    #[default]
    Discard,
    /// Park them as a draft that is restored when switching back
    KeepDrafts,
}

/// Result of a successful environment switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchOutcome {
    pub previous: Environment,
    pub active: Environment,
    /// Unsaved overrides dropped from the previous environment
    pub discarded: usize,
}

/// Parameters fetched for one flow; failed fetches carry their error
#[derive(Debug)]
pub struct FlowParameters {
    pub parameters: Vec<Parameter>,
    pub error: Option<FerryError>,
}

impl FlowParameters {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of one autosave tick that had something to save
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutosaveEvent {
    Saved { environment: Environment },
    Failed { environment: Environment, message: String },
}

/// Running autosave task; stops when dropped
pub struct AutosaveHandle {
    events: mpsc::UnboundedReceiver<AutosaveEvent>,
    task: JoinHandle<()>,
}

impl AutosaveHandle {
    /// Waits for the next save attempt
    pub async fn next_event(&mut self) -> Option<AutosaveEvent> {
        self.events.recv().await
    }

    pub fn stop(self) {}
}

impl Drop for AutosaveHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct StoreState {
    active: Environment,
    /// Working copy for the active environment
    overrides: Overrides,
    drafts: HashMap<Environment, Overrides>,
    saved: HashMap<Environment, Overrides>,
    metadata: BTreeMap<FlowId, Vec<Parameter>>,
    dirty: bool,
    revision: u64,
}

impl StoreState {
    fn overrides_for(&self, environment: Environment) -> Overrides {
        if environment == self.active {
            return self.overrides.clone();
        }
        self.drafts
            .get(&environment)
            .or_else(|| self.saved.get(&environment))
            .cloned()
            .unwrap_or_default()
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }
}

/// Per-environment parameter overrides for one tenant
pub struct ConfigurationStore {
    tenant: Tenant,
    directory: Arc<dyn ArtifactDirectory>,
    transport: Arc<dyn ArtifactTransport>,
    switch_policy: SwitchPolicy,
    read_timeout: Duration,
    write_timeout: Duration,
    state: Mutex<StoreState>,
    save_lock: tokio::sync::Mutex<()>,
}

impl ConfigurationStore {
    pub fn new(
        tenant: Tenant,
        directory: Arc<dyn ArtifactDirectory>,
        transport: Arc<dyn ArtifactTransport>,
    ) -> Self {
        Self {
            tenant,
            directory,
            transport,
            switch_policy: SwitchPolicy::default(),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(120),
            state: Mutex::new(StoreState {
                active: Environment::Development,
                overrides: Overrides::new(),
                drafts: HashMap::new(),
                saved: HashMap::new(),
                metadata: BTreeMap::new(),
                dirty: false,
                revision: 0,
            }),
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_switch_policy(mut self, policy: SwitchPolicy) -> Self {
        self.switch_policy = policy;
        self
    }

    pub fn with_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub fn active_environment(&self) -> Environment {
        self.state.lock().unwrap().active
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.state.lock().unwrap().dirty
    }

    /// Bumped on every local edit and environment switch
    pub fn revision(&self) -> u64 {
        self.state.lock().unwrap().revision
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Fetches parameter metadata for each flow concurrently
    ///
    /// Returned values are the effective values for `environment`. A flow
    /// whose fetch fails yields an empty list with its error; the others
    /// are unaffected.
    pub async fn load_configuration(
        &self,
        flows: &[FlowId],
        environment: Environment,
    ) -> BTreeMap<FlowId, FlowParameters> {
        info!(
            "Loading configuration of {} flow(s) for {}",
            flows.len(),
            environment
        );

        let mut fetches = JoinSet::new();
        for flow_id in flows {
            let directory = Arc::clone(&self.directory);
            let tenant = self.tenant.clone();
            let flow = FlowRef::active(flow_id.clone());
            let budget = self.read_timeout;

            fetches.spawn(async move {
                let result = bounded(budget, directory.configuration(&tenant, &flow)).await;
                (flow.id, result)
            });
        }

        let mut fetched = Vec::with_capacity(flows.len());
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok(entry) => fetched.push(entry),
                Err(e) => warn!("Configuration fetch task panicked: {}", e),
            }
        }

        let mut state = self.state.lock().unwrap();
        let overrides = state.overrides_for(environment);
        let mut loaded = BTreeMap::new();

        for (flow_id, result) in fetched {
            let entry = match result {
                Ok(parameters) => {
                    debug!("Flow {} declares {} parameter(s)", flow_id, parameters.len());
                    state.metadata.insert(flow_id.clone(), parameters.clone());
                    FlowParameters {
                        parameters: apply_overrides(parameters, overrides.get(&flow_id)),
                        error: None,
                    }
                }
                Err(e) => {
                    warn!("Failed to load configuration of {}: {}", flow_id, e);
                    FlowParameters {
                        parameters: Vec::new(),
                        error: Some(e),
                    }
                }
            };
            loaded.insert(flow_id, entry);
        }

        loaded
    }

    /// Declared parameters of a flow with the active overrides applied
    pub fn effective_parameters(&self, flow_id: &str) -> Result<Vec<Parameter>> {
        let state = self.state.lock().unwrap();
        let declared = state
            .metadata
            .get(flow_id)
            .cloned()
            .ok_or_else(|| FerryError::not_found("Flow configuration", flow_id))?;

        Ok(apply_overrides(declared, state.overrides.get(flow_id)))
    }

    // ========================================================================
    // Editing
    // ========================================================================

    /// Sets an override in the active environment
    ///
    /// Local only. Keys not declared by a loaded flow are rejected.
    pub fn update_parameter(
        &self,
        flow_id: &str,
        key: &str,
        value: impl Into<String>,
    ) -> Result<()> {
        if flow_id.is_empty() || key.is_empty() {
            return Err(FerryError::Validation(
                "flow id and parameter key must not be empty".to_string(),
            ));
        }

        let mut state = self.state.lock().unwrap();
        if let Some(declared) = state.metadata.get(flow_id) {
            if !declared.iter().any(|p| p.key == key) {
                return Err(FerryError::Validation(format!(
                    "flow {} declares no parameter '{}'",
                    flow_id, key
                )));
            }
        }

        state
            .overrides
            .entry(flow_id.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
        state.touch();
        Ok(())
    }

    /// Drops an override so the declared default applies again
    pub fn reset_parameter(&self, flow_id: &str, key: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(values) = state.overrides.get_mut(flow_id) else {
            return false;
        };
        if values.remove(key).is_none() {
            return false;
        }
        if values.is_empty() {
            state.overrides.remove(flow_id);
        }
        state.touch();
        true
    }

    /// Working copy of the active environment's overrides
    pub fn overrides(&self) -> Overrides {
        self.state.lock().unwrap().overrides.clone()
    }

    /// Overrides of every environment that has any, drafts included
    pub fn configurations(&self) -> BTreeMap<Environment, EnvironmentConfig> {
        let state = self.state.lock().unwrap();
        Environment::ALL
            .into_iter()
            .filter(|env| {
                *env == state.active || state.drafts.contains_key(env) || state.saved.contains_key(env)
            })
            .map(|env| {
                let mut config = EnvironmentConfig::new(env);
                config.parameters = state.overrides_for(env);
                (env, config)
            })
            .collect()
    }

    /// Activates another environment's overrides
    ///
    /// The target gets its draft if one was kept, else its last saved set,
    /// else nothing. Unsaved edits of the environment being left follow the
    /// store's [`SwitchPolicy`].
    pub fn switch_environment(&self, environment: Environment) -> SwitchOutcome {
        let mut state = self.state.lock().unwrap();
        let previous = state.active;
        if previous == environment {
            return SwitchOutcome {
                previous,
                active: environment,
                discarded: 0,
            };
        }

        let working = std::mem::take(&mut state.overrides);
        let mut discarded = 0;

        if state.dirty {
            match self.switch_policy {
                SwitchPolicy::Discard => {
                    let empty = Overrides::new();
                    let baseline = state.saved.get(&previous).unwrap_or(&empty);
                    discarded = changed_entries(&working, baseline);
                    if discarded > 0 {
                        warn!(
                            "Discarding {} unsaved override(s) for {}",
                            discarded, previous
                        );
                    }
                }
                SwitchPolicy::KeepDrafts => {
                    debug!("Keeping unsaved overrides of {} as a draft", previous);
                    state.drafts.insert(previous, working);
                }
            }
        }

        state.active = environment;
        match state.drafts.remove(&environment) {
            Some(draft) => {
                state.overrides = draft;
                state.dirty = true;
            }
            None => {
                state.overrides = state.saved.get(&environment).cloned().unwrap_or_default();
                state.dirty = false;
            }
        }
        state.revision += 1;

        info!("Switched configuration from {} to {}", previous, environment);
        SwitchOutcome {
            previous,
            active: environment,
            discarded,
        }
    }

    // ========================================================================
    // Saving
    // ========================================================================

    /// Sends the full override set of `environment`
    ///
    /// Saves are serialized. On failure nothing local changes. Dirty state is
    /// cleared only when no edit happened while the request was in flight.
    pub async fn save(&self, environment: Environment) -> Result<()> {
        let _serialized = self.save_lock.lock().await;

        let (overrides, revision) = {
            let state = self.state.lock().unwrap();
            (state.overrides_for(environment), state.revision)
        };
        let request = SaveConfiguration::from_overrides(environment, &overrides);

        bounded(
            self.write_timeout,
            self.transport.save_configuration(&self.tenant, &request),
        )
        .await
        .inspect_err(|e| warn!("Saving {} configuration failed: {}", environment, e))?;

        let mut state = self.state.lock().unwrap();
        if state.active == environment {
            if state.revision == revision {
                state.dirty = false;
            } else {
                debug!("Overrides changed during save; {} stays dirty", environment);
            }
        } else if state.drafts.get(&environment) == Some(&overrides) {
            state.drafts.remove(&environment);
        }
        state.saved.insert(environment, overrides);

        info!(
            "Saved {} override(s) for {}",
            request.entries.iter().map(|e| e.parameters.len()).sum::<usize>(),
            environment
        );
        Ok(())
    }

    /// Saves the active environment on a fixed interval while it is dirty
    ///
    /// Never blocks the caller; outcomes arrive on the handle.
    pub fn start_autosave(self: &Arc<Self>, interval: Duration) -> AutosaveHandle {
        let (tx, events) = mpsc::unbounded_channel();
        let store = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;

                if !store.has_unsaved_changes() {
                    continue;
                }

                let environment = store.active_environment();
                debug!("Autosaving {} configuration", environment);

                let event = match store.save(environment).await {
                    Ok(()) => AutosaveEvent::Saved { environment },
                    Err(e) => AutosaveEvent::Failed {
                        environment,
                        message: e.to_string(),
                    },
                };

                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        AutosaveHandle { events, task }
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Checks every loaded flow against `environment`
    pub fn validate(&self, environment: Environment) -> ValidationReport {
        let flows: Vec<FlowId> = self.state.lock().unwrap().metadata.keys().cloned().collect();
        self.validate_flows(&flows, environment)
    }

    /// Checks mandatory values and declared data types for the given flows
    pub fn validate_flows(&self, flows: &[FlowId], environment: Environment) -> ValidationReport {
        let state = self.state.lock().unwrap();
        let overrides = state.overrides_for(environment);
        let mut report = ValidationReport::default();

        for flow_id in flows {
            let Some(declared) = state.metadata.get(flow_id) else {
                report.issues.push(ValidationIssue {
                    iflow_id: flow_id.clone(),
                    environment,
                    parameter_key: None,
                    severity: IssueSeverity::Error,
                    message: "parameter metadata has not been loaded".to_string(),
                });
                continue;
            };

            report.issues.extend(check_parameters(
                flow_id,
                environment,
                declared,
                overrides.get(flow_id),
            ));
        }

        report
    }
}

/// Mandatory values, declared data types and undeclared override keys
pub(crate) fn check_parameters(
    flow_id: &str,
    environment: Environment,
    declared: &[Parameter],
    overrides: Option<&BTreeMap<String, String>>,
) -> Vec<ValidationIssue> {
    let issue = |key: &str, severity, message: String| ValidationIssue {
        iflow_id: flow_id.to_string(),
        environment,
        parameter_key: Some(key.to_string()),
        severity,
        message,
    };
    let mut issues = Vec::new();

    for parameter in apply_overrides(declared.to_vec(), overrides) {
        let value = parameter.value.trim();
        if value.is_empty() {
            if parameter.mandatory {
                issues.push(issue(
                    &parameter.key,
                    IssueSeverity::Error,
                    format!("mandatory parameter '{}' has no value", parameter.key),
                ));
            }
            continue;
        }
        if !matches_data_type(value, &parameter.data_type) {
            issues.push(issue(
                &parameter.key,
                IssueSeverity::Error,
                format!(
                    "'{}' is not a valid {} for '{}'",
                    value, parameter.data_type, parameter.key
                ),
            ));
        }
    }

    for key in overrides.into_iter().flat_map(BTreeMap::keys) {
        if !declared.iter().any(|p| &p.key == key) {
            issues.push(issue(
                key,
                IssueSeverity::Warning,
                format!("override for undeclared parameter '{}'", key),
            ));
        }
    }

    issues
}

fn apply_overrides(
    mut parameters: Vec<Parameter>,
    overrides: Option<&BTreeMap<String, String>>,
) -> Vec<Parameter> {
    if let Some(overrides) = overrides {
        for parameter in &mut parameters {
            if let Some(value) = overrides.get(&parameter.key) {
                parameter.value = value.clone();
            }
        }
    }
    parameters
}

/// Entries added, changed or removed in `working` relative to `baseline`
fn changed_entries(working: &Overrides, baseline: &Overrides) -> usize {
    let lookup = |map: &Overrides, flow: &str, key: &str| {
        map.get(flow).and_then(|values| values.get(key)).cloned()
    };

    let changed = working
        .iter()
        .flat_map(|(flow, values)| values.iter().map(move |(key, value)| (flow, key, value)))
        .filter(|(flow, key, value)| lookup(baseline, flow, key).as_ref() != Some(*value))
        .count();
    let removed = baseline
        .iter()
        .flat_map(|(flow, values)| values.keys().map(move |key| (flow, key)))
        .filter(|(flow, key)| lookup(working, flow, key).is_none())
        .count();

    changed + removed
}

fn matches_data_type(value: &str, data_type: &str) -> bool {
    let kind = data_type.rsplit(':').next().unwrap_or(data_type);
    match kind.to_ascii_lowercase().as_str() {
        "integer" | "int" | "long" | "short" => value.parse::<i64>().is_ok(),
        "decimal" | "double" | "float" => value.parse::<f64>().is_ok(),
        "boolean" => matches!(value, "true" | "false" | "1" | "0"),
        _ => true,
    }
}
