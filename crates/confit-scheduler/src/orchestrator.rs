//! Deployment orchestrator - deploys configs layer by layer in dependency order.

use bytes::Bytes;
use confit_config::{EngineSettings, InterpolatingRenderer, Renderer, Resolver};
use confit_core::{
    ConfigObject, Coordinate, EntityMap, Error, Properties, ResolvedEntity, Result,
};
use confit_deployer::Deployer;
use futures::StreamExt;
use futures::stream;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::graph::DependencyGraph;
use crate::report::{
    DETAIL_DUPLICATE_OF, DETAIL_SKIPPED_BY, Detail, NoopRecorder, Record, Recorder,
};

const CANCELLED_REASON: &str = "deployment cancelled";

/// State of a config during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigState {
    Pending,
    Deploying,
    Deployed,
    Failed { message: String },
    Excluded,
    Skipped { reason: String },
}

impl ConfigState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConfigState::Deployed
                | ConfigState::Failed { .. }
                | ConfigState::Excluded
                | ConfigState::Skipped { .. }
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConfigState::Deployed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfigState::Pending => "pending",
            ConfigState::Deploying => "deploying",
            ConfigState::Deployed => "deployed",
            ConfigState::Failed { .. } => "failed",
            ConfigState::Excluded => "excluded",
            ConfigState::Skipped { .. } => "skipped",
        }
    }
}

/// Event emitted during a run.
#[derive(Debug, Clone)]
pub enum DeployEvent {
    LayerStarted {
        index: usize,
        configs: Vec<Coordinate>,
    },
    ConfigStarted {
        coordinate: Coordinate,
    },
    ConfigCompleted {
        coordinate: Coordinate,
        state: ConfigState,
    },
    RunCompleted {
        success: bool,
    },
}

/// Number of configs per terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub deployed: usize,
    pub failed: usize,
    pub excluded: usize,
    pub skipped: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} deployed, {} failed, {} excluded, {} skipped",
            self.deployed, self.failed, self.excluded, self.skipped
        )
    }
}

/// Result of a run.
#[derive(Debug)]
pub struct DeployResult {
    /// No config failed and the run was not cancelled.
    pub success: bool,
    pub cancelled: bool,
    pub states: BTreeMap<Coordinate, ConfigState>,
    /// Configs dispatched together, in dispatch order.
    pub layers: Vec<Vec<Coordinate>>,
    /// Entities of deployed configs.
    pub entities: BTreeMap<Coordinate, ResolvedEntity>,
}

impl DeployResult {
    pub fn state(&self, coordinate: &Coordinate) -> Option<&ConfigState> {
        self.states.get(coordinate)
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for state in self.states.values() {
            match state {
                ConfigState::Deployed => summary.deployed += 1,
                ConfigState::Failed { .. } => summary.failed += 1,
                ConfigState::Excluded => summary.excluded += 1,
                ConfigState::Skipped { .. } => summary.skipped += 1,
                ConfigState::Pending | ConfigState::Deploying => {}
            }
        }
        summary
    }

    /// Failed configs with their error messages.
    pub fn failures(&self) -> impl Iterator<Item = (&Coordinate, &str)> {
        self.states.iter().filter_map(|(c, s)| match s {
            ConfigState::Failed { message } => Some((c, message.as_str())),
            _ => None,
        })
    }
}

/// A config that passed resolution, rendering and the duplicate check.
struct Prepared {
    config: ConfigObject,
    properties: Properties,
    rendered: Bytes,
    identity: Option<(String, String)>,
}

enum Attempt {
    Done(Result<ResolvedEntity>),
    Cancelled,
}

/// Mutable state of a single run.
struct RunState<'a> {
    graph: &'a DependencyGraph,
    states: BTreeMap<Coordinate, ConfigState>,
    entities: EntityMap,
}

impl RunState<'_> {
    fn is_pending(&self, coordinate: &Coordinate) -> bool {
        matches!(self.states.get(coordinate), Some(ConfigState::Pending))
    }

    /// Pending configs whose predecessors are all terminal, in coordinate order.
    fn ready(&self) -> Vec<Coordinate> {
        self.states
            .iter()
            .filter(|(c, s)| {
                matches!(s, ConfigState::Pending)
                    && self.graph.predecessors(c).all(|p| {
                        self.states
                            .get(p)
                            .map(ConfigState::is_terminal)
                            .unwrap_or(false)
                    })
            })
            .map(|(c, _)| c.clone())
            .collect()
    }

    fn undeployed_predecessors(&self, coordinate: &Coordinate) -> Vec<Coordinate> {
        self.graph
            .predecessors(coordinate)
            .filter(|p| !self.states.get(*p).is_some_and(ConfigState::is_success))
            .cloned()
            .collect()
    }
}

/// Deploys a set of configs in dependency order.
#[derive(Clone)]
pub struct DeployOrchestrator {
    deployer: Deployer,
    renderer: Arc<dyn Renderer>,
    resolver: Resolver,
    settings: EngineSettings,
    recorder: Arc<dyn Recorder>,
    events: Option<mpsc::Sender<DeployEvent>>,
}

impl DeployOrchestrator {
    /// Create an orchestrator that resolves environment parameters against
    /// the process environment and records nothing.
    pub fn new(deployer: Deployer, settings: EngineSettings) -> Self {
        Self {
            deployer,
            renderer: Arc::new(InterpolatingRenderer::new()),
            resolver: Resolver::from_process_env(),
            settings,
            recorder: Arc::new(NoopRecorder),
            events: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<DeployEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run in the background, returning a channel of events and a handle to
    /// get the final result.
    ///
    /// The channel is bounded and the run waits for room on every event, so
    /// drain the receiver before awaiting the handle.
    pub fn execute(
        &self,
        objects: Vec<ConfigObject>,
        cancel: CancellationToken,
    ) -> (
        mpsc::Receiver<DeployEvent>,
        tokio::task::JoinHandle<Result<DeployResult>>,
    ) {
        let (tx, rx) = mpsc::channel(100);
        let orchestrator = self.clone().with_events(tx);

        let handle = tokio::spawn(async move { orchestrator.run(&objects, &cancel).await });

        (rx, handle)
    }

    /// Deploy `objects`.
    ///
    /// Fails only if the dependency graph has a cycle, in which case nothing
    /// is deployed or recorded. Every other error is confined to the config
    /// it occurred for: the config fails and its descendants are skipped.
    pub async fn run(
        &self,
        objects: &[ConfigObject],
        cancel: &CancellationToken,
    ) -> Result<DeployResult> {
        let graph = DependencyGraph::build(objects)?;

        let mut configs: BTreeMap<&Coordinate, &ConfigObject> = BTreeMap::new();
        for object in objects {
            configs.entry(&object.coordinate).or_insert(object);
        }

        let mut run = RunState {
            graph: &graph,
            states: configs
                .keys()
                .map(|c| ((*c).clone(), ConfigState::Pending))
                .collect(),
            entities: EntityMap::new(),
        };

        info!(configs = configs.len(), "Starting deployment");

        let excluded: Vec<&ConfigObject> = configs.values().copied().filter(|c| c.skip).collect();
        for config in &excluded {
            self.exclude(&mut run, config).await;
        }
        for config in &excluded {
            self.cascade(&mut run, &config.coordinate, "was excluded")
                .await;
        }

        let mut layers = Vec::new();
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let ready = run.ready();
            if ready.is_empty() {
                break;
            }

            // Of two ready configs sharing an identity only the first in
            // coordinate order is dispatched; the other waits for the next
            // pass and is checked against what actually deployed.
            let mut prepared = Vec::with_capacity(ready.len());
            let mut rejected = Vec::new();
            let mut reserved: HashMap<(String, String), Coordinate> = HashMap::new();
            let mut dispatched = Vec::with_capacity(ready.len());
            for coordinate in &ready {
                let Some(config) = configs.get(coordinate).copied() else {
                    continue;
                };
                match self.prepare(&run, config) {
                    Ok(p) => {
                        if let Some(identity) = &p.identity {
                            if let Some(holder) = reserved.get(identity) {
                                debug!(coordinate = %coordinate, holder = %holder, "Holding back config with a contested name");
                                continue;
                            }
                            reserved.insert(identity.clone(), coordinate.clone());
                        }
                        prepared.push(p);
                    }
                    Err(failure) => rejected.push((coordinate.clone(), failure)),
                }
                dispatched.push(coordinate.clone());
            }

            info!(layer = layers.len(), configs = dispatched.len(), "Deploying layer");
            self.emit(DeployEvent::LayerStarted {
                index: layers.len(),
                configs: dispatched.clone(),
            })
            .await;

            for (coordinate, (e, details)) in rejected {
                self.fail(&mut run, &coordinate, e, details).await;
            }

            for p in &prepared {
                run.states
                    .insert(p.config.coordinate.clone(), ConfigState::Deploying);
                self.emit(DeployEvent::ConfigStarted {
                    coordinate: p.config.coordinate.clone(),
                })
                .await;
            }

            let deployer = &self.deployer;
            let timeout = self.settings.attempt_timeout;
            let mut outcomes: Vec<(Prepared, Attempt)> = stream::iter(prepared)
                .map(|p| attempt(deployer.clone(), p, cancel.clone(), timeout))
                .buffer_unordered(self.settings.concurrency.max(1))
                .collect()
                .await;
            outcomes.sort_by(|a, b| a.0.config.coordinate.cmp(&b.0.config.coordinate));

            for (p, outcome) in outcomes {
                let coordinate = p.config.coordinate.clone();
                match outcome {
                    Attempt::Done(Ok(entity)) => {
                        if let Some((api, name)) = &p.identity {
                            run.entities.claim_name(api, name, &coordinate);
                        }
                        run.entities.insert(entity);
                        info!(coordinate = %coordinate, "Config deployed");
                        self.complete(&mut run, &coordinate, ConfigState::Deployed)
                            .await;
                        self.recorder.record(Record::success(coordinate));
                    }
                    Attempt::Done(Err(e)) => self.fail(&mut run, &coordinate, e, Vec::new()).await,
                    Attempt::Cancelled => {
                        cancelled = true;
                        run.states
                            .insert(coordinate, ConfigState::Pending);
                    }
                }
            }

            layers.push(dispatched);
        }

        if cancelled {
            let pending: Vec<Coordinate> = run
                .states
                .iter()
                .filter(|(_, s)| matches!(s, ConfigState::Pending))
                .map(|(c, _)| c.clone())
                .collect();
            warn!(remaining = pending.len(), "Deployment cancelled");
            for coordinate in pending {
                self.skip(&mut run, &coordinate, CANCELLED_REASON.to_string())
                    .await;
            }
        }

        let success = !cancelled
            && !run
                .states
                .values()
                .any(|s| matches!(s, ConfigState::Failed { .. }));

        let result = DeployResult {
            success,
            cancelled,
            states: run.states,
            layers,
            entities: run
                .entities
                .snapshot()
                .into_iter()
                .filter(|(_, entity)| !entity.skip)
                .collect(),
        };
        info!(summary = %result.summary(), success, "Deployment finished");
        self.emit(DeployEvent::RunCompleted { success }).await;

        Ok(result)
    }

    /// Resolve, render and check the identity of a config before dispatch.
    ///
    /// A name collides only with a config that already deployed under it.
    fn prepare(
        &self,
        run: &RunState<'_>,
        config: &ConfigObject,
    ) -> std::result::Result<Prepared, (Error, Vec<Detail>)> {
        let coordinate = &config.coordinate;

        let properties = self
            .resolver
            .resolve(config, &run.entities)
            .map_err(|e| match e {
                Error::UnresolvedReference {
                    config,
                    target,
                    property,
                    ..
                } if !run.graph.contains(&target) => Error::UnresolvedReference {
                    config,
                    target,
                    property,
                    reason: "referenced config is not part of this deployment".to_string(),
                },
                other => other,
            })
            .map_err(|e| (e, Vec::new()))?;

        let rendered = self
            .renderer
            .render(&config.template, &properties)
            .map_err(|e| (e, Vec::new()))?;

        let identity = self
            .deployer
            .identity_key(config, &properties)
            .map_err(|e| (e, Vec::new()))?;

        if let Some((api, name)) = &identity {
            let existing = run
                .entities
                .name_owner(api, name)
                .filter(|owner| owner != coordinate);

            if let Some(existing) = existing {
                let detail = Detail::new(DETAIL_DUPLICATE_OF, existing.to_string());
                return Err((
                    Error::DuplicateIdentity {
                        config: coordinate.clone(),
                        existing,
                        api: api.clone(),
                        name: name.clone(),
                    },
                    vec![detail],
                ));
            }
        }

        Ok(Prepared {
            config: config.clone(),
            properties,
            rendered,
            identity,
        })
    }

    async fn exclude(&self, run: &mut RunState<'_>, config: &ConfigObject) {
        let coordinate = &config.coordinate;
        info!(coordinate = %coordinate, "Config excluded from deployment");

        run.entities.insert(ResolvedEntity {
            coordinate: coordinate.clone(),
            remote_id: String::new(),
            entity_name: None,
            properties: Properties::new(),
            skip: true,
        });
        self.complete(run, coordinate, ConfigState::Excluded).await;
        self.recorder.record(Record::excluded(coordinate.clone()));
    }

    async fn fail(
        &self,
        run: &mut RunState<'_>,
        coordinate: &Coordinate,
        err: Error,
        details: Vec<Detail>,
    ) {
        error!(coordinate = %coordinate, error = %err, "Config failed");
        let message = err.to_string();

        self.complete(
            run,
            coordinate,
            ConfigState::Failed {
                message: message.clone(),
            },
        )
        .await;

        let mut record = Record::failed(coordinate.clone(), message);
        record.details = details;
        self.recorder.record(record);

        self.cascade(run, coordinate, "failed").await;
    }

    /// Skip every pending descendant of `origin`.
    async fn cascade(&self, run: &mut RunState<'_>, origin: &Coordinate, cause: &str) {
        let descendants: Vec<Coordinate> = run
            .graph
            .descendants(origin)
            .into_iter()
            .filter(|c| run.is_pending(c))
            .collect();

        if descendants.is_empty() {
            return;
        }
        info!(origin = %origin, skipped = descendants.len(), "Skipping dependents");

        // mark all first so each record lists its final undeployed predecessors
        let reason = format!("depends on {} which {}", origin, cause);
        for coordinate in &descendants {
            run.states.insert(
                coordinate.clone(),
                ConfigState::Skipped {
                    reason: reason.clone(),
                },
            );
        }
        for coordinate in descendants {
            self.emit(DeployEvent::ConfigCompleted {
                coordinate: coordinate.clone(),
                state: ConfigState::Skipped {
                    reason: reason.clone(),
                },
            })
            .await;
            self.recorder
                .record(skipped_record(run, coordinate));
        }
    }

    async fn skip(&self, run: &mut RunState<'_>, coordinate: &Coordinate, reason: String) {
        self.complete(run, coordinate, ConfigState::Skipped { reason })
            .await;
        self.recorder
            .record(skipped_record(run, coordinate.clone()));
    }

    async fn complete(&self, run: &mut RunState<'_>, coordinate: &Coordinate, state: ConfigState) {
        run.states.insert(coordinate.clone(), state.clone());
        self.emit(DeployEvent::ConfigCompleted {
            coordinate: coordinate.clone(),
            state,
        })
        .await;
    }

    async fn emit(&self, event: DeployEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

async fn attempt(
    deployer: Deployer,
    p: Prepared,
    cancel: CancellationToken,
    timeout: Duration,
) -> (Prepared, Attempt) {
    if cancel.is_cancelled() {
        return (p, Attempt::Cancelled);
    }

    let deploy = deployer.deploy(&p.config, p.properties.clone(), p.rendered.clone());
    let result = match tokio::time::timeout(timeout, deploy).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(timeout)),
    };
    (p, Attempt::Done(result))
}

fn skipped_record(run: &RunState<'_>, coordinate: Coordinate) -> Record {
    let details = run
        .undeployed_predecessors(&coordinate)
        .into_iter()
        .map(|p| Detail::new(DETAIL_SKIPPED_BY, p.to_string()))
        .collect();
    Record {
        details,
        ..Record::skipped(coordinate)
    }
}
