//! The pipeline coordinator: owns a production line and runs its tick loop.
//!
//! # Architecture
//!
//! The `Coordinator` owns:
//! - A [`StageRegistry`] (name → stage, kind → names)
//! - A [`WiringGraph`] of stage-to-stage output links
//! - A [`TokenIndex`] of live tokens
//! - A [`SimState`] clock, a [`SimRng`] and a [`TokenFactory`]
//! - An [`EventBus`] for typed notifications
//!
//! # Four-Phase Step
//!
//! Each `step()` runs:
//! 1. **Process** -- every active stage runs its tick body; emissions go to
//!    the outbox
//! 2. **Deliver** -- emissions are handed to their target stages in emission
//!    order
//! 3. **Post-tick** -- changed stages are reported, buffered events are
//!    delivered to listeners
//! 4. **Bookkeeping** -- tick counter and state hash
//!
//! Because delivery happens after every stage has run, the order in which
//! stages are processed never changes timing: a token emitted during tick
//! `N` is first seen by its target at tick `N + 1`.

use crate::config::{
    BuildError, ConfigIssue, PipelineConfig, ReceiverMode, Severity, StageConfig, StageKindConfig,
    WeightError,
};
use crate::event::{Event, EventBus, EventFilter, EventKind, PassiveListener, SubscriberPriority};
use crate::factory::{StandardFactory, TokenFactory};
use crate::fixed::Ticks;
use crate::graph::WiringGraph;
use crate::id::{StageId, TokenId};
use crate::query::StageSnapshot;
use crate::registry::StageRegistry;
use crate::rng::SimRng;
use crate::sim::{AdvanceResult, SimState, SimulationStrategy, StateHash};
use crate::stage::quality::resolve_routes;
use crate::stage::splitter::validate_weights;
use crate::stage::{
    Assembler, Buffer, Conveyor, Emission, FlowSplitter, Provider, QualityGate, Receiver,
    RoutingError, Stage, StageBehavior, StageContext, StageHealth, StageKind,
};
use crate::token::{Token, TokenKind, composition_rule};
use crate::token_index::TokenIndex;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from runtime control operations on a built line.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControlError {
    #[error("unknown stage '{name}'")]
    UnknownStage { name: String },

    #[error("stage '{name}' is not a flow splitter")]
    NotASplitter { name: String },

    #[error("splitter '{name}': {source}")]
    Weights {
        name: String,
        #[source]
        source: WeightError,
    },

    #[error("stage '{name}' refused the token: {reason}")]
    Refused { name: String, reason: RoutingError },

    #[error("cannot create {kind} tokens")]
    NotBasic { kind: TokenKind },
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Owns a production line and drives it tick by tick.
pub struct Coordinator {
    title: String,
    registry: StageRegistry,
    graph: WiringGraph,
    tokens: TokenIndex,
    factory: Box<dyn TokenFactory>,
    rng: SimRng,
    strategy: SimulationStrategy,
    pub sim_state: SimState,
    paused: bool,
    /// Emissions waiting for the deliver phase.
    outbox: Vec<Emission>,
    issues: Vec<ConfigIssue>,
    pub event_bus: EventBus,
    loaded: bool,
    last_state_hash: u64,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("title", &self.title)
            .field("stages", &self.registry.len())
            .field("live_tokens", &self.tokens.len())
            .field("tick", &self.sim_state.tick)
            .field("paused", &self.paused)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Build a line with the standard token factory. Unusable geometry is
    /// fatal.
    pub fn build(config: &PipelineConfig) -> Result<Self, BuildError> {
        let factory = match &config.geometry {
            Some(geometry) => StandardFactory::from_config(geometry)?,
            None => StandardFactory::default(),
        };
        Self::build_with_factory(config, Box::new(factory))
    }

    /// Build a line with a caller-supplied token factory.
    ///
    /// Duplicate names, unknown outputs and bad splitter weights are fatal.
    /// Other wiring problems are recorded as [`ConfigIssue`]s; faults leave
    /// the affected stage non-functional.
    pub fn build_with_factory(
        config: &PipelineConfig,
        factory: Box<dyn TokenFactory>,
    ) -> Result<Self, BuildError> {
        let mut registry = StageRegistry::new();
        let mut graph = WiringGraph::new();
        let mut issues = Vec::new();

        for stage_config in &config.stages {
            let (behavior, problem) = behavior_for(stage_config);
            let id = registry.insert(Stage::new(&stage_config.name, behavior))?;
            graph.add_stage(id);
            if let Some(detail) = problem {
                issues.push(ConfigIssue::InvalidParameter {
                    stage: stage_config.name.clone(),
                    detail,
                });
            }
        }

        for stage_config in &config.stages {
            let Some(from) = registry.id_of(&stage_config.name) else {
                continue;
            };
            for output in &stage_config.outputs {
                let to = registry.id_of(output).ok_or_else(|| BuildError::UnknownOutput {
                    stage: stage_config.name.clone(),
                    output: output.clone(),
                })?;
                // Both ends were just registered, so this only reports
                // duplicates.
                if let Ok(false) = graph.connect(from, to) {
                    issues.push(ConfigIssue::DuplicateOutput {
                        stage: stage_config.name.clone(),
                        output: output.clone(),
                    });
                }
            }
        }

        for stage_config in &config.stages {
            validate_stage(stage_config, &mut registry, &graph, &mut issues)?;
        }

        for issue in &issues {
            match issue.severity() {
                Severity::Warning => tracing::warn!(stage = %issue.stage(), %issue, "configuration warning"),
                Severity::Fault => tracing::error!(stage = %issue.stage(), %issue, "configuration error"),
            }
            if issue.severity() == Severity::Fault
                && let Some(id) = registry.id_of(issue.stage())
                && let Some(stage) = registry.get_mut(id)
                && stage.health.is_ready()
            {
                stage.health = StageHealth::Faulted(issue.to_string());
            }
        }

        let paused = config.simulation.start_paused;
        if paused {
            for stage in registry.stages.values_mut() {
                stage.paused = true;
            }
        }

        tracing::info!(
            title = %config.title,
            stages = registry.len(),
            edges = graph.edge_count(),
            issues = issues.len(),
            "line built"
        );

        Ok(Self {
            title: config.title.clone(),
            registry,
            graph,
            tokens: TokenIndex::new(),
            factory,
            rng: SimRng::new(config.simulation.seed()),
            strategy: SimulationStrategy::Tick,
            sim_state: SimState::new(),
            paused,
            outbox: Vec::new(),
            issues,
            event_bus: EventBus::new(config.simulation.event_capacity),
            loaded: false,
            last_state_hash: 0,
        })
    }

    /// Use a different time-advance strategy.
    pub fn with_strategy(mut self, strategy: SimulationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Announce the built line to listeners. Runs once; `step()` calls it
    /// if it has not been called yet.
    pub fn initialize(&mut self) {
        if self.loaded {
            return;
        }
        self.loaded = true;
        let tick = self.sim_state.tick;
        self.event_bus.emit(Event::ObjectsLoaded {
            stages: self.registry.len(),
            tick,
        });
        for id in self.registry.order().to_vec() {
            self.notify_stage_changed(id);
        }
        self.event_bus.deliver();
        tracing::info!(title = %self.title, "line initialized");
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Problems found while building, in discovery order.
    pub fn issues(&self) -> &[ConfigIssue] {
        &self.issues
    }

    pub fn tick(&self) -> Ticks {
        self.sim_state.tick
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &WiringGraph {
        &self.graph
    }

    pub fn stage_id(&self, name: &str) -> Option<StageId> {
        self.registry.id_of(name)
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.registry.by_name(name)
    }

    /// Tokens held by a stage, oldest first. Empty for unknown stages.
    pub fn held_tokens(&self, name: &str) -> Vec<&Token> {
        self.registry
            .by_name(name)
            .map(|s| s.behavior.held_tokens())
            .unwrap_or_default()
    }

    pub fn live_token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Most recently computed state hash.
    pub fn state_hash(&self) -> u64 {
        self.last_state_hash
    }

    // -----------------------------------------------------------------------
    // Token index
    // -----------------------------------------------------------------------

    /// Add a token to the live index. `false` if its id is already live.
    pub fn register_token(&mut self, token: &Token) -> bool {
        let stage_name = self
            .registry
            .name_of(token.creation_stage())
            .unwrap_or_default()
            .to_owned();
        self.tokens
            .register(token, &stage_name, self.sim_state.tick, &mut self.event_bus)
    }

    /// Record that a live token is now at `stage`. `false` for unknown ids
    /// or stages.
    pub fn update_token(&mut self, id: &TokenId, stage: &str) -> bool {
        let Some(stage_id) = self.registry.id_of(stage) else {
            return false;
        };
        self.tokens
            .update(id, stage_id, stage, self.sim_state.tick, &mut self.event_bus)
    }

    /// Remove a token from the live index. Idempotent.
    pub fn retire_token(&mut self, id: &TokenId) -> bool {
        self.tokens.retire(id, self.sim_state.tick, &mut self.event_bus)
    }

    // -----------------------------------------------------------------------
    // Notifications and selection
    // -----------------------------------------------------------------------

    /// Raise `StageChanged` with the stage's current stats.
    pub fn notify_stage_changed(&mut self, id: StageId) -> bool {
        let Some(stage) = self.registry.get(id) else {
            return false;
        };
        let event = Event::StageChanged {
            stage: id,
            kind: stage.kind(),
            name: stage.name.clone(),
            stats: self.describe_stage(id),
            tick: self.sim_state.tick,
        };
        self.event_bus.emit(event);
        true
    }

    /// Raise `StageSelected` for a UI consumer.
    pub fn select_stage(&mut self, name: &str) -> bool {
        let Some(id) = self.registry.id_of(name) else {
            return false;
        };
        let kind = self.registry.get(id).map(Stage::kind);
        let Some(kind) = kind else {
            return false;
        };
        let event = Event::StageSelected {
            stage: id,
            kind,
            name: name.to_owned(),
            stats: self.describe_stage(id),
            tick: self.sim_state.tick,
        };
        self.event_bus.emit(event);
        true
    }

    /// Raise `TokenSelected` for a UI consumer.
    pub fn select_token(&mut self, id: &TokenId) -> bool {
        let Some(record) = self.tokens.get(id) else {
            return false;
        };
        let event = Event::TokenSelected {
            token: id.clone(),
            stats: record.stats(),
            tick: self.sim_state.tick,
        };
        self.event_bus.emit(event);
        true
    }

    /// Suppress an event kind. Suppressed events are never buffered.
    pub fn suppress_event(&mut self, kind: EventKind) {
        self.event_bus.suppress(kind);
    }

    pub fn on_passive(&mut self, kind: EventKind, listener: PassiveListener) {
        self.event_bus.on_passive(kind, listener);
    }

    pub fn on_passive_filtered(
        &mut self,
        kind: EventKind,
        priority: SubscriberPriority,
        filter: Option<EventFilter>,
        listener: PassiveListener,
    ) {
        self.event_bus
            .on_passive_filtered(kind, priority, filter, listener);
    }

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------

    /// Pause or resume every stage and raise `SimulationPaused`.
    ///
    /// Paused stages skip their tick body but still accept deliveries. Their
    /// timers keep the progress they had.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        for stage in self.registry.stages.values_mut() {
            stage.paused = paused;
        }
        self.event_bus.emit(Event::SimulationPaused {
            paused,
            tick: self.sim_state.tick,
        });
        tracing::info!(paused, tick = self.sim_state.tick, "pause changed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Pause or resume a single stage.
    pub fn set_stage_paused(&mut self, name: &str, paused: bool) -> Result<(), ControlError> {
        let id = self.require(name)?;
        if let Some(stage) = self.registry.get_mut(id) {
            stage.paused = paused;
        }
        tracing::debug!(stage = %name, paused, "stage pause changed");
        self.notify_stage_changed(id);
        Ok(())
    }

    /// Cut a stage out of delivery: tokens addressed to it are rejected and
    /// its tick body stops running.
    pub fn disable_stage(&mut self, name: &str) -> Result<(), ControlError> {
        self.set_enabled(name, false)
    }

    pub fn enable_stage(&mut self, name: &str) -> Result<(), ControlError> {
        self.set_enabled(name, true)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), ControlError> {
        let id = self.require(name)?;
        if let Some(stage) = self.registry.get_mut(id) {
            stage.enabled = enabled;
        }
        tracing::info!(stage = %name, enabled, "stage enablement changed");
        self.notify_stage_changed(id);
        Ok(())
    }

    /// Replace a splitter's weights. The weights are validated against the
    /// splitter's outputs; on error nothing changes.
    pub fn set_splitter_weights(&mut self, name: &str, weights: &[f64]) -> Result<(), ControlError> {
        let id = self.require(name)?;
        let outputs = self.graph.outputs(id).len();
        let Some(Stage {
            behavior: StageBehavior::FlowSplitter(splitter),
            ..
        }) = self.registry.get_mut(id)
        else {
            return Err(ControlError::NotASplitter {
                name: name.to_owned(),
            });
        };
        let weights = validate_weights(weights, outputs).map_err(|source| ControlError::Weights {
            name: name.to_owned(),
            source,
        })?;
        splitter.set_weights(weights);
        tracing::debug!(stage = %name, "splitter weights replaced");
        self.notify_stage_changed(id);
        Ok(())
    }

    /// Create a basic token and hand it straight to a stage, bypassing the
    /// outbox. Returns the new token's id.
    pub fn inject(&mut self, name: &str, kind: TokenKind) -> Result<TokenId, ControlError> {
        if !kind.is_basic() {
            return Err(ControlError::NotBasic { kind });
        }
        let id = self.require(name)?;
        self.check_accepting(id, name)?;
        let tick = self.sim_state.tick;
        let Self {
            registry,
            graph,
            tokens,
            factory,
            rng,
            event_bus,
            outbox,
            ..
        } = self;
        let Some(stage) = registry.stages.get_mut(id) else {
            return Err(ControlError::UnknownStage {
                name: name.to_owned(),
            });
        };
        let Stage { name, behavior, .. } = stage;
        let mut ctx = StageContext {
            tick,
            stage: id,
            name,
            outputs: graph.outputs(id),
            rng,
            factory: &**factory,
            tokens,
            events: event_bus,
            outbox,
        };
        let token = ctx
            .create_token(kind)
            .ok_or(ControlError::NotBasic { kind })?;
        let token_id = token.id().clone();
        behavior.accept(token, &mut ctx);
        self.notify_stage_changed(id);
        Ok(token_id)
    }

    /// Hand an existing token to a stage. It is registered as live if it
    /// is not already.
    pub fn inject_token(&mut self, name: &str, token: Token) -> Result<(), ControlError> {
        let id = self.require(name)?;
        self.check_accepting(id, name)?;
        if !self.tokens.contains(token.id()) {
            self.register_token(&token);
        }
        let tick = self.sim_state.tick;
        let Self {
            registry,
            graph,
            tokens,
            factory,
            rng,
            event_bus,
            outbox,
            ..
        } = self;
        let Some(stage) = registry.stages.get_mut(id) else {
            return Err(ControlError::UnknownStage {
                name: name.to_owned(),
            });
        };
        tokens.update(token.id(), id, &stage.name, tick, event_bus);
        let Stage { name, behavior, .. } = stage;
        let mut ctx = StageContext {
            tick,
            stage: id,
            name,
            outputs: graph.outputs(id),
            rng,
            factory: &**factory,
            tokens,
            events: event_bus,
            outbox,
        };
        behavior.accept(token, &mut ctx);
        self.notify_stage_changed(id);
        Ok(())
    }

    fn require(&self, name: &str) -> Result<StageId, ControlError> {
        self.registry
            .id_of(name)
            .ok_or_else(|| ControlError::UnknownStage {
                name: name.to_owned(),
            })
    }

    fn check_accepting(&self, id: StageId, name: &str) -> Result<(), ControlError> {
        match self.registry.get(id).and_then(refusal) {
            Some(reason) => Err(ControlError::Refused {
                name: name.to_owned(),
                reason,
            }),
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Query API
    // -----------------------------------------------------------------------

    /// Kinds with at least one stage.
    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.registry.kinds()
    }

    /// Names of stages of `kind`, in declared order.
    pub fn stage_names(&self, kind: StageKind) -> Vec<String> {
        self.registry.names_of(kind).to_vec()
    }

    /// Human-readable stats of a stage. Empty if there is no stage of that
    /// kind and name.
    pub fn stage_stats(&self, kind: StageKind, name: &str) -> String {
        match self.registry.id_of(name) {
            Some(id) if self.registry.get(id).map(Stage::kind) == Some(kind) => {
                self.describe_stage(id)
            }
            _ => String::new(),
        }
    }

    /// Ids of every live token, ascending.
    pub fn live_token_ids(&self) -> Vec<TokenId> {
        self.tokens.ids()
    }

    /// Human-readable stats of a live token. Empty if it is not live.
    pub fn token_stats(&self, id: &TokenId) -> String {
        self.tokens
            .get(id)
            .map(|record| record.stats())
            .unwrap_or_default()
    }

    pub fn stage_snapshot(&self, name: &str) -> Option<StageSnapshot> {
        let id = self.registry.id_of(name)?;
        let stage = self.registry.get(id)?;
        Some(StageSnapshot {
            id,
            name: stage.name.clone(),
            kind: stage.kind(),
            health: stage.health.clone(),
            paused: stage.paused,
            enabled: stage.enabled,
            inputs: self.names(self.graph.inputs(id)),
            outputs: self.names(self.graph.outputs(id)),
            held: stage
                .behavior
                .held_tokens()
                .into_iter()
                .map(|t| t.id().clone())
                .collect(),
            progress: stage.behavior.progress(),
            emitted: stage.emitted,
        })
    }

    fn names(&self, ids: &[StageId]) -> Vec<String> {
        ids.iter()
            .filter_map(|&id| self.registry.name_of(id))
            .map(str::to_owned)
            .collect()
    }

    fn describe_stage(&self, id: StageId) -> String {
        let Some(stage) = self.registry.get(id) else {
            return String::new();
        };
        let status = match (&stage.health, stage.enabled, stage.paused) {
            (StageHealth::Faulted(_), _, _) => stage.health.to_string(),
            (_, false, _) => "Disabled".to_string(),
            (_, true, true) => "Paused".to_string(),
            (_, true, false) => "Running".to_string(),
        };
        let mut out = format!(
            "Name: {}\nType: {}\nInputs: {}\nOutputs: {}\nStatus: {}\n",
            stage.name,
            stage.kind(),
            self.names(self.graph.inputs(id)).join(", "),
            self.names(self.graph.outputs(id)).join(", "),
            status,
        );
        stage.behavior.describe(&mut out);
        out
    }

    // -----------------------------------------------------------------------
    // Advance
    // -----------------------------------------------------------------------

    /// Advance according to the configured strategy.
    ///
    /// - **Tick mode**: runs `dt` steps.
    /// - **Delta mode**: `dt` is accumulated; as many fixed steps run as fit.
    pub fn advance(&mut self, dt: Ticks) -> AdvanceResult {
        let mut result = AdvanceResult::default();
        let steps = self.strategy.steps_for(&mut self.sim_state, dt);
        for _ in 0..steps {
            self.step_internal(&mut result);
        }
        result
    }

    /// Run a single step.
    pub fn step(&mut self) -> AdvanceResult {
        let mut result = AdvanceResult::default();
        self.step_internal(&mut result);
        result
    }

    fn step_internal(&mut self, result: &mut AdvanceResult) {
        if !self.loaded {
            self.initialize();
        }
        let tick = self.sim_state.tick;
        let mut changed = Vec::new();

        // Phase 1: Process -- stage tick bodies.
        self.phase_process(tick, &mut changed);

        // Phase 2: Deliver -- emissions reach their targets.
        self.phase_deliver(tick, &mut changed, result);

        // Phase 3: Post-tick -- change notifications, event delivery.
        self.phase_post_tick(&changed);

        // Phase 4: Bookkeeping -- tick counter, state hash.
        self.phase_bookkeeping();

        result.steps_run += 1;
    }

    // -----------------------------------------------------------------------
    // Phase 1: Process
    // -----------------------------------------------------------------------

    fn phase_process(&mut self, tick: Ticks, changed: &mut Vec<StageId>) {
        let Self {
            registry,
            graph,
            tokens,
            factory,
            rng,
            event_bus,
            outbox,
            ..
        } = self;
        for &id in &registry.order {
            let Some(stage) = registry.stages.get_mut(id) else {
                continue;
            };
            if !stage.is_active() {
                continue;
            }
            let before = outbox.len();
            let Stage {
                name,
                behavior,
                emitted,
                ..
            } = stage;
            let mut ctx = StageContext {
                tick,
                stage: id,
                name,
                outputs: graph.outputs(id),
                rng: &mut *rng,
                factory: &**factory,
                tokens: &mut *tokens,
                events: &mut *event_bus,
                outbox: &mut *outbox,
            };
            if behavior.tick(&mut ctx) {
                mark_changed(changed, id);
            }
            *emitted += (outbox.len() - before) as u64;
        }
    }

    // -----------------------------------------------------------------------
    // Phase 2: Deliver
    // -----------------------------------------------------------------------

    fn phase_deliver(&mut self, tick: Ticks, changed: &mut Vec<StageId>, result: &mut AdvanceResult) {
        let emissions = std::mem::take(&mut self.outbox);
        let Self {
            registry,
            graph,
            tokens,
            factory,
            rng,
            event_bus,
            outbox,
            ..
        } = self;

        for Emission { from, to, token } in emissions {
            let refused = match registry.stages.get(to) {
                Some(stage) => refusal(stage),
                None => Some(RoutingError::UnknownTarget),
            };
            if let Some(reason) = refused {
                // Reported against the sending stage.
                let name = registry.name_of(from).unwrap_or_default();
                let mut ctx = StageContext {
                    tick,
                    stage: from,
                    name,
                    outputs: graph.outputs(from),
                    rng: &mut *rng,
                    factory: &**factory,
                    tokens: &mut *tokens,
                    events: &mut *event_bus,
                    outbox: &mut *outbox,
                };
                ctx.reject(token, reason);
                result.rejected += 1;
                continue;
            }

            let Some(stage) = registry.stages.get_mut(to) else {
                continue;
            };
            tokens.update(token.id(), to, &stage.name, tick, event_bus);
            let Stage { name, behavior, .. } = stage;
            let mut ctx = StageContext {
                tick,
                stage: to,
                name,
                outputs: graph.outputs(to),
                rng: &mut *rng,
                factory: &**factory,
                tokens: &mut *tokens,
                events: &mut *event_bus,
                outbox: &mut *outbox,
            };
            behavior.accept(token, &mut ctx);
            result.delivered += 1;
            mark_changed(changed, to);
        }
    }

    // -----------------------------------------------------------------------
    // Phase 3: Post-tick
    // -----------------------------------------------------------------------

    fn phase_post_tick(&mut self, changed: &[StageId]) {
        let order: Vec<StageId> = self
            .registry
            .order()
            .iter()
            .copied()
            .filter(|id| changed.contains(id))
            .collect();
        for id in order {
            self.notify_stage_changed(id);
        }
        self.event_bus.deliver();
    }

    // -----------------------------------------------------------------------
    // Phase 4: Bookkeeping
    // -----------------------------------------------------------------------

    fn phase_bookkeeping(&mut self) {
        self.sim_state.tick += 1;
        self.last_state_hash = self.compute_state_hash();
    }

    /// Deterministic hash over the clock, the RNG, every stage's held
    /// tokens and timers, and the live-token index.
    fn compute_state_hash(&self) -> u64 {
        let mut hasher = StateHash::new();
        hasher.write_u64(self.sim_state.tick);
        hasher.write_u64(self.rng.state());

        for &id in self.registry.order() {
            let Some(stage) = self.registry.get(id) else {
                continue;
            };
            hasher.write_str(&stage.name);
            hasher.write_u64(stage.paused as u64);
            hasher.write_u64(stage.enabled as u64);
            for token in stage.behavior.held_tokens() {
                hasher.write_str(token.id().as_str());
            }
            if let Some(progress) = stage.behavior.progress() {
                hasher.write_u64(progress.elapsed);
            }
            if let StageBehavior::FlowSplitter(splitter) = &stage.behavior {
                for &weight in splitter.weights() {
                    hasher.write_fixed64(weight);
                }
            }
        }

        for id in self.tokens.ids() {
            hasher.write_str(id.as_str());
        }
        hasher.finish()
    }
}

// ---------------------------------------------------------------------------
// Build helpers
// ---------------------------------------------------------------------------

fn mark_changed(changed: &mut Vec<StageId>, id: StageId) {
    if !changed.contains(&id) {
        changed.push(id);
    }
}

/// Why a stage would refuse a delivery right now.
fn refusal(stage: &Stage) -> Option<RoutingError> {
    if !stage.enabled {
        Some(RoutingError::StageDisabled)
    } else if !stage.health.is_ready() {
        Some(RoutingError::StageFaulted)
    } else {
        None
    }
}

/// Build a stage's behaviour from its parameters. A bad parameter yields a
/// placeholder behaviour and a description of the problem.
fn behavior_for(config: &StageConfig) -> (StageBehavior, Option<String>) {
    match &config.kind {
        StageKindConfig::Provider {
            token,
            interval,
            begin_at_start,
        } => {
            let problem = (*interval == 0).then(|| "provider interval must be at least 1".to_string());
            (
                StageBehavior::Provider(Provider::new(*token, *interval, *begin_at_start)),
                problem,
            )
        }
        StageKindConfig::Conveyor {
            velocity,
            path,
            length,
        } => match Conveyor::new(*velocity, path, *length) {
            Ok(conveyor) => (StageBehavior::Conveyor(conveyor), None),
            Err(detail) => (
                StageBehavior::Conveyor(Conveyor::with_duration(1, Vec::new())),
                Some(detail),
            ),
        },
        StageKindConfig::Buffer { interval } => {
            let problem = (*interval == 0).then(|| "buffer interval must be at least 1".to_string());
            (StageBehavior::Buffer(Buffer::new(*interval)), problem)
        }
        StageKindConfig::Assembler {
            first,
            second,
            production_time,
        } => {
            let problem = (*production_time == 0)
                .then(|| "assembler production time must be at least 1".to_string());
            (
                StageBehavior::Assembler(Assembler::new(*first, *second, *production_time)),
                problem,
            )
        }
        // Weights are checked against the wiring in `validate_stage`.
        StageKindConfig::FlowSplitter { .. } => {
            (StageBehavior::FlowSplitter(FlowSplitter::new(Vec::new())), None)
        }
        StageKindConfig::QualityGate { threshold } => {
            (StageBehavior::QualityGate(QualityGate::new(*threshold)), None)
        }
        StageKindConfig::Receiver { mode } => {
            let problem = matches!(
                mode,
                ReceiverMode::Destroyer {
                    destroy_interval: Some(0),
                    ..
                }
            )
            .then(|| "destroy interval must be at least 1".to_string());
            (StageBehavior::Receiver(Receiver::new(mode.clone())), problem)
        }
    }
}

/// Check one stage against its wiring, finishing any wiring-dependent
/// setup (splitter weights, quality gate routes).
fn validate_stage(
    config: &StageConfig,
    registry: &mut StageRegistry,
    graph: &WiringGraph,
    issues: &mut Vec<ConfigIssue>,
) -> Result<(), BuildError> {
    let Some(id) = registry.id_of(&config.name) else {
        return Ok(());
    };
    let Some(kind) = registry.get(id).map(Stage::kind) else {
        return Ok(());
    };
    let stage = config.name.clone();
    let inputs = graph.inputs(id);
    let outputs = graph.outputs(id);

    match kind {
        StageKind::Provider if !inputs.is_empty() => {
            issues.push(ConfigIssue::UnexpectedInput {
                stage: stage.clone(),
            });
        }
        StageKind::Provider => {}
        _ if inputs.is_empty() => issues.push(ConfigIssue::MissingInput {
            stage: stage.clone(),
        }),
        _ => {}
    }

    match kind {
        StageKind::Receiver if !outputs.is_empty() => {
            issues.push(ConfigIssue::UnexpectedOutput {
                stage: stage.clone(),
            });
        }
        StageKind::Receiver => {}
        _ if outputs.is_empty() => issues.push(ConfigIssue::MissingOutput {
            stage: stage.clone(),
        }),
        StageKind::Provider | StageKind::Conveyor | StageKind::Buffer | StageKind::Assembler
            if outputs.len() > 1 =>
        {
            issues.push(ConfigIssue::ExtraOutputs {
                stage: stage.clone(),
                count: outputs.len(),
            });
        }
        _ => {}
    }

    match &config.kind {
        StageKindConfig::Provider { token, .. } if !token.is_basic() => {
            issues.push(ConfigIssue::NonBasicProvider {
                stage,
                kind: *token,
            });
        }
        StageKindConfig::Assembler { first, second, .. }
            if composition_rule(*first, *second).is_none() =>
        {
            issues.push(ConfigIssue::NoCompositionRule {
                stage,
                first: *first,
                second: *second,
            });
        }
        StageKindConfig::FlowSplitter { weights } => {
            let weights = validate_weights(weights, outputs.len()).map_err(|source| {
                BuildError::Weights {
                    stage: stage.clone(),
                    source,
                }
            })?;
            if outputs.len() < 2 && !outputs.is_empty() {
                issues.push(ConfigIssue::InvalidParameter {
                    stage,
                    detail: "flow splitter needs at least two outputs".to_string(),
                });
            }
            if let Some(Stage {
                behavior: StageBehavior::FlowSplitter(splitter),
                ..
            }) = registry.get_mut(id)
            {
                splitter.set_weights(weights);
            }
        }
        StageKindConfig::QualityGate { .. } => {
            if outputs.len() != 2 {
                issues.push(ConfigIssue::QualityGateOutputs {
                    stage,
                    count: outputs.len(),
                });
                return Ok(());
            }
            let is_destroyer = |target: StageId| {
                matches!(
                    registry.get(target).map(|s| &s.behavior),
                    Some(StageBehavior::Receiver(r)) if r.is_destroyer()
                )
            };
            match resolve_routes(outputs, is_destroyer) {
                Some(routes) => {
                    if let Some(Stage {
                        behavior: StageBehavior::QualityGate(gate),
                        ..
                    }) = registry.get_mut(id)
                    {
                        gate.routes = Some(routes);
                    }
                }
                None => issues.push(ConfigIssue::NoRejectOutput { stage }),
            }
        }
        _ => {}
    }
    Ok(())
}
