//! Acquisition manager: one shared source, many independent consumers.
//!
//! A manager owns the only live connection to one device. Consumers attach
//! taps to its channels, start and stop them independently, and detach
//! them when done. The manager:
//!
//! - wires each tap's chain (`source:ch → gate → stages… → sink:port`) and
//!   records every edge in its [`ConnectionGraph`], so detaching removes
//!   exactly what the tap owned;
//! - arbitrates the source buffer size as the largest hint among enabled
//!   taps, pushing it before a new tap's gate opens;
//! - runs the source iff at least one tap is enabled, and joins the source's
//!   worker when the last one stops;
//! - stops the source around attach/detach while it is running, since the
//!   wrapped engine cannot change shape live (see
//!   [`AcquisitionConfig::pause_on_topology_change`]).
//!
//! All mutating operations are serialized by one lock per manager.

use crate::backend::events::{EventBus, ManagerEvent};
use crate::backend::registry::ManagerRegistry;
use crate::backend::source::{AcquisitionSource, SourceOutput, SourceProvider};
use crate::backend::tap::{arbitrated_buffer_size, Tap, TapInfo};
use crate::config::{effective_kernel_buffers, AcquisitionConfig};
use crate::error::{AcqError, Result, ResultExt};
use crate::pipeline::nodes::MAX_SOURCE_CHANNELS;
use crate::pipeline::{
    Connection, ConnectionGraph, DataflowEngine, DownstreamChain, Gate, GraphResult, LocalEngine,
    NodeId, SourceNode, StageHandle, TapId, TopologySnapshot,
};
use crossbeam_channel::Receiver;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Shared owning handle to a manager
pub type ManagerHandle = Arc<AcquisitionManager>;

struct ManagerState {
    source: Box<dyn AcquisitionSource>,
    graph: ConnectionGraph,
    source_node: NodeId,
    taps: BTreeMap<TapId, Tap>,
    /// Last buffer size pushed to the source
    buffer_size: usize,
}

impl ManagerState {
    fn tap(&self, id: TapId) -> Result<&Tap> {
        self.taps.get(&id).ok_or(AcqError::UnknownTap(id))
    }

    fn tap_mut(&mut self, id: TapId) -> Result<&mut Tap> {
        self.taps.get_mut(&id).ok_or(AcqError::UnknownTap(id))
    }

    fn arbitrated(&self) -> usize {
        arbitrated_buffer_size(self.taps.values().map(|t| (t.enabled, t.buffer_size)))
    }

    fn any_enabled(&self) -> bool {
        self.taps.values().any(|t| t.enabled)
    }
}

/// Per-device owner of the source, its taps and the connection graph
pub struct AcquisitionManager {
    device: String,
    channel_count: usize,
    config: AcquisitionConfig,
    next_tap: AtomicU64,
    state: Mutex<ManagerState>,
    events: Arc<EventBus>,
}

impl AcquisitionManager {
    /// Shared manager for `device` from the process-wide registry, opening
    /// the source through `provider` on first use.
    pub fn get_or_create(
        provider: &dyn SourceProvider,
        device: &str,
        buffer_size: usize,
    ) -> Result<ManagerHandle> {
        ManagerRegistry::global().get_or_create(provider, device, buffer_size)
    }

    /// Open `device` and build an unshared manager around it
    pub fn open(
        provider: &dyn SourceProvider,
        device: &str,
        buffer_size: usize,
        config: AcquisitionConfig,
    ) -> Result<Self> {
        Self::open_with_engine(provider, device, buffer_size, config, Arc::new(LocalEngine::new()))
    }

    /// Like [`open`](Self::open), wiring through a caller-supplied engine
    pub fn open_with_engine(
        provider: &dyn SourceProvider,
        device: &str,
        buffer_size: usize,
        config: AcquisitionConfig,
        engine: Arc<dyn DataflowEngine>,
    ) -> Result<Self> {
        config.validate()?;
        let buffer_size = if buffer_size == 0 {
            config.default_buffer_size
        } else {
            buffer_size
        };

        let events = Arc::new(EventBus::new());
        let mut graph = ConnectionGraph::new(engine.clone());
        let source_node = graph.reserve_node();
        let output = SourceOutput::new(engine, source_node, events.clone());
        let mut source = provider.open(device, buffer_size, output)?;
        source
            .set_timeout(config.timeout())
            .with_context(|| format!("Failed to set timeout on {device}"))?;
        source
            .set_kernel_buffer_count(config.effective_kernel_buffers())
            .with_context(|| format!("Failed to set kernel buffers on {device}"))?;

        let mut channel_count = source.channel_count();
        if channel_count > MAX_SOURCE_CHANNELS {
            tracing::warn!(
                "{} exposes {} channels, only the first {} can be tapped",
                device,
                channel_count,
                MAX_SOURCE_CHANNELS
            );
            channel_count = MAX_SOURCE_CHANNELS;
        }
        graph.register_reserved(source_node, Arc::new(SourceNode::new(device, channel_count)))?;
        graph.protect(source_node);

        tracing::info!(
            "Created acquisition manager for {} ({} channels, buffer size {})",
            device,
            channel_count,
            buffer_size
        );

        Ok(Self {
            device: device.to_string(),
            channel_count,
            config,
            next_tap: AtomicU64::new(0),
            state: Mutex::new(ManagerState {
                source,
                graph,
                source_node,
                taps: BTreeMap::new(),
                buffer_size,
            }),
            events,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Buffer size last pushed to the source
    pub fn buffer_size(&self) -> usize {
        self.lock().buffer_size
    }

    pub fn is_running(&self) -> bool {
        self.lock().source.is_running()
    }

    pub fn tap_count(&self) -> usize {
        self.lock().taps.len()
    }

    /// Number of edges currently recorded in the connection graph
    pub fn edge_count(&self) -> usize {
        self.lock().graph.edge_count()
    }

    pub fn is_enabled(&self, id: TapId) -> Result<bool> {
        Ok(self.lock().tap(id)?.enabled)
    }

    pub fn tap(&self, id: TapId) -> Result<TapInfo> {
        Ok(TapInfo::from(self.lock().tap(id)?))
    }

    /// All live taps, ordered by id
    pub fn taps(&self) -> Vec<TapInfo> {
        self.lock().taps.values().map(TapInfo::from).collect()
    }

    pub fn topology(&self) -> TopologySnapshot {
        self.lock().graph.snapshot()
    }

    /// Receive [`ManagerEvent`]s for this manager
    pub fn subscribe(&self) -> Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    /// Attach a new, disabled tap on `channel` feeding `chain`.
    pub fn attach(
        &self,
        channel: usize,
        chain: &dyn DownstreamChain,
        buffer_size_hint: usize,
    ) -> Result<TapId> {
        if channel >= self.channel_count {
            return Err(AcqError::ChannelOutOfRange {
                channel,
                channel_count: self.channel_count,
            });
        }

        let mut state = self.lock();
        let paused = self.pause_for_topology(&mut state)?;
        let wired = self.wire_tap(&mut state, channel, chain, buffer_size_hint);
        let resumed = self.resume_after_topology(&mut state, paused);

        let id = wired?;
        if let Err(e) = resumed {
            if let Err(cleanup) = self.remove_tap(&mut state, id) {
                tracing::warn!("Failed to roll back {}: {}", id, cleanup);
            }
            return Err(e);
        }
        Ok(id)
    }

    /// Stop (if enabled) and remove a tap together with every stage that
    /// only it fed.
    pub fn detach(&self, id: TapId) -> Result<()> {
        let mut state = self.lock();
        if state.tap(id)?.enabled {
            self.stop_locked(&mut state, id)?;
        }

        let paused = self.pause_for_topology(&mut state)?;
        let removed = self.remove_tap(&mut state, id);
        let resumed = self.resume_after_topology(&mut state, paused);
        removed?;
        resumed
    }

    /// Enable a tap, growing the buffer size and starting the source as needed.
    pub fn start(&self, id: TapId) -> Result<()> {
        let mut state = self.lock();
        self.start_locked(&mut state, id)
    }

    /// Disable a tap. Stopping the last enabled tap stops the source and
    /// blocks until its worker has drained.
    pub fn stop(&self, id: TapId) -> Result<()> {
        let mut state = self.lock();
        self.stop_locked(&mut state, id)
    }

    /// Stop every enabled tap. Keeps going past failures and returns the
    /// first one.
    pub fn stop_all(&self) -> Result<()> {
        let mut state = self.lock();
        let enabled: Vec<TapId> = state
            .taps
            .values()
            .filter(|t| t.enabled)
            .map(|t| t.id)
            .collect();

        let mut first_error = None;
        for id in enabled {
            if let Err(e) = self.stop_locked(&mut state, id) {
                tracing::warn!("Failed to stop {} on {}: {}", id, self.device, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Change a tap's buffer-size hint and re-arbitrate if it is enabled.
    pub fn set_tap_buffer_size(&self, id: TapId, size: usize) -> Result<()> {
        let mut state = self.lock();
        let tap = state.tap_mut(id)?;
        let previous = std::mem::replace(&mut tap.buffer_size, size);
        if !tap.enabled {
            return Ok(());
        }

        if let Err(e) = self.rearbitrate(&mut state) {
            if let Some(tap) = state.taps.get_mut(&id) {
                tap.buffer_size = previous;
            }
            return Err(e);
        }
        Ok(())
    }

    pub fn set_device_timeout(&self, timeout: Duration) -> Result<()> {
        let mut state = self.lock();
        state.source.set_timeout(timeout)?;
        tracing::debug!("Timeout for {} set to {:?}", self.device, timeout);
        Ok(())
    }

    /// Set the kernel buffer count; 0 restores the default.
    pub fn set_kernel_buffer_count(&self, count: u32) -> Result<()> {
        let count = effective_kernel_buffers(count);
        let mut state = self.lock();
        state.source.set_kernel_buffer_count(count)?;
        tracing::debug!("Kernel buffers for {} set to {}", self.device, count);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_locked(&self, state: &mut ManagerState, id: TapId) -> Result<()> {
        let tap = state.tap_mut(id)?;
        if tap.enabled {
            return Ok(());
        }
        // Counted for arbitration only; the gate opens after the push.
        tap.enabled = true;

        let previous = state.buffer_size;
        let wanted = state.arbitrated();
        if wanted > previous {
            if let Err(e) = self.push_buffer_size(state, wanted) {
                if let Some(tap) = state.taps.get_mut(&id) {
                    tap.enabled = false;
                }
                return Err(e);
            }
        }

        if let Some(tap) = state.taps.get_mut(&id) {
            tap.open_gate();
        }

        if !state.source.is_running() {
            if let Err(e) = state.source.start() {
                tracing::warn!("Failed to start {} for {}: {}", self.device, id, e);
                if let Some(tap) = state.taps.get_mut(&id) {
                    tap.close_gate();
                }
                if state.buffer_size != previous {
                    if let Err(restore) = self.push_buffer_size(state, previous) {
                        tracing::warn!("Failed to restore buffer size {}: {}", previous, restore);
                    }
                }
                return Err(start_failed(e));
            }
            tracing::info!("Started acquisition on {}", self.device);
            self.events.publish(ManagerEvent::Started);
        }
        Ok(())
    }

    fn stop_locked(&self, state: &mut ManagerState, id: TapId) -> Result<()> {
        let tap = state.tap_mut(id)?;
        if !tap.enabled {
            return Ok(());
        }
        tap.close_gate();

        let result = if state.any_enabled() {
            self.rearbitrate(state)
        } else {
            self.stop_source(state)
        };
        if result.is_err() {
            if let Some(tap) = state.taps.get_mut(&id) {
                tap.open_gate();
            }
        }
        result
    }

    fn stop_source(&self, state: &mut ManagerState) -> Result<()> {
        if !state.source.is_running() {
            return Ok(());
        }
        if let Err(e) = state.source.stop() {
            tracing::warn!("Failed to stop {}: {}", self.device, e);
            return Err(stop_failed(e));
        }
        tracing::info!("Stopped acquisition on {}", self.device);
        self.events.publish(ManagerEvent::Stopped);
        Ok(())
    }

    /// Push the arbitrated size if it changed. Nothing is pushed while no
    /// tap is enabled.
    fn rearbitrate(&self, state: &mut ManagerState) -> Result<()> {
        let wanted = state.arbitrated();
        if wanted == 0 || wanted == state.buffer_size {
            return Ok(());
        }
        self.push_buffer_size(state, wanted)
    }

    fn push_buffer_size(&self, state: &mut ManagerState, size: usize) -> Result<()> {
        state.source.set_buffer_size(size)?;
        let previous = std::mem::replace(&mut state.buffer_size, size);
        tracing::debug!(
            "Buffer size for {} changed {} -> {}",
            self.device,
            previous,
            size
        );
        self.events.publish(ManagerEvent::BufferSizeChanged(size));
        Ok(())
    }

    fn pause_for_topology(&self, state: &mut ManagerState) -> Result<bool> {
        if !self.config.pause_on_topology_change || !state.source.is_running() {
            return Ok(false);
        }
        tracing::debug!("Pausing {} for topology change", self.device);
        state.source.stop().map_err(stop_failed)?;
        Ok(true)
    }

    fn resume_after_topology(&self, state: &mut ManagerState, paused: bool) -> Result<()> {
        if !paused || !state.any_enabled() {
            return Ok(());
        }
        if let Err(e) = state.source.start() {
            tracing::warn!(
                "Failed to restart {} after topology change, disabling all taps: {}",
                self.device,
                e
            );
            for tap in state.taps.values_mut().filter(|t| t.enabled) {
                tap.close_gate();
            }
            self.events.publish(ManagerEvent::Stopped);
            return Err(start_failed(e));
        }
        Ok(())
    }

    fn wire_tap(
        &self,
        state: &mut ManagerState,
        channel: usize,
        chain: &dyn DownstreamChain,
        buffer_size_hint: usize,
    ) -> Result<TapId> {
        let id = TapId(self.next_tap.fetch_add(1, Ordering::Relaxed));
        let gate = Arc::new(Gate::new(format!("gate:{id}")));
        let gate_stage: StageHandle = gate.clone();
        let gate_node = state.graph.register(&gate_stage)?;
        let stages = chain.stages(channel);
        let (sink, sink_port) = chain.sink();

        let mut edges = Vec::new();
        let source_node = state.source_node;
        if let Err(e) = wire_chain(
            &mut state.graph,
            source_node,
            channel,
            gate_node,
            &stages,
            (&sink, sink_port),
            &mut edges,
        ) {
            tracing::warn!(
                "Failed to wire {} on {} channel {}: {}",
                id,
                self.device,
                channel,
                e
            );
            if let Err(cleanup) =
                release_owned(&mut state.graph, gate_node, &stages, &sink, &edges)
            {
                tracing::warn!("Failed to unwire partial chain of {}: {}", id, cleanup);
            }
            return Err(e.into());
        }

        state.taps.insert(
            id,
            Tap {
                id,
                channel,
                buffer_size: buffer_size_hint,
                enabled: false,
                gate,
                gate_node,
                stages,
                sink,
                edges,
            },
        );
        tracing::debug!(
            "Attached {} to {} channel {} (hint {})",
            id,
            self.device,
            channel,
            buffer_size_hint
        );
        Ok(id)
    }

    fn remove_tap(&self, state: &mut ManagerState, id: TapId) -> Result<()> {
        let tap = state.taps.remove(&id).ok_or(AcqError::UnknownTap(id))?;
        let removed = release_owned(
            &mut state.graph,
            tap.gate_node,
            &tap.stages,
            &tap.sink,
            &tap.edges,
        )?;
        tracing::debug!(
            "Detached {} from {} channel {} ({} of {} edges removed)",
            id,
            self.device,
            tap.channel,
            removed,
            tap.edges.len()
        );
        self.rearbitrate(state)
    }
}

/// `source:channel → gate → stages… → sink:port`. Every edge the chain
/// needs is retained in `edges`, whether it was wired here or already
/// existed for a stage shared with another tap.
fn wire_chain(
    graph: &mut ConnectionGraph,
    source: NodeId,
    channel: usize,
    gate: NodeId,
    stages: &[StageHandle],
    (sink, port): (&StageHandle, usize),
    edges: &mut Vec<Connection>,
) -> GraphResult<()> {
    edges.push(graph.retain_edge(source, channel, gate, 0)?);

    let mut prev = gate;
    for stage in stages {
        let node = graph.register(stage)?;
        edges.push(graph.retain_edge(prev, 0, node, 0)?);
        prev = node;
    }

    let sink_node = graph.register(sink)?;
    edges.push(graph.retain_edge(prev, 0, sink_node, port)?);
    Ok(())
}

/// Release a tap's edges, then every one of its nodes left without edges.
/// Returns how many edges were actually unwired.
fn release_owned(
    graph: &mut ConnectionGraph,
    gate: NodeId,
    stages: &[StageHandle],
    sink: &StageHandle,
    edges: &[Connection],
) -> GraphResult<usize> {
    let mut removed = 0;
    for edge in edges {
        if graph.release_edge(edge)? {
            removed += 1;
        }
    }

    graph.release_if_isolated(gate)?;
    for stage in stages.iter().chain(std::iter::once(sink)) {
        if let Some(node) = graph.node_of(stage) {
            graph.release_if_isolated(node)?;
        }
    }
    Ok(removed)
}

fn start_failed(e: AcqError) -> AcqError {
    match e {
        AcqError::SourceStartFailed(_) => e,
        other => AcqError::SourceStartFailed(other.to_string()),
    }
}

fn stop_failed(e: AcqError) -> AcqError {
    match e {
        AcqError::SourceStopFailed(_) => e,
        other => AcqError::SourceStopFailed(other.to_string()),
    }
}

impl Drop for AcquisitionManager {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state.source.is_running() {
            match state.source.stop() {
                Ok(()) => self.events.publish(ManagerEvent::Stopped),
                Err(e) => tracing::warn!("Failed to stop {} on release: {}", self.device, e),
            }
        }
        tracing::info!("Released acquisition manager for {}", self.device);
    }
}
