//! Integration Tests for Network Execution
//!
//! These tests drive whole networks through the controller: building,
//! scheduling, executing, re-executing and persisting them.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use dataflow_core::engine::{
    ExecutionContext, NetworkEditorController, PollOutcome, Scheduler, SerialScheduler,
    StreamingQueue,
};
use dataflow_core::error::{ExecutionError, ModuleError, NetworkError};
use dataflow_core::events::NetworkEvent;
use dataflow_core::network::{
    DatatypeHandle, Legacy, LegacyModule, Module, ModuleDescription, ModuleId, ModuleLookupInfo,
    ModuleRegistry, Network, PortDescription, PortDirection,
};
use dataflow_core::serialization::NetworkFile;
use dataflow_core::state::{ModuleState, SimpleMapModuleStateFactory, StateValue};

type Log = Arc<Mutex<Vec<String>>>;

// ----------------------------------------------------------------------------
// Test modules
// ----------------------------------------------------------------------------

/// Sends its `Value` state; re-sends the cached handle when nothing changed.
/// Reports progress between reading the value and sending it.
struct Source {
    log: Log,
    cached: Option<DatatypeHandle>,
}

impl Module for Source {
    fn set_state_defaults(&self, state: &ModuleState) {
        state.set_value("Value", 1_i64);
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ModuleError> {
        self.log.lock().push(ctx.module_id().to_string());
        if let (Some(cached), false) = (&self.cached, ctx.need_to_execute()) {
            return ctx.send_output(0, cached.clone());
        }
        let value = ctx
            .state()
            .get_value("Value")
            .and_then(|v| v.as_int())
            .unwrap_or_default();
        ctx.report_progress(0.5);
        self.cached = Some(ctx.send_value(0, value)?);
        Ok(())
    }
}

/// Forwards its required input unchanged.
struct Relay {
    log: Log,
}

impl Module for Relay {
    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ModuleError> {
        self.log.lock().push(ctx.module_id().to_string());
        let input = ctx.get_required_handle(0)?;
        ctx.send_output(0, input)
    }
}

/// Adds a required and an optional input.
struct Add {
    log: Log,
    cached: Option<DatatypeHandle>,
}

impl Module for Add {
    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ModuleError> {
        self.log.lock().push(ctx.module_id().to_string());
        if let (Some(cached), false) = (&self.cached, ctx.need_to_execute()) {
            return ctx.send_output(0, cached.clone());
        }
        let a = ctx.get_required_input::<i64>(0)?;
        let b = ctx.get_optional_input::<i64>(1)?.map_or(0, |b| *b);
        self.cached = Some(ctx.send_value(0, *a + b)?);
        Ok(())
    }
}

/// Sums everything on a dynamic input port.
struct Gather {
    log: Log,
}

impl Module for Gather {
    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ModuleError> {
        self.log.lock().push(ctx.module_id().to_string());
        let total: i64 = ctx.get_dynamic_inputs::<i64>(0)?.iter().map(|v| **v).sum();
        ctx.state().set_value("Sum", total);
        ctx.send_value(0, total)?;
        Ok(())
    }
}

/// Runs `Iterations + 1` times per pass, sending its iteration number.
struct Looper {
    log: Log,
    iteration: i64,
}

impl Module for Looper {
    fn set_state_defaults(&self, state: &ModuleState) {
        state.set_value("Iterations", 2_i64);
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ModuleError> {
        self.log.lock().push(ctx.module_id().to_string());
        let limit = ctx
            .state()
            .get_value("Iterations")
            .and_then(|v| v.as_int())
            .unwrap_or_default();
        ctx.send_value(0, self.iteration)?;
        if self.iteration < limit {
            self.iteration += 1;
            ctx.enqueue_execute_again();
        } else {
            self.iteration = 0;
        }
        Ok(())
    }
}

/// Streams `Chunks` values produced on a background thread, one per
/// invocation.
struct Streamer {
    log: Log,
    queue: Option<StreamingQueue<i64>>,
}

impl Module for Streamer {
    fn set_state_defaults(&self, state: &ModuleState) {
        state.set_value("Chunks", 3_i64);
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ModuleError> {
        self.log.lock().push(ctx.module_id().to_string());
        let queue = match &self.queue {
            Some(queue) => queue.clone(),
            None => {
                let chunks = ctx
                    .state()
                    .get_value("Chunks")
                    .and_then(|v| v.as_int())
                    .unwrap_or_default();
                let queue = StreamingQueue::new();
                let producer = queue.clone();
                thread::spawn(move || {
                    for chunk in 0..chunks {
                        producer.push(chunk * 10);
                    }
                    producer.close();
                });
                self.queue = Some(queue.clone());
                queue
            }
        };

        match ctx.poll_stream(&queue) {
            PollOutcome::Item(chunk) => {
                ctx.send_value(0, chunk)?;
                ctx.enqueue_execute_again();
                Ok(())
            }
            PollOutcome::Closed => {
                self.queue = None;
                Ok(())
            }
            PollOutcome::Exhausted { .. } => Err(ModuleError::algorithm("stream stalled")),
        }
    }
}

/// Records every value it receives.
struct Collector {
    log: Log,
    received: Arc<Mutex<Vec<i64>>>,
}

impl Module for Collector {
    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ModuleError> {
        self.log.lock().push(ctx.module_id().to_string());
        let value = ctx.get_required_input::<i64>(0)?;
        self.received.lock().push(*value);
        ctx.report_progress(1.0);
        Ok(())
    }
}

/// Boolean-style module that fails while its `Fail` key is set.
struct Checker;

impl LegacyModule for Checker {
    fn set_state_defaults(&self, state: &ModuleState) {
        state.set_value("Fail", true);
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> bool {
        let fail = ctx
            .state()
            .get_value("Fail")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if fail {
            ctx.error("check failed");
        }
        !fail
    }
}

struct Fixture {
    log: Log,
    received: Arc<Mutex<Vec<i64>>>,
    registry: ModuleRegistry,
}

impl Fixture {
    fn new() -> Self {
        let log = Log::default();
        let received = Arc::new(Mutex::new(Vec::new()));
        let scalar_out = || PortDescription::new("Out", "Scalar");
        let scalar_in = |name: &str| PortDescription::new(name, "Scalar");

        let mut registry = ModuleRegistry::new();
        let l = log.clone();
        registry.register(
            ModuleDescription::new(ModuleLookupInfo::new("Source", "DataIO", "Test"))
                .output(scalar_out()),
            move || Source {
                log: l.clone(),
                cached: None,
            },
        );
        let l = log.clone();
        registry.register(
            ModuleDescription::new(ModuleLookupInfo::named("Relay"))
                .input(scalar_in("In"))
                .output(scalar_out()),
            move || Relay { log: l.clone() },
        );
        let l = log.clone();
        registry.register(
            ModuleDescription::new(ModuleLookupInfo::named("Add"))
                .input(scalar_in("A"))
                .input(scalar_in("B"))
                .output(scalar_out()),
            move || Add {
                log: l.clone(),
                cached: None,
            },
        );
        let l = log.clone();
        registry.register(
            ModuleDescription::new(ModuleLookupInfo::named("Gather"))
                .input(PortDescription::dynamic("Inputs", "Scalar"))
                .output(scalar_out()),
            move || Gather { log: l.clone() },
        );
        let l = log.clone();
        registry.register(
            ModuleDescription::new(ModuleLookupInfo::named("Looper")).output(scalar_out()),
            move || Looper {
                log: l.clone(),
                iteration: 0,
            },
        );
        let l = log.clone();
        registry.register(
            ModuleDescription::new(ModuleLookupInfo::named("Streamer")).output(scalar_out()),
            move || Streamer {
                log: l.clone(),
                queue: None,
            },
        );
        let (l, r) = (log.clone(), received.clone());
        registry.register(
            ModuleDescription::new(ModuleLookupInfo::named("Collector")).input(scalar_in("In")),
            move || Collector {
                log: l.clone(),
                received: r.clone(),
            },
        );
        registry.register(
            ModuleDescription::new(ModuleLookupInfo::named("Checker")).without_ui(),
            || Legacy(Checker),
        );

        Self {
            log,
            received,
            registry,
        }
    }

    fn controller(&self) -> NetworkEditorController {
        NetworkEditorController::new(
            Arc::new(self.registry.clone()),
            Arc::new(SimpleMapModuleStateFactory),
        )
    }

    fn network(&self) -> Network {
        Network::new(
            Arc::new(self.registry.clone()),
            Arc::new(SimpleMapModuleStateFactory),
        )
    }

    fn ran(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.lock())
    }
}

fn add(controller: &NetworkEditorController, name: &str) -> ModuleId {
    controller
        .add_module(&ModuleLookupInfo::named(name))
        .unwrap()
}

fn output_value(controller: &NetworkEditorController, id: &ModuleId) -> Option<i64> {
    controller.with_network(|n| {
        n.lookup_module(id)?
            .output_port(0)?
            .data()?
            .downcast_ref::<i64>()
            .copied()
    })
}

/// Every connection endpoint exists and is listed on both ports.
fn assert_consistent(net: &Network) {
    for connection in net.connections() {
        let source = net
            .lookup_module(connection.source())
            .expect("connection source must exist");
        let target = net
            .lookup_module(connection.target())
            .expect("connection target must exist");
        assert!(source
            .output_port(connection.source_port())
            .unwrap()
            .connections()
            .contains(connection.id()));
        assert!(target
            .input_port(connection.target_port())
            .unwrap()
            .connections()
            .contains(connection.id()));
    }
}

// ----------------------------------------------------------------------------
// Example scenarios
// ----------------------------------------------------------------------------

#[test]
fn chain_executes_in_order() {
    let fixture = Fixture::new();
    let controller = fixture.controller();
    let a = add(&controller, "Source");
    let b = add(&controller, "Relay");
    let c = add(&controller, "Relay");
    controller.connect(&a, 0, &b, 0).unwrap();
    controller.connect(&b, 0, &c, 0).unwrap();

    let report = controller.execute_all().unwrap();
    assert_eq!(report.invocations(), &[a, b, c.clone()]);
    assert_eq!(fixture.ran(), vec!["Source:0", "Relay:0", "Relay:1"]);
    assert_eq!(output_value(&controller, &c), Some(1));
}

#[test]
fn diamond_runs_source_first_and_join_last() {
    let fixture = Fixture::new();
    let controller = fixture.controller();
    let a = add(&controller, "Source");
    let b = add(&controller, "Relay");
    let c = add(&controller, "Relay");
    let d = add(&controller, "Add");
    controller.connect(&a, 0, &b, 0).unwrap();
    controller.connect(&a, 0, &c, 0).unwrap();
    controller.connect(&b, 0, &d, 0).unwrap();
    controller.connect(&c, 0, &d, 1).unwrap();

    let report = controller.execute_all().unwrap();
    let order = report.invocations();
    assert_eq!(order.first(), Some(&a));
    assert_eq!(order.last(), Some(&d));
    assert_eq!(order.len(), 4);
    assert_eq!(output_value(&controller, &d), Some(2));
}

#[test]
fn two_cycle_is_refused_without_mutation() {
    let fixture = Fixture::new();
    let controller = fixture.controller();
    let a = add(&controller, "Relay");
    let b = add(&controller, "Relay");
    controller.connect(&a, 0, &b, 0).unwrap();
    controller.connect(&b, 0, &a, 0).unwrap();

    let err = controller.execute_all().unwrap_err();
    assert!(err.is_cycle());
    assert!(fixture.ran().is_empty());
    controller.with_network(|n| {
        let ids: Vec<_> = n.module_ids().cloned().collect();
        assert_eq!(ids, vec![a.clone(), b.clone()]);
        assert_eq!(n.nconnections(), 2);
    });
}

#[test]
fn removing_a_connected_module() {
    let fixture = Fixture::new();
    let mut net = fixture.network();
    let info = |name: &str| ModuleLookupInfo::named(name);
    let a = net.add_module(&info("Source")).unwrap();
    let b = net.add_module(&info("Relay")).unwrap();
    let c = net.add_module(&info("Relay")).unwrap();
    net.connect(&a, 0, &b, 0).unwrap();
    net.connect(&b, 0, &c, 0).unwrap();

    // Plain removal refuses while connections reference the module
    assert!(!net.remove_module(&b));
    assert_eq!(net.nconnections(), 2);

    // The atomic helper drops both connections first
    let removed = net.remove_module_with_connections(&b).unwrap();
    assert_eq!(removed.len(), 2);
    assert_eq!(net.nconnections(), 0);
    assert!(net.lookup_module(&b).is_none());
    assert_consistent(&net);
}

#[test]
fn out_of_range_port_is_rejected() {
    let fixture = Fixture::new();
    let controller = fixture.controller();
    let a = add(&controller, "Add");
    let b = add(&controller, "Relay");

    let err = controller.connect(&a, 5, &b, 0).unwrap_err();
    assert_eq!(
        err,
        NetworkError::PortOutOfRange {
            module: a,
            direction: PortDirection::Output,
            port: 5,
            count: 1,
        }
    );
    controller.with_network(|n| assert_eq!(n.nconnections(), 0));
}

// ----------------------------------------------------------------------------
// Properties
// ----------------------------------------------------------------------------

/// Small deterministic generator for edit sequences.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) as usize) % bound.max(1)
    }
}

#[test]
fn edits_keep_graph_consistent() {
    let fixture = Fixture::new();
    let mut net = fixture.network();
    let mut rng = Lcg(7);
    let names = ["Source", "Relay", "Add", "Gather"];

    for _ in 0..400 {
        let ids: Vec<ModuleId> = net.module_ids().cloned().collect();
        match rng.next(5) {
            0 | 1 => {
                let name = names[rng.next(names.len())];
                net.add_module(&ModuleLookupInfo::named(name)).unwrap();
            }
            2 if !ids.is_empty() => {
                let (from, to) = (&ids[rng.next(ids.len())], &ids[rng.next(ids.len())]);
                let _ = net.connect(from, rng.next(2), to, rng.next(3));
            }
            3 if !ids.is_empty() => {
                let victim = &ids[rng.next(ids.len())];
                if !net.remove_module(victim) {
                    net.remove_module_with_connections(victim);
                }
            }
            4 => {
                let existing: Vec<_> = net.connections().map(|c| c.id().clone()).collect();
                if !existing.is_empty() {
                    assert!(net.disconnect(&existing[rng.next(existing.len())]));
                }
            }
            _ => {}
        }
        assert_consistent(&net);
    }
}

#[test]
fn connect_twice_adds_one_connection() {
    let fixture = Fixture::new();
    let controller = fixture.controller();
    let a = add(&controller, "Source");
    let b = add(&controller, "Relay");

    let first = controller.connect(&a, 0, &b, 0).unwrap();
    let second = controller.connect(&a, 0, &b, 0).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.as_str(), "Source:0_p#Out#0_@to@_Relay:0_p#In#0");
    controller.with_network(|n| assert_eq!(n.nconnections(), 1));
}

/// A layered DAG whose connections are added in a scrambled order.
fn layered_network(fixture: &Fixture) -> Network {
    let mut net = fixture.network();
    let mut rng = Lcg(42);
    let mut ids = Vec::new();
    for _ in 0..30 {
        ids.push(net.add_module(&ModuleLookupInfo::named("Gather")).unwrap());
    }
    for _ in 0..80 {
        let x = rng.next(ids.len());
        let y = rng.next(ids.len());
        // Edges point from the higher index to the lower one
        if x != y {
            let (from, to) = (x.max(y), x.min(y));
            net.connect(&ids[from], 0, &ids[to], 0).unwrap();
        }
    }
    net
}

#[test]
fn schedule_respects_every_edge_and_is_stable() {
    let fixture = Fixture::new();
    let net = layered_network(&fixture);

    let order = SerialScheduler.schedule(&net).unwrap();
    assert_eq!(order.len(), net.nmodules());
    for connection in net.connections() {
        assert!(order.position(connection.source()) < order.position(connection.target()));
    }
    assert_eq!(order, SerialScheduler.schedule(&net).unwrap());
}

#[test]
fn any_cycle_fails_scheduling() {
    let fixture = Fixture::new();
    let mut net = layered_network(&fixture);
    assert!(SerialScheduler.schedule(&net).is_ok());

    // Close a long loop through the whole graph
    let ids: Vec<_> = net.module_ids().cloned().collect();
    for pair in ids.windows(2) {
        net.connect(&pair[0], 0, &pair[1], 0).unwrap();
    }
    assert!(SerialScheduler.schedule(&net).is_err());
}

#[test]
fn need_to_execute_tracks_inputs_and_state() {
    let fixture = Fixture::new();
    let controller = fixture.controller();
    let a = add(&controller, "Source");
    let b = add(&controller, "Source");
    let sum = add(&controller, "Add");
    controller.connect(&a, 0, &sum, 0).unwrap();
    controller.connect(&b, 0, &sum, 1).unwrap();

    let need = |id: &ModuleId| controller.with_network(|n| n.need_to_execute(id).unwrap());
    assert!(need(&sum));

    controller.execute_all().unwrap();
    assert!(!need(&a) && !need(&b) && !need(&sum));

    // A pass with nothing changed keeps everything cached
    controller.execute_all().unwrap();
    assert!(!need(&sum));
    assert_eq!(output_value(&controller, &sum), Some(2));

    // One upstream state key flips the source; its new output flips the sum
    controller.module_state(&b).unwrap().set_value("Value", 5_i64);
    assert!(need(&b));
    assert!(!need(&sum));
    controller.execute_all().unwrap();
    assert_eq!(output_value(&controller, &sum), Some(6));
    assert!(!need(&sum));

    // A state key on the module itself
    controller.module_state(&sum).unwrap().set_value("Note", "x");
    assert!(need(&sum));
}

#[test]
fn state_edit_during_execution_is_kept_for_next_pass() {
    let fixture = Fixture::new();
    let controller = fixture.controller();
    let source = add(&controller, "Source");
    let collector = add(&controller, "Collector");
    controller.connect(&source, 0, &collector, 0).unwrap();

    // Edit the value once, after the source has read it but before it returns
    let state = controller.module_state(&source).unwrap();
    let edit = Arc::new(Mutex::new(Some(7_i64)));
    let (target, next) = (source.clone(), edit.clone());
    controller.subscribe(move |event| {
        if let NetworkEvent::ModuleProgress { id, .. } = event {
            if *id == target {
                if let Some(value) = next.lock().take() {
                    state.set_value("Value", value);
                }
            }
        }
    });

    let need = |id: &ModuleId| controller.with_network(|n| n.need_to_execute(id).unwrap());

    controller.execute_all().unwrap();
    assert!(edit.lock().is_none());
    assert_eq!(*fixture.received.lock(), vec![1]);
    assert!(need(&source));

    controller.execute_all().unwrap();
    assert_eq!(*fixture.received.lock(), vec![1, 7]);
    assert!(!need(&source));
}

#[test]
fn re_execution_runs_n_plus_one_times() {
    let fixture = Fixture::new();
    let controller = fixture.controller();
    let looper = add(&controller, "Looper");
    let relay = add(&controller, "Relay");
    let collector = add(&controller, "Collector");
    controller.connect(&looper, 0, &relay, 0).unwrap();
    controller.connect(&relay, 0, &collector, 0).unwrap();
    controller
        .module_state(&looper)
        .unwrap()
        .set_value("Iterations", 3_i64);

    let report = controller.execute_all().unwrap();
    assert_eq!(report.count(&looper), 4);
    assert_eq!(report.count(&relay), 4);
    assert_eq!(report.count(&collector), 4);
    assert_eq!(*fixture.received.lock(), vec![0, 1, 2, 3]);

    // Every looper run is followed by its dependents before it runs again
    let ran = fixture.ran();
    assert_eq!(ran.len(), 12);
    for chunk in ran.chunks(3) {
        assert_eq!(chunk, ["Looper:0", "Relay:0", "Collector:0"]);
    }
}

#[test]
fn join_never_runs_ahead_of_a_refreshed_producer() {
    let fixture = Fixture::new();
    let controller = fixture.controller();
    let direct = add(&controller, "Looper");
    let relayed = add(&controller, "Looper");
    let relay = add(&controller, "Relay");
    let join = add(&controller, "Add");
    controller.connect(&relayed, 0, &relay, 0).unwrap();
    controller.connect(&relay, 0, &join, 0).unwrap();
    controller.connect(&direct, 0, &join, 1).unwrap();

    let report = controller.execute_all().unwrap();
    assert_eq!(report.count(&direct), 3);
    assert_eq!(report.count(&relayed), 3);
    assert_eq!(output_value(&controller, &join), Some(4));

    // Between the last run of the relayed looper and any join run, the relay
    // has caught up
    let ran = report.invocations();
    for (at, _) in ran.iter().enumerate().filter(|(_, id)| **id == join) {
        let last_loop = ran[..at].iter().rposition(|m| *m == relayed).unwrap();
        assert!(
            ran[last_loop..at].contains(&relay),
            "{join} ran on stale input at {at}: {ran:?}"
        );
    }
    assert_eq!(ran.last(), Some(&join));
}

// ----------------------------------------------------------------------------
// Further behaviour
// ----------------------------------------------------------------------------

#[test]
fn streaming_module_drains_its_producer() {
    let fixture = Fixture::new();
    let controller = fixture.controller();
    let streamer = add(&controller, "Streamer");
    let collector = add(&controller, "Collector");
    controller.connect(&streamer, 0, &collector, 0).unwrap();

    let progress = Arc::new(Mutex::new(0));
    let counter = progress.clone();
    controller.subscribe(move |event| {
        if let NetworkEvent::ModuleProgress { .. } = event {
            *counter.lock() += 1;
        }
    });

    let report = controller.execute_all().unwrap();
    assert_eq!(*fixture.received.lock(), vec![0, 10, 20]);
    // One invocation per chunk plus the one that sees the closed queue
    assert_eq!(report.count(&streamer), 4);
    assert_eq!(report.count(&collector), 3);
    assert_eq!(*progress.lock(), 3);
}

#[test]
fn execute_from_runs_downstream_only() {
    let fixture = Fixture::new();
    let controller = fixture.controller();
    let a = add(&controller, "Source");
    let b = add(&controller, "Relay");
    let c = add(&controller, "Relay");
    let other = add(&controller, "Source");
    controller.connect(&a, 0, &b, 0).unwrap();
    controller.connect(&b, 0, &c, 0).unwrap();
    controller.execute_all().unwrap();
    fixture.ran();

    let report = controller.execute_from(&b).unwrap();
    assert_eq!(report.invocations(), &[b, c.clone()]);
    assert_eq!(fixture.ran(), vec!["Relay:0", "Relay:1"]);
    // Modules outside the pass keep their outputs
    assert_eq!(output_value(&controller, &a), Some(1));
    assert_eq!(output_value(&controller, &other), Some(1));
    assert_eq!(output_value(&controller, &c), Some(1));
}

#[test]
fn dynamic_port_gathers_all_producers() {
    let fixture = Fixture::new();
    let controller = fixture.controller();
    let gather = add(&controller, "Gather");
    for value in [2_i64, 3, 4] {
        let source = add(&controller, "Source");
        controller
            .module_state(&source)
            .unwrap()
            .set_value("Value", value);
        controller.connect(&source, 0, &gather, 0).unwrap();
    }

    controller.execute_all().unwrap();
    let sum = controller
        .module_state(&gather)
        .unwrap()
        .get_value("Sum");
    assert_eq!(sum, Some(StateValue::Int(9)));
}

#[test]
fn legacy_failure_stops_the_pass() {
    let fixture = Fixture::new();
    let controller = fixture.controller();
    let source = add(&controller, "Source");
    let checker = add(&controller, "Checker");
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    controller.subscribe(move |event| {
        if let NetworkEvent::ModuleErrored { id, message } = event {
            sink.lock().push((id.clone(), message.clone()));
        }
    });

    let err = controller.execute_all().unwrap_err();
    assert!(matches!(
        &err,
        ExecutionError::Module {
            source: ModuleError::LegacyExecuteFailed,
            ..
        }
    ));
    assert_eq!(err.module(), Some(&checker));
    assert_eq!(errors.lock().len(), 1);
    // The source ran first and keeps its output
    assert_eq!(output_value(&controller, &source), Some(1));

    controller
        .module_state(&checker)
        .unwrap()
        .set_value("Fail", false);
    assert!(controller.execute_all().is_ok());
}

#[test]
fn saved_network_reloads_and_runs() {
    let fixture = Fixture::new();
    let controller = fixture.controller();
    let a = add(&controller, "Source");
    let b = add(&controller, "Relay");
    controller.connect(&a, 0, &b, 0).unwrap();
    controller.module_state(&a).unwrap().set_value("Value", 42_i64);

    let json = controller.save_network().to_json().unwrap();
    let file = NetworkFile::from_json(&json).unwrap();
    assert_eq!(file.modules[0].info.category_name, "DataIO");

    let restored = fixture.controller();
    restored.load_network(&file).unwrap();
    restored.execute_all().unwrap();
    assert_eq!(output_value(&restored, &b), Some(42));

    // Ids continue past the loaded ones
    assert_eq!(add(&restored, "Relay"), ModuleId::new("Relay", 1));
}

#[tokio::test]
async fn detached_execution_completes() {
    let fixture = Fixture::new();
    let controller = Arc::new(fixture.controller());
    let a = add(&controller, "Source");
    let b = add(&controller, "Relay");
    controller.connect(&a, 0, &b, 0).unwrap();

    let report = controller.execute_all_detached().await.unwrap().unwrap();
    assert_eq!(report.invocations(), &[a, b]);
}
