//! In-memory branch-and-bound backend.
//!
//! # Algorithm
//!
//! 1. Depth-first search over variables in creation order.
//! 2. At every node, linear constraints are propagated to a fixpoint using
//!    activity bounds (min/max reachable value of the left-hand side).
//!    A violated constraint with exactly one open enforcement literal fixes
//!    that literal to false.
//! 3. A node is pruned when the optimistic objective (fixed part plus every
//!    open positive coefficient) cannot beat the incumbent.
//! 4. Values are tried in hint order, else in the direction that raises the
//!    objective. Workers other than the first flip that order at random,
//!    and all workers share the best objective found so far.
//!
//! Worker 0 is never stopped by the others and wins objective ties, so a
//! search that completes returns the same assignment on every run. All
//! workers stop at the deadline or when the cancel token fires.
//!
//! # Complexity
//! Exponential in the worst case; bounded by the configured time budget.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::{
    BoolVar, CancelToken, ConstraintModel, CpSolution, LinearConstraint, LinearExpr, Relation, SolveStatus, SolverConfig,
};

/// Probability that a diversified worker flips its preferred value.
const FLIP_PROBABILITY: f64 = 0.2;

const UNASSIGNED: i8 = -1;

/// A [`ConstraintModel`] solved in process.
///
/// # Example
/// ```
/// use u_roster::cp::{ConstraintModel, InMemoryModel, LinearExpr, SolverConfig, SolveStatus};
///
/// let mut model = InMemoryModel::new();
/// let x = model.new_bool_var("x");
/// let y = model.new_bool_var("y");
/// model.add_at_most(&[x, y], 1);
/// model.maximize(LinearExpr::weighted([(x, 2), (y, 3)]));
///
/// let solution = model.solve(&SolverConfig::default().with_workers(1));
/// assert_eq!(solution.status, SolveStatus::Optimal);
/// assert_eq!(solution.objective, 3);
/// assert!(solution.value(y));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryModel {
    names: Vec<String>,
    constraints: Vec<LinearConstraint>,
    objective: LinearExpr,
    hints: Vec<Option<bool>>,
}

impl InMemoryModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Name given to a variable.
    pub fn name(&self, var: BoolVar) -> Option<&str> {
        self.names.get(var.0).map(String::as_str)
    }

    /// The constraints added so far.
    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    /// The objective.
    pub fn objective(&self) -> &LinearExpr {
        &self.objective
    }
}

impl ConstraintModel for InMemoryModel {
    fn new_bool_var(&mut self, name: &str) -> BoolVar {
        self.names.push(name.to_string());
        self.hints.push(None);
        BoolVar(self.names.len() - 1)
    }

    fn add_constraint(&mut self, constraint: LinearConstraint) {
        self.constraints.push(constraint);
    }

    fn maximize(&mut self, objective: LinearExpr) {
        self.objective = objective;
    }

    fn add_hint(&mut self, var: BoolVar, value: bool) {
        if let Some(h) = self.hints.get_mut(var.0) {
            *h = Some(value);
        }
    }

    fn var_count(&self) -> usize {
        self.names.len()
    }

    fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    fn solve(&self, config: &SolverConfig) -> CpSolution {
        let started = Instant::now();
        let compiled = Compiled::from_model(self);
        let shared = Shared {
            best: AtomicI64::new(i64::MIN),
            stop: AtomicBool::new(false),
            nodes: AtomicU64::new(0),
            deadline: started + config.time_budget,
            check_interval: config.check_interval.max(1),
            cancel: config.cancel.clone(),
        };

        let workers = config.workers.max(1);
        let outcomes: Vec<WorkerOutcome> = if workers == 1 {
            vec![Worker::new(&compiled, &shared, 0, None).run()]
        } else {
            thread::scope(|scope| {
                let handles: Vec<_> = (0..workers)
                    .map(|idx| {
                        let rng = (idx > 0).then(|| SmallRng::seed_from_u64(config.seed.wrapping_add(idx as u64)));
                        let compiled = &compiled;
                        let shared = &shared;
                        scope.spawn(move || Worker::new(compiled, shared, idx, rng).run())
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or_default())
                    .collect()
            })
        };

        let completed = outcomes.iter().any(|o| o.completed);
        let mut best: Option<(i64, Vec<bool>)> = None;
        for outcome in outcomes {
            if let Some((obj, values)) = outcome.best {
                if best.as_ref().map_or(true, |(b, _)| obj > *b) {
                    best = Some((obj, values));
                }
            }
        }

        let status = match (&best, completed) {
            (Some(_), true) => SolveStatus::Optimal,
            (Some(_), false) => SolveStatus::Feasible,
            (None, true) => SolveStatus::Infeasible,
            (None, false) => SolveStatus::Unknown,
        };
        let nodes = shared.nodes.load(Ordering::Relaxed);
        let elapsed = started.elapsed();
        debug!(
            vars = self.names.len(),
            constraints = self.constraints.len(),
            workers,
            nodes,
            ?status,
            elapsed_ms = elapsed.as_millis() as u64,
            "cp search finished"
        );

        let (objective, values) = best.unwrap_or((0, Vec::new()));
        CpSolution {
            status,
            objective,
            values,
            nodes,
            elapsed,
        }
    }
}

// ======================== Compiled form ========================

struct Compiled {
    constraints: Vec<CompiledConstraint>,
    obj_coef: Vec<i64>,
    obj_constant: i64,
    hints: Vec<Option<bool>>,
    watches: Vec<Vec<usize>>,
}

struct CompiledConstraint {
    terms: Vec<(usize, i64)>,
    relation: Relation,
    rhs: i64,
    enforcement: Vec<(usize, bool)>,
}

impl Compiled {
    fn from_model(model: &InMemoryModel) -> Self {
        let n = model.names.len();
        let mut watches = vec![Vec::new(); n];
        let mut constraints = Vec::with_capacity(model.constraints.len());

        for (idx, c) in model.constraints.iter().enumerate() {
            let mut terms: Vec<(usize, i64)> = c.expr.terms.iter().map(|(v, k)| (v.0, *k)).collect();
            terms.sort_unstable_by_key(|(v, _)| *v);
            let mut merged: Vec<(usize, i64)> = Vec::with_capacity(terms.len());
            for (v, k) in terms {
                match merged.last_mut() {
                    Some((last, acc)) if *last == v => *acc += k,
                    _ => merged.push((v, k)),
                }
            }
            merged.retain(|(_, k)| *k != 0);

            let enforcement: Vec<(usize, bool)> = c.enforcement.iter().map(|l| (l.var.0, l.positive)).collect();
            for &(v, _) in &merged {
                watches[v].push(idx);
            }
            for &(v, _) in &enforcement {
                if watches[v].last() != Some(&idx) {
                    watches[v].push(idx);
                }
            }
            constraints.push(CompiledConstraint {
                terms: merged,
                relation: c.relation,
                rhs: c.rhs - c.expr.constant,
                enforcement,
            });
        }

        let mut obj_coef = vec![0i64; n];
        for (v, k) in &model.objective.terms {
            obj_coef[v.0] += *k;
        }

        Self {
            constraints,
            obj_coef,
            obj_constant: model.objective.constant,
            hints: model.hints.clone(),
            watches,
        }
    }
}

struct Shared {
    best: AtomicI64,
    stop: AtomicBool,
    nodes: AtomicU64,
    deadline: Instant,
    check_interval: u64,
    cancel: Option<CancelToken>,
}

impl Shared {
    fn out_of_time(&self) -> bool {
        Instant::now() >= self.deadline || self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

#[derive(Default)]
struct WorkerOutcome {
    best: Option<(i64, Vec<bool>)>,
    completed: bool,
}

struct Frame {
    trail_len: usize,
    var: usize,
    value: bool,
    flipped: bool,
}

// ======================== Search ========================

struct Worker<'a> {
    model: &'a Compiled,
    shared: &'a Shared,
    index: usize,
    rng: Option<SmallRng>,
    values: Vec<i8>,
    trail: Vec<usize>,
    bound: i64,
    queue: Vec<usize>,
    queued: Vec<bool>,
    best: Option<(i64, Vec<bool>)>,
    nodes: u64,
}

impl<'a> Worker<'a> {
    fn new(model: &'a Compiled, shared: &'a Shared, index: usize, rng: Option<SmallRng>) -> Self {
        let bound = model.obj_constant + model.obj_coef.iter().map(|k| (*k).max(0)).sum::<i64>();
        Self {
            model,
            shared,
            index,
            rng,
            values: vec![UNASSIGNED; model.obj_coef.len()],
            trail: Vec::new(),
            bound,
            queue: Vec::new(),
            queued: vec![false; model.constraints.len()],
            best: None,
            nodes: 0,
        }
    }

    fn run(mut self) -> WorkerOutcome {
        let completed = self.search();
        self.shared.nodes.fetch_add(self.nodes, Ordering::Relaxed);
        if completed && self.index == 0 {
            self.shared.stop.store(true, Ordering::Relaxed);
        }
        WorkerOutcome {
            best: self.best,
            completed,
        }
    }

    /// Runs the DFS. Returns `true` when the tree was exhausted.
    fn search(&mut self) -> bool {
        for c in 0..self.model.constraints.len() {
            self.enqueue(c);
        }
        let mut ok = self.propagate();
        let mut stack: Vec<Frame> = Vec::new();
        let mut cursor = 0;

        loop {
            if ok {
                if self.nodes % self.shared.check_interval == 0 && self.shared.out_of_time() {
                    return false;
                }
                self.nodes += 1;
                if self.index > 0 && self.shared.stop.load(Ordering::Relaxed) {
                    return false;
                }
                if self.can_prune() {
                    ok = false;
                    continue;
                }
                match self.next_unassigned(cursor) {
                    None => {
                        self.record_solution();
                        ok = false;
                    }
                    Some(var) => {
                        let value = self.choose(var);
                        stack.push(Frame {
                            trail_len: self.trail.len(),
                            var,
                            value,
                            flipped: false,
                        });
                        cursor = var;
                        ok = self.decide(var, value);
                    }
                }
                continue;
            }

            // backtrack to the most recent untried branch
            loop {
                let Some(frame) = stack.last_mut() else {
                    return true;
                };
                let trail_len = frame.trail_len;
                if frame.flipped {
                    stack.pop();
                    self.undo(trail_len);
                    continue;
                }
                frame.flipped = true;
                let (var, value) = (frame.var, !frame.value);
                self.undo(trail_len);
                cursor = var;
                ok = self.decide(var, value);
                break;
            }
        }
    }

    fn can_prune(&self) -> bool {
        if self.bound < self.shared.best.load(Ordering::Relaxed) {
            return true;
        }
        self.best.as_ref().is_some_and(|(b, _)| self.bound <= *b)
    }

    fn next_unassigned(&self, from: usize) -> Option<usize> {
        (from..self.values.len()).find(|&v| self.values[v] == UNASSIGNED)
    }

    fn choose(&mut self, var: usize) -> bool {
        let preferred = self.model.hints[var].unwrap_or(self.model.obj_coef[var] > 0);
        let flip = self.rng.as_mut().is_some_and(|rng| rng.random_bool(FLIP_PROBABILITY));
        if flip {
            !preferred
        } else {
            preferred
        }
    }

    fn record_solution(&mut self) {
        let objective = self.bound;
        if self.best.as_ref().map_or(true, |(b, _)| objective > *b) {
            self.best = Some((objective, self.values.iter().map(|v| *v == 1).collect()));
            self.shared.best.fetch_max(objective, Ordering::Relaxed);
        }
    }

    fn decide(&mut self, var: usize, value: bool) -> bool {
        self.assign(var, value) && self.propagate()
    }

    /// Assigns a variable. Returns `false` if it already holds the opposite value.
    fn assign(&mut self, var: usize, value: bool) -> bool {
        match self.values[var] {
            UNASSIGNED => {
                let v = i8::from(value);
                self.values[var] = v;
                self.trail.push(var);
                let k = self.model.obj_coef[var];
                self.bound += k * i64::from(v) - k.max(0);
                let model = self.model;
                for &c in &model.watches[var] {
                    self.enqueue(c);
                }
                true
            }
            current => (current == 1) == value,
        }
    }

    fn undo(&mut self, trail_len: usize) {
        while self.trail.len() > trail_len {
            let Some(var) = self.trail.pop() else { break };
            let k = self.model.obj_coef[var];
            self.bound -= k * i64::from(self.values[var]) - k.max(0);
            self.values[var] = UNASSIGNED;
        }
    }

    fn enqueue(&mut self, c: usize) {
        if !self.queued[c] {
            self.queued[c] = true;
            self.queue.push(c);
        }
    }

    fn clear_queue(&mut self) {
        for c in self.queue.drain(..) {
            self.queued[c] = false;
        }
    }

    /// Propagates queued constraints to a fixpoint. `false` on conflict.
    fn propagate(&mut self) -> bool {
        while let Some(c) = self.queue.pop() {
            self.queued[c] = false;
            if !self.propagate_one(c) {
                self.clear_queue();
                return false;
            }
        }
        true
    }

    fn propagate_one(&mut self, c: usize) -> bool {
        let model = self.model;
        let con = &model.constraints[c];

        let mut open_enforcement: Option<(usize, bool)> = None;
        let mut open_count = 0;
        for &(var, positive) in &con.enforcement {
            match self.values[var] {
                UNASSIGNED => {
                    open_count += 1;
                    open_enforcement = Some((var, positive));
                }
                v => {
                    if (v == 1) != positive {
                        return true; // inactive
                    }
                }
            }
        }

        let (mut min, mut max) = (0i64, 0i64);
        for &(var, k) in &con.terms {
            match self.values[var] {
                UNASSIGNED => {
                    if k > 0 {
                        max += k;
                    } else {
                        min += k;
                    }
                }
                v => {
                    min += k * i64::from(v);
                    max += k * i64::from(v);
                }
            }
        }

        let upper = matches!(con.relation, Relation::Le | Relation::Eq);
        let lower = matches!(con.relation, Relation::Ge | Relation::Eq);
        let violated = (upper && min > con.rhs) || (lower && max < con.rhs);

        if violated {
            return match (open_count, open_enforcement) {
                (0, _) => false,
                (1, Some((var, positive))) => self.assign(var, !positive),
                _ => true,
            };
        }
        if open_count > 0 {
            return true;
        }

        for &(var, k) in &con.terms {
            if self.values[var] != UNASSIGNED {
                continue;
            }
            let mut forced: Option<bool> = None;
            if upper {
                if k > 0 && min + k > con.rhs {
                    forced = Some(false);
                } else if k < 0 && min - k > con.rhs {
                    forced = Some(true);
                }
            }
            if lower {
                let need = if k > 0 && max - k < con.rhs {
                    Some(true)
                } else if k < 0 && max + k < con.rhs {
                    Some(false)
                } else {
                    None
                };
                match (forced, need) {
                    (Some(a), Some(b)) if a != b => return false,
                    (None, Some(b)) => forced = Some(b),
                    _ => {}
                }
            }
            if let Some(value) = forced {
                if !self.assign(var, value) {
                    return false;
                }
            }
        }
        true
    }
}
