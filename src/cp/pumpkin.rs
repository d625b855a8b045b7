//! Pumpkin-backed model.
//!
//! # Encoding
//!
//! - Every boolean becomes a 0/1 integer domain.
//! - `expr ≤ rhs` and `expr == rhs` rows are posted as `≥` rows over
//!   scaled views.
//! - An enforced row is relaxed by big-M over the slack of its
//!   enforcement literals (the number of literals that are false), so it
//!   binds only when every literal holds.
//! - The objective is channelled into one bounded integer that linear
//!   SAT-UNSAT search maximises.
//!
//! Pumpkin's solver works on `i32`; a model whose coefficients or bounds
//! do not fit reports [`SolveStatus::Unknown`].
//!
//! # Reference
//! Flippo et al. (2024), "A Multi-Stage Proof Logging Framework to Certify
//! the Correctness of CP Solvers", CP 2024

use std::collections::BTreeMap;
use std::time::Instant;

use pumpkin_solver::constraints as cp;
use pumpkin_solver::optimisation::linear_sat_unsat::LinearSatUnsat;
use pumpkin_solver::optimisation::OptimisationDirection;
use pumpkin_solver::results::{OptimisationResult, ProblemSolution};
use pumpkin_solver::termination::{TerminationCondition, TimeBudget};
use pumpkin_solver::variables::TransformableVariable;
use pumpkin_solver::Solver;
use tracing::{debug, warn};

use super::{BoolVar, CancelToken, ConstraintModel, CpSolution, LinearConstraint, LinearExpr, Relation, SolveStatus, SolverConfig};

/// A [`ConstraintModel`] solved by Pumpkin.
///
/// The model is recorded as it is built and translated on every
/// [`solve`](ConstraintModel::solve). Hints are ignored: the default
/// brancher picks its own values.
///
/// # Example
/// ```
/// use u_roster::cp::{ConstraintModel, LinearExpr, PumpkinModel, SolverConfig, SolveStatus};
///
/// let mut model = PumpkinModel::new();
/// let x = model.new_bool_var("x");
/// let y = model.new_bool_var("y");
/// model.add_at_most(&[x, y], 1);
/// model.maximize(LinearExpr::weighted([(x, 2), (y, 3)]));
///
/// let solution = model.solve(&SolverConfig::default());
/// assert_eq!(solution.status, SolveStatus::Optimal);
/// assert_eq!(solution.objective, 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PumpkinModel {
    names: Vec<String>,
    constraints: Vec<LinearConstraint>,
    objective: LinearExpr,
}

impl PumpkinModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Name given to a variable.
    pub fn name(&self, var: BoolVar) -> Option<&str> {
        self.names.get(var.0).map(String::as_str)
    }
}

impl ConstraintModel for PumpkinModel {
    fn new_bool_var(&mut self, name: &str) -> BoolVar {
        self.names.push(name.to_string());
        BoolVar(self.names.len() - 1)
    }

    fn add_constraint(&mut self, constraint: LinearConstraint) {
        self.constraints.push(constraint);
    }

    fn maximize(&mut self, objective: LinearExpr) {
        self.objective = objective;
    }

    fn add_hint(&mut self, _var: BoolVar, _value: bool) {}

    fn var_count(&self) -> usize {
        self.names.len()
    }

    fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    fn solve(&self, config: &SolverConfig) -> CpSolution {
        let started = Instant::now();
        let finish = |status: SolveStatus, values: Vec<bool>| {
            let objective = if values.is_empty() { 0 } else { self.objective.evaluate(&values) };
            let elapsed = started.elapsed();
            debug!(
                vars = self.names.len(),
                constraints = self.constraints.len(),
                ?status,
                objective,
                elapsed_ms = elapsed.as_millis() as u64,
                "pumpkin search finished"
            );
            CpSolution {
                status,
                objective,
                values,
                nodes: 0,
                elapsed,
            }
        };

        let Some(rows) = self.rows() else {
            warn!("model coefficients exceed the solver's integer range");
            return finish(SolveStatus::Unknown, Vec::new());
        };
        let Some(objective) = ObjectiveRow::new(&self.objective) else {
            warn!("objective exceeds the solver's integer range");
            return finish(SolveStatus::Unknown, Vec::new());
        };

        let mut solver = Solver::default();
        let tag = solver.new_constraint_tag();
        let vars: Vec<_> = (0..self.names.len()).map(|_| solver.new_bounded_integer(0, 1)).collect();

        let mut feasible = true;
        for row in &rows {
            if row.terms.is_empty() {
                feasible &= 0 >= row.rhs;
                continue;
            }
            let terms = row.terms.iter().map(|&(v, k)| vars[v].scaled(k)).collect::<Vec<_>>();
            feasible &= solver
                .add_constraint(cp::greater_than_or_equals(terms, row.rhs, tag))
                .post()
                .is_ok();
        }

        // objective == Σ k·x, as two ≥ rows
        let obj = solver.new_bounded_integer(objective.lower, objective.upper);
        let mut up = objective.terms.iter().map(|&(v, k)| vars[v].scaled(k)).collect::<Vec<_>>();
        up.push(obj.scaled(-1));
        let mut down = objective.terms.iter().map(|&(v, k)| vars[v].scaled(-k)).collect::<Vec<_>>();
        down.push(obj.scaled(1));
        feasible &= solver.add_constraint(cp::greater_than_or_equals(up, 0, tag)).post().is_ok();
        feasible &= solver.add_constraint(cp::greater_than_or_equals(down, 0, tag)).post().is_ok();

        if !feasible {
            return finish(SolveStatus::Infeasible, Vec::new());
        }

        let mut brancher = solver.default_brancher();
        let mut termination = Termination {
            budget: TimeBudget::starting_now(config.time_budget),
            cancel: config.cancel.clone(),
        };
        fn noop_callback<B>(_: &Solver, _: pumpkin_solver::results::SolutionReference, _: &B) {}
        let result = solver.optimise(
            &mut brancher,
            &mut termination,
            LinearSatUnsat::new(OptimisationDirection::Maximise, obj, noop_callback),
        );

        match result {
            OptimisationResult::Optimal(solution) => {
                let values = vars.iter().map(|&v| solution.get_integer_value(v) == 1).collect();
                finish(SolveStatus::Optimal, values)
            }
            OptimisationResult::Satisfiable(solution) => {
                let values = vars.iter().map(|&v| solution.get_integer_value(v) == 1).collect();
                finish(SolveStatus::Feasible, values)
            }
            OptimisationResult::Unsatisfiable => finish(SolveStatus::Infeasible, Vec::new()),
            OptimisationResult::Unknown => finish(SolveStatus::Unknown, Vec::new()),
        }
    }
}

impl PumpkinModel {
    /// Every constraint as `≥` rows over variable indices.
    fn rows(&self) -> Option<Vec<Row>> {
        let mut rows = Vec::with_capacity(self.constraints.len());
        for c in &self.constraints {
            let rhs = c.rhs - c.expr.constant;
            // slack = constant + Σ terms counts the false enforcement literals
            let mut slack_terms: Vec<(usize, i64)> = Vec::with_capacity(c.enforcement.len());
            let mut slack_constant = 0i64;
            for lit in &c.enforcement {
                if lit.positive {
                    slack_constant += 1;
                    slack_terms.push((lit.var.0, -1));
                } else {
                    slack_terms.push((lit.var.0, 1));
                }
            }
            let expr: Vec<(usize, i64)> = c.expr.terms.iter().map(|(v, k)| (v.0, *k)).collect();
            let (min, max) = bounds(&expr);

            if matches!(c.relation, Relation::Ge | Relation::Eq) {
                // expr + M·slack ≥ rhs
                let m = (rhs - min).max(0);
                let terms = expr.iter().copied().chain(slack_terms.iter().map(|&(v, k)| (v, m * k)));
                rows.push(Row::new(terms, rhs - m * slack_constant)?);
            }
            if matches!(c.relation, Relation::Le | Relation::Eq) {
                // -expr + M·slack ≥ -rhs
                let m = (max - rhs).max(0);
                let terms = expr
                    .iter()
                    .map(|&(v, k)| (v, -k))
                    .chain(slack_terms.iter().map(|&(v, k)| (v, m * k)));
                rows.push(Row::new(terms, -rhs - m * slack_constant)?);
            }
        }
        Some(rows)
    }
}

/// `Σ k·x ≥ rhs` with merged terms, in the solver's integer width.
struct Row {
    terms: Vec<(usize, i32)>,
    rhs: i32,
}

/// Channelled objective `Σ k·x` with its reachable range.
struct ObjectiveRow {
    terms: Vec<(usize, i32)>,
    lower: i32,
    upper: i32,
}

impl Row {
    fn new(terms: impl IntoIterator<Item = (usize, i64)>, rhs: i64) -> Option<Self> {
        Some(Self {
            terms: merge(terms)?,
            rhs: i32::try_from(rhs).ok()?,
        })
    }
}

impl ObjectiveRow {
    fn new(expr: &LinearExpr) -> Option<Self> {
        let raw: Vec<(usize, i64)> = expr.terms.iter().map(|(v, k)| (v.0, *k)).collect();
        let (lower, upper) = bounds(&raw);
        Some(Self {
            terms: merge(raw)?,
            lower: i32::try_from(lower).ok()?,
            upper: i32::try_from(upper).ok()?,
        })
    }
}

fn merge(terms: impl IntoIterator<Item = (usize, i64)>) -> Option<Vec<(usize, i32)>> {
    let mut merged: BTreeMap<usize, i64> = BTreeMap::new();
    for (v, k) in terms {
        *merged.entry(v).or_insert(0) += k;
    }
    merged
        .into_iter()
        .filter(|(_, k)| *k != 0)
        .map(|(v, k)| i32::try_from(k).ok().map(|k| (v, k)))
        .collect()
}

/// Smallest and largest value of `Σ k·x` over 0/1 assignments.
fn bounds(terms: &[(usize, i64)]) -> (i64, i64) {
    let mut merged: BTreeMap<usize, i64> = BTreeMap::new();
    for &(v, k) in terms {
        *merged.entry(v).or_insert(0) += k;
    }
    merged.values().fold((0, 0), |(lo, hi), &k| if k < 0 { (lo + k, hi) } else { (lo, hi + k) })
}

/// Time budget that also honours a cancel token.
struct Termination {
    budget: TimeBudget,
    cancel: Option<CancelToken>,
}

impl TerminationCondition for Termination {
    fn should_stop(&mut self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) || self.budget.should_stop()
    }
}
