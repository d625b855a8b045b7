//! Constraint programming over boolean decisions.
//!
//! [`ConstraintModel`] is the seam between the roster formulation and the
//! solver: boolean variables, linear constraints over them (optionally
//! enforced only when some literals hold), a linear objective to maximize
//! and value hints. Two backends:
//!
//! - [`PumpkinModel`]: the Pumpkin CP solver (lazy clause generation), used
//!   for production runs.
//! - [`InMemoryModel`]: a small propagate-and-branch search with an
//!   objective bound, run on several threads that share the incumbent.
//!
//! Either backend stops at its time budget or when the [`CancelToken`] in
//! its [`SolverConfig`] is cancelled.
//!
//! # Modules
//!
//! - **`pumpkin`**: Pumpkin-backed model
//! - **`search`**: In-memory branch-and-bound backend
//! - **`roster`**: Roster formulation (agents × dates × shift candidates)
//!
//! # Reference
//! - Rossi, van Beek & Walsh (2006), "Handbook of Constraint Programming", Ch. 3-4
//! - Land & Doig (1960), "An Automatic Method of Solving Discrete Programming Problems"

mod pumpkin;
mod roster;
mod search;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use pumpkin::PumpkinModel;
pub use roster::{ObjectiveWeights, RosterCpBuilder, RosterSolution, RosterVars};
pub use search::InMemoryModel;

/// A boolean decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoolVar(pub(crate) usize);

impl BoolVar {
    /// Index in creation order.
    pub fn index(self) -> usize {
        self.0
    }

    /// The literal "this variable is true".
    pub fn lit(self) -> Literal {
        Literal {
            var: self,
            positive: true,
        }
    }

    /// The literal "this variable is false".
    pub fn not(self) -> Literal {
        Literal {
            var: self,
            positive: false,
        }
    }
}

/// A variable or its negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Literal {
    /// Underlying variable.
    pub var: BoolVar,
    /// `true` = the variable itself, `false` = its negation.
    pub positive: bool,
}

impl From<BoolVar> for Literal {
    fn from(var: BoolVar) -> Self {
        var.lit()
    }
}

/// A linear expression `Σ coef·var + constant` over boolean variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearExpr {
    /// `(variable, coefficient)` terms.
    pub terms: Vec<(BoolVar, i64)>,
    /// Constant offset.
    pub constant: i64,
}

impl LinearExpr {
    /// The empty expression (0).
    pub fn new() -> Self {
        Self::default()
    }

    /// `Σ vars` with unit coefficients.
    pub fn sum<I: IntoIterator<Item = BoolVar>>(vars: I) -> Self {
        Self {
            terms: vars.into_iter().map(|v| (v, 1)).collect(),
            constant: 0,
        }
    }

    /// `Σ coef·var`.
    pub fn weighted<I: IntoIterator<Item = (BoolVar, i64)>>(terms: I) -> Self {
        Self {
            terms: terms.into_iter().collect(),
            constant: 0,
        }
    }

    /// Adds a term.
    pub fn add_term(&mut self, var: BoolVar, coef: i64) {
        if coef != 0 {
            self.terms.push((var, coef));
        }
    }

    /// Adds a term (builder form).
    pub fn with_term(mut self, var: BoolVar, coef: i64) -> Self {
        self.add_term(var, coef);
        self
    }

    /// Whether the expression has no variable terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Value under a full assignment.
    pub fn evaluate(&self, values: &[bool]) -> i64 {
        self.constant
            + self
                .terms
                .iter()
                .filter(|(v, _)| values.get(v.0).copied().unwrap_or(false))
                .map(|(_, c)| *c)
                .sum::<i64>()
    }
}

/// Comparison of a linear constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// `expr <= rhs`
    Le,
    /// `expr >= rhs`
    Ge,
    /// `expr == rhs`
    Eq,
}

/// `expr (<=|>=|==) rhs`, enforced only when every enforcement literal holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConstraint {
    /// Left-hand side.
    pub expr: LinearExpr,
    /// Comparison.
    pub relation: Relation,
    /// Right-hand side.
    pub rhs: i64,
    /// Conjunction of literals that activates the constraint. Empty = always.
    pub enforcement: Vec<Literal>,
}

impl LinearConstraint {
    /// `expr <= rhs`.
    pub fn le(expr: LinearExpr, rhs: i64) -> Self {
        Self::new(expr, Relation::Le, rhs)
    }

    /// `expr >= rhs`.
    pub fn ge(expr: LinearExpr, rhs: i64) -> Self {
        Self::new(expr, Relation::Ge, rhs)
    }

    /// `expr == rhs`.
    pub fn eq(expr: LinearExpr, rhs: i64) -> Self {
        Self::new(expr, Relation::Eq, rhs)
    }

    fn new(expr: LinearExpr, relation: Relation, rhs: i64) -> Self {
        Self {
            expr,
            relation,
            rhs,
            enforcement: Vec::new(),
        }
    }

    /// Enforces the constraint only when `lit` holds.
    pub fn only_if(mut self, lit: impl Into<Literal>) -> Self {
        self.enforcement.push(lit.into());
        self
    }

    /// Whether a full assignment satisfies the constraint.
    pub fn is_satisfied(&self, values: &[bool]) -> bool {
        let active = self
            .enforcement
            .iter()
            .all(|l| values.get(l.var.0).copied().unwrap_or(false) == l.positive);
        if !active {
            return true;
        }
        let lhs = self.expr.evaluate(values);
        match self.relation {
            Relation::Le => lhs <= self.rhs,
            Relation::Ge => lhs >= self.rhs,
            Relation::Eq => lhs == self.rhs,
        }
    }
}

/// Model-building and solving operations.
///
/// The roster formulation only talks to this trait, so the backend can be
/// replaced by a binding to an external solver.
pub trait ConstraintModel {
    /// Creates a boolean variable.
    fn new_bool_var(&mut self, name: &str) -> BoolVar;

    /// Adds a linear constraint.
    fn add_constraint(&mut self, constraint: LinearConstraint);

    /// Sets the expression to maximize.
    fn maximize(&mut self, objective: LinearExpr);

    /// Suggests a value for a variable.
    fn add_hint(&mut self, var: BoolVar, value: bool);

    /// Number of variables.
    fn var_count(&self) -> usize;

    /// Number of constraints.
    fn constraint_count(&self) -> usize;

    /// Searches for the best assignment within the configured budget.
    fn solve(&self, config: &SolverConfig) -> CpSolution;

    /// `Σ vars <= rhs`.
    fn add_at_most(&mut self, vars: &[BoolVar], rhs: i64) {
        self.add_constraint(LinearConstraint::le(LinearExpr::sum(vars.iter().copied()), rhs));
    }

    /// `Σ vars == target`, for a boolean `target`.
    fn add_sum_equals(&mut self, vars: &[BoolVar], target: BoolVar) {
        let expr = LinearExpr::sum(vars.iter().copied()).with_term(target, -1);
        self.add_constraint(LinearConstraint::eq(expr, 0));
    }

    /// Fixes a variable.
    fn fix(&mut self, var: BoolVar, value: bool) {
        let expr = LinearExpr::sum([var]);
        self.add_constraint(LinearConstraint::eq(expr, i64::from(value)));
    }
}

/// Which [`ConstraintModel`] implementation solves the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverBackend {
    /// [`PumpkinModel`].
    #[default]
    Pumpkin,
    /// [`InMemoryModel`].
    InMemory,
}

/// Shared flag asking a running search to stop.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every holder to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether [`cancel`](Self::cancel) was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl PartialEq for CancelToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Solver parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Wall-clock search budget.
    pub time_budget: Duration,
    /// Parallel search workers (at least 1). The Pumpkin backend runs one.
    pub workers: usize,
    /// Seed for the diversified workers.
    pub seed: u64,
    /// Nodes between clock checks.
    pub check_interval: u64,
    /// Stops the search early when cancelled.
    #[serde(skip)]
    pub cancel: Option<CancelToken>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_budget: Duration::from_secs(30),
            workers: 4,
            seed: 0x5eed,
            check_interval: 512,
            cancel: None,
        }
    }
}

impl SolverConfig {
    /// Sets the time budget.
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = budget;
        self
    }

    /// Sets the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Attaches a cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Whether the attached token, if any, has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// Outcome of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    /// Best solution proven optimal.
    Optimal,
    /// A solution was found but the budget ran out.
    Feasible,
    /// The search space was exhausted without a solution.
    Infeasible,
    /// The budget ran out without a solution.
    Unknown,
}

/// A search result.
#[derive(Debug, Clone)]
pub struct CpSolution {
    /// Outcome.
    pub status: SolveStatus,
    /// Objective of the returned assignment.
    pub objective: i64,
    /// Variable values (empty when no solution).
    pub values: Vec<bool>,
    /// Nodes explored over all workers (0 when the backend does not count them).
    pub nodes: u64,
    /// Wall-clock time spent.
    pub elapsed: Duration,
}

impl CpSolution {
    /// Whether an assignment is available.
    pub fn is_solution_found(&self) -> bool {
        matches!(self.status, SolveStatus::Optimal | SolveStatus::Feasible)
    }

    /// Value of a variable (false when absent).
    pub fn value(&self, var: BoolVar) -> bool {
        self.values.get(var.0).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_evaluate() {
        let e = LinearExpr::weighted([(BoolVar(0), 3), (BoolVar(1), -2)]).with_term(BoolVar(2), 0);
        assert_eq!(e.terms.len(), 2); // zero coefficient dropped
        assert_eq!(e.evaluate(&[true, true, true]), 1);
        assert_eq!(e.evaluate(&[true, false, false]), 3);
    }

    #[test]
    fn test_constraint_satisfaction() {
        let c = LinearConstraint::le(LinearExpr::sum([BoolVar(0), BoolVar(1)]), 1);
        assert!(c.is_satisfied(&[true, false]));
        assert!(!c.is_satisfied(&[true, true]));

        let gated = c.clone().only_if(BoolVar(2));
        assert!(gated.is_satisfied(&[true, true, false]));
        assert!(!gated.is_satisfied(&[true, true, true]));

        let negated = c.only_if(BoolVar(2).not());
        assert!(negated.is_satisfied(&[true, true, true]));
    }

    #[test]
    fn test_cancel_token_shared_by_clones() {
        let token = CancelToken::new();
        let config = SolverConfig::default().with_cancel(token.clone());
        assert!(!config.is_cancelled());
        token.cancel();
        assert!(config.is_cancelled());
        assert!(!SolverConfig::default().is_cancelled());
        assert_ne!(token, CancelToken::new());
    }
}
