//! A small clause solver with cost minimization.
//!
//! The SAT resolver's encoding only needs propositional clauses and a
//! "select as few variables as possible" objective, so the solver is a
//! branch-and-bound DPLL: unit propagation to a fixed point, branch on the
//! first unassigned variable (false first, which biases the search toward
//! small selections early), and prune any branch that already selects at
//! least as many variables as the best complete model found so far. The
//! search is complete, so the returned model has minimum cost.

/// A propositional formula in conjunctive normal form. Literals are
/// non-zero integers: `v + 1` for variable `v`, negative for its negation.
#[derive(Debug, Default, Clone)]
pub struct Formula {
    num_vars: usize,
    clauses: Vec<Vec<i32>>,
}

/// The positive literal of variable `v`.
pub fn lit(v: usize) -> i32 {
    i32::try_from(v + 1).expect("variable index out of range")
}

impl Formula {
    pub fn new(num_vars: usize) -> Self {
        Self {
            num_vars,
            clauses: Vec::new(),
        }
    }

    /// Add a clause (a disjunction of literals).
    pub fn clause(&mut self, lits: Vec<i32>) {
        debug_assert!(lits.iter().all(|&l| l != 0 && l.unsigned_abs() as usize <= self.num_vars));
        self.clauses.push(lits);
    }

    /// Add pairwise clauses asserting that at most one of the variables is
    /// true.
    pub fn at_most_one(&mut self, vars: &[usize]) {
        for (i, &a) in vars.iter().enumerate() {
            for &b in &vars[i + 1..] {
                self.clause(vec![-lit(a), -lit(b)]);
            }
        }
    }

    /// Find a model with the fewest true variables, or `None` if the
    /// formula is unsatisfiable.
    pub fn solve_minimize(&self) -> Option<Vec<bool>> {
        let mut best: Option<(usize, Vec<bool>)> = None;
        self.search(vec![None; self.num_vars], &mut best);
        best.map(|(_, model)| model)
    }

    fn search(&self, mut assign: Vec<Option<bool>>, best: &mut Option<(usize, Vec<bool>)>) {
        if !self.propagate(&mut assign) {
            return;
        }
        let cost = assign.iter().filter(|a| **a == Some(true)).count();
        if let Some((best_cost, _)) = best {
            // Further assignments only ever add true variables.
            if cost >= *best_cost {
                return;
            }
        }
        match assign.iter().position(|a| a.is_none()) {
            None => {
                *best = Some((cost, assign.iter().map(|a| a.unwrap_or(false)).collect()));
            }
            Some(v) => {
                let mut negative = assign.clone();
                negative[v] = Some(false);
                self.search(negative, best);
                assign[v] = Some(true);
                self.search(assign, best);
            }
        }
    }

    /// Unit-propagate to a fixed point. Returns false on conflict.
    fn propagate(&self, assign: &mut [Option<bool>]) -> bool {
        loop {
            let mut changed = false;
            for clause in &self.clauses {
                let mut satisfied = false;
                let mut unassigned = None;
                let mut unassigned_count = 0;
                for &l in clause {
                    match value(assign, l) {
                        Some(true) => {
                            satisfied = true;
                            break;
                        }
                        Some(false) => {}
                        None => {
                            unassigned = Some(l);
                            unassigned_count += 1;
                        }
                    }
                }
                if satisfied {
                    continue;
                }
                match unassigned_count {
                    0 => return false,
                    1 => {
                        let l = unassigned.expect("counted one unassigned literal");
                        assign[(l.unsigned_abs() as usize) - 1] = Some(l > 0);
                        changed = true;
                    }
                    _ => {}
                }
            }
            if !changed {
                return true;
            }
        }
    }
}

fn value(assign: &[Option<bool>], l: i32) -> Option<bool> {
    let v = assign[(l.unsigned_abs() as usize) - 1]?;
    Some(if l > 0 { v } else { !v })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_clause() {
        let mut f = Formula::new(1);
        f.clause(vec![lit(0)]);
        assert_eq!(f.solve_minimize(), Some(vec![true]));
    }

    #[test]
    fn test_unsat() {
        let mut f = Formula::new(1);
        f.clause(vec![lit(0)]);
        f.clause(vec![-lit(0)]);
        assert_eq!(f.solve_minimize(), None);
    }

    #[test]
    fn test_minimization_prefers_fewer_true() {
        // x0 and (x1 or x2): the minimum model picks exactly one of x1/x2.
        let mut f = Formula::new(3);
        f.clause(vec![lit(0)]);
        f.clause(vec![lit(1), lit(2)]);
        let model = f.solve_minimize().unwrap();
        assert!(model[0]);
        assert_eq!(model.iter().filter(|&&b| b).count(), 2);
    }

    #[test]
    fn test_implication_chain() {
        // x0, x0 -> x1, x1 -> x2: everything forced true.
        let mut f = Formula::new(3);
        f.clause(vec![lit(0)]);
        f.clause(vec![-lit(0), lit(1)]);
        f.clause(vec![-lit(1), lit(2)]);
        assert_eq!(f.solve_minimize(), Some(vec![true, true, true]));
    }

    #[test]
    fn test_at_most_one() {
        // One of three must be picked, at most one may be.
        let mut f = Formula::new(3);
        f.clause(vec![lit(0), lit(1), lit(2)]);
        f.at_most_one(&[0, 1, 2]);
        let model = f.solve_minimize().unwrap();
        assert_eq!(model.iter().filter(|&&b| b).count(), 1);
    }

    #[test]
    fn test_minimization_avoids_expensive_branch() {
        // x0, and x0 -> (x1 or x2); x1 drags in x3 and x4. Minimal model
        // takes x2 alone.
        let mut f = Formula::new(5);
        f.clause(vec![lit(0)]);
        f.clause(vec![-lit(0), lit(1), lit(2)]);
        f.clause(vec![-lit(1), lit(3)]);
        f.clause(vec![-lit(1), lit(4)]);
        let model = f.solve_minimize().unwrap();
        assert_eq!(model, vec![true, false, true, false, false]);
    }
}
