//! Non-fatal diagnostics raised during encode and decode.
//!
//! A problem records that some value could not be processed faithfully,
//! together with the property trace in effect when it was raised. Problems
//! accumulate; they never abort the operation that raised them. What to do
//! with the accumulated set (log it, fail the run, ignore it) is the
//! caller's policy.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::trace::PropertyTrace;

/// One diagnostic, attributed to where in the graph it was raised.
#[derive(Clone, Debug)]
pub struct Problem {
    pub trace: PropertyTrace,
    pub message: String,
}

impl Problem {
    pub fn new(trace: PropertyTrace, message: impl Into<String>) -> Self {
        Problem {
            trace,
            message: message.into(),
        }
    }
}

/// Consumer of problems raised by an operation.
///
/// Implementations are infallible by contract: raising a problem must never
/// disturb the operation that raised it.
pub trait ProblemSink {
    fn on_problem(&self, problem: Problem);
}

/// A sink that appends problems in raise order.
///
/// Clones share the same underlying list, so callers can keep one handle
/// while the context holds another.
#[derive(Clone, Default)]
pub struct ProblemCollector {
    problems: Rc<RefCell<Vec<Problem>>>,
}

impl ProblemCollector {
    pub fn new() -> Self {
        ProblemCollector::default()
    }

    pub fn len(&self) -> usize {
        self.problems.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.borrow().is_empty()
    }

    /// Removes and returns everything collected so far.
    pub fn take(&self) -> Vec<Problem> {
        self.problems.take()
    }
}

impl ProblemSink for ProblemCollector {
    fn on_problem(&self, problem: Problem) {
        self.problems.borrow_mut().push(problem);
    }
}

/// Serializable summary of the problems from one operation, suitable for
/// persisting next to the encoded graph or shipping to a report consumer.
#[derive(Debug, Serialize)]
pub struct ProblemReport {
    pub problem_count: usize,
    pub problems: Vec<ReportedProblem>,
}

#[derive(Debug, Serialize)]
pub struct ReportedProblem {
    pub path: String,
    pub segments: Vec<String>,
    pub message: String,
}

impl ProblemReport {
    pub fn new(problems: &[Problem]) -> Self {
        let problems: Vec<ReportedProblem> = problems
            .iter()
            .map(|p| ReportedProblem {
                path: p.trace.to_string(),
                segments: p.trace.segments(),
                message: p.message.clone(),
            })
            .collect();
        ProblemReport {
            problem_count: problems.len(),
            problems,
        }
    }

    /// Renders the report as pretty-printed JSON, for persisting next to
    /// the encoded graph.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
