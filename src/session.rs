//! Caller-owned planning session
//!
//! Holds the most recent finished optimization and runs new requests on a
//! background thread. Submitting a request cancels whatever request was
//! still in flight, and a result from a superseded request is refused.

use std::thread::{self, JoinHandle};

use log::debug;

use crate::assumptions::Assumptions;
use crate::error::{PlannerError, Result};
use crate::household::Household;
use crate::optimizer::{CancellationToken, OptimizationResult, Optimizer, Strategy};

/// Handle to an optimization running in the background
#[derive(Debug)]
pub struct PendingPlan {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<Result<OptimizationResult>>,
}

impl PendingPlan {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Block until the optimization finishes
    pub fn wait(self) -> Result<FinishedPlan> {
        let result = self
            .handle
            .join()
            .map_err(|_| PlannerError::Worker(format!("request {} panicked", self.generation)))??;
        Ok(FinishedPlan {
            generation: self.generation,
            result,
        })
    }
}

/// Output of a finished request, tagged with the request that produced it
#[derive(Debug, Clone)]
pub struct FinishedPlan {
    pub generation: u64,
    pub result: OptimizationResult,
}

#[derive(Debug)]
pub struct PlanningSession {
    optimizer: Optimizer,
    generation: u64,
    in_flight: Option<CancellationToken>,
    last: Option<OptimizationResult>,
}

impl PlanningSession {
    pub fn new(optimizer: Optimizer) -> Self {
        Self {
            optimizer,
            generation: 0,
            in_flight: None,
            last: None,
        }
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    /// Current request generation; 0 before the first submit
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_result(&self) -> Option<&OptimizationResult> {
        self.last.as_ref()
    }

    /// Start optimizing in the background, cancelling any earlier request
    pub fn submit(&mut self, household: Household, assumptions: Assumptions, strategy: Strategy) -> PendingPlan {
        if let Some(previous) = self.in_flight.take() {
            previous.cancel();
            debug!("request {} superseded", self.generation);
        }

        self.generation += 1;
        let generation = self.generation;
        let cancel = CancellationToken::new();
        self.in_flight = Some(cancel.clone());

        let optimizer = self.optimizer.clone();
        let token = cancel.clone();
        let handle = thread::spawn(move || {
            optimizer.optimize_with_cancel(&household, &assumptions, &strategy, &token)
        });

        PendingPlan {
            generation,
            cancel,
            handle,
        }
    }

    /// Store a finished result as the session's last optimization
    pub fn complete(&mut self, finished: FinishedPlan) -> Result<&OptimizationResult> {
        if finished.generation != self.generation {
            return Err(PlannerError::StaleResult {
                generation: finished.generation,
                current: self.generation,
            });
        }
        self.in_flight = None;
        Ok(self.last.insert(finished.result))
    }

    /// Submit, wait and complete in one call
    pub fn run(
        &mut self,
        household: Household,
        assumptions: Assumptions,
        strategy: Strategy,
    ) -> Result<&OptimizationResult> {
        let finished = self.submit(household, assumptions, strategy).wait()?;
        self.complete(finished)
    }
}
