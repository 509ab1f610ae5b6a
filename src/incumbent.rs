use crate::common_util::hold;
use crate::error::Error;
use crate::meta::{Chromosome, ObjectiveFunction, Params};
use float_cmp::approx_eq;
use log::debug;
use std::sync::Mutex;
use tangram_finite::FiniteF64;

#[derive(Debug, Clone)]
pub struct Incumbent<C> {
    pub chromosome: C,
    pub value: FiniteF64,
}

pub struct IncumbentTracker<C> {
    state: Mutex<Option<Incumbent<C>>>,
}

impl<C: Chromosome> Default for IncumbentTracker<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Chromosome> IncumbentTracker<C> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    pub fn try_update(&self, chromosome: &C, value: FiniteF64) -> bool {
        let mut state = hold(&self.state);
        let improves = state
            .as_ref()
            .map_or(true, |incumbent| value < incumbent.value);
        if improves {
            debug!("updating incumbent, value {}", value.get());
            *state = Some(Incumbent {
                chromosome: chromosome.clone(),
                value,
            });
        }
        improves
    }

    // Re-evaluates the candidate under the lock before publishing it. A
    // disagreement beyond the tolerance means the objective function mutates
    // shared state across concurrent calls, and every previously published
    // value is suspect.
    pub fn try_update_checked<F>(
        &self,
        chromosome: &C,
        value: FiniteF64,
        objective: &F,
        params: &Params,
    ) -> Result<bool, Error>
    where
        F: ObjectiveFunction<C> + ?Sized,
    {
        let mut state = hold(&self.state);
        let improves = state
            .as_ref()
            .map_or(true, |incumbent| value < incumbent.value);
        if !improves {
            return Ok(false);
        }
        let recomputed = objective.evaluate(chromosome, params)?;
        if !approx_eq!(f64, recomputed, value.get(), epsilon = 1e-25) {
            return Err(Error::ReentrancyViolation {
                cached: value.get(),
                recomputed,
            });
        }
        debug!("updating incumbent, value {}", value.get());
        *state = Some(Incumbent {
            chromosome: chromosome.clone(),
            value,
        });
        Ok(true)
    }

    pub fn best(&self) -> Option<Incumbent<C>> {
        hold(&self.state).clone()
    }

    pub fn into_best(self) -> Option<Incumbent<C>> {
        self.state.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}
