//! Transmutation job handler.
//!
//! Resolves a pending transmutation: draws a cost variation and a success
//! roll, writes the outcome in one conditional update, and audits it.
//! Redeliveries of an already-resolved transmutation are acknowledged
//! without touching the row.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use super::{HandlerOutcome, JobHandler};
use crate::audit::AuditSink;
use crate::error::{Error, Result};
use crate::model::{Actor, Transmutation, TransmutationJob, TransmutationState};
use crate::store::TransmutationStore;

/// Range of the multiplicative cost variation.
pub const VARIATION: Range<f64> = 0.8..1.3;
/// Probability that a transmutation succeeds.
pub const SUCCESS_PROBABILITY: f64 = 0.70;
/// Share of the final cost wasted by a failed transmutation.
pub const WASTE_FRACTION: f64 = 0.5;

/// The two independent random draws behind one resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roll {
    pub variation: f64,
    pub success: bool,
}

impl Roll {
    pub fn draw<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let variation = rng.gen_range(VARIATION);
        let success = rng.gen_bool(SUCCESS_PROBABILITY);
        Self { variation, success }
    }
}

/// A computed outcome, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub state: TransmutationState,
    /// `cost * variation`.
    pub final_cost: f64,
    pub result: String,
}

/// Truncate to whole cents so a reported amount never rounds up past the
/// exclusive upper bound of the variation range.
fn floor_cents(amount: f64) -> f64 {
    (amount * 100.0).floor() / 100.0
}

impl Resolution {
    pub fn compute(cost: f64, roll: Roll) -> Self {
        let final_cost = cost * roll.variation;
        if roll.success {
            Self {
                state: TransmutationState::Completed,
                final_cost,
                result: format!(
                    "Success: stable matter. Final cost: {:.2} (variation {:+.0}%)",
                    floor_cents(final_cost),
                    (roll.variation - 1.0) * 100.0
                ),
            }
        } else {
            Self {
                state: TransmutationState::Failed,
                final_cost,
                result: format!(
                    "Failure: unbalanced exchange. Wasted energy: {:.2} units.",
                    floor_cents(final_cost * WASTE_FRACTION)
                ),
            }
        }
    }

    /// The amount reported in `result`: final cost on success, wasted
    /// energy on failure.
    pub fn reported_amount(result: &str) -> Option<f64> {
        let tail = result
            .split_once("Final cost: ")
            .or_else(|| result.split_once("Wasted energy: "))?
            .1;
        tail.split_whitespace().next()?.parse().ok()
    }
}

pub struct TransmutationHandler {
    store: Arc<dyn TransmutationStore>,
    audit: AuditSink,
    rng: Mutex<StdRng>,
    /// Simulated processing time before the outcome is computed.
    work: Duration,
}

impl TransmutationHandler {
    pub fn new(store: Arc<dyn TransmutationStore>, audit: AuditSink) -> Self {
        Self {
            store,
            audit,
            rng: Mutex::new(StdRng::from_entropy()),
            work: Duration::ZERO,
        }
    }

    /// Use a fixed RNG seed, for reproducible outcomes.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn with_simulated_work(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }

    fn roll(&self) -> Roll {
        Roll::draw(&mut *self.rng.lock())
    }

    async fn resolve(&self, transmutation: &Transmutation) -> Result<HandlerOutcome> {
        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }

        let resolution = Resolution::compute(transmutation.cost, self.roll());
        let applied = self
            .store
            .resolve_transmutation(transmutation.id, resolution.state, &resolution.result)
            .await?;
        if !applied {
            // A concurrent delivery resolved it first.
            return Ok(HandlerOutcome::AlreadyResolved);
        }

        info!(
            transmutation = %transmutation.id,
            state = %resolution.state,
            final_cost = resolution.final_cost,
            "transmutation resolved"
        );
        self.audit.record(
            Actor::System,
            "transmutation_resolved",
            "transmutation",
            format!(
                "Transmutation {} ({}): {}",
                transmutation.id, transmutation.name, resolution.result
            ),
        );
        Ok(HandlerOutcome::Applied)
    }
}

#[async_trait]
impl JobHandler for TransmutationHandler {
    async fn handle(&self, payload: &serde_json::Value) -> Result<HandlerOutcome> {
        let job: TransmutationJob = serde_json::from_value(payload.clone())
            .map_err(|e| Error::InvalidArgument(format!("bad transmutation payload: {e}")))?;

        // NotFound propagates and is permanent: the producer referenced a
        // row that does not exist.
        let transmutation = self.store.get_transmutation(job.transmutation_id).await?;

        if transmutation.state.is_terminal() {
            return Ok(HandlerOutcome::AlreadyResolved);
        }

        info!(transmutation = %transmutation.id, name = %transmutation.name, "processing transmutation");
        self.resolve(&transmutation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_reports_final_cost_and_variation() {
        let r = Resolution::compute(
            100.0,
            Roll {
                variation: 1.1,
                success: true,
            },
        );
        assert_eq!(r.state, TransmutationState::Completed);
        assert!((r.final_cost - 110.0).abs() < 1e-9);
        assert_eq!(
            r.result,
            "Success: stable matter. Final cost: 110.00 (variation +10%)"
        );
    }

    #[test]
    fn failure_reports_half_the_final_cost_as_waste() {
        let r = Resolution::compute(
            100.0,
            Roll {
                variation: 0.8,
                success: false,
            },
        );
        assert_eq!(r.state, TransmutationState::Failed);
        assert_eq!(
            r.result,
            "Failure: unbalanced exchange. Wasted energy: 40.00 units."
        );
    }

    #[test]
    fn reported_amounts_never_round_up_to_the_bound() {
        let success = Resolution::compute(
            100.0,
            Roll {
                variation: 1.299999,
                success: true,
            },
        );
        assert!(
            success.result.contains("Final cost: 129.99 "),
            "{}",
            success.result
        );

        let failure = Resolution::compute(
            100.0,
            Roll {
                variation: 1.299999,
                success: false,
            },
        );
        assert_eq!(
            failure.result,
            "Failure: unbalanced exchange. Wasted energy: 64.99 units."
        );
    }

    #[test]
    fn outcomes_stay_in_bounds_and_succeed_seventy_percent() {
        let mut rng = StdRng::seed_from_u64(7);
        let cost = 250.0;
        let runs = 10_000;
        let mut successes = 0;

        for _ in 0..runs {
            let roll = Roll::draw(&mut rng);
            let r = Resolution::compute(cost, roll);
            assert!(r.final_cost >= 0.8 * cost && r.final_cost < 1.3 * cost);
            let reported = Resolution::reported_amount(&r.result).unwrap();
            if r.state == TransmutationState::Completed {
                successes += 1;
                assert!(
                    (0.8 * cost..1.3 * cost).contains(&reported),
                    "{}",
                    r.result
                );
            } else {
                assert!(
                    (0.4 * cost..0.65 * cost).contains(&reported),
                    "{}",
                    r.result
                );
            }
        }

        let rate = successes as f64 / runs as f64;
        assert!((rate - SUCCESS_PROBABILITY).abs() <= 0.02, "rate {rate}");
    }

    #[test]
    fn draws_are_independent() {
        // Success rate should not depend on which half of the variation
        // range was drawn.
        let mut rng = StdRng::seed_from_u64(11);
        let (mut low, mut low_ok, mut high, mut high_ok) = (0u32, 0u32, 0u32, 0u32);
        for _ in 0..20_000 {
            let roll = Roll::draw(&mut rng);
            if roll.variation < 1.05 {
                low += 1;
                low_ok += roll.success as u32;
            } else {
                high += 1;
                high_ok += roll.success as u32;
            }
        }
        let low_rate = low_ok as f64 / low as f64;
        let high_rate = high_ok as f64 / high as f64;
        assert!((low_rate - high_rate).abs() < 0.03, "{low_rate} vs {high_rate}");
    }
}
