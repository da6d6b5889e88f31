/*!
 * Retry and drop policy, applied by the pusher to each finished dispatch.
 *
 * The transport's completion callback does nothing but hand the hits back
 * as a `DispatchOutcome`; everything that touches queue state happens here,
 * on the pusher thread.
 */
use super::options::SuccessAccounting;
use crate::protocol::hit::Hit;

/// Hits of one finished request, returned to the pusher.
#[derive(Debug)]
pub(crate) struct DispatchOutcome {
    pub hits: Vec<Hit>,
    pub delivered: bool,
}

/// What the pusher must do with a `DispatchOutcome`.
#[derive(Debug, Default)]
pub(crate) struct Settlement {
    /// Hits to append to the back of the pending list, in order.
    pub requeue: Vec<Hit>,
    /// Added to `successful_hits`.
    pub succeeded: u64,
    /// Added to `failed_hits`; these hits are gone for good.
    pub dropped: u64,
}

/**
 * Applies the policy:
 * - delivered ⇒ credit according to `accounting`;
 * - failed ⇒ bump every hit's attempt counter, drop the ones that reached
 *   `max_attempts`, requeue the rest.
 */
pub(crate) fn settle(
    outcome: DispatchOutcome,
    max_attempts: u32,
    accounting: SuccessAccounting,
) -> Settlement {
    if outcome.delivered {
        let succeeded = match accounting {
            SuccessAccounting::PerBatch => 1,
            SuccessAccounting::PerHit => outcome.hits.len() as u64,
        };
        return Settlement {
            succeeded,
            ..Default::default()
        };
    }

    let mut settlement = Settlement::default();
    for mut hit in outcome.hits {
        hit.attempts += 1;
        if hit.attempts >= max_attempts {
            tracing::warn!(
                user_id = hit.user_id(),
                hit_type = hit.kind().hit_type(),
                attempts = hit.attempts,
                "dropping hit after repeated delivery failures"
            );
            settlement.dropped += 1;
        } else {
            settlement.requeue.push(hit);
        }
    }
    settlement
}
