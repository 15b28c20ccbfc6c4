use std::time::Duration;

/// Retransmission-timeout estimator: Jacobson's EWMA over round-trip samples
/// (RFC 6298) with the transport's clamping bounds.
///
/// The first sample seeds the estimator (`srtt = rtt`, `rttvar = rtt/2`);
/// every further sample folds in with `alpha = 1/8`, `beta = 1/4`. Samples
/// must only be taken from packets that were sent exactly once - Karn's rule
/// is the caller's responsibility.
pub struct RtoEstimator {
    srtt_ms: Option<u64>,
    rttvar_ms: u64,
    rto_ms: u64,
    min_ms: u64,
    max_ms: u64,
}

impl RtoEstimator {
    pub fn new(initial: Duration, min: Duration, max: Duration) -> RtoEstimator {
        RtoEstimator {
            srtt_ms: None,
            rttvar_ms: 0,
            rto_ms: initial.as_millis() as u64,
            min_ms: min.as_millis() as u64,
            max_ms: max.as_millis() as u64,
        }
    }

    pub fn rto_ms(&self) -> u64 {
        self.rto_ms
    }

    /// deadline offset for the nth consecutive retransmit of one sequence:
    /// the current RTO doubled per retry, capped at the maximum
    pub fn backoff_ms(&self, consecutive_retries: u32) -> u64 {
        let exponent = consecutive_retries.min(16);
        self.rto_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_ms)
    }

    pub fn on_sample(&mut self, rtt_ms: u64) {
        match self.srtt_ms {
            None => {
                self.srtt_ms = Some(rtt_ms);
                self.rttvar_ms = rtt_ms / 2;
            }
            Some(srtt) => {
                // rttvar <- 3/4 rttvar + 1/4 |srtt - rtt|
                self.rttvar_ms = (3 * self.rttvar_ms + srtt.abs_diff(rtt_ms)) / 4;
                // srtt <- 7/8 srtt + 1/8 rtt
                self.srtt_ms = Some((7 * srtt + rtt_ms) / 8);
            }
        }

        let srtt = self.srtt_ms.expect("just set above");
        self.rto_ms = (srtt + 4 * self.rttvar_ms).clamp(self.min_ms, self.max_ms);
    }
}
