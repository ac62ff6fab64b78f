//! Sampling decisions.
//!
//! A [`Sampler`] decides whether a trace is recorded at all; sampled-out
//! traces never enter the reporter. Decisions are made per trace identifier
//! and must be deterministic given that identifier so every participant in a
//! distributed trace agrees.
//!
//! [`SamplingPolicy`] composes samplers per traffic direction: an explicit
//! direction-specific sampler wins over an explicit global sampler, which
//! wins over the probability-derived default.

use crate::config::ConfigError;
use std::fmt;
use std::sync::Arc;

/// Whether this process originated the traced call or received it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficDirection {
    /// This process originated the call (outbound).
    Client,
    /// This process received the call (inbound).
    Server,
}

/// A per-trace recording decision function.
pub trait Sampler: Send + Sync {
    /// Returns true if the trace with this identifier should be recorded.
    ///
    /// Must be deterministic in `trace_id`.
    fn is_sampled(&self, trace_id: u128) -> bool;
}

/// Records every trace.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSampler;

impl Sampler for AlwaysSampler {
    fn is_sampled(&self, _trace_id: u128) -> bool {
        true
    }
}

/// Records no traces.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverSampler;

impl Sampler for NeverSampler {
    fn is_sampled(&self, _trace_id: u128) -> bool {
        false
    }
}

// Granularity of the rate comparison: rates are effectively rounded to
// 1/10_000ths, matching the original's boundary sampler.
const BOUNDARY: u64 = 10_000;

/// Probabilistic sampler, deterministic on the trace identifier.
///
/// The low 64 bits of the trace id are reduced modulo 10000 and compared
/// against the rate boundary, so a given trace id always produces the same
/// decision and the sampled fraction converges to the rate over many
/// independent ids.
#[derive(Debug, Clone, Copy)]
pub struct RateSampler {
    threshold: u64,
}

impl RateSampler {
    /// Creates a sampler recording roughly `rate` of all traces.
    ///
    /// `rate` must lie in `[0.0, 1.0]`.
    pub fn new(rate: f32) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&rate) || rate.is_nan() {
            return Err(ConfigError::InvalidSampleRate(rate));
        }
        Ok(Self {
            threshold: (f64::from(rate) * BOUNDARY as f64).round() as u64,
        })
    }
}

impl Sampler for RateSampler {
    fn is_sampled(&self, trace_id: u128) -> bool {
        (trace_id as u64) % BOUNDARY < self.threshold
    }
}

/// Composition of samplers over both traffic directions.
///
/// Resolution order for each direction: the direction's explicit sampler,
/// then the explicit global sampler, then the rate-derived default. Swapping
/// a sampler only affects traces that have not yet been decided; mid-flight
/// traces keep the decision already propagated to them.
#[derive(Clone)]
pub struct SamplingPolicy {
    default: Arc<dyn Sampler>,
    global: Option<Arc<dyn Sampler>>,
    client: Option<Arc<dyn Sampler>>,
    server: Option<Arc<dyn Sampler>>,
}

impl SamplingPolicy {
    /// Policy sampling at the given probability, no overrides.
    pub fn with_rate(rate: f32) -> Result<Self, ConfigError> {
        Ok(Self {
            default: Arc::new(RateSampler::new(rate)?),
            global: None,
            client: None,
            server: None,
        })
    }

    /// Installs a global sampler taking precedence over the rate default.
    pub fn global_sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.global = Some(sampler);
        self
    }

    /// Overrides the sampler for client-originated traffic only.
    pub fn client_sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.client = Some(sampler);
        self
    }

    /// Overrides the sampler for server-received traffic only.
    pub fn server_sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.server = Some(sampler);
        self
    }

    /// Decides whether the trace is recorded, for one traffic direction.
    pub fn decide(&self, direction: TrafficDirection, trace_id: u128) -> bool {
        self.sampler_for(direction).is_sampled(trace_id)
    }

    fn sampler_for(&self, direction: TrafficDirection) -> &Arc<dyn Sampler> {
        let specific = match direction {
            TrafficDirection::Client => &self.client,
            TrafficDirection::Server => &self.server,
        };
        specific
            .as_ref()
            .or(self.global.as_ref())
            .unwrap_or(&self.default)
    }
}

impl fmt::Debug for SamplingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplingPolicy")
            .field("global_override", &self.global.is_some())
            .field("client_override", &self.client.is_some())
            .field("server_override", &self.server.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_rate_bounds() {
        assert!(RateSampler::new(-0.1).is_err());
        assert!(RateSampler::new(1.1).is_err());
        assert!(RateSampler::new(f32::NAN).is_err());
        assert!(RateSampler::new(0.0).is_ok());
        assert!(RateSampler::new(1.0).is_ok());
    }

    #[test]
    fn test_rate_zero_and_one() {
        let none = RateSampler::new(0.0).unwrap();
        let all = RateSampler::new(1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let trace_id: u128 = rng.gen();
            assert!(!none.is_sampled(trace_id));
            assert!(all.is_sampled(trace_id));
        }
    }

    #[test]
    fn test_decision_is_deterministic_per_trace_id() {
        let sampler = RateSampler::new(0.5).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            let trace_id: u128 = rng.gen();
            let first = sampler.is_sampled(trace_id);
            for _ in 0..5 {
                assert_eq!(first, sampler.is_sampled(trace_id));
            }
        }
    }

    #[test]
    fn test_sampled_fraction_converges_to_rate() {
        let rate = 0.2_f32;
        let sampler = RateSampler::new(rate).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let total = 100_000;
        let sampled = (0..total)
            .filter(|_| sampler.is_sampled(rng.gen::<u128>()))
            .count();

        let fraction = sampled as f64 / f64::from(total);
        assert!(
            (fraction - f64::from(rate)).abs() < 0.02,
            "sampled fraction {} too far from rate {}",
            fraction,
            rate
        );
    }

    #[test]
    fn test_direction_override_beats_global_beats_rate() {
        // Rate default would sample everything.
        let policy = SamplingPolicy::with_rate(1.0).unwrap();
        assert!(policy.decide(TrafficDirection::Client, 1));
        assert!(policy.decide(TrafficDirection::Server, 1));

        // Global override beats the rate default for both directions.
        let policy = policy.global_sampler(Arc::new(NeverSampler));
        assert!(!policy.decide(TrafficDirection::Client, 1));
        assert!(!policy.decide(TrafficDirection::Server, 1));

        // Direction-specific override beats the global one, other
        // direction still follows the global sampler.
        let policy = policy.server_sampler(Arc::new(AlwaysSampler));
        assert!(policy.decide(TrafficDirection::Server, 1));
        assert!(!policy.decide(TrafficDirection::Client, 1));
    }
}
