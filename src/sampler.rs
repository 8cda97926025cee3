//! Sampling policies.
//!
//! A sampler decides, from trace id bits alone, whether a new trace is
//! recorded and reported. It is consulted only for contexts whose sampling
//! state is still [`SamplingState::Deferred`]; an upstream `Sampled` or
//! `NotSampled` decision is authoritative and is never overridden locally.

use crate::context::{SamplingState, TraceContext, TraceId};

/// Built-in sampling policies.
///
/// Every policy is a pure function of the trace id under one process
/// configuration: repeated queries about the same trace id always return the
/// same decision, so every span of a trace is sampled consistently. Deciding
/// never blocks and never fails.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Sampler {
    /// Always sample the trace
    AlwaysOn,
    /// Never sample the trace
    AlwaysOff,
    /// Sample a given fraction of traces. Fractions >= 1 will always sample.
    /// Fractions < 0 are treated as zero. The decision is derived from the
    /// trace id, so all spans of one trace decide alike.
    TraceIdRatioBased(f64),
}

impl Sampler {
    /// Decide whether a trace with the given id is sampled.
    pub fn decide(&self, trace_id: TraceId) -> SamplingState {
        match self {
            Sampler::AlwaysOn => SamplingState::Sampled,
            Sampler::AlwaysOff => SamplingState::NotSampled,
            Sampler::TraceIdRatioBased(prob) => sample_based_on_probability(prob, trace_id),
        }
    }

    /// Apply the local decision to a context whose sampling state is still
    /// deferred. Contexts that already carry an upstream decision pass
    /// through unchanged.
    pub fn resolve(&self, context: TraceContext) -> TraceContext {
        if context.sampling().is_decided() {
            context
        } else {
            let decision = self.decide(context.trace_id());
            context.with_sampling(decision)
        }
    }
}

fn sample_based_on_probability(prob: &f64, trace_id: TraceId) -> SamplingState {
    if *prob >= 1.0 {
        SamplingState::Sampled
    } else {
        let prob_upper_bound = (prob.max(0.0) * (1u64 << 63) as f64) as u64;
        let bytes = trace_id.to_bytes();
        let (_, low) = bytes.split_at(8);
        let trace_id_low = u64::from_be_bytes(low.try_into().unwrap());
        let rnd_from_trace_id = trace_id_low >> 1;

        if rnd_from_trace_id < prob_upper_bound {
            SamplingState::Sampled
        } else {
            SamplingState::NotSampled
        }
    }
}
