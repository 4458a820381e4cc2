//! Encoder capability: sequences of observations in, sequences of codes out.
//!
//! Observations arrive with a `(batch, time)` preshape. An encoder may carry
//! recurrent state between calls; the state is a separate value owned by the
//! caller, the encoder itself only holds parameters.

use burn::prelude::*;

/// Turns observation tensors of rank `D` into `(batch, time, code_size)` codes.
///
/// `initial_state` and `forward` have no default bodies: every encoder
/// must say how it starts and how it steps.
pub trait Encoder<B: Backend, const D: usize> {
    /// Recurrent state threaded between calls.
    type State: Clone + core::fmt::Debug;

    /// Width of the produced code, fixed at construction.
    fn code_size(&self) -> usize;

    /// Starting state for a batch of `batch_size` sequences.
    fn initial_state(&self, batch_size: usize, device: &B::Device) -> Self::State;

    /// Encode a batch of observation sequences.
    ///
    /// - `obs`: `[B, T, ...]`
    /// - `first`: `[B, T]`, true where a step begins a new episode
    /// - `state_in`: state with batch extent `B`
    ///
    /// Returns: (codes `[B, T, code_size]`, state_out)
    fn forward(
        &self,
        obs: Tensor<B, D>,
        first: Option<Tensor<B, 2, Bool>>,
        state_in: Self::State,
    ) -> (Tensor<B, 3>, Self::State);

    /// Encode without episode boundaries, starting from the initial state
    /// and discarding the final one.
    fn stateless_forward(&self, obs: Tensor<B, D>) -> Tensor<B, 3> {
        let batch_size = obs.dims()[0];
        let state = self.initial_state(batch_size, &obs.device());
        let (code, _state) = self.forward(obs, None, state);
        code
    }
}

/// State of an encoder with no memory: a batch extent and zero features.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmptyState {
    batch_size: usize,
}

impl EmptyState {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Semantic shape `[batch, 0]`.
    pub fn dims(&self) -> [usize; 2] {
        [self.batch_size, 0]
    }
}

/// Check the `first` flags agree with the observation preshape.
pub(crate) fn check_first_flags<B: Backend>(
    first: Option<&Tensor<B, 2, Bool>>,
    batch: usize,
    time: usize,
) {
    if let Some(first) = first {
        assert_eq!(
            first.dims(),
            [batch, time],
            "episode-boundary flags must have shape [batch, time]"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_state_has_zero_width() {
        for batch in [1, 3, 64] {
            let state = EmptyState::new(batch);
            assert_eq!(state.dims(), [batch, 0]);
            assert_eq!(state.batch_size(), batch);
        }
    }
}
