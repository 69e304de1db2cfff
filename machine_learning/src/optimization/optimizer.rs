use crate::Result;

/// Defines the strategy for updating model parameters based on calculated gradients.
pub trait Optimizer {
    /// Updates the provided slice of parameters using their gradient.
    ///
    /// # Arguments
    /// * `params` - The parameters to update.
    /// * `grad` - The gradient of the loss with respect to `params`.
    ///
    /// # Returns
    /// An error if there's a mismatch in the sizes of `grad`, `params` and the optimizer's state.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()>;
}

/// Checks the lengths of a parameter slice, its gradient and the optimizer's state agree.
pub(super) fn check_sizes(params: &[f32], grad: &[f32], state: Option<usize>) -> Result<()> {
    if grad.len() != params.len() {
        return Err(crate::MlErr::SizeMismatch {
            what: "gradient",
            got: grad.len(),
            expected: params.len(),
        });
    }

    match state {
        Some(len) if len != params.len() => Err(crate::MlErr::SizeMismatch {
            what: "optimizer state",
            got: params.len(),
            expected: len,
        }),
        _ => Ok(()),
    }
}
