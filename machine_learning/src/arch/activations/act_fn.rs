use ndarray::{ArrayD, ArrayViewD, Zip};
use serde::{Deserialize, Serialize};

use super::{Sigmoid, Softmax};

/// The activation functions an `Activation` layer can apply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActFn {
    Relu,
    LeakyRelu { alpha: f32 },
    Sigmoid(Sigmoid),
    Tanh,
    Softmax,
    Elu { alpha: f32 },
}

impl ActFn {
    pub fn leaky_relu(alpha: f32) -> Self {
        Self::LeakyRelu { alpha }
    }

    pub fn sigmoid() -> Self {
        Self::Sigmoid(Sigmoid::default())
    }

    pub fn elu(alpha: f32) -> Self {
        Self::Elu { alpha }
    }

    /// The display name of the function, as shown in a model summary.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Relu => "ReLU",
            Self::LeakyRelu { .. } => "LeakyReLU",
            Self::Sigmoid(_) => "Sigmoid",
            Self::Tanh => "TanH",
            Self::Softmax => "Softmax",
            Self::Elu { .. } => "ELU",
        }
    }

    /// Applies the function to `x`.
    pub fn forward(&self, x: ArrayViewD<f32>) -> ArrayD<f32> {
        match *self {
            Self::Relu => x.mapv(|x| x.max(0.)),
            Self::LeakyRelu { alpha } => x.mapv(|x| if x >= 0. { x } else { alpha * x }),
            Self::Sigmoid(s) => x.mapv(|x| s.f(x)),
            Self::Tanh => x.mapv(f32::tanh),
            Self::Softmax => Softmax.f(x),
            Self::Elu { alpha } => x.mapv(|x| if x >= 0. { x } else { alpha * x.exp_m1() }),
        }
    }

    /// Back propagates `d` through the function.
    ///
    /// # Arguments
    /// * `x` - The input of the forward pass.
    /// * `a` - The output of the forward pass.
    /// * `d` - The gradient of the loss with respect to `a`.
    ///
    /// # Returns
    /// The gradient of the loss with respect to `x`.
    pub fn backward(
        &self,
        x: ArrayViewD<f32>,
        a: ArrayViewD<f32>,
        d: ArrayViewD<f32>,
    ) -> ArrayD<f32> {
        let elementwise = |df: &dyn Fn(f32, f32) -> f32| {
            Zip::from(&d)
                .and(&x)
                .and(&a)
                .map_collect(|&d, &x, &a| d * df(x, a))
        };

        match *self {
            Self::Relu => elementwise(&|x, _| if x >= 0. { 1. } else { 0. }),
            Self::LeakyRelu { alpha } => {
                elementwise(&|x, _| if x >= 0. { 1. } else { alpha })
            }
            Self::Sigmoid(s) => elementwise(&|_, a| s.df_from_output(a)),
            Self::Tanh => elementwise(&|_, a| 1. - a * a),
            Self::Softmax => Softmax.backward(a, d),
            Self::Elu { alpha } => elementwise(&|x, a| if x >= 0. { 1. } else { a + alpha }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn numeric_grad(act_fn: ActFn, x: &ArrayD<f32>, d: &ArrayD<f32>) -> ArrayD<f32> {
        let h = 1e-3;
        let mut grad = ArrayD::zeros(x.raw_dim());

        for (i, g) in grad.iter_mut().enumerate() {
            let mut plus = x.clone();
            let mut minus = x.clone();
            plus.as_slice_mut().unwrap()[i] += h;
            minus.as_slice_mut().unwrap()[i] -= h;

            let f_plus = (act_fn.forward(plus.view()) * d).sum();
            let f_minus = (act_fn.forward(minus.view()) * d).sum();
            *g = (f_plus - f_minus) / (2. * h);
        }

        grad
    }

    #[test]
    fn relu_clamps_negatives() {
        let x = array![[-1.0, 0.0, 2.0]].into_dyn();
        assert_eq!(ActFn::Relu.forward(x.view()), array![[0.0, 0.0, 2.0]].into_dyn());
    }

    #[test]
    fn backward_matches_finite_differences() {
        let x = array![[0.3, -0.7, 1.2, -2.1], [0.5, 0.25, -0.4, 0.9]].into_dyn();
        let d = array![[0.1, -0.2, 0.3, 0.4], [-0.5, 0.6, 0.2, -0.1]].into_dyn();

        for act_fn in [
            ActFn::leaky_relu(0.2),
            ActFn::sigmoid(),
            ActFn::Tanh,
            ActFn::Softmax,
            ActFn::elu(1.0),
        ] {
            let a = act_fn.forward(x.view());
            let analytic = act_fn.backward(x.view(), a.view(), d.view());
            let numeric = numeric_grad(act_fn, &x, &d);

            for (g, n) in analytic.iter().zip(numeric.iter()) {
                assert!((g - n).abs() < 1e-2, "{}: {g} vs {n}", act_fn.name());
            }
        }
    }

    #[test]
    fn serializes_with_a_kind_tag() {
        let json = serde_json::to_string(&ActFn::leaky_relu(0.1)).unwrap();
        assert_eq!(json, r#"{"kind":"leaky_relu","alpha":0.1}"#);
        let back: ActFn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ActFn::leaky_relu(0.1));
    }
}
