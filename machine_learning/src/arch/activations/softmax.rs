use ndarray::{ArrayD, ArrayViewD, Axis, Zip};

/// Softmax over the last axis of a tensor.
#[derive(Clone, Copy, Debug, Default)]
pub struct Softmax;

impl Softmax {
    pub fn f(&self, x: ArrayViewD<f32>) -> ArrayD<f32> {
        let mut out = x.to_owned();
        let Some(last) = out.ndim().checked_sub(1) else {
            return out;
        };

        for mut lane in out.lanes_mut(Axis(last)) {
            let max = lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            lane.mapv_inplace(|v| (v - max).exp());
            let sum = lane.sum();
            lane.mapv_inplace(|v| v / sum);
        }

        out
    }

    /// Jacobian-vector product of the softmax, in terms of its output `s`:
    /// `dx = s * (d - sum(d * s))` along the last axis.
    pub fn backward(&self, s: ArrayViewD<f32>, d: ArrayViewD<f32>) -> ArrayD<f32> {
        let mut dx = d.to_owned();
        let Some(last) = dx.ndim().checked_sub(1) else {
            return dx;
        };

        Zip::from(dx.lanes_mut(Axis(last)))
            .and(s.lanes(Axis(last)))
            .for_each(|mut dx, s| {
                let dot = dx.iter().zip(s.iter()).map(|(d, s)| d * s).sum::<f32>();
                dx.zip_mut_with(&s, |d, &s| *d = s * (*d - dot));
            });

        dx
    }
}
