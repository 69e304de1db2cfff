use std::f32;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sigmoid {
    amp: f32,
}

impl Default for Sigmoid {
    fn default() -> Self {
        Self { amp: 1. }
    }
}

impl Sigmoid {
    pub fn new(amp: f32) -> Self {
        Self { amp }
    }

    pub fn f(&self, z: f32) -> f32 {
        self.amp / (1. + (-z).exp())
    }

    /// The derivative expressed in terms of the activation `a = f(z)`.
    pub fn df_from_output(&self, a: f32) -> f32 {
        (a * (self.amp - a)) / self.amp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midpoint() {
        let s = Sigmoid::default();
        assert_eq!(s.f(0.), 0.5);
        assert_eq!(s.df_from_output(0.5), 0.25);
    }

    #[test]
    fn amplitude_scales_the_output() {
        let s = Sigmoid::new(2.);
        assert_eq!(s.f(0.), 1.);
        assert!((s.f(50.) - 2.).abs() < 1e-6);
    }
}
