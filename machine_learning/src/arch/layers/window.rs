use ndarray::{Array2, Array4, ArrayView2, ArrayView4};
use serde::{Deserialize, Serialize};

/// How the borders of an image are treated by a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    /// Pads so that a unit stride keeps the spatial extents.
    Same,
    /// No padding, the window only visits complete positions.
    #[default]
    Valid,
}

/// A 2d sliding window over `(batch, channels, height, width)` tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub kernel: (usize, usize),
    pub stride: usize,
    pub padding: Padding,
}

impl Window {
    /// Creates a new `Window`.
    ///
    /// # Arguments
    /// * `kernel` - The window's height and width.
    /// * `stride` - The step between two consecutive window positions.
    /// * `padding` - The border handling.
    pub fn new(kernel: (usize, usize), stride: usize, padding: Padding) -> Self {
        Self {
            kernel,
            stride,
            padding,
        }
    }

    /// The amount of padding for each border, as `((top, bottom), (left, right))`.
    ///
    /// Same padding splits `k - 1` placing the smaller half before the image.
    pub fn pads(&self) -> ((usize, usize), (usize, usize)) {
        match self.padding {
            Padding::Valid => ((0, 0), (0, 0)),
            Padding::Same => {
                let (kh, kw) = self.kernel;
                let split = |k: usize| (k.saturating_sub(1) / 2, k / 2);
                (split(kh), split(kw))
            }
        }
    }

    /// The spatial extents of the output for an input of `height` by `width`.
    ///
    /// # Returns
    /// `None` if the window doesn't fit inside the padded input or the stride is zero.
    pub fn output_dims(&self, height: usize, width: usize) -> Option<(usize, usize)> {
        let (kh, kw) = self.kernel;
        if self.stride == 0 || kh == 0 || kw == 0 {
            return None;
        }

        let ((top, bottom), (left, right)) = self.pads();
        let padded_h = height + top + bottom;
        let padded_w = width + left + right;
        if kh > padded_h || kw > padded_w {
            return None;
        }

        Some((
            (padded_h - kh) / self.stride + 1,
            (padded_w - kw) / self.stride + 1,
        ))
    }

    /// Unfolds every window position of `x` into a column.
    ///
    /// The result has shape `(channels * kh * kw, batch * out_h * out_w)`, rows are ordered by
    /// channel then kernel row then kernel column, and columns by sample then output row then
    /// output column. Positions that fall on the padding take `pad_value`.
    pub fn im2col(&self, x: ArrayView4<f32>, pad_value: f32) -> Option<Array2<f32>> {
        let (b, c, h, w) = x.dim();
        let (oh, ow) = self.output_dims(h, w)?;
        let (kh, kw) = self.kernel;
        let ((top, _), (left, _)) = self.pads();

        let mut cols = Array2::from_elem((c * kh * kw, b * oh * ow), pad_value);
        for ((bi, ci, i, j), &v) in x.indexed_iter() {
            let (pi, pj) = (i + top, j + left);

            for ki in 0..kh {
                let Some(oi) = self.position(pi, ki, oh) else {
                    continue;
                };

                for kj in 0..kw {
                    let Some(oj) = self.position(pj, kj, ow) else {
                        continue;
                    };

                    cols[[(ci * kh + ki) * kw + kj, (bi * oh + oi) * ow + oj]] = v;
                }
            }
        }

        Some(cols)
    }

    /// Folds columns back into an image of shape `(b, c, h, w)`, summing overlapping windows
    /// and dropping whatever falls on the padding. This is the adjoint of `im2col`.
    pub fn col2im(
        &self,
        cols: ArrayView2<f32>,
        (b, c, h, w): (usize, usize, usize, usize),
    ) -> Option<Array4<f32>> {
        let (oh, ow) = self.output_dims(h, w)?;
        let (kh, kw) = self.kernel;
        let ((top, _), (left, _)) = self.pads();

        if cols.dim() != (c * kh * kw, b * oh * ow) {
            return None;
        }

        let mut x = Array4::zeros((b, c, h, w));
        for ((bi, ci, i, j), v) in x.indexed_iter_mut() {
            let (pi, pj) = (i + top, j + left);

            for ki in 0..kh {
                let Some(oi) = self.position(pi, ki, oh) else {
                    continue;
                };

                for kj in 0..kw {
                    let Some(oj) = self.position(pj, kj, ow) else {
                        continue;
                    };

                    *v += cols[[(ci * kh + ki) * kw + kj, (bi * oh + oi) * ow + oj]];
                }
            }
        }

        Some(x)
    }

    /// The output position whose window places kernel offset `k` over padded coordinate `p`.
    fn position(&self, p: usize, k: usize, out: usize) -> Option<usize> {
        let start = p.checked_sub(k)?;
        if start % self.stride != 0 {
            return None;
        }

        let o = start / self.stride;
        (o < out).then_some(o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    #[test]
    fn same_padding_keeps_the_extents() {
        let window = Window::new((3, 3), 1, Padding::Same);
        assert_eq!(window.pads(), ((1, 1), (1, 1)));
        assert_eq!(window.output_dims(8, 8), Some((8, 8)));

        let even = Window::new((2, 2), 2, Padding::Same);
        assert_eq!(even.pads(), ((0, 1), (0, 1)));
        assert_eq!(even.output_dims(4, 4), Some((2, 2)));
        assert_eq!(even.output_dims(1, 1), Some((1, 1)));
    }

    #[test]
    fn oversized_windows_do_not_fit() {
        let window = Window::new((3, 3), 1, Padding::Valid);
        assert_eq!(window.output_dims(2, 8), None);
        assert_eq!(Window::new((1, 1), 0, Padding::Valid).output_dims(4, 4), None);
    }

    #[test]
    fn im2col_lays_out_valid_windows() {
        let x = Array::range(0., 16., 1.).into_shape_with_order((1, 1, 4, 4)).unwrap();
        let window = Window::new((2, 2), 2, Padding::Valid);

        let cols = window.im2col(x.view(), 0.).unwrap();
        assert_eq!(cols.dim(), (4, 4));
        // first window covers 0, 1, 4, 5
        assert_eq!(cols.column(0).to_vec(), vec![0., 1., 4., 5.]);
        assert_eq!(cols.column(3).to_vec(), vec![10., 11., 14., 15.]);
    }

    #[test]
    fn padding_positions_take_the_pad_value() {
        let x = Array4::<f32>::ones((1, 1, 2, 2));
        let window = Window::new((3, 3), 1, Padding::Same);

        let cols = window.im2col(x.view(), -1.).unwrap();
        assert_eq!(cols.dim(), (9, 4));
        assert_eq!(cols.iter().filter(|&&v| v == 1.).count(), 16);
        assert_eq!(cols.iter().filter(|&&v| v == -1.).count(), 20);
    }

    #[test]
    fn col2im_is_the_adjoint_of_im2col() {
        let window = Window::new((3, 3), 1, Padding::Same);
        let x = Array::range(0., 18., 1.).into_shape_with_order((1, 2, 3, 3)).unwrap();
        let cols = window.im2col(x.view(), 0.).unwrap();
        let y = Array::range(0., cols.len() as f32, 1.)
            .into_shape_with_order(cols.dim())
            .unwrap();

        // <im2col(x), y> == <x, col2im(y)>
        let lhs = (&cols * &y).sum();
        let rhs = (&x * &window.col2im(y.view(), x.dim()).unwrap()).sum();
        assert!((lhs - rhs).abs() < 1e-2);
    }
}
