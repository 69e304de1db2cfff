use std::{fmt, sync::Arc};

use machine_learning::{
    arch::activations::{ActFn, Softmax},
    dataset::argmax_lane,
};
use ndarray::{ArrayD, ArrayViewD, Axis, Ix2, IxDyn, Zip, arr0};

/// The body of a custom operation.
pub type OpFn =
    Arc<dyn Fn(&[&ArrayD<f32>]) -> std::result::Result<ArrayD<f32>, String> + Send + Sync>;

type OpResult = std::result::Result<ArrayD<f32>, String>;

/// An operation a graph node evaluates.
///
/// Binary element-wise operations broadcast their operands against each other. Reductions
/// over `axis: None` collapse the whole tensor into a scalar.
#[derive(Clone)]
pub enum Op {
    Constant(ArrayD<f32>),
    Placeholder(String),
    Add,
    Sub,
    Mul,
    Div,
    MatMul,
    Neg,
    Exp,
    Log,
    Relu,
    Sigmoid,
    Scale(f32),
    Clip { min: f32, max: f32 },
    Sum { axis: Option<usize> },
    Mean { axis: Option<usize> },
    Argmax { axis: usize },
    Equal,
    Reshape(Vec<usize>),
    Transpose,
    Softmax,
    Custom { name: String, arity: usize, func: OpFn },
}

impl Op {
    /// Wraps a closure into a named custom operation taking `arity` inputs.
    pub fn custom<N, F>(name: N, arity: usize, func: F) -> Self
    where
        N: Into<String>,
        F: Fn(&[&ArrayD<f32>]) -> std::result::Result<ArrayD<f32>, String> + Send + Sync + 'static,
    {
        Self::Custom {
            name: name.into(),
            arity,
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Constant(_) => "constant",
            Self::Placeholder(_) => "placeholder",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::MatMul => "matmul",
            Self::Neg => "neg",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Scale(_) => "scale",
            Self::Clip { .. } => "clip",
            Self::Sum { .. } => "sum",
            Self::Mean { .. } => "mean",
            Self::Argmax { .. } => "argmax",
            Self::Equal => "equal",
            Self::Reshape(_) => "reshape",
            Self::Transpose => "transpose",
            Self::Softmax => "softmax",
            Self::Custom { name, .. } => name.as_str(),
        }
    }

    /// The amount of inputs the operation takes.
    pub fn arity(&self) -> usize {
        match self {
            Self::Constant(_) | Self::Placeholder(_) => 0,
            Self::Add | Self::Sub | Self::Mul | Self::Div | Self::MatMul | Self::Equal => 2,
            Self::Custom { arity, .. } => *arity,
            _ => 1,
        }
    }

    /// Checks the operation's own arguments, independently of its inputs.
    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Self::Clip { min, max } if !(min <= max) => {
                Err(format!("clip bounds must satisfy min <= max, got [{min}, {max}]"))
            }
            Self::Scale(s) if !s.is_finite() => Err(format!("scale factor {s} is not finite")),
            Self::Placeholder(name) if name.is_empty() => {
                Err("placeholder names must not be empty".into())
            }
            Self::Custom { name, .. } if name.is_empty() => {
                Err("custom operations must be named".into())
            }
            _ => Ok(()),
        }
    }

    /// Evaluates the operation over already evaluated inputs.
    ///
    /// # Arguments
    /// * `inputs` - The values of the node's inputs, in declaration order.
    ///
    /// # Returns
    /// The node's value, or a message describing why it could not be computed.
    pub(crate) fn eval(&self, inputs: &[&ArrayD<f32>]) -> OpResult {
        if inputs.len() != self.arity() {
            return Err(format!(
                "expected {} input(s), got {}",
                self.arity(),
                inputs.len()
            ));
        }

        match self {
            Self::Constant(value) => Ok(value.clone()),
            Self::Placeholder(name) => Err(format!("placeholder {name:?} was not fed")),
            Self::Add => zip_with(inputs[0], inputs[1], |a, b| a + b),
            Self::Sub => zip_with(inputs[0], inputs[1], |a, b| a - b),
            Self::Mul => zip_with(inputs[0], inputs[1], |a, b| a * b),
            Self::Div => zip_with(inputs[0], inputs[1], |a, b| a / b),
            Self::Equal => zip_with(inputs[0], inputs[1], |a, b| f32::from(u8::from(a == b))),
            Self::MatMul => matmul(inputs[0], inputs[1]),
            Self::Neg => Ok(inputs[0].mapv(|v| -v)),
            Self::Exp => Ok(inputs[0].mapv(f32::exp)),
            Self::Log => Ok(inputs[0].mapv(f32::ln)),
            Self::Relu => Ok(ActFn::Relu.forward(inputs[0].view())),
            Self::Sigmoid => Ok(ActFn::sigmoid().forward(inputs[0].view())),
            Self::Scale(s) => Ok(inputs[0].mapv(|v| v * s)),
            Self::Clip { min, max } => Ok(inputs[0].mapv(|v| v.clamp(*min, *max))),
            Self::Sum { axis: None } => Ok(arr0(inputs[0].sum()).into_dyn()),
            Self::Sum { axis: Some(axis) } => {
                let axis = check_axis(inputs[0], *axis)?;
                Ok(inputs[0].sum_axis(axis))
            }
            Self::Mean { axis: None } => inputs[0]
                .mean()
                .map(|m| arr0(m).into_dyn())
                .ok_or_else(|| "mean of an empty tensor".to_string()),
            Self::Mean { axis: Some(axis) } => {
                let axis = check_axis(inputs[0], *axis)?;
                inputs[0]
                    .mean_axis(axis)
                    .ok_or_else(|| format!("mean over empty axis {}", axis.index()))
            }
            Self::Argmax { axis } => {
                let axis = check_axis(inputs[0], *axis)?;
                Ok(inputs[0].map_axis(axis, |lane| argmax_lane(lane) as f32))
            }
            Self::Reshape(shape) => reshape(inputs[0], shape),
            Self::Transpose => Ok(inputs[0].t().as_standard_layout().into_owned()),
            Self::Softmax => {
                if inputs[0].ndim() == 0 {
                    return Err("softmax needs at least one axis".into());
                }
                Ok(Softmax.f(inputs[0].view()))
            }
            Self::Custom { func, .. } => func(inputs),
        }
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => write!(f, "Constant({:?})", value.shape()),
            Self::Placeholder(name) => write!(f, "Placeholder({name:?})"),
            Self::Scale(s) => write!(f, "Scale({s})"),
            Self::Clip { min, max } => write!(f, "Clip {{ min: {min}, max: {max} }}"),
            Self::Sum { axis } => write!(f, "Sum {{ axis: {axis:?} }}"),
            Self::Mean { axis } => write!(f, "Mean {{ axis: {axis:?} }}"),
            Self::Argmax { axis } => write!(f, "Argmax {{ axis: {axis} }}"),
            Self::Reshape(shape) => write!(f, "Reshape({shape:?})"),
            Self::Custom { name, arity, .. } => {
                write!(f, "Custom {{ name: {name:?}, arity: {arity} }}")
            }
            op => f.write_str(op.name()),
        }
    }
}

fn check_axis(x: &ArrayD<f32>, axis: usize) -> std::result::Result<Axis, String> {
    if axis >= x.ndim() {
        return Err(format!(
            "axis {axis} is out of bounds for a tensor of shape {:?}",
            x.shape()
        ));
    }
    Ok(Axis(axis))
}

/// The shape both operands broadcast to, aligning their trailing axes.
fn broadcast_shape(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let rank = a.len().max(b.len());
    let extent = |dims: &[usize], i: usize| {
        (i + dims.len())
            .checked_sub(rank)
            .map_or(1, |j| dims[j])
    };

    (0..rank)
        .map(|i| match (extent(a, i), extent(b, i)) {
            (x, y) if x == y => Some(x),
            (1, y) => Some(y),
            (x, 1) => Some(x),
            _ => None,
        })
        .collect()
}

fn zip_with<F>(a: &ArrayD<f32>, b: &ArrayD<f32>, f: F) -> OpResult
where
    F: Fn(f32, f32) -> f32,
{
    let incompatible = || {
        format!(
            "shapes {:?} and {:?} do not broadcast",
            a.shape(),
            b.shape()
        )
    };

    let shape = broadcast_shape(a.shape(), b.shape()).ok_or_else(incompatible)?;
    let lhs = a.broadcast(IxDyn(&shape)).ok_or_else(incompatible)?;
    let rhs = b.broadcast(IxDyn(&shape)).ok_or_else(incompatible)?;

    Ok(Zip::from(lhs).and(rhs).map_collect(|&x, &y| f(x, y)))
}

fn matmul(a: &ArrayD<f32>, b: &ArrayD<f32>) -> OpResult {
    let lhs = a
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| format!("matmul needs matrices, got shape {:?}", a.shape()))?;
    let rhs = b
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| format!("matmul needs matrices, got shape {:?}", b.shape()))?;

    if lhs.ncols() != rhs.nrows() {
        return Err(format!(
            "cannot multiply {:?} by {:?}",
            lhs.shape(),
            rhs.shape()
        ));
    }

    Ok(lhs.dot(&rhs).into_dyn())
}

fn reshape(x: &ArrayD<f32>, shape: &[usize]) -> OpResult {
    let size: usize = shape.iter().product();
    if size != x.len() {
        return Err(format!(
            "cannot reshape {:?} ({} scalars) into {shape:?} ({size} scalars)",
            x.shape(),
            x.len()
        ));
    }

    x.as_standard_layout()
        .into_owned()
        .into_shape_with_order(IxDyn(shape))
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn eval(op: Op, inputs: &[ArrayD<f32>]) -> OpResult {
        let refs: Vec<_> = inputs.iter().collect();
        op.eval(&refs)
    }

    #[test]
    fn element_wise_ops_broadcast() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn();
        let b = array![10.0, 20.0, 30.0].into_dyn();

        let sum = eval(Op::Add, &[a.clone(), b.clone()]).unwrap();
        assert_eq!(sum, array![[11.0, 22.0, 33.0], [14.0, 25.0, 36.0]].into_dyn());

        let col = array![[2.0], [4.0]].into_dyn();
        let div = eval(Op::Div, &[a, col]).unwrap();
        assert_eq!(div, array![[0.5, 1.0, 1.5], [1.0, 1.25, 1.5]].into_dyn());
    }

    #[test]
    fn incompatible_shapes_are_errors_not_panics() {
        let a = array![[1.0, 2.0, 3.0]].into_dyn();
        let b = array![1.0, 2.0].into_dyn();
        assert!(eval(Op::Mul, &[a.clone(), b.clone()]).is_err());
        assert!(eval(Op::MatMul, &[a.clone(), b]).is_err());
        assert!(eval(Op::Sum { axis: Some(2) }, &[a.clone()]).is_err());
        assert!(eval(Op::Reshape(vec![2, 2]), &[a]).is_err());
    }

    #[test]
    fn matmul_multiplies_matrices() {
        let a = array![[1.0, 2.0], [3.0, 4.0]].into_dyn();
        let b = array![[5.0], [6.0]].into_dyn();
        assert_eq!(
            eval(Op::MatMul, &[a, b]).unwrap(),
            array![[17.0], [39.0]].into_dyn()
        );
    }

    #[test]
    fn reductions() {
        let a = array![[1.0, 5.0, 3.0], [4.0, 2.0, 6.0]].into_dyn();

        assert_eq!(eval(Op::Sum { axis: None }, &[a.clone()]).unwrap().sum(), 21.0);
        assert_eq!(
            eval(Op::Mean { axis: Some(0) }, &[a.clone()]).unwrap(),
            array![2.5, 3.5, 4.5].into_dyn()
        );
        assert_eq!(
            eval(Op::Argmax { axis: 1 }, &[a]).unwrap(),
            array![1.0, 2.0].into_dyn()
        );
    }

    #[test]
    fn argmax_and_equal_compute_accuracy() {
        let probs = array![[0.1, 0.9], [0.8, 0.2], [0.3, 0.7]].into_dyn();
        let labels = array![1.0, 1.0, 1.0].into_dyn();

        let predicted = eval(Op::Argmax { axis: 1 }, &[probs]).unwrap();
        let hits = eval(Op::Equal, &[predicted, labels]).unwrap();
        let acc = eval(Op::Mean { axis: None }, &[hits]).unwrap();

        assert!((acc.sum() - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let x = array![[1.0, 2.0, 3.0], [0.0, 0.0, 0.0]].into_dyn();
        let s = eval(Op::Softmax, &[x]).unwrap();
        for row in s.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn transpose_and_reshape() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn();
        let t = eval(Op::Transpose, &[a.clone()]).unwrap();
        assert_eq!(t, array![[1.0, 4.0], [2.0, 5.0], [3.0, 6.0]].into_dyn());

        let r = eval(Op::Reshape(vec![3, 2]), &[a]).unwrap();
        assert_eq!(r, array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]].into_dyn());
    }

    #[test]
    fn invalid_clip_bounds_are_rejected() {
        assert!(Op::Clip { min: 1.0, max: 0.0 }.validate().is_err());
        assert!(Op::Clip { min: f32::NAN, max: 0.0 }.validate().is_err());
        assert!(Op::Clip { min: 0.0, max: 1.0 }.validate().is_ok());
    }

    #[test]
    fn custom_ops_run_their_body() {
        let op = Op::custom("sum3", 3, |xs| Ok(xs[0] + xs[1] + xs[2]));

        let x = array![1.0].into_dyn();
        let out = eval(op.clone(), &[x.clone(), x.clone(), x.clone()]).unwrap();
        assert_eq!(out, array![3.0].into_dyn());
        assert!(eval(op, &[x]).is_err());
    }
}
