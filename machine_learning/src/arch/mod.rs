pub mod activations;
pub mod layers;
pub mod loss;
mod param;
mod sequential;
mod shape;
mod summary;

pub use param::Param;
pub use sequential::Sequential;
pub use shape::Shape;
pub use summary::{Summary, SummaryRow};
