use std::fmt::{self, Display};

use super::Shape;

/// One line of a model summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub layer: String,
    pub parameters: usize,
    pub output_shape: Shape,
}

/// A listing of a model's layers, their output shapes and parameter counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub input_shape: Shape,
    pub rows: Vec<SummaryRow>,
}

impl Summary {
    pub fn total_parameters(&self) -> usize {
        self.rows.iter().map(|r| r.parameters).sum()
    }
}

fn border(f: &mut fmt::Formatter<'_>, widths: &[usize]) -> fmt::Result {
    for w in widths {
        write!(f, "+{}", "-".repeat(w + 2))?;
    }
    writeln!(f, "+")
}

fn line(f: &mut fmt::Formatter<'_>, widths: &[usize], cells: &[String]) -> fmt::Result {
    for (w, cell) in widths.iter().zip(cells) {
        write!(f, "| {cell:<w$} ")?;
    }
    writeln!(f, "|")
}

impl Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = "Model Summary".to_string();
        let width = [title.len()];
        border(f, &width)?;
        line(f, &width, &[title])?;
        border(f, &width)?;
        writeln!(f, "Input Shape: {}", self.input_shape)?;

        let header = ["Layer Type", "Parameters", "Output Shape"].map(String::from);
        let rows: Vec<[String; 3]> = self
            .rows
            .iter()
            .map(|r| {
                [
                    r.layer.clone(),
                    r.parameters.to_string(),
                    r.output_shape.to_string(),
                ]
            })
            .collect();

        let mut widths = header.each_ref().map(|h| h.len());
        for row in &rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.len());
            }
        }

        border(f, &widths)?;
        line(f, &widths, &header)?;
        border(f, &widths)?;
        for row in &rows {
            line(f, &widths, row)?;
        }
        border(f, &widths)?;

        writeln!(f, "Total Parameters: {}", self.total_parameters())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_a_table() {
        let summary = Summary {
            input_shape: Shape::from((1, 8, 8)),
            rows: vec![
                SummaryRow {
                    layer: "Conv2D".into(),
                    parameters: 160,
                    output_shape: Shape::from((16, 8, 8)),
                },
                SummaryRow {
                    layer: "Activation (ReLU)".into(),
                    parameters: 0,
                    output_shape: Shape::from((16, 8, 8)),
                },
            ],
        };

        let text = summary.to_string();
        assert!(text.contains("| Model Summary |"));
        assert!(text.contains("Input Shape: (1, 8, 8)"));
        assert!(text.contains("| Conv2D            | 160        | (16, 8, 8)   |"));
        assert!(text.ends_with("Total Parameters: 160\n"));
    }
}
