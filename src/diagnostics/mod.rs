pub mod diagnostic;
pub mod position;

pub use diagnostic::{Diagnostic, Severity, render_diagnostics};
pub use position::Position;
