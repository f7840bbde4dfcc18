use std::fmt::Write as _;

use serde::Serialize;

use crate::diagnostics::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Error,
    Warning,
}

/// A renderable parse/evaluation report with an optional source location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub title: String,
    pub code: Option<String>,
    pub message: Option<String>,
    pub position: Option<Position>,
    pub hints: Vec<String>,
}

impl Diagnostic {
    pub fn error(title: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            title: title.into(),
            code: None,
            message: None,
            position: None,
            hints: Vec::new(),
        }
    }

    pub fn warning(title: impl Into<String>) -> Self {
        let mut diag = Self::error(title);
        diag.severity = Severity::Warning;
        diag
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    /// Plain-text rendering with an optional source excerpt and caret gutter.
    pub fn render(&self, source: Option<&str>) -> String {
        let mut out = String::new();
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match &self.code {
            Some(code) => {
                let _ = writeln!(out, "{}[{}]: {}", label, code, self.title);
            }
            None => {
                let _ = writeln!(out, "{}: {}", label, self.title);
            }
        }

        if let Some(position) = self.position {
            let _ = writeln!(out, " --> {}", position);
            if let Some(line_text) = source.and_then(|src| source_line(src, position.line)) {
                let gutter = position.line.to_string();
                let _ = writeln!(out, " {} | {}", gutter, line_text);
                let caret_pad = " ".repeat(position.column.saturating_sub(1));
                let _ = writeln!(out, " {} | {}^", " ".repeat(gutter.len()), caret_pad);
            }
        }

        if let Some(message) = &self.message {
            let _ = writeln!(out, "{}", message);
        }
        for hint in &self.hints {
            let _ = writeln!(out, "hint: {}", hint);
        }
        out
    }
}

fn source_line(source: &str, line: usize) -> Option<&str> {
    source.lines().nth(line.checked_sub(1)?)
}

pub fn render_diagnostics(diagnostics: &[Diagnostic], source: Option<&str>) -> String {
    diagnostics
        .iter()
        .map(|d| d.render(source))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_code_and_position() {
        let diag = Diagnostic::error("unexpected token")
            .with_code("E1000")
            .with_position(Position::new(1, 5))
            .with_hint("check the expression syntax");
        let rendered = diag.render(Some("1 + + 2"));
        assert!(rendered.contains("error[E1000]: unexpected token"));
        assert!(rendered.contains("--> 1:5"));
        assert!(rendered.contains("hint: check the expression syntax"));
    }

    #[test]
    fn test_render_without_source() {
        let diag = Diagnostic::error("boom").with_position(Position::new(2, 1));
        let rendered = diag.render(None);
        assert!(rendered.contains("error: boom"));
        assert!(rendered.contains("--> 2:1"));
    }
}
