//! Source diagnostics for evaluation errors

use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use norn_list::EvalError;

/// Render `err` against the `source` it came from.
pub fn render(err: &EvalError, source_name: &str, source: &str, color: bool) -> String {
    let span = char_range(source, err.span().start..err.span().end);
    let id = source_name.to_string();

    let (message, note) = match err {
        EvalError::Parse(e) => (e.message.clone(), "syntax error here".to_string()),
        EvalError::InvalidLiteral { source, .. } => (source.to_string(), "not a valid literal".to_string()),
        EvalError::RecursiveDefinition { name, through, .. } => (
            format!("recursive list definition of '{}'", name),
            format!("'{}' would depend on itself through '{}'", name, through),
        ),
    };

    let mut out = Vec::new();
    let written = Report::build(ReportKind::Error, id.clone(), span.start)
        .with_config(Config::default().with_color(color))
        .with_message(message)
        .with_label(Label::new((id.clone(), span)).with_message(note).with_color(Color::Red))
        .finish()
        .write((id, Source::from(source.to_string())), &mut out);

    match written {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => format!("{}: {}\n", source_name, err),
    }
}

/// Byte offsets to char offsets, clamped to the source
fn char_range(source: &str, bytes: Range<usize>) -> Range<usize> {
    let to_chars = |offset: usize| {
        let offset = offset.min(source.len());
        source.get(..offset).map_or(offset, |prefix| prefix.chars().count())
    };
    to_chars(bytes.start)..to_chars(bytes.end)
}
