use std::io::Write;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use serde::Serialize;

use sandbox::HostValue;

use crate::runner::{BlockOutcome, BlockReport};

pub fn pass_label(no_color: bool) -> &'static str {
    if no_color { "PASS" } else { "\x1b[32mPASS\x1b[0m" }
}

pub fn fail_label(no_color: bool) -> &'static str {
    if no_color { "FAIL" } else { "\x1b[31mFAIL\x1b[0m" }
}

pub fn skip_label(no_color: bool) -> &'static str {
    if no_color { "SKIP" } else { "\x1b[33mSKIP\x1b[0m" }
}

pub fn bold(s: &str, no_color: bool) -> String {
    if no_color {
        s.to_string()
    } else {
        format!("\x1b[1m{}\x1b[0m", s)
    }
}

pub fn label(report: &BlockReport, no_color: bool) -> &'static str {
    match report.outcome {
        BlockOutcome::Skipped => skip_label(no_color),
        _ if report.is_failure() => fail_label(no_color),
        _ => pass_label(no_color),
    }
}

/// `#2 js (line 14)`
pub fn title(report: &BlockReport) -> String {
    if report.language.is_empty() {
        format!("#{} (line {})", report.number, report.line)
    } else {
        format!("#{} {} (line {})", report.number, report.language, report.line)
    }
}

/// Why a block failed, as plain text. `None` for passing and skipped blocks.
pub fn failure_reason(report: &BlockReport) -> Option<String> {
    match &report.outcome {
        BlockOutcome::DecodeFailed(err) => Some(err.to_string()),
        BlockOutcome::Failed(err) => Some(err.to_string()),
        BlockOutcome::Captured(captured) if captured.failures > 0 => Some(format!(
            "{} of {} bridge call(s) failed verification",
            captured.failures, captured.calls
        )),
        _ => None,
    }
}

pub fn to_diagnostic(report: &BlockReport, file_id: usize) -> Option<Diagnostic<usize>> {
    if let BlockOutcome::DecodeFailed(err) = &report.outcome {
        return Some(err.to_diagnostic(file_id));
    }
    let reason = failure_reason(report)?;
    let message = match report.outcome {
        BlockOutcome::Failed(_) => format!("block {} failed", report.number),
        _ => format!("verification failed in block {}", report.number),
    };
    Some(
        Diagnostic::error()
            .with_message(message)
            .with_labels(vec![Label::primary(file_id, report.span.clone())])
            .with_notes(vec![reason]),
    )
}

fn captured_value(report: &BlockReport) -> Option<&HostValue> {
    match &report.outcome {
        BlockOutcome::Captured(captured) => captured.value.as_ref(),
        _ => None,
    }
}

/// One line per block on stdout, diagnostics for failed blocks on stderr.
pub fn print_text(
    reports: &[BlockReport],
    files: &SimpleFiles<String, String>,
    file_id: usize,
    no_color: bool,
) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let writer = StandardStream::stderr(color_choice);
    let config = term::Config::default();

    for report in reports {
        let shown = match (&report.outcome, captured_value(report)) {
            (BlockOutcome::Captured(_), Some(value)) => value.to_string(),
            (BlockOutcome::Captured(_), None) | (BlockOutcome::Failed(_), _) => "(no value)".into(),
            _ => String::new(),
        };
        println!("  {}  {}  {}", label(report, no_color), title(report), shown);

        if let Some(diagnostic) = to_diagnostic(report, file_id) {
            let _ = term::emit_to_write_style(&mut writer.lock(), &config, files, &diagnostic);
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    file: &'a str,
    blocks: Vec<JsonBlock<'a>>,
}

#[derive(Serialize)]
struct JsonBlock<'a> {
    block: usize,
    line: usize,
    language: &'a str,
    status: &'static str,
    value: Option<&'a HostValue>,
    calls: u64,
    failures: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn json_block(report: &BlockReport) -> JsonBlock<'_> {
    let (status, calls, failures) = match &report.outcome {
        BlockOutcome::Captured(captured) => {
            let status = if captured.failures > 0 { "failed" } else { "passed" };
            (status, captured.calls, captured.failures)
        }
        BlockOutcome::Skipped => ("skipped", 0, 0),
        BlockOutcome::DecodeFailed(_) => ("decode_error", 0, 0),
        BlockOutcome::Failed(_) => ("error", 0, 0),
    };
    JsonBlock {
        block: report.number,
        line: report.line,
        language: &report.language,
        status,
        value: captured_value(report),
        calls,
        failures,
        error: failure_reason(report),
    }
}

pub fn write_json(
    out: &mut impl Write,
    path: &str,
    reports: &[BlockReport],
) -> serde_json::Result<()> {
    let report = JsonReport {
        file: path,
        blocks: reports.iter().map(json_block).collect(),
    };
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out).map_err(serde_json::Error::io)
}
