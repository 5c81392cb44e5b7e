//! `read_file` and `read_file_lines`.

use patchwright_core::tool::{ReadFileArgs, ReadFileLinesArgs, ToolErrorCode, ToolOutcome};
use patchwright_core::workspace::Workspace;

use crate::ToolLimits;
use crate::dispatcher::{Failure, confine, decode_text};

pub(crate) async fn run(
    ws: &dyn Workspace,
    limits: &ToolLimits,
    args: &ReadFileArgs,
) -> Result<ToolOutcome, Failure> {
    let path = confine(ws, &args.path)?;
    let bytes = ws.read(&path).await?;
    if bytes.len() > limits.max_file_bytes {
        return Err(Failure::new(
            ToolErrorCode::TooLarge,
            format!(
                "file too large: {} ({} bytes, limit {}); use read_file_lines",
                args.path,
                bytes.len(),
                limits.max_file_bytes
            ),
        ));
    }
    let text = decode_text(&args.path, bytes)?;
    Ok(ToolOutcome::ok(text))
}

pub(crate) async fn run_lines(
    ws: &dyn Workspace,
    args: &ReadFileLinesArgs,
) -> Result<ToolOutcome, Failure> {
    let path = confine(ws, &args.path)?;
    let text = decode_text(&args.path, ws.read(&path).await?)?;
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let (start, end) = check_range(&args.path, args.start_line, args.end_line, lines.len())?;
    Ok(ToolOutcome::ok(lines[start..end].concat()))
}

/// Validate 1-based inclusive bounds against a file of `line_count` lines
/// and return the zero-based half-open slice range.
pub(crate) fn check_range(
    path: &str,
    start_line: usize,
    end_line: usize,
    line_count: usize,
) -> Result<(usize, usize), Failure> {
    if start_line == 0 || start_line > end_line || end_line > line_count {
        return Err(Failure::new(
            ToolErrorCode::InvalidRange,
            format!(
                "invalid line range {start_line}-{end_line} for {path} ({line_count} lines); \
                 lines are 1-based, inclusive, and start must not exceed end"
            ),
        ));
    }
    Ok((start_line - 1, end_line))
}
