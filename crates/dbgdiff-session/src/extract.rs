//! Program points from the static line table and from live frames.

use std::path::Path;

use dbgdiff_model::{DebuggerKind, Image, Location};
use tracing::{error, warn};

use crate::{Result, Session, SessionOptions};

/// Every line-table row the debugger reports for `source` in `binary`.
///
/// Runs in a session of its own, which is closed before returning.
pub fn static_line_table(
    binary: &Path,
    source: &Path,
    kind: DebuggerKind,
    options: &SessionOptions,
) -> Result<Image> {
    let mut session = Session::launch(kind, binary, options)?;
    for command in session.adapter().line_table_prelude() {
        session.send(command)?;
    }
    let command = session.adapter().line_table_command(source);
    let output = session.send(&command)?;
    let image: Image = session.adapter().parse_line_table(&output).into_iter().collect();
    if image.is_empty() {
        warn!(session = %session.id(), source = %source.display(), "line table is empty");
    }
    Ok(image)
}

/// Where the inferior is stopped.
///
/// A frame outside `source` has `file: None`. Output that cannot be read as
/// a frame is logged and treated as no frame.
pub fn current_frame(session: &mut Session, source: &Path) -> Result<Option<Location>> {
    let output = session.send(session.adapter().frame_command())?;
    let name = source_name(source);
    match session.adapter().parse_frame(&output, name) {
        Ok(None) if output.contains("error") => {
            warn!(session = %session.id(), output = %output, "frame query failed");
            Ok(None)
        }
        Ok(location) => Ok(location),
        Err(mismatch) => {
            error!(session = %session.id(), %mismatch, "frame did not parse");
            Ok(None)
        }
    }
}

/// Basename of the file under test, as frames print it.
pub fn source_name(source: &Path) -> &str {
    source
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
}
