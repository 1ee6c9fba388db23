//! Link validation performed at stream start.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::format::MbusFormat;
use crate::pipeline::pad::{Link, PadFlags};
use crate::pipeline::pixfmt;

/// Check that the formats on both ends of `link` agree.
///
/// Links leaving an EXTERNAL source pad carry client data whose layout the
/// graph does not control and always pass.
pub fn validate_link(
    link: &Link,
    source_flags: PadFlags,
    source: &MbusFormat,
    sink: &MbusFormat,
) -> PipelineResult<()> {
    if source_flags.is_external() {
        return Ok(());
    }

    let mismatch = |reason: String| {
        tracing::debug!("Link {:?} invalid: {}", link.id, reason);
        Err(PipelineError::FormatMismatch {
            link: link.id,
            reason,
        })
    };

    if source.width != sink.width || source.height != sink.height {
        return mismatch(format!(
            "size {}x{} vs {}x{}",
            source.width, source.height, sink.width, sink.height
        ));
    }
    if source.code != sink.code {
        return mismatch(format!(
            "code {} vs {}",
            pixfmt::code_name(source.code),
            pixfmt::code_name(sink.code)
        ));
    }
    if !sink.field.accepts(source.field) {
        return mismatch(format!("field {:?} vs {:?}", source.field, sink.field));
    }
    if let Some(reason) = source.colorimetry.conflict_with(&sink.colorimetry) {
        return mismatch(reason);
    }
    Ok(())
}
