//! WGSL source composition

use crate::{BindingSlot, DeviceError};

/// Replaces every `${SLOT_NAME}` placeholder with the slot's binding index.
///
/// Unknown or unterminated placeholders are reported as
/// [`DeviceError::UnresolvedBinding`].
pub fn compose_shader(label: &str, source: &str) -> Result<String, DeviceError> {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(DeviceError::UnresolvedBinding {
                label: label.to_string(),
                placeholder: after.chars().take(24).collect(),
            });
        };
        let name = after[..end].trim();
        let slot = BindingSlot::from_placeholder(name).ok_or_else(|| DeviceError::UnresolvedBinding {
            label: label.to_string(),
            placeholder: name.to_string(),
        })?;
        out.push_str(&slot.index().to_string());
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    log::debug!("Composed shader `{}` ({} bytes)", label, out.len());
    Ok(out)
}
