use super::{DecodedFrame, FieldSpec, FrameSchema, Postprocess, Preprocess, RawValue, Value};
use crate::error::FrameError;

/// Side state carried between decodes of the same endpoint on one device.
///
/// Frames of one record can depend on values seen in earlier records (the log only tells
/// the current day in its day-summary frames), so each reader owns one of these instead of
/// keeping that state on the shared schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeContext {
    /// Highest day count reported by the device so far.
    pub max_days_observed: i64,
}

/// Decode `bytes` against `schema`.
///
/// Payloads longer than the schema are accepted, trailing bytes are ignored. Either every
/// frame of the payload is returned or none is.
pub fn decode(
    schema: &'static FrameSchema,
    bytes: &[u8],
    context: &mut DecodeContext,
) -> Result<Vec<DecodedFrame>, FrameError> {
    let needed = schema.width();
    if bytes.len() < needed {
        return Err(FrameError::TooShort {
            schema: schema.name,
            needed,
            got: bytes.len(),
        });
    }

    let mut raw = Vec::new();
    let mut offset = 0;
    for field in schema.fields() {
        let width = field.encoding.width();
        if !field.is_ignored() {
            raw.push((field, field.encoding.read(&bytes[offset..offset + width])));
        }
        offset += width;
    }

    if let Some(Preprocess::MergeHighBytes) = schema.preprocess {
        raw = merge_high_bytes(raw)?;
    }

    // committed only once every frame has decoded
    let mut scratch = context.clone();
    let mut frames = Vec::new();
    let mut current: Vec<(&'static str, Value)> = Vec::new();
    for (field, value) in raw {
        if current.iter().any(|(name, _)| *name == field.name) {
            frames.push(finish(schema, std::mem::take(&mut current), &mut scratch)?);
        }
        current.push((field.name, field.convert(&value)));
    }
    frames.push(finish(schema, current, &mut scratch)?);

    *context = scratch;
    Ok(frames)
}

fn merge_high_bytes(
    raw: Vec<(&'static FieldSpec, RawValue)>,
) -> Result<Vec<(&'static FieldSpec, RawValue)>, FrameError> {
    let mut merged: Vec<(&'static FieldSpec, RawValue)> = Vec::with_capacity(raw.len());
    for (field, value) in raw {
        match merged.iter_mut().find(|(existing, _)| existing.name == field.name) {
            Some((_, RawValue::Int(existing))) => match field.convert(&value) {
                Value::Int(addend) => *existing += addend,
                _ => return Err(FrameError::NonIntegerMerge(field.name)),
            },
            Some((_, RawValue::Bytes(_))) => return Err(FrameError::NonIntegerMerge(field.name)),
            None => merged.push((field, value)),
        }
    }
    Ok(merged)
}

fn finish(
    schema: &'static FrameSchema,
    mut fields: Vec<(&'static str, Value)>,
    context: &mut DecodeContext,
) -> Result<DecodedFrame, FrameError> {
    if let Some(Postprocess::DaysAgo) = schema.postprocess {
        add_days_ago(&mut fields, context);
    }
    let output_id = render_output_id(schema.output_id, &fields)?;
    Ok(DecodedFrame {
        kind: schema.kind,
        output_id,
        fields,
    })
}

fn int_field(fields: &[(&'static str, Value)], name: &str) -> Option<i64> {
    fields
        .iter()
        .find(|(field, _)| *field == name)
        .and_then(|(_, value)| value.as_int())
}

fn add_days_ago(fields: &mut Vec<(&'static str, Value)>, context: &mut DecodeContext) {
    if let Some(max_day_count) = int_field(fields, "max_day_count") {
        context.max_days_observed = max_day_count;
    }
    if let Some(day_counter) = int_field(fields, "day_counter") {
        fields.push(("days_ago", Value::Int(context.max_days_observed - day_counter)));
    }
}

fn render_output_id(
    template: &'static str,
    fields: &[(&'static str, Value)],
) -> Result<String, FrameError> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| FrameError::UnknownTemplateField {
            template,
            field: after.to_string(),
        })?;
        let name = &after[..end];
        let value = fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
            .ok_or_else(|| FrameError::UnknownTemplateField {
                template,
                field: name.to_string(),
            })?;
        output.push_str(&value.to_string());
        rest = &after[end + 1..];
    }
    output.push_str(rest);
    Ok(output)
}
