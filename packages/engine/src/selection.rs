//! Selection converters.

use scribe_view::ViewRange;

use crate::consumable::{ConsumableItem, ConsumableKey};
use crate::conversion_api::{ConversionApi, SelectionData};
use crate::emitter::EventInfo;
use crate::error::ConversionResult;

fn is_collapsed(data: &SelectionData) -> bool {
    data.ranges.len() == 1 && data.ranges[0].is_collapsed()
}

fn consume_selection(api: &mut ConversionApi<'_>) -> bool {
    api.consumable.consume(ConsumableItem::Selection, &ConsumableKey::Selection)
}

/// Drops the previous view selection, merging away empty attribute
/// elements left behind by an earlier caret.
pub fn clear_attributes() -> impl Fn(&mut EventInfo, &SelectionData, &mut ConversionApi<'_>) -> ConversionResult<()> {
    |_, _, api| {
        let ranges = api.writer.document().selection().ranges.clone();
        for range in ranges.into_iter().filter(|range| range.is_collapsed()) {
            if api.writer.document().is_attached(range.end.parent) {
                api.writer.merge_attributes(range.start);
            }
        }
        api.writer.set_selection(Vec::new(), false);
        Ok(())
    }
}

pub fn convert_range_selection() -> impl Fn(&mut EventInfo, &SelectionData, &mut ConversionApi<'_>) -> ConversionResult<()> {
    |_, data, api| {
        if is_collapsed(data) || !consume_selection(api) {
            return Ok(());
        }
        let ranges = data
            .ranges
            .iter()
            .map(|range| api.to_view_range(range))
            .collect::<ConversionResult<Vec<_>>>()?;
        api.writer.set_selection(ranges, data.backward);
        Ok(())
    }
}

/// Places a caret, breaking attribute elements so it sits between them.
pub fn convert_collapsed_selection() -> impl Fn(&mut EventInfo, &SelectionData, &mut ConversionApi<'_>) -> ConversionResult<()> {
    |_, data, api| {
        if !is_collapsed(data) || !consume_selection(api) {
            return Ok(());
        }
        let position = api.to_view_position(&data.ranges[0].start)?;
        let position = api.writer.break_attributes(position)?;
        api.writer
            .set_selection(vec![ViewRange::collapsed(position)], false);
        Ok(())
    }
}
