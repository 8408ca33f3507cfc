//! Descriptor set bind-range coalescing
//!
//! A pipeline maps set indices to set types; a holder maps set types to sets.
//! Indices whose type the holder provides are bound in as few calls as
//! possible: one call per run of consecutive indices.

use std::collections::BTreeMap;
use std::sync::Arc;
use crate::error::{Error, Result};
use crate::renderer::{CommandList, DescriptorSet, DescriptorSetHolder, DescriptorSetType, Pipeline};

/// Inclusive range of set indices bound by one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindRange {
    pub first: u32,
    pub last: u32,
}

impl BindRange {
    pub fn len(&self) -> u32 {
        self.last - self.first + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Runs of consecutive pipeline set indices whose type `holder` provides
///
/// `{0,1,2,4}` against a holder covering the types at `{0,1,4}` gives `[0..=1]` and `[4..=4]`.
pub fn coalesce_bind_ranges(
    pipeline_sets: &BTreeMap<u32, DescriptorSetType>,
    holder: &DescriptorSetHolder,
) -> Vec<BindRange> {
    let mut ranges = Vec::new();
    let mut current: Option<BindRange> = None;

    for (&index, set_type) in pipeline_sets {
        if !holder.contains_key(set_type) {
            ranges.extend(current.take());
            continue;
        }
        current = match current {
            Some(range) if range.last + 1 == index => Some(BindRange { last: index, ..range }),
            other => {
                ranges.extend(other);
                Some(BindRange { first: index, last: index })
            }
        };
    }
    ranges.extend(current);

    ranges
}

/// Bind every set of `holder` the pipeline declares; returns the number of bind calls
pub fn bind_descriptor_sets(
    cmd: &mut dyn CommandList,
    pipeline: &Arc<dyn Pipeline>,
    holder: &DescriptorSetHolder,
) -> Result<u32> {
    let pipeline_sets = pipeline.layout_info().set_layouts();
    let ranges = coalesce_bind_ranges(pipeline_sets, holder);

    for range in &ranges {
        let sets = (range.first..=range.last)
            .map(|index| {
                pipeline_sets
                    .get(&index)
                    .and_then(|set_type| holder.get(set_type))
                    .ok_or_else(|| Error::InvalidResource(format!("no descriptor set for index {}", index)))
            })
            .collect::<Result<Vec<&Arc<dyn DescriptorSet>>>>()?;
        cmd.bind_descriptor_sets(pipeline, range.first, &sets)?;
    }

    Ok(ranges.len() as u32)
}

#[cfg(test)]
#[path = "descriptor_binding_tests.rs"]
mod tests;
