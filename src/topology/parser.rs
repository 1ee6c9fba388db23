//! Parser for textual topology descriptors.
//!
//! Entities are written `driver:name` and links `source:pad->sink:pad`.
//! Entity names may contain spaces and `/` but not `:` or `->`.

use crate::pipeline::{PipelineError, PipelineResult};

/// A parsed `driver:name` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub driver: String,
    pub name: String,
}

/// One end of a link descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PadRef {
    pub entity: String,
    pub pad: u16,
}

/// A parsed `source:pad->sink:pad` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDescriptor {
    pub source: PadRef,
    pub sink: PadRef,
}

pub fn parse_entity(descriptor: &str) -> PipelineResult<EntityDescriptor> {
    let (driver, name) = descriptor.split_once(':').ok_or_else(|| {
        PipelineError::invalid(format!("'{}' is not of the form driver:name", descriptor))
    })?;
    let driver = driver.trim();
    let name = name.trim();
    if driver.is_empty() || name.is_empty() {
        return Err(PipelineError::invalid(format!(
            "'{}' has an empty driver or name",
            descriptor
        )));
    }
    Ok(EntityDescriptor {
        driver: driver.to_string(),
        name: name.to_string(),
    })
}

fn parse_pad_ref(text: &str, descriptor: &str) -> PipelineResult<PadRef> {
    let (entity, pad) = text.rsplit_once(':').ok_or_else(|| {
        PipelineError::invalid(format!("'{}' in '{}' lacks a :pad suffix", text, descriptor))
    })?;
    let entity = entity.trim();
    if entity.is_empty() {
        return Err(PipelineError::invalid(format!(
            "empty entity name in '{}'",
            descriptor
        )));
    }
    let pad = pad.trim().parse::<u16>().map_err(|e| {
        PipelineError::invalid(format!("bad pad index '{}' in '{}': {}", pad, descriptor, e))
    })?;
    Ok(PadRef {
        entity: entity.to_string(),
        pad,
    })
}

pub fn parse_link(descriptor: &str) -> PipelineResult<LinkDescriptor> {
    let (source, sink) = descriptor.split_once("->").ok_or_else(|| {
        PipelineError::invalid(format!(
            "'{}' is not of the form source:pad->sink:pad",
            descriptor
        ))
    })?;
    Ok(LinkDescriptor {
        source: parse_pad_ref(source, descriptor)?,
        sink: parse_pad_ref(sink, descriptor)?,
    })
}
