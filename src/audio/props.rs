// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! SPA `Props` pods for node volume and mute.

use libspa::pod::deserialize::PodDeserializer;
use libspa::pod::serialize::PodSerializer;
use libspa::pod::{Object, Property, PropertyFlags, Value, ValueArray};
use std::io::Cursor;
use thiserror::Error;
use tracing::trace;

/// Ids from spa/param/param.h and spa/param/props.h.
mod spa_const {
    pub const SPA_TYPE_OBJECT_PROPS: u32 = libspa::sys::SPA_TYPE_OBJECT_Props;
    pub const SPA_PARAM_PROPS: u32 = libspa::sys::SPA_PARAM_Props;
    pub const SPA_PROP_VOLUME: u32 = libspa::sys::SPA_PROP_volume;
    pub const SPA_PROP_MUTE: u32 = libspa::sys::SPA_PROP_mute;
    pub const SPA_PROP_CHANNEL_VOLUMES: u32 = libspa::sys::SPA_PROP_channelVolumes;
}

#[derive(Debug, Error)]
pub enum PropsError {
    #[error("Failed to serialize pod: {0}")]
    Serialize(String),
    #[error("Failed to parse pod: {0}")]
    Deserialize(String),
}

/// Volume and mute carried by one `Props` param.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PropsUpdate {
    /// Loudest channel volume, if channel volumes were present.
    pub volume: Option<f32>,
    pub muted: Option<bool>,
    /// Number of channel volumes, if present.
    pub channels: Option<usize>,
}

/// `Props` pod setting every channel of a node to `volume`.
pub fn build_channel_volumes_pod(volume: f32, channels: usize) -> Result<Vec<u8>, PropsError> {
    let volume = volume.clamp(0.0, 1.0);
    trace!("Building channel volumes pod: {:.3} x {}", volume, channels);
    serialize(vec![Property {
        key: spa_const::SPA_PROP_CHANNEL_VOLUMES,
        flags: PropertyFlags::empty(),
        value: Value::ValueArray(ValueArray::Float(vec![volume; channels.max(1)])),
    }])
}

pub fn build_mute_pod(muted: bool) -> Result<Vec<u8>, PropsError> {
    serialize(vec![Property {
        key: spa_const::SPA_PROP_MUTE,
        flags: PropertyFlags::empty(),
        value: Value::Bool(muted),
    }])
}

fn serialize(properties: Vec<Property>) -> Result<Vec<u8>, PropsError> {
    let value = Value::Object(Object {
        type_: spa_const::SPA_TYPE_OBJECT_PROPS,
        id: spa_const::SPA_PARAM_PROPS,
        properties,
    });
    let mut buffer = vec![0u8; 1024];
    let (_, written) = PodSerializer::serialize(Cursor::new(&mut buffer[..]), &value)
        .map_err(|e| PropsError::Serialize(format!("{:?}", e)))?;
    buffer.truncate(written as usize);
    Ok(buffer)
}

/// Extract volume and mute from a serialized `Props` object.
///
/// Channel volumes win over the single `volume` property when both are
/// present, since that is what mixers show.
pub fn parse_props(bytes: &[u8]) -> Result<PropsUpdate, PropsError> {
    let (_, value) = PodDeserializer::deserialize_any_from(bytes)
        .map_err(|e| PropsError::Deserialize(format!("{:?}", e)))?;
    let Value::Object(object) = value else {
        return Err(PropsError::Deserialize("not an object".into()));
    };

    let mut update = PropsUpdate::default();
    let mut single_volume = None;
    for property in object.properties {
        match (property.key, property.value) {
            (spa_const::SPA_PROP_CHANNEL_VOLUMES, Value::ValueArray(ValueArray::Float(volumes))) => {
                update.channels = Some(volumes.len());
                update.volume = volumes.into_iter().reduce(f32::max);
            }
            (spa_const::SPA_PROP_VOLUME, Value::Float(volume)) => single_volume = Some(volume),
            (spa_const::SPA_PROP_MUTE, Value::Bool(muted)) => update.muted = Some(muted),
            _ => {}
        }
    }
    if update.volume.is_none() {
        update.volume = single_volume;
    }
    Ok(update)
}
