//! Entity record encoding: CBOR body, zstd compressed, explicit schema version.

use crate::error::StoreError;
use realm_entity::Entity;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Version stamped into every encoded entity record.
pub const RECORD_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct RecordRef<'a> {
    schema_version: u32,
    entity: &'a Entity,
}

#[derive(Deserialize)]
struct Record {
    schema_version: u32,
    entity: Entity,
}

pub(crate) fn encode_entity(entity: &Entity) -> Result<Vec<u8>, StoreError> {
    let record = RecordRef {
        schema_version: RECORD_SCHEMA_VERSION,
        entity,
    };
    let cbor_bytes = cbor_serialize(&record)?;
    Ok(zstd_compress(&cbor_bytes)?)
}

/// Decode a payload. The error is a human-readable reason; the caller knows
/// which id it was loading.
pub(crate) fn decode_entity(payload: &[u8]) -> Result<Entity, String> {
    if payload.is_empty() {
        return Err("empty payload".into());
    }
    let cbor_bytes = zstd_decompress(payload).map_err(|e| format!("decompress: {e}"))?;
    let record: Record = cbor_deserialize(&cbor_bytes).map_err(|e| e.to_string())?;
    if record.schema_version != RECORD_SCHEMA_VERSION {
        return Err(format!(
            "record schema v{}, expected v{RECORD_SCHEMA_VERSION}",
            record.schema_version
        ));
    }
    Ok(record.entity)
}

pub(crate) fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::CborEncode(e.to_string()))?;
    Ok(buf)
}

pub(crate) fn cbor_deserialize<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(data).map_err(|e| StoreError::CborDecode(e.to_string()))
}

fn zstd_compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    encoder.finish()
}

fn zstd_decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use realm_common::{EntityId, EntityKind};
    use realm_entity::{Blueprint, BufferedSession, EquipSlot};

    #[test]
    fn decoded_entity_keeps_persisted_fields_only() {
        let mut knight = Entity::new(
            EntityId::new(),
            EntityKind::Player,
            Some(EntityId::new()),
            Blueprint::named("Knight").with_attribute("title", "Sir"),
        );
        let sword = EntityId::new();
        knight.equip(EquipSlot::MainHand, sword).unwrap();
        knight.attach_session(BufferedSession::new());

        let bytes = encode_entity(&knight).unwrap();
        let decoded = decode_entity(&bytes).unwrap();
        assert_eq!(decoded.id(), knight.id());
        assert_eq!(decoded.kind(), EntityKind::Player);
        assert_eq!(decoded.container(), knight.container());
        assert_eq!(decoded.equipment().unwrap().get(EquipSlot::MainHand), Some(sword));
        assert_eq!(decoded.attribute("title"), Some("Sir"));
        assert!(decoded.session().is_none());
    }

    #[test]
    fn empty_and_garbage_payloads_are_rejected() {
        assert!(decode_entity(&[]).is_err());
        assert!(decode_entity(b"definitely not zstd").is_err());
    }

    #[test]
    fn unknown_schema_version_is_rejected() {
        let entity = Entity::new(EntityId::new(), EntityKind::Item, None, Blueprint::named("x"));
        let record = RecordRef {
            schema_version: RECORD_SCHEMA_VERSION + 1,
            entity: &entity,
        };
        let bytes = zstd_compress(&cbor_serialize(&record).unwrap()).unwrap();
        let reason = decode_entity(&bytes).unwrap_err();
        assert!(reason.contains("schema"));
    }
}
