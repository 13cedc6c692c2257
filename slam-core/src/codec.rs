//! Binary save record for the registry and every entity state.
//!
//! All integers and floats are little-endian; strings are a `u32` byte
//! length followed by UTF-8.
//!
//! ```text
//! u32 effect_count
//!   { string name, i32 id } × effect_count
//! u32 entity_count
//!   u32 entity_id
//!   f32 arousal
//!   f32 last_update
//!   u32 slot_count     { f32 value, i32 law, f32 param, f32 limit, i32 aux } × slot_count
//!   u8  group_count    { u32 n, u32 member × n, f32 value } × group_count
//!   u32 active_count   { i32 id } × active_count
//!   u32 dynamic_count  { string name, effect } × dynamic_count
//!   u32 active_dynamic { string name } × active_dynamic
//! ```
//!
//! Decoding is all-or-nothing. Two kinds of damage are repaired instead of
//! rejected: a stored arousal that drifted from the recomputed sum, and group
//! values too large to be legitimate products.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::effect::EffectRecord;
use crate::error::{Result, SlamError};
use crate::group::EffectGroup;
use crate::registry::EffectRegistry;
use crate::state::EntityArousalState;
use crate::types::{DecayLaw, EffectId, EntityId};

/// Four-character tag of the main record.
pub const RECORD_TYPE: u32 = u32::from_be_bytes(*b"DATA");
/// Current layout version.
pub const RECORD_VERSION: u32 = 1;

const HEADER_LEN: usize = 12;

// ---------------------------------------------------------------------------
// Record framing
// ---------------------------------------------------------------------------

/// A versioned, typed blob as handed to (or received from) the host's save
/// system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRecord {
    /// Four-character record tag.
    pub record_type: u32,
    /// Layout version of `data`.
    pub version: u32,
    /// Encoded payload.
    pub data: Vec<u8>,
}

impl SaveRecord {
    /// Frame as `u32 type, u32 version, u32 length, payload`.
    ///
    /// # Errors
    /// Returns [`SlamError::Corrupted`] if the payload exceeds 4 GiB.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let len = u32::try_from(self.data.len())
            .map_err(|_| SlamError::Corrupted("record payload too large".to_string()))?;
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len());
        out.write_u32::<LittleEndian>(self.record_type)?;
        out.write_u32::<LittleEndian>(self.version)?;
        out.write_u32::<LittleEndian>(len)?;
        out.extend_from_slice(&self.data);
        Ok(out)
    }

    /// Parse a framed record.
    ///
    /// # Errors
    /// Returns [`SlamError::Corrupted`] on a short header or a length that
    /// does not match the remaining bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = RecordReader::new(bytes);
        let record_type = reader.u32()?;
        let version = reader.u32()?;
        let len = reader.u32()? as usize;
        if bytes.len() - HEADER_LEN != len {
            return Err(SlamError::Corrupted(format!(
                "record length {len} does not match {} payload bytes",
                bytes.len() - HEADER_LEN
            )));
        }
        Ok(Self {
            record_type,
            version,
            data: bytes[HEADER_LEN..].to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// Identifier resolution
// ---------------------------------------------------------------------------

/// Maps an entity id stored in a save to its id in the running session.
///
/// Returning `None` drops the entity's state from the load.
pub trait IdentifierResolver {
    /// Resolve a stored id.
    fn resolve(&self, stored: EntityId) -> Option<EntityId>;
}

/// Resolver that keeps every id as stored.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl IdentifierResolver for IdentityResolver {
    fn resolve(&self, stored: EntityId) -> Option<EntityId> {
        Some(stored)
    }
}

impl<F> IdentifierResolver for F
where
    F: Fn(EntityId) -> Option<EntityId>,
{
    fn resolve(&self, stored: EntityId) -> Option<EntityId> {
        self(stored)
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn write_string(out: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u32::try_from(s.len())
        .map_err(|_| SlamError::Corrupted(format!("string of {} bytes too long", s.len())))?;
    out.write_u32::<LittleEndian>(len)?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn write_effect(out: &mut Vec<u8>, effect: &EffectRecord) -> Result<()> {
    out.write_f32::<LittleEndian>(effect.value)?;
    out.write_i32::<LittleEndian>(effect.law.raw())?;
    out.write_f32::<LittleEndian>(effect.param)?;
    out.write_f32::<LittleEndian>(effect.limit)?;
    out.write_i32::<LittleEndian>(effect.aux)?;
    Ok(())
}

fn write_len(out: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| SlamError::Corrupted(format!("collection of {len} entries too large")))?;
    out.write_u32::<LittleEndian>(len)?;
    Ok(())
}

fn write_state(out: &mut Vec<u8>, state: &EntityArousalState) -> Result<()> {
    out.write_f32::<LittleEndian>(state.arousal)?;
    out.write_f32::<LittleEndian>(state.last_update)?;

    write_len(out, state.static_effects.len())?;
    for effect in &state.static_effects {
        write_effect(out, effect)?;
    }

    let group_count = u8::try_from(state.groups.len())
        .map_err(|_| SlamError::Logic(format!("{} groups exceed the save limit", state.groups.len())))?;
    out.write_u8(group_count)?;
    for (_, group) in state.groups.iter() {
        write_len(out, group.members.len())?;
        for member in &group.members {
            out.write_u32::<LittleEndian>(member.0)?;
        }
        out.write_f32::<LittleEndian>(group.value)?;
    }

    write_len(out, state.active_static.len())?;
    for id in &state.active_static {
        let raw = i32::try_from(id.0)
            .map_err(|_| SlamError::Logic(format!("effect id {id} exceeds i32")))?;
        out.write_i32::<LittleEndian>(raw)?;
    }

    write_len(out, state.dynamic_effects.len())?;
    for (name, effect) in &state.dynamic_effects {
        write_string(out, name)?;
        write_effect(out, effect)?;
    }

    write_len(out, state.active_dynamic.len())?;
    for name in &state.active_dynamic {
        write_string(out, name)?;
    }
    Ok(())
}

/// Encode the registry and all entity states into one record.
///
/// Entities are written in ascending id order so equal states produce
/// equal bytes.
///
/// # Errors
/// Returns [`SlamError::Logic`] if a state breaks a format limit.
pub fn encode(
    registry: &EffectRegistry,
    states: &HashMap<EntityId, EntityArousalState>,
) -> Result<SaveRecord> {
    let mut out = Vec::new();

    out.write_u32::<LittleEndian>(registry.count())?;
    let mut entries: Vec<(&str, EffectId)> = registry.entries().collect();
    entries.sort_by_key(|(_, id)| *id);
    for (name, id) in entries {
        write_string(&mut out, name)?;
        let raw = i32::try_from(id.0)
            .map_err(|_| SlamError::Logic(format!("effect id {id} exceeds i32")))?;
        out.write_i32::<LittleEndian>(raw)?;
    }

    write_len(&mut out, states.len())?;
    let mut entities: Vec<&EntityId> = states.keys().collect();
    entities.sort_unstable();
    for who in entities {
        out.write_u32::<LittleEndian>(who.0)?;
        write_state(&mut out, &states[who])?;
    }

    debug!(
        effects = registry.count(),
        entities = states.len(),
        bytes = out.len(),
        "Encoded save record"
    );
    Ok(SaveRecord {
        record_type: RECORD_TYPE,
        version: RECORD_VERSION,
        data: out,
    })
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Result of a successful decode.
#[derive(Debug, Default)]
pub struct Snapshot {
    /// Restored registry.
    pub registry: EffectRegistry,
    /// Restored states keyed by resolved entity id.
    pub states: HashMap<EntityId, EntityArousalState>,
    /// Entities whose id failed to resolve.
    pub dropped: usize,
    /// Entities whose stored arousal was out of tolerance.
    pub healed: usize,
    /// Group values reset because of an implausible magnitude.
    pub corrupted_groups: usize,
}

struct RecordReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

fn truncated(_: std::io::Error) -> SlamError {
    SlamError::Corrupted("unexpected end of record".to_string())
}

impl<'a> RecordReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len();
        len.saturating_sub(usize::try_from(self.cursor.position()).unwrap_or(len))
    }

    fn u8(&mut self) -> Result<u8> {
        self.cursor.read_u8().map_err(truncated)
    }

    fn u32(&mut self) -> Result<u32> {
        self.cursor.read_u32::<LittleEndian>().map_err(truncated)
    }

    fn i32(&mut self) -> Result<i32> {
        self.cursor.read_i32::<LittleEndian>().map_err(truncated)
    }

    fn f32(&mut self) -> Result<f32> {
        self.cursor.read_f32::<LittleEndian>().map_err(truncated)
    }

    /// Read a count and reject it if the remaining bytes cannot hold that
    /// many entries of at least `min_entry` bytes.
    fn count(&mut self, min_entry: usize) -> Result<usize> {
        let count = self.u32()? as usize;
        if count.saturating_mul(min_entry) > self.remaining() {
            return Err(SlamError::Corrupted(format!(
                "count {count} exceeds remaining {} bytes",
                self.remaining()
            )));
        }
        Ok(count)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.count(1)?;
        let mut buf = vec![0_u8; len];
        self.cursor.read_exact(&mut buf).map_err(truncated)?;
        String::from_utf8(buf).map_err(|e| SlamError::Corrupted(format!("invalid UTF-8 name: {e}")))
    }

    fn effect(&mut self) -> Result<EffectRecord> {
        let value = self.f32()?;
        let raw_law = self.i32()?;
        let law = DecayLaw::from_raw(raw_law)
            .ok_or_else(|| SlamError::Corrupted(format!("unknown law {raw_law}")))?;
        Ok(EffectRecord {
            value,
            law,
            param: self.f32()?,
            limit: self.f32()?,
            aux: self.i32()?,
        })
    }

}

fn slot_id(raw: i64, slot_count: usize) -> Result<EffectId> {
    u32::try_from(raw)
        .ok()
        .filter(|id| (*id as usize) < slot_count)
        .map(EffectId)
        .ok_or_else(|| SlamError::Corrupted(format!("effect id {raw} out of range ({slot_count} slots)")))
}

const EFFECT_LEN: usize = 20;

fn read_state(
    reader: &mut RecordReader<'_>,
    who: EntityId,
    slot_count: usize,
    config: &PersistenceConfig,
    snapshot: &mut Snapshot,
) -> Result<EntityArousalState> {
    let mut state = EntityArousalState::new(slot_count);
    let stored_arousal = reader.f32()?;
    state.last_update = reader.f32()?;

    let stored_slots = reader.count(EFFECT_LEN)?;
    if stored_slots > slot_count {
        return Err(SlamError::Corrupted(format!(
            "entity {who} has {stored_slots} slots, registry has {slot_count}"
        )));
    }
    for slot in state.static_effects.iter_mut().take(stored_slots) {
        *slot = reader.effect()?;
    }

    let group_count = reader.u8()?;
    for _ in 0..group_count {
        let member_count = reader.count(4)?;
        let mut group = EffectGroup::default();
        for _ in 0..member_count {
            let raw = reader.u32()?;
            let id = slot_id(i64::from(raw), slot_count)?;
            if group.members.contains(&id) || state.static_group_of[id.index()].is_some() {
                return Err(SlamError::Corrupted(format!("effect {id} is in two groups")));
            }
            group.members.push(id);
        }
        group.value = reader.f32()?;
        if group.value.abs() > config.max_group_magnitude {
            warn!(entity = %who, value = group.value, "Possibly corrupted group value, resetting to zero");
            group.value = 0.0;
            snapshot.corrupted_groups += 1;
        }
        let members = group.members.clone();
        let handle = state.groups.insert(group);
        for id in members {
            state.static_group_of[id.index()] = Some(handle);
        }
    }

    let active_count = reader.count(4)?;
    for _ in 0..active_count {
        let raw = reader.i32()?;
        let id = slot_id(i64::from(raw), slot_count)?;
        if state.static_effects[id.index()].law.is_active() {
            state.active_static.insert(id);
        } else {
            debug!(entity = %who, effect = %id, "Dropping dormant effect from active set");
        }
    }

    let dynamic_count = reader.count(4 + EFFECT_LEN)?;
    for _ in 0..dynamic_count {
        let name = reader.string()?;
        let effect = reader.effect()?;
        if state.dynamic_effects.contains_key(&name) {
            return Err(SlamError::Corrupted(format!("dynamic effect {name:?} stored twice")));
        }
        state.dynamic_effects.insert(name, effect);
    }

    let active_dynamic = reader.count(4)?;
    for _ in 0..active_dynamic {
        let name = reader.string()?;
        if state.dynamic_effects.get(&name).is_some_and(|e| e.law.is_active()) {
            state.active_dynamic.insert(name);
        }
    }

    let recalculated = state.recompute_arousal();
    if (recalculated - stored_arousal).abs() > config.arousal_tolerance {
        info!(
            entity = %who,
            expected = recalculated,
            got = stored_arousal,
            "Arousal data mismatch"
        );
        snapshot.healed += 1;
    }
    state.arousal = recalculated;
    Ok(state)
}

/// Decode a record produced by [`encode`].
///
/// # Errors
/// Returns [`SlamError::Corrupted`] on a foreign record type, a version
/// mismatch or any structural damage.
pub fn decode(
    record: &SaveRecord,
    resolver: &dyn IdentifierResolver,
    config: &PersistenceConfig,
) -> Result<Snapshot> {
    if record.record_type != RECORD_TYPE {
        return Err(SlamError::Corrupted(format!(
            "unhandled record type {:#010x}",
            record.record_type
        )));
    }
    if record.version != RECORD_VERSION {
        return Err(SlamError::Corrupted(format!(
            "unsupported record version {}",
            record.version
        )));
    }

    let mut reader = RecordReader::new(&record.data);
    let mut snapshot = Snapshot::default();

    let effect_count = reader.u32()?;
    let slot_count = effect_count as usize;
    let mut ids = HashMap::with_capacity(slot_count.min(reader.remaining() / 8));
    let mut bound = HashSet::with_capacity(ids.capacity());
    for _ in 0..effect_count {
        let name = reader.string()?;
        let raw = reader.i32()?;
        let id = slot_id(i64::from(raw), slot_count)?;
        if !bound.insert(id) {
            return Err(SlamError::Corrupted(format!("effect {id} bound to two names")));
        }
        if ids.insert(name, id).is_some() {
            return Err(SlamError::Corrupted("duplicate effect name".to_string()));
        }
    }
    snapshot.registry = EffectRegistry::from_parts(ids, effect_count);
    info!(effects = effect_count, "Loaded effect registry");

    let entity_count = reader.count(4)?;
    for _ in 0..entity_count {
        let stored = EntityId(reader.u32()?);
        let state = read_state(&mut reader, stored, slot_count, config, &mut snapshot)?;
        match resolver.resolve(stored) {
            Some(who) => {
                snapshot.states.insert(who, state);
            }
            None => {
                debug!(entity = %stored, "Dropping state of unresolved entity");
                snapshot.dropped += 1;
            }
        }
    }

    if reader.remaining() != 0 {
        return Err(SlamError::Corrupted(format!(
            "{} trailing bytes after last entity",
            reader.remaining()
        )));
    }

    info!(
        entities = snapshot.states.len(),
        dropped = snapshot.dropped,
        healed = snapshot.healed,
        "Loaded entity states"
    );
    Ok(snapshot)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const WHO: EntityId = EntityId(0x0001_0D62);

    fn populated() -> (EffectRegistry, HashMap<EntityId, EntityArousalState>) {
        let mut registry = EffectRegistry::new();
        for name in ["Heat", "Lust", "Shame"] {
            registry.register(name);
        }
        let mut state = EntityArousalState::new(3);
        state.last_update = 12.5;
        state.set_static_effect(EffectId(0), DecayLaw::ExponentialDecay, 2.0, 0.0, 0).expect("law");
        state.set_static_value(EffectId(0), 10.0).expect("value");
        state.set_static_value(EffectId(1), 2.0).expect("value");
        state.set_static_value(EffectId(2), 3.0).expect("value");
        state.group_effects(WHO, EffectId(1), EffectId(2)).expect("group");
        state.set_dynamic_effect("sauna", 4.0, DecayLaw::LinearRamp, -1.0, 0.0);

        let mut states = HashMap::new();
        states.insert(WHO, state);
        (registry, states)
    }

    fn corrupt_group_value(bytes: &mut [u8], value: f32) {
        // Header of the single entity: registry block, entity count, id,
        // arousal, last_update, slot count, 3 effects, group count,
        // member count, 2 members, then the group value.
        let registry_len: usize = 4 + ["Heat", "Lust", "Shame"].iter().map(|n| 4 + n.len() + 4).sum::<usize>();
        let offset = registry_len + 4 + 4 + 4 + 4 + 4 + 3 * EFFECT_LEN + 1 + 4 + 8;
        bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put_str(out: &mut Vec<u8>, s: &str) {
        out.write_u32::<LittleEndian>(s.len() as u32).expect("len");
        out.extend_from_slice(s.as_bytes());
    }

    fn record_of(data: Vec<u8>) -> SaveRecord {
        SaveRecord {
            record_type: RECORD_TYPE,
            version: RECORD_VERSION,
            data,
        }
    }

    #[test]
    fn one_id_under_two_names_is_rejected() {
        let mut data = Vec::new();
        data.write_u32::<LittleEndian>(2).expect("count");
        for name in ["Heat", "Lust"] {
            put_str(&mut data, name);
            data.write_i32::<LittleEndian>(0).expect("id");
        }
        data.write_u32::<LittleEndian>(0).expect("entities");

        let err = decode(&record_of(data), &IdentityResolver, &PersistenceConfig::default())
            .expect_err("aliased id");
        assert!(matches!(err, SlamError::Corrupted(_)));
    }

    #[test]
    fn repeated_dynamic_name_is_rejected() {
        let mut data = Vec::new();
        data.write_u32::<LittleEndian>(0).expect("effects");
        data.write_u32::<LittleEndian>(1).expect("entities");
        data.write_u32::<LittleEndian>(WHO.0).expect("who");
        data.write_f32::<LittleEndian>(2.0).expect("arousal");
        data.write_f32::<LittleEndian>(1.0).expect("last update");
        data.write_u32::<LittleEndian>(0).expect("slots");
        data.write_u8(0).expect("groups");
        data.write_u32::<LittleEndian>(0).expect("active");
        data.write_u32::<LittleEndian>(2).expect("dynamic");
        for _ in 0..2 {
            put_str(&mut data, "sauna");
            data.write_f32::<LittleEndian>(1.0).expect("value");
            data.write_i32::<LittleEndian>(0).expect("law");
            data.write_f32::<LittleEndian>(0.0).expect("param");
            data.write_f32::<LittleEndian>(0.0).expect("limit");
            data.write_i32::<LittleEndian>(0).expect("aux");
        }
        data.write_u32::<LittleEndian>(0).expect("active dynamic");

        let err = decode(&record_of(data), &IdentityResolver, &PersistenceConfig::default())
            .expect_err("repeated name");
        assert!(matches!(err, SlamError::Corrupted(_)));
    }

    #[test]
    fn round_trip_preserves_state() {
        let (registry, states) = populated();
        let record = encode(&registry, &states).expect("encode");
        let snapshot = decode(&record, &IdentityResolver, &PersistenceConfig::default()).expect("decode");

        assert_eq!(snapshot.registry.count(), 3);
        assert_eq!(snapshot.registry.id_of("Lust"), Some(EffectId(1)));
        let before = &states[&WHO];
        let after = &snapshot.states[&WHO];
        assert!((after.arousal() - before.arousal()).abs() < 0.5);
        assert!((after.last_update() - 12.5).abs() < f32::EPSILON);
        assert!(after.is_static_effect_active(EffectId(0)));
        assert!(after.is_dynamic_effect_active("sauna"));
        assert_eq!(after.group_of(EffectId(1)).expect("slot"), after.group_of(EffectId(2)).expect("slot"));
        assert!(after.group_of(EffectId(1)).expect("slot").is_some());
        assert_eq!(snapshot.healed, 0);
    }

    #[test]
    fn framed_bytes_round_trip() {
        let (registry, states) = populated();
        let record = encode(&registry, &states).expect("encode");
        let bytes = record.to_bytes().expect("frame");
        assert_eq!(SaveRecord::from_bytes(&bytes).expect("parse"), record);
        assert!(SaveRecord::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn corrupted_group_value_is_reset() {
        let (registry, states) = populated();
        let mut record = encode(&registry, &states).expect("encode");
        corrupt_group_value(&mut record.data, 1e6);

        let snapshot = decode(&record, &IdentityResolver, &PersistenceConfig::default()).expect("decode");
        let state = &snapshot.states[&WHO];
        let handle = state.group_of(EffectId(1)).expect("slot").expect("grouped");
        assert_eq!(state.group(handle).expect("group").value, 0.0);
        assert_eq!(snapshot.corrupted_groups, 1);
        // The stored arousal included the old product, so it is healed too.
        assert_eq!(snapshot.healed, 1);
        assert!((state.arousal() - state.recompute_arousal()).abs() < f32::EPSILON);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let (registry, states) = populated();
        let mut record = encode(&registry, &states).expect("encode");
        record.version = 2;
        let err = decode(&record, &IdentityResolver, &PersistenceConfig::default()).expect_err("version");
        assert!(matches!(err, SlamError::Corrupted(_)));
    }

    #[test]
    fn truncated_record_is_rejected() {
        let (registry, states) = populated();
        let mut record = encode(&registry, &states).expect("encode");
        record.data.truncate(record.data.len() - 3);
        assert!(decode(&record, &IdentityResolver, &PersistenceConfig::default()).is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let (registry, states) = populated();
        let mut record = encode(&registry, &states).expect("encode");
        record.data.push(0);
        assert!(decode(&record, &IdentityResolver, &PersistenceConfig::default()).is_err());
    }

    #[test]
    fn unresolved_entities_are_skipped() {
        let (registry, mut states) = populated();
        states.insert(EntityId(7), EntityArousalState::new(3));
        let record = encode(&registry, &states).expect("encode");

        let resolver = |id: EntityId| (id != WHO).then_some(EntityId(id.0 + 100));
        let snapshot = decode(&record, &resolver, &PersistenceConfig::default()).expect("decode");
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.states.len(), 1);
        assert!(snapshot.states.contains_key(&EntityId(107)));
    }

    #[test]
    fn empty_engine_encodes_to_two_counts() {
        let record = encode(&EffectRegistry::new(), &HashMap::new()).expect("encode");
        assert_eq!(record.data, vec![0; 8]);
        let snapshot = decode(&record, &IdentityResolver, &PersistenceConfig::default()).expect("decode");
        assert!(snapshot.states.is_empty());
    }
}
