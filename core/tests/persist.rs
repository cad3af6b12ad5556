//! Binary state persistence: one persist function both writes and reads.

use rts_sim_core::{
    clock::LogicFrame,
    error::{SimError, SimResult},
    object::ObjectBody,
    persist::{JsonStateWriter, PersistEnum, Persistable, StatePersister, StateReader, StateWriter},
    types::{ColorRgba, ObjectId, Vector3},
};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
enum Stance {
    #[default]
    Guard,
    Aggressive,
}

impl PersistEnum for Stance {
    fn to_raw(self) -> u32 {
        self as u32
    }

    fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Guard),
            1 => Some(Self::Aggressive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Squad {
    name:     String,
    title:    String,
    leader:   ObjectId,
    formed:   LogicFrame,
    stance:   Stance,
    rally:    Vector3,
    color:    ColorRgba,
    members:  Vec<ObjectId>,
    veteran:  bool,
    /// Only present from version 2 on.
    morale:   f32,
}

impl Persistable for Squad {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        let version = p.persist_version(2)?;
        p.persist_ascii_string("Name", &mut self.name)?;
        p.persist_unicode_string("Title", &mut self.title)?;
        p.persist_object_id("Leader", &mut self.leader)?;
        p.persist_frame("Formed", &mut self.formed)?;
        p.persist_enum("Stance", &mut self.stance)?;
        p.persist_vector3("Rally", &mut self.rally)?;
        p.persist_color("Color", &mut self.color)?;
        p.persist_list_u16("Members", &mut self.members, |p, id| p.persist_object_id("Member", id))?;
        p.persist_bool("Veteran", &mut self.veteran)?;
        if version >= 2 {
            p.persist_f32("Morale", &mut self.morale)?;
        }
        Ok(())
    }
}

fn sample_squad() -> Squad {
    Squad {
        name:    "Alpha".to_string(),
        title:   "Überfall".to_string(),
        leader:  ObjectId(12),
        formed:  LogicFrame(450),
        stance:  Stance::Aggressive,
        rally:   Vector3::new(10.0, -4.5, 2.0),
        color:   ColorRgba::new(255, 0, 128, 255),
        members: vec![ObjectId(12), ObjectId(13), ObjectId(20)],
        veteran: true,
        morale:  0.75,
    }
}

fn write<T: Persistable>(value: &mut T) -> Vec<u8> {
    let mut writer = StateWriter::new();
    let p: &mut dyn StatePersister = &mut writer;
    p.persist_object("Root", value).unwrap();
    writer.finish().unwrap()
}

fn read<T: Persistable + Default>(bytes: &[u8]) -> SimResult<T> {
    let mut value = T::default();
    let mut reader = StateReader::new(bytes);
    let p: &mut dyn StatePersister = &mut reader;
    p.persist_object("Root", &mut value)?;
    Ok(value)
}

#[test]
fn write_then_read_restores_every_field() {
    let mut squad = sample_squad();
    let bytes = write(&mut squad);
    let restored: Squad = read(&bytes).unwrap();
    assert_eq!(restored, squad);
}

#[test]
fn saving_twice_gives_identical_bytes() {
    let mut squad = sample_squad();
    let first = write(&mut squad);
    let mut restored: Squad = read(&first).unwrap();
    assert_eq!(write(&mut restored), first);
}

#[test]
fn newer_version_is_rejected() {
    let mut bytes = write(&mut sample_squad());
    bytes[0] = 3;
    assert!(matches!(read::<Squad>(&bytes), Err(SimError::VersionTooNew { found: 3, max: 2, .. })));
}

#[test]
fn older_version_reads_with_defaults() {
    let mut squad = sample_squad();
    let mut bytes = write(&mut squad);
    bytes[0] = 1;
    // A version 1 writer never wrote the trailing morale.
    bytes.truncate(bytes.len() - 4);
    let restored: Squad = read(&bytes).unwrap();
    assert_eq!(restored.morale, 0.0);
    assert_eq!(restored.members, squad.members);
}

#[test]
fn bool_bytes_other_than_zero_or_one_are_corrupt() {
    let mut squad = sample_squad();
    let mut bytes = write(&mut squad);
    let veteran_at = bytes.len() - 5;
    bytes[veteran_at] = 7;
    assert!(matches!(read::<Squad>(&bytes), Err(SimError::CorruptState { .. })));
}

#[test]
fn unknown_enum_value_is_corrupt() {
    let mut writer = StateWriter::new();
    writer.persist_u32("Stance", &mut 9).unwrap();
    let bytes = writer.finish().unwrap();

    let mut reader = StateReader::new(&bytes);
    let p: &mut dyn StatePersister = &mut reader;
    let mut stance = Stance::Guard;
    assert!(matches!(p.persist_enum("Stance", &mut stance), Err(SimError::CorruptState { .. })));
}

#[test]
fn truncated_stream_reports_end_of_data() {
    let bytes = write(&mut sample_squad());
    let result = read::<Squad>(&bytes[..bytes.len() / 2]);
    assert!(matches!(result, Err(SimError::UnexpectedEof { .. })));
}

#[test]
fn list_count_larger_than_the_stream_is_rejected_before_allocating() {
    let mut writer = StateWriter::new();
    writer.persist_u32("Count", &mut 1_000_000).unwrap();
    let bytes = writer.finish().unwrap();

    let mut reader = StateReader::new(&bytes);
    let p: &mut dyn StatePersister = &mut reader;
    let mut items: Vec<u32> = Vec::new();
    let result = p.persist_list_u32("Items", &mut items, |p, v| p.persist_u32("Item", v));
    assert!(matches!(result, Err(SimError::CorruptState { .. })));
    assert!(items.is_empty());
}

#[test]
fn unread_segment_tail_is_skipped() {
    let mut writer = StateWriter::new();
    writer.begin_segment("Module").unwrap();
    writer.persist_u32("Known", &mut 5).unwrap();
    writer.persist_u32("AddedLater", &mut 6).unwrap();
    writer.end_segment().unwrap();
    writer.persist_u8("After", &mut 0xAB).unwrap();
    let bytes = writer.finish().unwrap();

    let mut reader = StateReader::new(&bytes);
    assert_eq!(reader.begin_segment("Module").unwrap(), 8);
    let mut known = 0;
    reader.persist_u32("Known", &mut known).unwrap();
    reader.end_segment().unwrap();
    let mut after = 0;
    reader.persist_u8("After", &mut after).unwrap();
    assert_eq!((known, after), (5, 0xAB));
    assert!(reader.is_at_end());
}

#[test]
fn reading_past_a_segment_is_fatal() {
    let mut writer = StateWriter::new();
    writer.begin_segment("Module").unwrap();
    writer.persist_u8("Only", &mut 1).unwrap();
    writer.end_segment().unwrap();
    writer.persist_u32("Next", &mut 0).unwrap();
    let bytes = writer.finish().unwrap();

    let mut reader = StateReader::new(&bytes);
    reader.begin_segment("Module").unwrap();
    let mut value = 0u32;
    assert!(matches!(
        reader.persist_u32("TooWide", &mut value),
        Err(SimError::SegmentOverrun { declared: 1, .. })
    ));
}

#[test]
fn segment_longer_than_the_stream_is_rejected() {
    let mut bytes = 100u32.to_le_bytes().to_vec();
    bytes.extend_from_slice(&[0; 4]);
    let mut reader = StateReader::new(&bytes);
    assert!(matches!(reader.begin_segment("Chunk"), Err(SimError::SegmentOverrun { .. })));
}

#[test]
fn strings_are_length_limited_and_ascii_checked() {
    let mut writer = StateWriter::new();
    let mut long = "x".repeat(256);
    assert!(matches!(writer.persist_ascii_string("Name", &mut long), Err(SimError::InvalidString { .. })));
    let mut accented = "é".to_string();
    assert!(matches!(writer.persist_ascii_string("Name", &mut accented), Err(SimError::InvalidString { .. })));

    let bytes = [2u8, b'o', 0xFF];
    let mut reader = StateReader::new(&bytes);
    let mut name = String::new();
    assert!(matches!(reader.persist_ascii_string("Name", &mut name), Err(SimError::InvalidString { .. })));
}

#[test]
fn sentinels_must_match() {
    let mut writer = StateWriter::new();
    writer.persist_i32("Marker", &mut 41).unwrap();
    let bytes = writer.finish().unwrap();
    let mut reader = StateReader::new(&bytes);
    assert!(matches!(reader.persist_sentinel_i32("Marker", 42), Err(SimError::CorruptState { .. })));
}

#[test]
fn json_dump_follows_the_same_call_sequence() {
    let mut squad = sample_squad();
    let mut json = JsonStateWriter::new();
    let p: &mut dyn StatePersister = &mut json;
    p.persist_object("Squad", &mut squad).unwrap();
    let tree = json.finish().unwrap();

    assert_eq!(tree["Squad"]["Version"], 2);
    assert_eq!(tree["Squad"]["Name"], "Alpha");
    assert_eq!(tree["Squad"]["Title"], "Überfall");
    assert_eq!(tree["Squad"]["Stance"], 1);
    assert_eq!(tree["Squad"]["Rally"]["Y"], -4.5);
    assert_eq!(tree["Squad"]["Veteran"], true);
}

#[test]
fn non_finite_health_is_corrupt() {
    for health in [f32::NAN, f32::INFINITY] {
        let mut body = ObjectBody { health: 0.0, max_health: 100.0, ..ObjectBody::default() };
        let mut bytes = write(&mut body);
        // Health sits right before MaxHealth, SupplyBoxes, ModelConditions,
        // Status and LastDamageFrame.
        let health_at = bytes.len() - (4 + 4 + 4 + 8 + 4 + 4);
        bytes[health_at..health_at + 4].copy_from_slice(&health.to_le_bytes());
        assert!(matches!(read::<ObjectBody>(&bytes), Err(SimError::CorruptState { .. })), "health {health}");
    }
}
