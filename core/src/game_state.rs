//! Session-level roots: save metadata, campaign progress and the map the
//! session was started from.

use crate::{
    clock::LogicFrame,
    error::{SimError, SimResult},
    persist::{PersistEnum, Persistable, StatePersister},
};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SaveGameType {
    #[default]
    Skirmish,
    SinglePlayer,
}

impl PersistEnum for SaveGameType {
    fn to_raw(self) -> u32 {
        self as u32
    }

    fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Skirmish),
            1 => Some(Self::SinglePlayer),
            _ => None,
        }
    }
}

/// Wall-clock save time in the SYSTEMTIME layout: eight u16 fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveDate {
    pub year:         u16,
    pub month:        u16,
    pub day_of_week:  u16,
    pub day:          u16,
    pub hour:         u16,
    pub minute:       u16,
    pub second:       u16,
    pub milliseconds: u16,
}

impl SaveDate {
    pub fn from_datetime(time: &DateTime<Utc>) -> Self {
        Self {
            year:         u16::try_from(time.year()).unwrap_or(0),
            month:        time.month() as u16,
            day_of_week:  time.weekday().num_days_from_sunday() as u16,
            day:          time.day() as u16,
            hour:         time.hour() as u16,
            minute:       time.minute() as u16,
            second:       time.second() as u16,
            milliseconds: (time.timestamp_subsec_millis().min(999)) as u16,
        }
    }

    pub fn now() -> Self {
        Self::from_datetime(&Utc::now())
    }

    /// None for the all-zero date of a save that never went through a store.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(i32::from(self.year), u32::from(self.month), u32::from(self.day))?
            .and_hms_milli_opt(
                u32::from(self.hour),
                u32::from(self.minute),
                u32::from(self.second),
                u32::from(self.milliseconds),
            )
    }
}

impl Persistable for SaveDate {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_u16("Year", &mut self.year)?;
        p.persist_u16("Month", &mut self.month)?;
        p.persist_u16("DayOfWeek", &mut self.day_of_week)?;
        p.persist_u16("Day", &mut self.day)?;
        p.persist_u16("Hour", &mut self.hour)?;
        p.persist_u16("Minute", &mut self.minute)?;
        p.persist_u16("Second", &mut self.second)?;
        p.persist_u16("Milliseconds", &mut self.milliseconds)?;
        if p.is_reading() && (self.month > 12 || self.day_of_week > 6 || self.day > 31) {
            return Err(SimError::corrupt("Date", format!("{self:?}")));
        }
        Ok(())
    }
}

/// What a save browser shows, plus the logic frame the save was taken at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameState {
    pub save_type:      SaveGameType,
    pub map_path:       String,
    pub date:           SaveDate,
    pub description:    String,
    pub mission_name:   String,
    pub campaign_side:  String,
    pub mission_number: u32,
    pub frame:          LogicFrame,
}

impl Persistable for GameState {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_enum("SaveGameType", &mut self.save_type)?;
        p.persist_ascii_string("MapPath", &mut self.map_path)?;
        p.persist_object("Date", &mut self.date)?;
        p.persist_unicode_string("Description", &mut self.description)?;
        p.persist_ascii_string("MissionName", &mut self.mission_name)?;
        p.persist_ascii_string("CampaignSide", &mut self.campaign_side)?;
        p.persist_u32("MissionNumber", &mut self.mission_number)?;
        p.persist_frame("LogicFrame", &mut self.frame)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
}

impl PersistEnum for Difficulty {
    fn to_raw(self) -> u32 {
        self as u32
    }

    fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Easy),
            1 => Some(Self::Normal),
            2 => Some(Self::Hard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CampaignManager {
    pub campaign_name: String,
    pub mission_name:  String,
    pub difficulty:    Difficulty,
    pub rank_points:   u32,
    pub is_in_progress: bool,
}

impl Persistable for CampaignManager {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_ascii_string("CampaignName", &mut self.campaign_name)?;
        p.persist_ascii_string("MissionName", &mut self.mission_name)?;
        p.persist_enum("Difficulty", &mut self.difficulty)?;
        p.persist_u32("RankPoints", &mut self.rank_points)?;
        p.persist_bool("IsInProgress", &mut self.is_in_progress)
    }
}

/// The map a session runs on. Map contents are owned by the asset layer;
/// only their path and size are recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameStateMap {
    pub map_path:          String,
    pub pristine_map_path: String,
    pub embedded_map_size: u32,
}

impl Persistable for GameStateMap {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_ascii_string("MapPath", &mut self.map_path)?;
        p.persist_ascii_string("PristineMapPath", &mut self.pristine_map_path)?;
        p.persist_u32("EmbeddedMapSize", &mut self.embedded_map_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn save_date_matches_calendar_fields() {
        let time = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 30).unwrap();
        let date = SaveDate::from_datetime(&time);
        assert_eq!((date.year, date.month, date.day), (2024, 3, 9));
        assert_eq!(date.day_of_week, 6, "2024-03-09 was a Saturday");
        assert_eq!(date.to_naive(), Some(time.naive_utc()));
    }

    #[test]
    fn zero_date_has_no_calendar_value() {
        assert_eq!(SaveDate::default().to_naive(), None);
    }
}
