//! Teams group objects under an owning player for scripts and AI.

use crate::{
    error::{SimError, SimResult},
    persist::{Persistable, StatePersister},
    types::{ObjectId, PlayerIndex},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Team {
    pub id:      u32,
    pub name:    String,
    pub owner:   PlayerIndex,
    pub members: Vec<ObjectId>,
}

impl Persistable for Team {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_u32("Id", &mut self.id)?;
        p.persist_ascii_string("Name", &mut self.name)?;
        p.persist_u32("Owner", &mut self.owner)?;
        p.persist_list_u16("Members", &mut self.members, |p, id| p.persist_object_id("Member", id))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamFactory {
    next_team_id: u32,
    teams:        Vec<Team>,
}

impl Default for TeamFactory {
    fn default() -> Self {
        Self { next_team_id: 1, teams: Vec::new() }
    }
}

impl TeamFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_team(&mut self, name: &str, owner: PlayerIndex) -> u32 {
        let id = self.next_team_id;
        self.next_team_id += 1;
        self.teams.push(Team { id, name: name.to_string(), owner, members: Vec::new() });
        id
    }

    pub fn team(&self, id: u32) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == id)
    }

    pub fn team_mut(&mut self, id: u32) -> Option<&mut Team> {
        self.teams.iter_mut().find(|t| t.id == id)
    }

    pub fn add_member(&mut self, id: u32, member: ObjectId) -> bool {
        match self.team_mut(id) {
            Some(team) if !team.members.contains(&member) => {
                team.members.push(member);
                true
            }
            _ => false,
        }
    }

    /// Drops a removed object from every team it belonged to.
    pub fn remove_member(&mut self, member: ObjectId) {
        for team in &mut self.teams {
            team.members.retain(|&m| m != member);
        }
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }
}

impl Persistable for TeamFactory {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_u32("NextTeamId", &mut self.next_team_id)?;
        p.persist_list_u16("Teams", &mut self.teams, |p, team| p.persist_object("Team", team))?;
        if p.is_reading() {
            if let Some(team) = self.teams.iter().find(|t| t.id == 0 || t.id >= self.next_team_id) {
                return Err(SimError::corrupt(
                    "Teams",
                    format!("team id {} outside 1..{}", team.id, self.next_team_id),
                ));
            }
        }
        Ok(())
    }
}
