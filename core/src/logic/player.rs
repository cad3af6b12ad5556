//! Players, their money and their supply registries.
//!
//! RULES:
//!   - Money only moves through BankAccount.
//!   - Supply registries are derived state: they are rebuilt from the
//!     object table after a load and never persisted.

use crate::{
    error::{SimError, SimResult},
    persist::{Persistable, StatePersister},
    types::{ObjectId, PlayerIndex},
};
use std::collections::BTreeSet;

/// Side of players that never fight anyone.
pub const NEUTRAL_SIDE: &str = "Civilian";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BankAccount {
    money: u32,
}

impl BankAccount {
    pub fn with_balance(money: u32) -> Self {
        Self { money }
    }

    pub fn balance(&self) -> u32 {
        self.money
    }

    pub fn deposit(&mut self, amount: u32) {
        self.money = self.money.saturating_add(amount);
    }

    /// Returns false, leaving the balance untouched, when funds are short.
    pub fn withdraw(&mut self, amount: u32) -> bool {
        match self.money.checked_sub(amount) {
            Some(rest) => {
                self.money = rest;
                true
            }
            None => false,
        }
    }
}

impl Persistable for BankAccount {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_u32("Money", &mut self.money)
    }
}

/// Docks a player's gatherers may use. Ordered sets keep searches
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupplyManager {
    warehouses: BTreeSet<ObjectId>,
    centers:    BTreeSet<ObjectId>,
}

impl SupplyManager {
    pub fn register_warehouse(&mut self, id: ObjectId) {
        self.warehouses.insert(id);
    }

    pub fn unregister_warehouse(&mut self, id: ObjectId) {
        self.warehouses.remove(&id);
    }

    pub fn register_center(&mut self, id: ObjectId) {
        self.centers.insert(id);
    }

    pub fn unregister_center(&mut self, id: ObjectId) {
        self.centers.remove(&id);
    }

    pub fn warehouses(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.warehouses.iter().copied()
    }

    pub fn centers(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.centers.iter().copied()
    }

    pub fn clear(&mut self) {
        self.warehouses.clear();
        self.centers.clear();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Player {
    pub index:                   PlayerIndex,
    pub name:                    String,
    pub side:                    String,
    pub bank:                    BankAccount,
    pub science_purchase_points: u32,
    /// Extra money per delivered box, on top of the supply center's value.
    pub supply_bonus:            u32,
    pub upgrades:                Vec<String>,
    pub supply_manager:          SupplyManager,
}

impl Player {
    pub fn is_neutral(&self) -> bool {
        self.side == NEUTRAL_SIDE
    }

    pub fn has_upgrade(&self, upgrade: &str) -> bool {
        self.upgrades.iter().any(|u| u == upgrade)
    }

    /// Returns false if the player already owned the upgrade.
    pub fn add_upgrade(&mut self, upgrade: &str) -> bool {
        if self.has_upgrade(upgrade) {
            return false;
        }
        self.upgrades.push(upgrade.to_string());
        true
    }
}

impl Persistable for Player {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_unicode_string("Name", &mut self.name)?;
        p.persist_ascii_string("Side", &mut self.side)?;
        p.persist_object("BankAccount", &mut self.bank)?;
        p.persist_u32("SciencePurchasePoints", &mut self.science_purchase_points)?;
        p.persist_u32("SupplyBonus", &mut self.supply_bonus)?;
        p.persist_list_u16("Upgrades", &mut self.upgrades, |p, upgrade| p.persist_ascii_string("Upgrade", upgrade))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerManager {
    players:    Vec<Player>,
    /// Shared warehouses, seeded into players added after the warehouse.
    warehouses: BTreeSet<ObjectId>,
}

impl PlayerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_player(&mut self, name: &str, side: &str, money: u32) -> PlayerIndex {
        let index = self.players.len() as PlayerIndex;
        let mut supply_manager = SupplyManager::default();
        for &id in &self.warehouses {
            supply_manager.register_warehouse(id);
        }
        self.players.push(Player {
            index,
            name: name.to_string(),
            side: side.to_string(),
            bank: BankAccount::with_balance(money),
            supply_manager,
            ..Player::default()
        });
        index
    }

    pub fn get(&self, index: PlayerIndex) -> SimResult<&Player> {
        self.players.get(index as usize).ok_or(SimError::PlayerNotFound { index })
    }

    pub fn get_mut(&mut self, index: PlayerIndex) -> SimResult<&mut Player> {
        self.players.get_mut(index as usize).ok_or(SimError::PlayerNotFound { index })
    }

    /// Unknown indices are treated as hostile, not neutral.
    pub fn is_neutral(&self, index: PlayerIndex) -> bool {
        self.players.get(index as usize).is_some_and(Player::is_neutral)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    /// Warehouses are shared: every player's gatherers may use them.
    pub fn register_warehouse(&mut self, id: ObjectId) {
        self.warehouses.insert(id);
        for player in &mut self.players {
            player.supply_manager.register_warehouse(id);
        }
    }

    pub fn unregister_warehouse(&mut self, id: ObjectId) {
        self.warehouses.remove(&id);
        for player in &mut self.players {
            player.supply_manager.unregister_warehouse(id);
        }
    }

    pub fn clear_supply_registries(&mut self) {
        self.warehouses.clear();
        for player in &mut self.players {
            player.supply_manager.clear();
        }
    }
}

impl Persistable for PlayerManager {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_list_u32("Players", &mut self.players, |p, player| p.persist_object("Player", player))?;
        if p.is_reading() {
            for (index, player) in self.players.iter_mut().enumerate() {
                player.index = index as PlayerIndex;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn withdraw_refuses_overdraft() {
        let mut account = BankAccount::with_balance(50);
        assert!(!account.withdraw(60));
        assert_eq!(account.balance(), 50);
        assert!(account.withdraw(50));
        assert_eq!(account.balance(), 0);
    }

    #[test]
    fn warehouses_are_registered_for_every_player() {
        let mut players = PlayerManager::new();
        players.add_player("USA", "America", 0);
        players.add_player("GLA", "GLA", 0);
        players.register_warehouse(ObjectId(9));
        for player in players.iter() {
            assert_eq!(player.supply_manager.warehouses().collect::<Vec<_>>(), vec![ObjectId(9)]);
        }
    }

    #[test]
    fn late_players_see_existing_warehouses() {
        let mut players = PlayerManager::new();
        players.register_warehouse(ObjectId(4));
        let first = players.add_player("USA", "America", 0);
        players.register_warehouse(ObjectId(9));
        let second = players.add_player("GLA", "GLA", 0);
        players.unregister_warehouse(ObjectId(4));
        let third = players.add_player("China", "China", 0);
        for index in [first, second, third] {
            let warehouses: Vec<_> = players.get(index).unwrap().supply_manager.warehouses().collect();
            assert_eq!(warehouses, vec![ObjectId(9)], "player {index}");
        }
    }
}
