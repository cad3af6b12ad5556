//! Logic-side roots: the object table, players, terrain, teams and the
//! spatial partition, plus the `World` view modules see during a frame.

pub mod game_logic;
pub mod partition;
pub mod player;
pub mod team;
pub mod terrain;
pub mod world;

pub use game_logic::{GameLogic, ObjectTable};
pub use partition::PartitionManager;
pub use player::{BankAccount, Player, PlayerManager, SupplyManager};
pub use team::{Team, TeamFactory};
pub use terrain::TerrainLogic;
pub use world::World;
