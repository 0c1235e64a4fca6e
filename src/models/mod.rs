//! Domain payloads cached per game.

pub mod aoc;
pub mod ror;
pub mod starcitizen;

pub use aoc::{Ingredient, Item, Mob, MobDrop, Recipe};
pub use ror::ServerStatus;
pub use starcitizen::{Commodity, Vehicle};
