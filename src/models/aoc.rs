//! Ashes of Creation codex entities.

use serde::{Deserialize, Serialize};

use crate::cache::{Cacheable, EntityKind, Link, Relation};

/// Gameplay tag marking items that are crafting recipes/components.
pub const CRAFTING_TAG: &str = "Artisanship.Crafting";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub guid: String,
    pub name: String,
    /// Designer-facing name, e.g. `"Weapon_Sword_Iron_T1"`.
    pub internal_name: Option<String>,
    pub gameplay_tags: Vec<String>,
    pub rarity: Option<String>,
}

impl Item {
    pub fn is_crafting(&self) -> bool {
        self.gameplay_tags.iter().any(|t| t == CRAFTING_TAG)
    }
}

impl Cacheable for Item {
    const KIND: EntityKind = EntityKind::Item;

    fn key(&self) -> String {
        self.guid.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub item_guid: String,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub guid: String,
    pub name: String,
    pub output_item_guid: Option<String>,
    pub ingredients: Vec<Ingredient>,
}

impl Cacheable for Recipe {
    const KIND: EntityKind = EntityKind::Recipe;

    fn key(&self) -> String {
        self.guid.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn links(&self) -> Vec<Link> {
        let output = self.output_item_guid.iter().map(|g| Link::output(g.as_str()));
        let ingredients = self
            .ingredients
            .iter()
            .map(|i| Link::ingredient(&i.item_guid, i.quantity));
        output.chain(ingredients).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobDrop {
    pub guid: String,
    /// Fraction in `0.0..=1.0`, when the codex publishes one.
    pub drop_rate: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mob {
    pub guid: String,
    pub name: String,
    pub level: Option<i32>,
    pub item_drops: Vec<MobDrop>,
    pub recipe_drops: Vec<MobDrop>,
}

impl Cacheable for Mob {
    const KIND: EntityKind = EntityKind::Mob;

    fn key(&self) -> String {
        self.guid.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn links(&self) -> Vec<Link> {
        let items = self
            .item_drops
            .iter()
            .map(|d| Link::drop(Relation::ItemDrop, &d.guid, d.drop_rate));
        let recipes = self
            .recipe_drops
            .iter()
            .map(|d| Link::drop(Relation::RecipeDrop, &d.guid, d.drop_rate));
        items.chain(recipes).collect()
    }
}
