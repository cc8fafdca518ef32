//! Capability table mapping each [`EntityKind`] to its [`Behavior`] and, for
//! crafters, its [`Recipe`].
//!
//! Built in two phases: registration on a [`RegistryBuilder`], then `build()`
//! freezes it into an immutable [`Registry`] that the simulation owns.

use crate::behavior::{BeltBehavior, CrafterBehavior, InserterBehavior, MinerBehavior};
use crate::config::SimConfig;
use crate::fixed::Millis;
use crate::kind::{Entity, EntityKind, EntityState, Item};
use crate::sim::TickContext;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Behavior trait
// ---------------------------------------------------------------------------

/// Per-kind lifecycle hooks.
///
/// `create` produces the initial state for a freshly placed entity. `update`
/// runs exactly once per tick for every live entity of the kind, in ascending
/// id order. Movement between tiles only happens through
/// [`TickContext::request_transfer`]; the request is resolved after every
/// entity has updated.
pub trait Behavior: std::fmt::Debug + Send + Sync {
    fn create(&self) -> EntityState;

    fn update(&self, entity: &mut Entity, dt_ms: Millis, ctx: &mut TickContext<'_>);
}

// ---------------------------------------------------------------------------
// Recipes
// ---------------------------------------------------------------------------

/// What a crafter consumes and produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub inputs: Vec<(Item, u32)>,
    pub output: Item,
    pub duration_ms: Millis,
}

impl Recipe {
    pub fn new(inputs: Vec<(Item, u32)>, output: Item, duration_ms: Millis) -> Self {
        Self {
            inputs,
            output,
            duration_ms,
        }
    }

    fn required(&self, item: Item) -> u32 {
        self.inputs
            .iter()
            .filter(|(i, _)| *i == item)
            .map(|(_, n)| *n)
            .sum()
    }

    /// Whether a buffer holding `held` still has room for one more `item`.
    pub fn wants(&self, item: Item, held: &[Item]) -> bool {
        let have = held.iter().filter(|&&i| i == item).count() as u32;
        have < self.required(item)
    }

    /// Whether `held` covers every input.
    pub fn is_satisfied(&self, held: &[Item]) -> bool {
        self.inputs
            .iter()
            .all(|&(item, n)| held.iter().filter(|&&i| i == item).count() as u32 >= n)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{0} does not run recipes")]
    NotACrafter(EntityKind),
    #[error("crafter kind {0} is registered without a recipe")]
    MissingRecipe(EntityKind),
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Mutable registration phase.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    behaviors: BTreeMap<EntityKind, Box<dyn Behavior>>,
    recipes: BTreeMap<EntityKind, Recipe>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder pre-loaded with the stock behaviors and recipes.
    pub fn with_defaults(config: &SimConfig) -> Self {
        let mut b = Self::new();
        b.register(
            EntityKind::Miner,
            Box::new(MinerBehavior {
                interval_ms: config.miner_interval_ms,
                deplete: config.deplete_on_extract,
            }),
        );
        b.register(EntityKind::Belt, Box::new(BeltBehavior));
        b.register(
            EntityKind::Inserter,
            Box::new(InserterBehavior {
                swing_ms: config.inserter_swing_ms,
            }),
        );
        b.register(EntityKind::Furnace, Box::new(CrafterBehavior));
        b.register(EntityKind::Assembler, Box::new(CrafterBehavior));
        b.recipes.insert(
            EntityKind::Furnace,
            Recipe::new(vec![(Item::IronOre, 1)], Item::IronPlate, config.furnace_ms),
        );
        b.recipes.insert(
            EntityKind::Assembler,
            Recipe::new(vec![(Item::IronPlate, 2)], Item::Gear, config.assembler_ms),
        );
        b
    }

    /// Register a behavior for `kind`. The first registration wins; later
    /// ones are ignored. Returns whether this call registered anything.
    pub fn register(&mut self, kind: EntityKind, behavior: Box<dyn Behavior>) -> bool {
        if self.behaviors.contains_key(&kind) {
            log::debug!("behavior for {kind} already registered, ignoring {behavior:?}");
            return false;
        }
        log::debug!("registered behavior for {kind}");
        self.behaviors.insert(kind, behavior);
        true
    }

    /// Set the recipe a crafter kind runs. Replaces any earlier recipe.
    pub fn set_recipe(&mut self, kind: EntityKind, recipe: Recipe) -> Result<(), RegistryError> {
        if !kind.is_crafter() {
            return Err(RegistryError::NotACrafter(kind));
        }
        self.recipes.insert(kind, recipe);
        Ok(())
    }

    pub fn is_registered(&self, kind: EntityKind) -> bool {
        self.behaviors.contains_key(&kind)
    }

    /// Freeze the table. Every registered crafter needs a recipe.
    pub fn build(self) -> Result<Registry, RegistryError> {
        for &kind in self.behaviors.keys() {
            if kind.is_crafter() && !self.recipes.contains_key(&kind) {
                return Err(RegistryError::MissingRecipe(kind));
            }
        }
        Ok(self.freeze())
    }

    fn freeze(self) -> Registry {
        Registry {
            behaviors: self.behaviors,
            recipes: self.recipes,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Immutable capability table. Thread-safe to share.
#[derive(Debug)]
pub struct Registry {
    behaviors: BTreeMap<EntityKind, Box<dyn Behavior>>,
    recipes: BTreeMap<EntityKind, Recipe>,
}

impl Registry {
    /// The stock table: all five kinds and both default recipes.
    pub fn with_defaults(config: &SimConfig) -> Self {
        RegistryBuilder::with_defaults(config).freeze()
    }

    pub fn behavior(&self, kind: EntityKind) -> Option<&dyn Behavior> {
        self.behaviors.get(&kind).map(|b| b.as_ref())
    }

    pub fn recipe(&self, kind: EntityKind) -> Option<&Recipe> {
        self.recipes.get(&kind)
    }

    pub fn is_registered(&self, kind: EntityKind) -> bool {
        self.behaviors.contains_key(&kind)
    }

    /// Registered kinds, in declaration order.
    pub fn kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.behaviors.keys().copied()
    }
}
