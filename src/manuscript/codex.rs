//! # Codex
//!
//! The characters, places, items and lore of a project, kept in `codex.json`
//! beside the manifest. The codex can be scanned against a text to find the
//! entities that are mentioned in it.
use displaydoc::Display;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// ID of a codex entity
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// What a codex entity describes
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// character
    Character,
    /// location
    Location,
    /// item
    Item,
    /// lore
    Lore,
}

impl EntityKind {
    /// The highlight color of new entities of this kind
    pub fn color(self) -> &'static str {
        match self {
            Self::Character => "#3b82f6",
            Self::Location => "#10b981",
            Self::Item => "#f59e0b",
            Self::Lore => "#8b5cf6",
        }
    }
}

/// Unknown entity kind {0:?}
#[derive(Debug, Error, Display)]
pub struct UnknownEntityKind(String);

impl FromStr for EntityKind {
    type Err = UnknownEntityKind;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "character" => Ok(Self::Character),
            "location" => Ok(Self::Location),
            "item" => Ok(Self::Item),
            "lore" => Ok(Self::Lore),
            _ => Err(UnknownEntityKind(s.to_owned())),
        }
    }
}

/// An entry in the codex
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
}

/// A partial change to an entity, `None` keeps the current value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityUpdate {
    pub name: Option<String>,
    pub kind: Option<EntityKind>,
    pub description: Option<String>,
    pub color: Option<String>,
}

/// The codex of a project, `codex.json`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Codex {
    #[serde(default)]
    entities: Vec<Entity>,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whether `name` occurs in `haystack` as a whole word, both already lowercase
fn mentions(haystack: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    haystack.match_indices(name).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + name.len()..].chars().next();
        !before.map_or(false, is_word_char) && !after.map_or(false, is_word_char)
    })
}

impl Codex {
    /// Add an entity, colored by its kind
    pub fn add(&mut self, name: &str, kind: EntityKind, description: &str) -> &Entity {
        self.entities.push(Entity {
            id: EntityId::random(),
            name: name.trim().to_owned(),
            kind,
            description: description.to_owned(),
            color: kind.color().to_owned(),
        });
        let index = self.entities.len() - 1;
        &self.entities[index]
    }

    /// Change an entity, returns false if it does not exist
    ///
    /// A new kind without an explicit color also takes the color of that kind.
    pub fn update(&mut self, id: EntityId, update: EntityUpdate) -> bool {
        let entity = match self.entities.iter_mut().find(|e| e.id == id) {
            Some(entity) => entity,
            None => return false,
        };
        if let Some(name) = update.name {
            entity.name = name.trim().to_owned();
        }
        if let Some(description) = update.description {
            entity.description = description;
        }
        match (update.kind, update.color) {
            (kind, Some(color)) => {
                entity.kind = kind.unwrap_or(entity.kind);
                entity.color = color;
            }
            (Some(kind), None) => {
                entity.kind = kind;
                entity.color = kind.color().to_owned();
            }
            (None, None) => {}
        }
        true
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let index = self.entities.iter().position(|e| e.id == id)?;
        Some(self.entities.remove(index))
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// All entities, in the order they were added
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// The entities whose name occurs in `text` as a whole word, ignoring case
    pub fn scan(&self, text: &str) -> Vec<&Entity> {
        let haystack = text.to_lowercase();
        self.entities
            .iter()
            .filter(|e| mentions(&haystack, &e.name.to_lowercase()))
            .collect()
    }
}
