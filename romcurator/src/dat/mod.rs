//! Catalog model.
//!
//! A [`Dat`] lists the games a collection should contain. Games that are
//! clones of another game are grouped with it into a [`Parent`].
//!
//! Catalogs are loaded from JSON:
//!
//! ```json
//! {
//!   "name": "Console",
//!   "games": [
//!     { "name": "Foo (USA)", "releases": [{ "name": "Foo", "region": "USA" }],
//!       "roms": [{ "name": "foo.rom", "size": 4, "crc32": "aabbccdd" }] },
//!     { "name": "Foo (Japan)", "clone_of": "Foo (USA)", "roms": [] }
//!   ]
//! }
//! ```

mod game;
mod rom;

pub use game::{Game, Release, SingleValueGame};
pub use rom::Rom;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

/// Errors loading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// A game and its clones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parent {
    name: String,
    games: Vec<Arc<Game>>,
}

impl Parent {
    pub fn new(name: impl Into<String>, games: Vec<Arc<Game>>) -> Self {
        Self {
            name: name.into(),
            games,
        }
    }

    /// Name of the parent game.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn games(&self) -> &[Arc<Game>] {
        &self.games
    }
}

/// A catalog of games.
#[derive(Debug, Clone)]
pub struct Dat {
    name: String,
    games: Vec<Arc<Game>>,
    parents: Vec<Parent>,
}

#[derive(Deserialize)]
struct DatDocument {
    name: String,
    #[serde(default)]
    games: Vec<Game>,
}

impl Dat {
    pub fn new(name: impl Into<String>, games: Vec<Game>) -> Self {
        let games: Vec<Arc<Game>> = games.into_iter().map(Arc::new).collect();
        let parents = group_parents(&games);
        Self {
            name: name.into(),
            games,
            parents,
        }
    }

    /// Parses a JSON catalog.
    pub fn from_json_str(json: &str) -> CatalogResult<Self> {
        let document: DatDocument = serde_json::from_str(json)?;
        let games = document
            .games
            .into_iter()
            .map(|mut game| {
                game.roms.iter_mut().for_each(Rom::normalize);
                game
            })
            .collect();
        Ok(Self::new(document.name, games))
    }

    /// Reads and parses a JSON catalog file.
    pub fn load(path: &Path) -> CatalogResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dat = Self::from_json_str(&json)?;
        tracing::info!(
            dat = %dat.name,
            games = dat.games.len(),
            parents = dat.parents.len(),
            "Loaded catalog"
        );
        Ok(dat)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn games(&self) -> &[Arc<Game>] {
        &self.games
    }

    /// Parent groups in catalog order.
    pub fn parents(&self) -> &[Parent] {
        &self.parents
    }
}

/// Groups clones under their parent. A clone whose parent is missing from
/// the catalog becomes a parent of its own.
///
/// Clones of clones join the group at the top of their `clone_of` chain,
/// wherever the games appear in the catalog.
fn group_parents(games: &[Arc<Game>]) -> Vec<Parent> {
    let by_name: HashMap<&str, &Game> = games
        .iter()
        .map(|game| (game.name.as_str(), game.as_ref()))
        .collect();
    let roots: Vec<&str> = games.iter().map(|game| root_of(game, &by_name)).collect();

    let mut parents: Vec<Parent> = Vec::new();
    let mut parent_index: HashMap<&str, usize> = HashMap::new();

    for (game, &root) in games.iter().zip(&roots) {
        if root == game.name {
            parent_index.insert(root, parents.len());
            parents.push(Parent::new(game.name.clone(), vec![Arc::clone(game)]));
        }
    }

    for (game, &root) in games.iter().zip(&roots) {
        if root != game.name {
            match parent_index.get(root) {
                Some(&index) => parents[index].games.push(Arc::clone(game)),
                None => {
                    parent_index.insert(game.name.as_str(), parents.len());
                    parents.push(Parent::new(game.name.clone(), vec![Arc::clone(game)]));
                }
            }
        }
    }

    parents
}

/// Follows `clone_of` links to the top of the chain. A missing parent or a
/// cycle ends the walk.
fn root_of<'a>(game: &'a Game, by_name: &HashMap<&str, &'a Game>) -> &'a str {
    let mut current = game;
    let mut visited = HashSet::new();
    while visited.insert(current.name.as_str()) {
        match current.clone_of.as_deref().and_then(|parent| by_name.get(parent)) {
            Some(&parent) => current = parent,
            None => break,
        }
    }
    current.name.as_str()
}
