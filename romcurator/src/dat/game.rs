use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::Rom;

/// Two-letter language codes recognised in game names, e.g. `(En,Fr,De)`.
const KNOWN_LANGUAGES: &[&str] = &[
    "DA", "DE", "EL", "EN", "ES", "FI", "FR", "HR", "HU", "IT", "JA", "KO", "NL", "NO", "PL",
    "PT", "RU", "SV", "TR", "ZH",
];

/// A regional release of a game.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Release {
    pub name: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Release {
    pub fn new(name: impl Into<String>, region: impl Into<String>, language: Option<String>) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            language,
        }
    }
}

/// A game in a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub name: String,
    /// Name of the parent game, for clones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_of: Option<String>,
    #[serde(default)]
    pub releases: Vec<Release>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub roms: Vec<Rom>,
}

impl Game {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clone_of: None,
            releases: Vec::new(),
            categories: Vec::new(),
            roms: Vec::new(),
        }
    }

    pub fn with_rom(mut self, rom: Rom) -> Self {
        self.roms.push(rom);
        self
    }

    pub fn with_release(mut self, release: Release) -> Self {
        self.releases.push(release);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn with_clone_of(mut self, parent: impl Into<String>) -> Self {
        self.clone_of = Some(parent.into());
        self
    }

    pub fn is_clone(&self) -> bool {
        self.clone_of.is_some()
    }

    /// Upper-cased regions of the game's releases, first occurrence order.
    pub fn regions(&self) -> Vec<String> {
        unique(self.releases.iter().map(|release| release.region.to_uppercase()))
    }

    /// Languages of the game.
    ///
    /// Two-letter codes in the name (`Game (En,Fr)`) win; otherwise the
    /// releases' languages are used.
    pub fn languages(&self) -> Vec<String> {
        let from_name = languages_from_name(&self.name);
        if !from_name.is_empty() {
            return from_name;
        }
        unique(
            self.releases
                .iter()
                .filter_map(|release| release.language.as_ref())
                .map(|language| language.to_uppercase()),
        )
    }

    pub fn categories(&self) -> Vec<String> {
        unique(self.categories.iter().cloned())
    }
}

fn unique(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = Vec::new();
    for value in values {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}

fn languages_from_name(name: &str) -> Vec<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"\(([a-zA-Z]{2}(?:[,+][a-zA-Z]{2})*)\)").expect("valid language regex")
    });

    let Some(captures) = pattern.captures(name) else {
        return Vec::new();
    };
    unique(
        captures[1]
            .split([',', '+'])
            .map(str::to_uppercase)
            .filter(|code| KNOWN_LANGUAGES.contains(&code.as_str())),
    )
}

/// A game narrowed to at most one region, language and category.
///
/// The candidate generator writes one candidate per variant, so output path
/// templates can use `{region}` and friends unambiguously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleValueGame {
    game: Arc<Game>,
    source: Arc<Game>,
    region: Option<String>,
    language: Option<String>,
    category: Option<String>,
}

impl SingleValueGame {
    /// A variant without any narrowing.
    pub fn from_game(game: Arc<Game>) -> Self {
        Self {
            source: Arc::clone(&game),
            game,
            region: None,
            language: None,
            category: None,
        }
    }

    /// Every variant of `game`: regions × languages × categories.
    ///
    /// An axis with no values contributes a single unset value, so every game
    /// has at least one variant.
    pub fn expand(game: &Arc<Game>) -> Vec<Self> {
        fn axis(values: Vec<String>) -> Vec<Option<String>> {
            if values.is_empty() {
                vec![None]
            } else {
                values.into_iter().map(Some).collect()
            }
        }

        let regions = axis(game.regions());
        let languages = axis(game.languages());
        let categories = axis(game.categories());

        let mut variants = Vec::with_capacity(regions.len() * languages.len() * categories.len());
        for region in &regions {
            for language in &languages {
                for category in &categories {
                    variants.push(Self {
                        game: Arc::clone(game),
                        source: Arc::clone(game),
                        region: region.clone(),
                        language: language.clone(),
                        category: category.clone(),
                    });
                }
            }
        }
        variants
    }

    pub fn game(&self) -> &Arc<Game> {
        &self.game
    }

    pub fn name(&self) -> &str {
        &self.game.name
    }

    /// The catalog game this variant came from, unchanged by [`renamed`].
    ///
    /// [`renamed`]: SingleValueGame::renamed
    pub fn source(&self) -> &Arc<Game> {
        &self.source
    }

    pub fn roms(&self) -> &[Rom] {
        &self.game.roms
    }

    /// The narrowed region, or the game's first.
    pub fn region(&self) -> Option<String> {
        self.region.clone().or_else(|| self.game.regions().into_iter().next())
    }

    /// The narrowed language, or the game's first.
    pub fn language(&self) -> Option<String> {
        self.language
            .clone()
            .or_else(|| self.game.languages().into_iter().next())
    }

    /// The narrowed category, or the game's first.
    pub fn category(&self) -> Option<String> {
        self.category
            .clone()
            .or_else(|| self.game.categories().into_iter().next())
    }

    /// The release matching the narrowed region, or the game's first.
    pub fn release(&self) -> Option<&Release> {
        let releases = &self.game.releases;
        match &self.region {
            Some(region) => releases
                .iter()
                .find(|release| release.region.eq_ignore_ascii_case(region))
                .or_else(|| releases.first()),
            None => releases.first(),
        }
    }

    /// This variant with the game renamed and its ROMs replaced.
    ///
    /// Releases are renamed too, so output templates see the new name. The
    /// variant keeps its [`source`](SingleValueGame::source) game.
    pub fn renamed(&self, name: impl Into<String>, roms: Vec<Rom>) -> Self {
        let name = name.into();
        let releases = self
            .game
            .releases
            .iter()
            .map(|release| Release {
                name: name.clone(),
                ..release.clone()
            })
            .collect();

        let game = Game {
            name,
            clone_of: self.game.clone_of.clone(),
            releases,
            categories: self.game.categories.clone(),
            roms,
        };

        Self {
            game: Arc::new(game),
            ..self.clone()
        }
    }
}
