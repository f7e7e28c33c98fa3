//! Output path computation.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::dat::{Dat, Rom, SingleValueGame};
use crate::file::DiscoveredFile;

/// Errors computing an output path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OutputPathError {
    #[error("Unknown output path token {{{0}}}")]
    UnknownToken(String),

    #[error("Game '{game}' has no value for output path token {{{token}}}")]
    MissingValue { token: String, game: String },

    #[error("Unterminated token in output path template: {0}")]
    Unterminated(String),

    #[error("Invalid game subdirectory mode: {0}")]
    InvalidGameSubdir(String),

    #[error("ROM name '{0}' leaves the output directory")]
    EscapingRomName(String),
}

pub type OutputPathResult<T> = Result<T, OutputPathError>;

/// Decides where a ROM is written.
pub trait OutputPathFormatter: Send + Sync {
    /// The output path of `rom` of `game`, satisfied by `input`.
    fn format(
        &self,
        dat: &Dat,
        game: &SingleValueGame,
        rom: &Rom,
        input: &DiscoveredFile,
    ) -> OutputPathResult<PathBuf>;
}

/// When ROMs are nested in a directory named after their game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameSubdir {
    Never,
    /// Only for games with more than one ROM.
    #[default]
    Multiple,
    Always,
}

impl FromStr for GameSubdir {
    type Err = OutputPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "never" => Ok(Self::Never),
            "multiple" => Ok(Self::Multiple),
            "always" => Ok(Self::Always),
            _ => Err(OutputPathError::InvalidGameSubdir(s.to_string())),
        }
    }
}

impl fmt::Display for GameSubdir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Never => "never",
            Self::Multiple => "multiple",
            Self::Always => "always",
        };
        f.write_str(name)
    }
}

/// Output directory template with `{dat}`, `{game}`, `{region}`,
/// `{language}` and `{category}` tokens.
///
/// ```ignore
/// let formatter = TemplateOutputFormatter::new("out/{region}").with_game_subdir(GameSubdir::Always);
/// // "Foo (USA)" / foo.rom → out/USA/Foo (USA)/foo.rom
/// ```
#[derive(Debug, Clone)]
pub struct TemplateOutputFormatter {
    template: String,
    game_subdir: GameSubdir,
}

impl TemplateOutputFormatter {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            game_subdir: GameSubdir::default(),
        }
    }

    pub fn with_game_subdir(mut self, game_subdir: GameSubdir) -> Self {
        self.game_subdir = game_subdir;
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    fn render(&self, dat: &Dat, game: &SingleValueGame) -> OutputPathResult<String> {
        let mut rendered = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| OutputPathError::Unterminated(self.template.clone()))?;
            let token = &after[..close];

            let value = match token {
                "dat" => Some(dat.name().to_string()),
                "game" => Some(game.name().to_string()),
                "region" => game.region(),
                "language" => game.language(),
                "category" => game.category(),
                other => return Err(OutputPathError::UnknownToken(other.to_string())),
            };
            let value = value.ok_or_else(|| OutputPathError::MissingValue {
                token: token.to_string(),
                game: game.name().to_string(),
            })?;

            rendered.push_str(&sanitize_segment(&value));
            rest = &after[close + 1..];
        }
        rendered.push_str(rest);

        Ok(rendered)
    }
}

impl OutputPathFormatter for TemplateOutputFormatter {
    fn format(
        &self,
        dat: &Dat,
        game: &SingleValueGame,
        rom: &Rom,
        _input: &DiscoveredFile,
    ) -> OutputPathResult<PathBuf> {
        let mut path = PathBuf::from(self.render(dat, game)?);

        let nest = match self.game_subdir {
            GameSubdir::Never => false,
            GameSubdir::Multiple => game.roms().len() > 1,
            GameSubdir::Always => true,
        };
        if nest {
            path.push(sanitize_segment(game.name()));
        }

        for segment in rom.name.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => return Err(OutputPathError::EscapingRomName(rom.name.clone())),
                segment => path.push(segment),
            }
        }

        Ok(path)
    }
}

/// Keeps token values from introducing or leaving directory levels.
fn sanitize_segment(value: &str) -> String {
    let value = value.replace(['/', '\\'], "_");
    if value == "." || value == ".." {
        value.replace('.', "_")
    } else {
        value
    }
}
