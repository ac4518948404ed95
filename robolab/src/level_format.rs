use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::LoadError;
use crate::level::Level;

const BUILTIN_LEVELS: &str = include_str!("../levels/builtin.toml");

/// A TOML document holding `[[level]]` tables.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LevelPack {
    #[serde(default, rename = "level")]
    pub levels: Vec<Level>,
}

impl LevelPack {
    /// The six levels that ship with the crate.
    pub fn builtin() -> Result<Self, LoadError> {
        Self::from_toml_str(BUILTIN_LEVELS)
    }

    /// Load a level pack from a TOML file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|err| err.with_path(path))
    }

    /// Save this pack to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), LoadError> {
        let text =
            toml::to_string_pretty(self).map_err(|err| LoadError::Serialize(err.to_string()))?;
        std::fs::write(path, text).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, LoadError> {
        let pack: Self = toml::from_str(text).map_err(LoadError::parse)?;
        pack.validate()?;
        Ok(pack)
    }

    fn validate(&self) -> Result<(), LoadError> {
        let mut seen = BTreeSet::new();
        for level in &self.levels {
            if !seen.insert(level.id) {
                return Err(LoadError::Invalid(format!("duplicate level id {}", level.id)));
            }
            if !(1..=6).contains(&level.difficulty) {
                return Err(LoadError::Invalid(format!(
                    "level {} has difficulty {}, expected 1 to 6",
                    level.id, level.difficulty
                )));
            }
            if let Some(bad) = level
                .obstacles
                .iter()
                .find(|obstacle| obstacle.width <= 0.0 || obstacle.height <= 0.0)
            {
                return Err(LoadError::Invalid(format!(
                    "level {} has an empty obstacle at ({}, {})",
                    level.id, bad.x, bad.y
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::ObjectiveKind;

    #[test]
    fn builtin_pack_parses() {
        let pack = LevelPack::builtin().unwrap();
        let ids: Vec<u32> = pack.levels.iter().map(|level| level.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);

        let first = &pack.levels[0];
        assert_eq!(first.name, "First Steps");
        assert_eq!(first.start, [0.0, 0.0]);
        assert_eq!(
            first.objectives[0].kind,
            ObjectiveKind::ReachTarget {
                target: [5.0, 5.0],
                tolerance: 1.0
            }
        );

        let speed = &pack.levels[5];
        assert_eq!(speed.time_limit, Some(60.0));
        assert!(
            speed
                .objectives
                .iter()
                .any(|o| o.kind == ObjectiveKind::TimeLimit { seconds: 60.0 })
        );
        assert_eq!(speed.items[5].kind, "gem");
        assert_eq!(speed.items[0].kind, "coin");
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = LevelPack::from_toml_str(
            r#"
            [[level]]
            id = 1
            name = "a"

            [[level]]
            id = 1
            name = "b"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate level id 1"));
    }

    #[test]
    fn rejects_out_of_range_difficulty() {
        let err = LevelPack::from_toml_str("[[level]]\nid = 1\nname = \"a\"\ndifficulty = 9\n")
            .unwrap_err();
        assert!(matches!(err, LoadError::Invalid(_)));
    }

    #[test]
    fn parse_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[[level]]\nid = \"one\"\n").unwrap();
        let err = LevelPack::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"), "{err}");
    }

    #[test]
    fn save_then_load_keeps_levels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pack.toml");
        let pack = LevelPack::builtin().unwrap();
        pack.save(&path).unwrap();
        assert_eq!(LevelPack::load(&path).unwrap(), pack);
    }
}
