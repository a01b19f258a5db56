/// Fidelity levels a loader can produce, as a bitmask.
///
/// The same type is used for the set of levels a consumer asked for and
/// the set already produced. Produced levels are only ever added.

use std::fmt;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LoadLevels: u8 {
        /// Small cached thumbnail
        const THUMBNAIL = 0b0000_0001;
        /// Embedded / large preview
        const LARGE     = 0b0000_0010;
        /// Full-resolution decode
        const FULL      = 0b0000_0100;
    }
}

/// A level that can stand in for another one when it is missing.
///
/// Reads as: producing `level` needs `source` when `condition` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub level: LoadLevels,
    pub source: LoadLevels,
    pub condition: DependencyCondition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyCondition {
    /// Only when the thumbnail cache has no entry for the resource
    CacheMiss,
}

/// Declared escalation edges. A thumbnail that is not cached is
/// synthesized from the large preview, so a thumbnail request on a
/// cache miss also requests `LARGE`.
pub const DEPENDENCIES: &[Dependency] = &[Dependency {
    level: LoadLevels::THUMBNAIL,
    source: LoadLevels::LARGE,
    condition: DependencyCondition::CacheMiss,
}];

impl LoadLevels {
    /// Single levels in fidelity order
    pub const EACH: [LoadLevels; 3] = [LoadLevels::THUMBNAIL, LoadLevels::LARGE, LoadLevels::FULL];

    /// Levels that must be produced first for `self` on a thumbnail cache miss.
    pub fn escalation_on_cache_miss(self) -> LoadLevels {
        DEPENDENCIES
            .iter()
            .filter(|dep| dep.condition == DependencyCondition::CacheMiss && self.contains(dep.level))
            .fold(LoadLevels::empty(), |acc, dep| acc | dep.source)
    }

    /// Slot of a single level in per-level tables. `None` for empty or combined sets.
    pub(crate) fn index(self) -> Option<usize> {
        LoadLevels::EACH.iter().position(|level| *level == self)
    }

    fn label(self) -> &'static str {
        match self.index() {
            Some(0) => "thumbnail",
            Some(1) => "large",
            Some(2) => "full",
            _ => "?",
        }
    }
}

impl fmt::Display for LoadLevels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = LoadLevels::EACH
            .iter()
            .filter(|level| self.contains(**level))
            .map(|level| level.label())
            .collect();
        f.write_str(&names.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_escalates_to_large() {
        assert_eq!(LoadLevels::THUMBNAIL.escalation_on_cache_miss(), LoadLevels::LARGE);
        assert_eq!(
            (LoadLevels::THUMBNAIL | LoadLevels::FULL).escalation_on_cache_miss(),
            LoadLevels::LARGE
        );
    }

    #[test]
    fn test_other_levels_have_no_escalation() {
        assert!(LoadLevels::LARGE.escalation_on_cache_miss().is_empty());
        assert!(LoadLevels::FULL.escalation_on_cache_miss().is_empty());
    }

    #[test]
    fn test_index_of_single_levels() {
        assert_eq!(LoadLevels::THUMBNAIL.index(), Some(0));
        assert_eq!(LoadLevels::LARGE.index(), Some(1));
        assert_eq!(LoadLevels::FULL.index(), Some(2));
        assert_eq!((LoadLevels::LARGE | LoadLevels::FULL).index(), None);
        assert_eq!(LoadLevels::empty().index(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(LoadLevels::empty().to_string(), "none");
        assert_eq!((LoadLevels::FULL | LoadLevels::THUMBNAIL).to_string(), "thumbnail|full");
    }
}
