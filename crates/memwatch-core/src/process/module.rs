use std::fmt;

/// A loaded image (main executable or library) inside the target process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleInfo {
    pub name: String,
    pub base_address: u64,
    pub size: u64,
}

impl ModuleInfo {
    pub fn new(name: impl Into<String>, base_address: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            base_address,
            size,
        }
    }

    /// Case-insensitive comparison against an already lower-cased name.
    pub fn matches_lowercase(&self, lowered: &str) -> bool {
        self.name.to_lowercase() == lowered
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.base_address && address - self.base_address < self.size
    }
}

impl fmt::Display for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {:#x} (size {:#x})",
            self.name, self.base_address, self.size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_lowercase() {
        let module = ModuleInfo::new("Game.EXE", 0x400000, 0x1000);
        assert!(module.matches_lowercase("game.exe"));
        assert!(!module.matches_lowercase("Game.EXE"));
        assert!(!module.matches_lowercase("game.dll"));
    }

    #[test]
    fn test_contains() {
        let module = ModuleInfo::new("game.exe", 0x10000, 0x100);
        assert!(module.contains(0x10000));
        assert!(module.contains(0x100FF));
        assert!(!module.contains(0x10100));
        assert!(!module.contains(0xFFFF));
    }

    #[test]
    fn test_display() {
        let module = ModuleInfo::new("game.exe", 0x10000, 0x100);
        assert_eq!(module.to_string(), "game.exe @ 0x10000 (size 0x100)");
    }
}
