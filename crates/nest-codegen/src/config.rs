//! Compilation options.

use std::fmt;
use std::str::FromStr;

/// How much optimization the pipeline performs.
///
/// Levels are cumulative: each one enables everything below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum OptLevel {
    /// `-O0`: compile the tree as written
    None,
    /// `-O1`: fold constants and prune dead branches in the tree
    Tree,
    /// `-O2`: also run the instruction peephole passes
    Peephole,
    /// `-O3`: also replace reads of builtin names with constants
    #[default]
    Builtins,
}

impl OptLevel {
    /// Returns the numeric level, `0` to `3`.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "-O{}", self.as_u8())
    }
}

/// Error returned when parsing an [`OptLevel`] fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid optimization level '{0}', expected 0, 1, 2 or 3")]
pub struct ParseOptLevelError(String);

impl FromStr for OptLevel {
    type Err = ParseOptLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches("-O") {
            "0" => Ok(OptLevel::None),
            "1" => Ok(OptLevel::Tree),
            "2" => Ok(OptLevel::Peephole),
            "3" => Ok(OptLevel::Builtins),
            _ => Err(ParseOptLevelError(s.to_string())),
        }
    }
}

/// Options for compiling one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Optimization level
    pub opt_level: OptLevel,
    /// Whether builtin names are bound at runtime. When false, builtin
    /// substitution is skipped at every level.
    pub builtins: bool,
    /// Whether the unit is a module: modules end by returning their
    /// variable table instead of `null`
    pub is_module: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::default(),
            builtins: true,
            is_module: false,
        }
    }
}

impl Options {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the optimization level.
    pub fn with_opt_level(mut self, opt_level: OptLevel) -> Self {
        self.opt_level = opt_level;
        self
    }

    /// Enables or disables the builtin bindings.
    pub fn with_builtins(mut self, builtins: bool) -> Self {
        self.builtins = builtins;
        self
    }

    /// Marks the unit as a module.
    pub fn with_module(mut self, is_module: bool) -> Self {
        self.is_module = is_module;
        self
    }

    /// Returns true if the tree optimizer should run.
    pub fn optimize_tree(&self) -> bool {
        self.opt_level >= OptLevel::Tree
    }

    /// Returns true if the peephole optimizer should run.
    pub fn optimize_ir(&self) -> bool {
        self.opt_level >= OptLevel::Peephole
    }

    /// Returns true if builtin names should be substituted.
    pub fn substitute_builtins(&self) -> bool {
        self.builtins && self.opt_level >= OptLevel::Builtins
    }
}
