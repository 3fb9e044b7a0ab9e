//! Per-argument directives written in front of an argument.

use std::fmt;

/// A directive attached to one argument of a call, e.g. `[top] x`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Directive {
    #[default]
    None,
    /// Marks the last of a run of arguments that the operation should use.
    Top,
    Key,
    Up,
    Down,
}

impl Directive {
    pub fn is_none(self) -> bool {
        self == Directive::None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Directive::None => "",
            Directive::Top => "top",
            Directive::Key => "key",
            Directive::Up => "<",
            Directive::Down => ">",
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.as_str())
    }
}
