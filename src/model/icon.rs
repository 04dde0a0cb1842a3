//! Icon references and display colors shared by groups and entries

use std::fmt;

use super::Identifier;

/// Builtin icon index, or a reference into the database's custom icons
///
/// The two forms are exclusive: choosing one discards the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Icon {
    Builtin(i32),
    Custom(Identifier),
}

impl Default for Icon {
    fn default() -> Self {
        Icon::Builtin(0)
    }
}

impl Icon {
    /// Builtin index; custom icons report 0
    pub fn number(&self) -> i32 {
        match self {
            Icon::Builtin(number) => *number,
            Icon::Custom(_) => 0,
        }
    }

    pub fn custom_uuid(&self) -> Option<Identifier> {
        match self {
            Icon::Builtin(_) => None,
            Icon::Custom(uuid) => Some(*uuid),
        }
    }
}

/// 24-bit RGB color, written as `#RRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Color {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Parse `#RRGGBB`; anything else is `None`
    pub fn parse(text: &str) -> Option<Self> {
        let digits = text.strip_prefix('#')?;
        if digits.len() != 6 {
            return None;
        }
        let bytes = hex::decode(digits).ok()?;
        Some(Self::new(bytes[0], bytes[1], bytes[2]))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icon_forms() {
        assert_eq!(Icon::default().number(), 0);
        assert_eq!(Icon::Builtin(43).number(), 43);
        let uuid = Identifier::random();
        assert_eq!(Icon::Custom(uuid).custom_uuid(), Some(uuid));
        assert_eq!(Icon::Custom(uuid).number(), 0);
        assert_eq!(Icon::Builtin(3).custom_uuid(), None);
    }

    #[test]
    fn test_color_parse_and_format() {
        let color = Color::parse("#FF8000").unwrap();
        assert_eq!(color, Color::new(255, 128, 0));
        assert_eq!(color.to_string(), "#FF8000");
        assert_eq!(Color::parse("#ff8000"), Some(color));
    }

    #[test]
    fn test_color_invalid() {
        assert_eq!(Color::parse(""), None);
        assert_eq!(Color::parse("FF8000"), None);
        assert_eq!(Color::parse("#FF80"), None);
        assert_eq!(Color::parse("#GG8000"), None);
        assert_eq!(Color::parse("#FF80001"), None);
    }
}
