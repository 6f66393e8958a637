//! Counter formatting
//!
//! Turns a 1-based counter value into its display form. Used for footnote
//! markers, enumerate tags and equation numbers.

use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer};

const ROMAN_NUMERALS: [(u32, &str); 13] = [
    (1000, "M"),
    (900, "CM"),
    (500, "D"),
    (400, "CD"),
    (100, "C"),
    (90, "XC"),
    (50, "L"),
    (40, "XL"),
    (10, "X"),
    (9, "IX"),
    (5, "V"),
    (4, "IV"),
    (1, "I"),
];

const FN_SYMBOLS: [&str; 6] = ["*", "†", "‡", "§", "¶", "‖"];

const SUPERSCRIPT_DIGITS: [char; 10] = ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];

const SUBSCRIPT_DIGITS: [char; 10] = ['₀', '₁', '₂', '₃', '₄', '₅', '₆', '₇', '₈', '₉'];

lazy_static! {
    static ref DOLLAR_TEMPLATE: Regex = Regex::new(r"\$\{([a-zA-Z0-9_]+)\}").unwrap();
}

/// A counter formatter.
#[derive(Clone, Default)]
pub enum CounterFormatter {
    /// 1, 2, 3, ...
    #[default]
    Arabic,
    /// a, b, ..., z, aa, bb, ...
    Alph,
    /// A, B, ..., Z, AA, BB, ...
    AlphUpper,
    /// i, ii, iii, ...
    Roman,
    /// I, II, III, ...
    RomanUpper,
    /// *, †, ‡, §, ¶, ‖, **, ††, ...
    Fnsymbol,
    /// ¹, ², ³, ...
    UnicodeSuperscript,
    /// ₁, ₂, ₃, ...
    UnicodeSubscript,
    /// `${name}` placeholders replaced by the named formatter, e.g.
    /// `"(${roman})"`
    Template(String),
    /// The first `1`, `a`, `A`, `i` or `I` is replaced by the counter in
    /// that style, e.g. `"(a.)"`. Without any of these the template is
    /// returned unchanged, which makes it a fixed bullet.
    TagTemplate(String),
    /// Any function
    Custom(Arc<dyn Fn(u32) -> String + Send + Sync>),
}

impl CounterFormatter {
    /// Wrap a closure as a formatter.
    pub fn custom(f: impl Fn(u32) -> String + Send + Sync + 'static) -> Self {
        CounterFormatter::Custom(Arc::new(f))
    }

    /// Look up a named formatter (`arabic`, `alph`, `Alph`, `roman`,
    /// `Roman`, `fnsymbol`, `unicodesuperscript`, `unicodesubscript`).
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "arabic" => CounterFormatter::Arabic,
            "alph" => CounterFormatter::Alph,
            "Alph" => CounterFormatter::AlphUpper,
            "roman" => CounterFormatter::Roman,
            "Roman" => CounterFormatter::RomanUpper,
            "fnsymbol" => CounterFormatter::Fnsymbol,
            "unicodesuperscript" => CounterFormatter::UnicodeSuperscript,
            "unicodesubscript" => CounterFormatter::UnicodeSubscript,
            _ => return None,
        })
    }

    /// A named formatter, or else a tag template.
    pub fn parse(spec: &str) -> Self {
        Self::from_name(spec).unwrap_or_else(|| CounterFormatter::TagTemplate(spec.to_string()))
    }

    pub fn format(&self, n: u32) -> String {
        match self {
            CounterFormatter::Arabic => n.to_string(),
            CounterFormatter::Alph => alph(n),
            CounterFormatter::AlphUpper => alph(n).to_uppercase(),
            CounterFormatter::Roman => roman(n).to_lowercase(),
            CounterFormatter::RomanUpper => roman(n),
            CounterFormatter::Fnsymbol => fnsymbol(n),
            CounterFormatter::UnicodeSuperscript => custom_digits(n, &SUPERSCRIPT_DIGITS),
            CounterFormatter::UnicodeSubscript => custom_digits(n, &SUBSCRIPT_DIGITS),
            CounterFormatter::Template(template) => DOLLAR_TEMPLATE
                .replace_all(template, |caps: &Captures| {
                    Self::from_name(&caps[1])
                        .map(|f| f.format(n))
                        .unwrap_or_else(|| caps[0].to_string())
                })
                .into_owned(),
            CounterFormatter::TagTemplate(template) => format_tag_template(template, n),
            CounterFormatter::Custom(f) => f(n),
        }
    }
}

impl fmt::Debug for CounterFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterFormatter::Template(t) => f.debug_tuple("Template").field(t).finish(),
            CounterFormatter::TagTemplate(t) => f.debug_tuple("TagTemplate").field(t).finish(),
            CounterFormatter::Custom(_) => write!(f, "Custom(..)"),
            CounterFormatter::Arabic => write!(f, "Arabic"),
            CounterFormatter::Alph => write!(f, "Alph"),
            CounterFormatter::AlphUpper => write!(f, "AlphUpper"),
            CounterFormatter::Roman => write!(f, "Roman"),
            CounterFormatter::RomanUpper => write!(f, "RomanUpper"),
            CounterFormatter::Fnsymbol => write!(f, "Fnsymbol"),
            CounterFormatter::UnicodeSuperscript => write!(f, "UnicodeSuperscript"),
            CounterFormatter::UnicodeSubscript => write!(f, "UnicodeSubscript"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FormatterRepr {
    Name(String),
    Template { template: String },
    TagTemplate { tag_template: String },
}

impl<'de> Deserialize<'de> for CounterFormatter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match FormatterRepr::deserialize(deserializer)? {
            FormatterRepr::Name(name) => Self::from_name(&name).ok_or_else(|| {
                serde::de::Error::custom(format!("unknown counter formatter '{}'", name))
            })?,
            FormatterRepr::Template { template } => CounterFormatter::Template(template),
            FormatterRepr::TagTemplate { tag_template } => {
                CounterFormatter::TagTemplate(tag_template)
            }
        })
    }
}

fn alph(n: u32) -> String {
    if n == 0 {
        return String::new();
    }
    let n = n - 1;
    let letter = (b'a' + (n % 26) as u8) as char;
    letter.to_string().repeat(1 + (n / 26) as usize)
}

fn roman(mut n: u32) -> String {
    let mut s = String::new();
    for (value, numeral) in ROMAN_NUMERALS {
        while n >= value {
            s.push_str(numeral);
            n -= value;
        }
    }
    s
}

fn fnsymbol(n: u32) -> String {
    if n == 0 {
        return String::new();
    }
    let n = (n - 1) as usize;
    FN_SYMBOLS[n % FN_SYMBOLS.len()].repeat(1 + n / FN_SYMBOLS.len())
}

fn custom_digits(mut n: u32, digits: &[char; 10]) -> String {
    let mut out = Vec::new();
    while n > 0 {
        out.push(digits[(n % 10) as usize]);
        n /= 10;
    }
    out.iter().rev().collect()
}

fn format_tag_template(template: &str, n: u32) -> String {
    match template.char_indices().find(|(_, c)| matches!(c, '1' | 'a' | 'A' | 'i' | 'I')) {
        Some((idx, c)) => {
            let counter = match c {
                'a' => alph(n),
                'A' => alph(n).to_uppercase(),
                'i' => roman(n).to_lowercase(),
                'I' => roman(n),
                _ => n.to_string(),
            };
            format!("{}{}{}", &template[..idx], counter, &template[idx + c.len_utf8()..])
        }
        None => template.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_formatters() {
        assert_eq!(CounterFormatter::Arabic.format(12), "12");
        assert_eq!(CounterFormatter::Alph.format(1), "a");
        assert_eq!(CounterFormatter::Alph.format(28), "bb");
        assert_eq!(CounterFormatter::AlphUpper.format(3), "C");
        assert_eq!(CounterFormatter::Roman.format(14), "xiv");
        assert_eq!(CounterFormatter::RomanUpper.format(1994), "MCMXCIV");
        assert_eq!(CounterFormatter::Fnsymbol.format(2), "†");
        assert_eq!(CounterFormatter::Fnsymbol.format(7), "**");
        assert_eq!(CounterFormatter::UnicodeSuperscript.format(120), "¹²⁰");
        assert_eq!(CounterFormatter::UnicodeSubscript.format(4), "₄");
    }

    #[test]
    fn test_dollar_template() {
        let f = CounterFormatter::Template("(${roman})".to_string());
        assert_eq!(f.format(3), "(iii)");
    }

    #[test]
    fn test_tag_template() {
        assert_eq!(CounterFormatter::parse("(a.)").format(2), "(b.)");
        assert_eq!(CounterFormatter::parse("Step 1:").format(4), "Step 4:");
        assert_eq!(CounterFormatter::parse("I)").format(4), "IV)");
        assert_eq!(CounterFormatter::parse("•").format(9), "•");
        assert_eq!(CounterFormatter::parse("roman").format(2), "ii");
    }

    #[test]
    fn test_custom() {
        let f = CounterFormatter::custom(|n| format!("<{}>", n * 10));
        assert_eq!(f.format(2), "<20>");
    }

    #[test]
    fn test_deserialize() {
        let f: CounterFormatter = serde_json::from_str("\"unicodesuperscript\"").unwrap();
        assert_eq!(f.format(3), "³");
        let f: CounterFormatter = serde_json::from_str(r#"{"template": "${alph}."}"#).unwrap();
        assert_eq!(f.format(1), "a.");
        let f: CounterFormatter = serde_json::from_str(r#"{"tag_template": "[1]"}"#).unwrap();
        assert_eq!(f.format(5), "[5]");
        assert!(serde_json::from_str::<CounterFormatter>("\"nope\"").is_err());
    }
}
