//! Morse pattern codec
//!
//! Maps characters to dot/dash groups and back, derives the expected symbol
//! counts of a password, and models canonical Morse timing:
//! - Dash: 3 units
//! - Gap between elements of one character: 1 unit
//! - Gap between characters: 3 units
//! - Gap between words: 7 units

use crate::types::{ExpectedPattern, ExpectedTiming};

/// Character emitted for a group that is not in the table
pub const UNKNOWN_CHAR: char = '?';

pub const DOT: char = '.';
pub const DASH: char = '-';

/// Typed dash variant (em dash) accepted as [`DASH`]
pub const EM_DASH: char = '\u{2014}';

/// Group used for the space between words
pub const WORD_SEPARATOR: &str = "/";

pub const DASH_UNITS: f64 = 3.0;
pub const INTRA_CHAR_GAP_UNITS: f64 = 1.0;
pub const INTER_CHAR_GAP_UNITS: f64 = 3.0;
pub const INTER_WORD_GAP_UNITS: f64 = 7.0;

/// Default relative tolerance for [`PatternCodec::validate`]
pub const DEFAULT_VALIDATION_TOLERANCE: f64 = 0.3;

/// International Morse code table
const MORSE_TABLE: &[(char, &str)] = &[
    ('A', ".-"),
    ('B', "-..."),
    ('C', "-.-."),
    ('D', "-.."),
    ('E', "."),
    ('F', "..-."),
    ('G', "--."),
    ('H', "...."),
    ('I', ".."),
    ('J', ".---"),
    ('K', "-.-"),
    ('L', ".-.."),
    ('M', "--"),
    ('N', "-."),
    ('O', "---"),
    ('P', ".--."),
    ('Q', "--.-"),
    ('R', ".-."),
    ('S', "..."),
    ('T', "-"),
    ('U', "..-"),
    ('V', "...-"),
    ('W', ".--"),
    ('X', "-..-"),
    ('Y', "-.--"),
    ('Z', "--.."),
    ('0', "-----"),
    ('1', ".----"),
    ('2', "..---"),
    ('3', "...--"),
    ('4', "....-"),
    ('5', "....."),
    ('6', "-...."),
    ('7', "--..."),
    ('8', "---.."),
    ('9', "----."),
    ('.', ".-.-.-"),
    (',', "--..--"),
    ('?', "..--.."),
    ('/', "-..-."),
    ('@', ".--.-."),
    (' ', WORD_SEPARATOR),
];

/// Stateless Morse codec
pub struct PatternCodec;

impl PatternCodec {
    /// Look up the dot/dash group for a character (case-insensitive)
    pub fn encode(character: char) -> Option<&'static str> {
        let upper = character.to_ascii_uppercase();
        MORSE_TABLE
            .iter()
            .find(|(c, _)| *c == upper)
            .map(|(_, group)| *group)
    }

    /// Look up the character for a single dot/dash group
    pub fn decode_group(group: &str) -> Option<char> {
        MORSE_TABLE
            .iter()
            .find(|(_, g)| *g == group)
            .map(|(c, _)| *c)
    }

    /// Decode a sequence of groups; unknown groups become [`UNKNOWN_CHAR`]
    pub fn decode<S: AsRef<str>>(groups: &[S]) -> String {
        groups
            .iter()
            .map(|g| Self::decode_group(g.as_ref()).unwrap_or(UNKNOWN_CHAR))
            .collect()
    }

    /// Decode whitespace-separated Morse text such as `"... --- ..."`
    pub fn decode_text(morse: &str) -> String {
        let normalized = Self::normalize(morse);
        let groups: Vec<&str> = normalized.split_whitespace().collect();
        Self::decode(&groups)
    }

    /// Replace em dashes with [`DASH`]
    pub fn normalize(morse: &str) -> String {
        morse.replace(EM_DASH, "-")
    }

    /// Parse a Morse password into its expected pattern
    pub fn parse(morse: &str) -> ExpectedPattern {
        let groups: Vec<String> = Self::normalize(morse)
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let decoded = Self::decode(&groups);

        let dots = groups.iter().map(|g| g.matches(DOT).count()).sum();
        let dashes = groups.iter().map(|g| g.matches(DASH).count()).sum();

        ExpectedPattern {
            morse_code: groups.join(" "),
            pattern_count: groups.len(),
            groups,
            decoded,
            total_elements: dots + dashes,
            dots,
            dashes,
        }
    }

    /// Expected timing for one character at the given dot duration
    ///
    /// Total duration covers the elements plus the gaps between them, not the
    /// trailing inter-character gap. The space between words has no elements
    /// and lasts the inter-word gap.
    pub fn expected_timing(character: char, unit_duration: f64) -> Option<ExpectedTiming> {
        let pattern = Self::encode(character)?;
        if pattern == WORD_SEPARATOR {
            return Some(ExpectedTiming {
                pattern,
                num_elements: 0,
                dots: 0,
                dashes: 0,
                total_duration: INTER_WORD_GAP_UNITS * unit_duration,
            });
        }

        let elements: Vec<char> = pattern.chars().filter(|c| *c == DOT || *c == DASH).collect();

        let dots = elements.iter().filter(|c| **c == DOT).count();
        let dashes = elements.len() - dots;
        let element_units = dots as f64 + dashes as f64 * DASH_UNITS;
        let gap_units = elements.len().saturating_sub(1) as f64 * INTRA_CHAR_GAP_UNITS;

        Some(ExpectedTiming {
            pattern,
            num_elements: elements.len(),
            dots,
            dashes,
            total_duration: (element_units + gap_units) * unit_duration,
        })
    }

    /// Expected duration of plain text, from the first element to the last
    ///
    /// Characters of a word are separated by the inter-character gap and words
    /// by the inter-word gap. `None` if any character has no Morse group.
    pub fn expected_text_duration(text: &str, unit_duration: f64) -> Option<f64> {
        let mut words = Vec::new();
        for word in text.split(' ').filter(|w| !w.is_empty()) {
            let mut duration = 0.0;
            let mut count = 0usize;
            for character in word.chars() {
                duration += Self::expected_timing(character, unit_duration)?.total_duration;
                count += 1;
            }
            duration += count.saturating_sub(1) as f64 * INTER_CHAR_GAP_UNITS * unit_duration;
            words.push(duration);
        }

        let gaps = words.len().saturating_sub(1) as f64 * INTER_WORD_GAP_UNITS * unit_duration;
        Some(words.iter().sum::<f64>() + gaps)
    }

    /// Check that press durations follow a dot/dash group within `tolerance`
    ///
    /// The local dot duration is the shortest press; every press must fall in
    /// `[expected * (1 - tolerance), expected * (1 + tolerance)]`.
    pub fn validate(presses: &[f64], expected_units: &str, tolerance: f64) -> bool {
        let units: Vec<char> = expected_units.chars().collect();
        if presses.len() != units.len() {
            return false;
        }
        if presses.is_empty() {
            return true;
        }

        let dot_duration = presses.iter().copied().fold(f64::INFINITY, f64::min);

        presses.iter().zip(units).all(|(&press, unit)| {
            let expected = if unit == DOT {
                dot_duration
            } else {
                dot_duration * DASH_UNITS
            };
            let lower = expected * (1.0 - tolerance);
            let upper = expected * (1.0 + tolerance);
            (lower..=upper).contains(&press)
        })
    }

    /// [`PatternCodec::validate`] over every element of a parsed password
    pub fn validate_pattern(presses: &[f64], pattern: &ExpectedPattern, tolerance: f64) -> bool {
        let units: String = pattern
            .groups
            .iter()
            .flat_map(|group| group.chars())
            .filter(|c| *c == DOT || *c == DASH)
            .collect();
        Self::validate(presses, &units, tolerance)
    }
}
