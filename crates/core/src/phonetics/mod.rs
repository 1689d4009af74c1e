//! Phonetic spell-out layers.
//!
//! Layer 0 holds the characters of the word. Every following layer replaces
//! each character of the previous one with the characters of its spoken
//! name: `"cat"` becomes `"seeaytee"`, which in turn expands further.

use std::collections::HashMap;

use serde::Serialize;

/// Source of phonetic layers. The English letter table is the default; tests
/// and other front ends may swap in their own.
pub trait LayerGenerator {
    fn generate(&self, word: &str, max_depth: usize) -> Layers;
}

/// Ordered phonetic layers plus, for every character past layer 0, the
/// index of the character it was spelled out from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Layers {
    layers: Vec<Vec<char>>,
    origins: Vec<Vec<usize>>,
}

impl Layers {
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[char]> {
        self.layers.get(index).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[char]> {
        self.layers.iter().map(Vec::as_slice)
    }

    pub fn last(&self) -> Option<&[char]> {
        self.layers.last().map(Vec::as_slice)
    }

    /// Index in layer `index - 1` that produced character `position` of
    /// layer `index`.
    pub fn origin(&self, index: usize, position: usize) -> Option<usize> {
        if index == 0 {
            return None;
        }
        self.origins.get(index)?.get(position).copied()
    }

    pub fn layer_text(&self, index: usize) -> Option<String> {
        self.get(index).map(|layer| layer.iter().collect())
    }

    pub fn total_chars(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }

    /// Layers as strings, convenient for storing in state.
    pub fn texts(&self) -> Vec<String> {
        self.layers.iter().map(|layer| layer.iter().collect()).collect()
    }
}

/// Concatenation of the last layer's characters.
pub fn final_layer_text(layers: &Layers) -> String {
    layers
        .last()
        .map(|layer| layer.iter().collect())
        .unwrap_or_default()
}

/// Letter and digit names used for the spell-out.
#[derive(Debug, Clone)]
pub struct PhoneticTable {
    names: HashMap<char, String>,
}

const ENGLISH: &[(char, &str)] = &[
    ('a', "ay"),
    ('b', "bee"),
    ('c', "see"),
    ('d', "dee"),
    ('e', "ee"),
    ('f', "ef"),
    ('g', "jee"),
    ('h', "aitch"),
    ('i', "eye"),
    ('j', "jay"),
    ('k', "kay"),
    ('l', "el"),
    ('m', "em"),
    ('n', "en"),
    ('o', "oh"),
    ('p', "pee"),
    ('q', "cue"),
    ('r', "ar"),
    ('s', "ess"),
    ('t', "tee"),
    ('u', "you"),
    ('v', "vee"),
    ('w', "doubleyou"),
    ('x', "ex"),
    ('y', "why"),
    ('z', "zee"),
    ('0', "zero"),
    ('1', "one"),
    ('2', "two"),
    ('3', "three"),
    ('4', "four"),
    ('5', "five"),
    ('6', "six"),
    ('7', "seven"),
    ('8', "eight"),
    ('9', "nine"),
];

impl Default for PhoneticTable {
    fn default() -> Self {
        Self::english()
    }
}

impl PhoneticTable {
    pub fn english() -> Self {
        Self {
            names: ENGLISH
                .iter()
                .map(|(letter, name)| (*letter, (*name).to_string()))
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            names: HashMap::new(),
        }
    }

    pub fn with_name(mut self, letter: char, name: impl Into<String>) -> Self {
        self.names.insert(letter, name.into());
        self
    }

    /// Spoken name of a character, case-insensitive. Characters without a
    /// name (spaces, punctuation) spell out to nothing.
    pub fn spell(&self, letter: char) -> Option<&str> {
        letter
            .to_lowercase()
            .next()
            .and_then(|lower| self.names.get(&lower))
            .map(String::as_str)
    }
}

impl LayerGenerator for PhoneticTable {
    /// Produces at least one layer for a non-empty word and stops early once
    /// a layer spells out to nothing.
    fn generate(&self, word: &str, max_depth: usize) -> Layers {
        let first: Vec<char> = word.chars().collect();
        if first.is_empty() {
            return Layers::default();
        }

        let mut layers = Layers {
            layers: vec![first],
            origins: vec![Vec::new()],
        };

        while layers.len() < max_depth.max(1) {
            let Some(previous) = layers.layers.last() else {
                break;
            };
            let mut next = Vec::new();
            let mut origins = Vec::new();
            for (index, letter) in previous.iter().enumerate() {
                if let Some(name) = self.spell(*letter) {
                    for spelled in name.chars() {
                        next.push(spelled);
                        origins.push(index);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            layers.layers.push(next);
            layers.origins.push(origins);
        }

        layers
    }
}

/// Spells out `word` with the English table.
pub fn generate_layers(word: &str, max_depth: usize) -> Layers {
    PhoneticTable::english().generate(word, max_depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cat_expands_through_three_layers() {
        let layers = generate_layers("cat", 3);

        assert_eq!(layers.len(), 3);
        assert_eq!(layers.get(0), Some(&['c', 'a', 't'][..]));
        assert_eq!(layers.layer_text(1).as_deref(), Some("seeaytee"));
        assert_eq!(
            layers.layer_text(2).as_deref(),
            Some("esseeeeaywhyteeeeee")
        );
        assert_eq!(final_layer_text(&layers), "esseeeeaywhyteeeeee");
    }

    #[test]
    fn origins_point_back_to_the_spelled_character() {
        let layers = generate_layers("cat", 2);
        let origins: Vec<_> = (0..8).map(|i| layers.origin(1, i).unwrap()).collect();
        assert_eq!(origins, vec![0, 0, 0, 1, 1, 2, 2, 2]);
        assert_eq!(layers.origin(0, 0), None);
    }

    #[test]
    fn unknown_characters_stop_generation_early() {
        let layers = generate_layers("?!", 5);
        assert_eq!(layers.len(), 1);
        assert_eq!(final_layer_text(&layers), "?!");
    }

    #[test]
    fn depth_zero_still_yields_the_raw_characters() {
        let layers = generate_layers("dog", 0);
        assert_eq!(layers.len(), 1);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let layers = generate_layers("Hi", 2);
        assert_eq!(layers.layer_text(0).as_deref(), Some("Hi"));
        assert_eq!(layers.layer_text(1).as_deref(), Some("aitcheye"));
    }

    #[test]
    fn empty_word_has_no_layers() {
        assert!(generate_layers("", 3).is_empty());
    }

    #[test]
    fn custom_tables_drive_generation() {
        let table = PhoneticTable::empty().with_name('a', "b");
        let layers = table.generate("a", 4);
        assert_eq!(layers.texts(), vec!["a".to_string(), "b".to_string()]);
    }
}
