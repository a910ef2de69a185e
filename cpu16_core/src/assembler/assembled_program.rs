use bimap::BiBTreeMap;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledProgram {
    /// Map of word addresses to memory words
    pub image: BTreeMap<u16, u16>,

    /// Map of instruction addresses (left) to line numbers (right)
    pub source_map: BiBTreeMap<u16, usize>,

    /// Map of labels and constants to values
    pub symbol_table: HashMap<String, u16>,
}

impl AssembledProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowest address holding an instruction.
    pub fn entry_point(&self) -> Option<u16> {
        self.source_map.left_values().next().copied()
    }

    pub fn add_symbol(&mut self, name: &str, value: u16) -> Result<(), String> {
        if self.symbol_table.contains_key(name) {
            return Err(format!("Duplicate symbol '{name}'"));
        }
        self.symbol_table.insert(name.to_string(), value);
        Ok(())
    }

    pub fn add_word(&mut self, address: u16, word: u16) -> Result<(), String> {
        if self.image.insert(address, word).is_some() {
            return Err(format!("Address {address:#06x} is already occupied"));
        }
        Ok(())
    }

    pub fn add_instruction(&mut self, address: u16, words: &[u16], line: usize) -> Result<(), String> {
        for (i, &word) in words.iter().enumerate() {
            self.add_word(address.wrapping_add(2 * i as u16), word)?;
        }
        self.source_map.insert(address, line);
        Ok(())
    }

    /// The words in address order, paired with the source line of each
    /// instruction word.
    pub fn listing(&self) -> impl Iterator<Item = (u16, u16, Option<usize>)> + '_ {
        self.image
            .iter()
            .map(|(&address, &word)| (address, word, self.source_map.get_by_left(&address).copied()))
    }
}
