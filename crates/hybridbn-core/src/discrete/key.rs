//! Variable keys, discrete keys and assignments.
//!
//! A [`Key`] is an opaque integer naming one random variable. The helpers
//! [`symbol`] and [`format_key`] pack a character and an index into a key so
//! that `x1`, `m0`, `z2` style names survive rendering.

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{HybridError, Result};

/// Identifier of one random variable.
pub type Key = u64;

/// Assignment of discrete values to discrete keys.
///
/// `BTreeMap` keeps iteration in ascending key order, which is the canonical
/// order used everywhere in the crate.
pub type DiscreteValues = BTreeMap<Key, usize>;

const CHR_BITS: u32 = 8;
const INDEX_BITS: u32 = u64::BITS - CHR_BITS;
const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;

/// Packs a character and an index into a key, rendered as e.g. `x1`.
pub fn symbol(chr: char, index: u64) -> Key {
    ((chr as u64 & 0xff) << INDEX_BITS) | (index & INDEX_MASK)
}

/// Renders a key as `<chr><index>` when it was built by [`symbol`], otherwise
/// as a plain integer.
pub fn format_key(key: Key) -> String {
    let chr = (key >> INDEX_BITS) as u8;
    if chr.is_ascii_alphabetic() {
        format!("{}{}", chr as char, key & INDEX_MASK)
    } else {
        key.to_string()
    }
}

/// A categorical variable: key plus number of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiscreteKey {
    pub key: Key,
    pub cardinality: usize,
}

impl DiscreteKey {
    /// Creates a discrete key. Cardinality must be at least 1.
    pub fn new(key: Key, cardinality: usize) -> Result<Self> {
        if cardinality == 0 {
            return Err(HybridError::Validation(format!(
                "discrete key {} must have cardinality >= 1",
                format_key(key)
            )));
        }
        Ok(Self { key, cardinality })
    }

    /// Reads this key's value from `values`, range checked.
    pub fn value_in(&self, values: &DiscreteValues) -> Result<usize> {
        let value = *values
            .get(&self.key)
            .ok_or(HybridError::MissingAssignment { key: self.key })?;
        if value >= self.cardinality {
            return Err(HybridError::InvalidAssignment {
                key: self.key,
                value,
                cardinality: self.cardinality,
            });
        }
        Ok(value)
    }
}

impl fmt::Display for DiscreteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", format_key(self.key), self.cardinality)
    }
}

/// Sorts and deduplicates keys, rejecting an empty domain or a key seen with
/// two cardinalities.
pub fn canonical_keys(keys: impl IntoIterator<Item = DiscreteKey>) -> Result<Vec<DiscreteKey>> {
    let mut by_key: BTreeMap<Key, usize> = BTreeMap::new();
    for dk in keys {
        if dk.cardinality == 0 {
            return Err(HybridError::Validation(format!(
                "discrete key {} has cardinality 0",
                format_key(dk.key)
            )));
        }
        match by_key.get(&dk.key) {
            Some(&card) if card != dk.cardinality => {
                return Err(HybridError::Validation(format!(
                    "discrete key {} has conflicting cardinalities {} and {}",
                    format_key(dk.key),
                    card,
                    dk.cardinality
                )));
            }
            Some(_) => {}
            None => {
                by_key.insert(dk.key, dk.cardinality);
            }
        }
    }
    Ok(by_key
        .into_iter()
        .map(|(key, cardinality)| DiscreteKey { key, cardinality })
        .collect())
}

/// Number of joint assignments over `keys`.
pub fn assignment_count(keys: &[DiscreteKey]) -> usize {
    keys.iter().map(|dk| dk.cardinality).product()
}

/// Restricts `values` to the given keys.
pub fn restrict(values: &DiscreteValues, keys: &[DiscreteKey]) -> Result<DiscreteValues> {
    keys.iter()
        .map(|dk| dk.value_in(values).map(|v| (dk.key, v)))
        .collect()
}

/// Iterator over every joint assignment of a key list.
///
/// Enumeration is row-major: the first key in the list is the most
/// significant digit, values ascend. With canonical (sorted) keys this is the
/// canonical assignment order used for tie-breaking.
#[derive(Debug, Clone)]
pub struct Assignments {
    keys: Vec<DiscreteKey>,
    digits: Vec<usize>,
    done: bool,
}

impl Assignments {
    pub fn new(keys: &[DiscreteKey]) -> Self {
        Self {
            keys: keys.to_vec(),
            digits: vec![0; keys.len()],
            done: keys.iter().any(|dk| dk.cardinality == 0),
        }
    }
}

impl Iterator for Assignments {
    type Item = DiscreteValues;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current: DiscreteValues = self
            .keys
            .iter()
            .zip(&self.digits)
            .map(|(dk, &v)| (dk.key, v))
            .collect();

        // Odometer increment, last key fastest.
        self.done = true;
        for idx in (0..self.keys.len()).rev() {
            self.digits[idx] += 1;
            if self.digits[idx] < self.keys[idx].cardinality {
                self.done = false;
                break;
            }
            self.digits[idx] = 0;
        }
        Some(current)
    }
}

/// Renders an assignment as `(m0, 1) (m1, 0)`.
pub fn format_assignment(values: &DiscreteValues) -> String {
    values
        .iter()
        .map(|(k, v)| format!("({}, {})", format_key(*k), v))
        .collect::<Vec<_>>()
        .join(" ")
}
