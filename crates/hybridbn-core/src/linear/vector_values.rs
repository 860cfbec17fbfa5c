//! Continuous assignments: key to real vector.

use std::collections::BTreeMap;
use std::fmt;

use nalgebra::DVector;

use crate::discrete::key::{format_key, Key};
use crate::errors::{HybridError, Result};
use crate::linear::{format_vector, vectors_close};

/// Mapping from continuous keys to vectors, iterated in ascending key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorValues {
    values: BTreeMap<Key, DVector<f64>>,
}

impl VectorValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the value of `key`, returning the previous one.
    pub fn insert(&mut self, key: Key, value: DVector<f64>) -> Option<DVector<f64>> {
        self.values.insert(key, value)
    }

    /// Inserts a one-dimensional value.
    pub fn insert_scalar(&mut self, key: Key, value: f64) -> Option<DVector<f64>> {
        self.insert(key, DVector::from_element(1, value))
    }

    /// Builder form of [`VectorValues::insert`].
    pub fn with(mut self, key: Key, value: DVector<f64>) -> Self {
        self.insert(key, value);
        self
    }

    /// Builder form of [`VectorValues::insert_scalar`].
    pub fn with_scalar(mut self, key: Key, value: f64) -> Self {
        self.insert_scalar(key, value);
        self
    }

    pub fn get(&self, key: Key) -> Option<&DVector<f64>> {
        self.values.get(&key)
    }

    /// Value of `key` or [`HybridError::MissingValue`].
    pub fn at(&self, key: Key) -> Result<&DVector<f64>> {
        self.values.get(&key).ok_or(HybridError::MissingValue { key })
    }

    pub fn contains(&self, key: Key) -> bool {
        self.values.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.values.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, &DVector<f64>)> + '_ {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    /// Copies every entry of `other` into `self`, overwriting shared keys.
    pub fn update(&mut self, other: &VectorValues) {
        for (k, v) in other.iter() {
            self.values.insert(k, v.clone());
        }
    }

    /// Union of both sets of values; entries of `other` win on shared keys.
    pub fn merged(&self, other: &VectorValues) -> VectorValues {
        let mut out = self.clone();
        out.update(other);
        out
    }

    /// Entries whose keys appear in `keys`.
    pub fn subset(&self, keys: &[Key]) -> VectorValues {
        self.values
            .iter()
            .filter(|(k, _)| keys.contains(k))
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    /// Same keys, same dimensions, entries within `tol`.
    pub fn equals(&self, other: &VectorValues, tol: f64) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && vectors_close(va, vb, tol))
    }
}

impl FromIterator<(Key, DVector<f64>)> for VectorValues {
    fn from_iter<I: IntoIterator<Item = (Key, DVector<f64>)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for VectorValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "VectorValues: {} elements", self.values.len())?;
        for (k, v) in &self.values {
            writeln!(f, "  {}: {}", format_key(*k), format_vector(v))?;
        }
        Ok(())
    }
}
