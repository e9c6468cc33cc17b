//! # TaggedSeries — Partição Tagged/Untagged
//!
//! Acompanha uma série de registros enquanto as regras são aplicadas:
//!
//! - `tagged_index`: posições que já receberam tag;
//! - `untagged_index`: o complemento, sempre ordenado.
//!
//! Os dois conjuntos são disjuntos e cobrem toda a série. Posições só migram de
//! untagged para tagged, nunca ao contrário.
//!
//! A visão em minúsculas é calculada sob demanda e guardada em cache; alternar
//! a flag apenas escolhe qual visão usar, os valores originais nunca mudam.

use std::cell::OnceCell;
use std::collections::BTreeSet;

use crate::error::{Result, TagError};
use crate::series::{Prefill, Series};

pub struct TaggedSeries<'a, K> {
    series: &'a Series<K>,
    lowercase: bool,
    cached_lower: OnceCell<Vec<Option<String>>>,
    tagged: BTreeSet<usize>,
    untagged: Vec<usize>,
    tags: Vec<Option<String>>,
}

impl<'a, K> TaggedSeries<'a, K> {
    pub fn new(series: &'a Series<K>, prefill: &Prefill) -> Result<Self> {
        Ok(Self {
            series,
            lowercase: false,
            cached_lower: OnceCell::new(),
            tagged: BTreeSet::new(),
            untagged: (0..series.len()).collect(),
            tags: prefill.materialize(series.len())?,
        })
    }

    /// Escolhe entre a visão original e a visão em minúsculas.
    pub fn use_lowercase(&mut self, flag: bool) -> &mut Self {
        self.lowercase = flag;
        self
    }

    /// Valores na visão corrente.
    pub fn values(&self) -> &[Option<String>] {
        if self.lowercase {
            self.cached_lower
                .get_or_init(|| self.series.lowercased_values())
        } else {
            self.series.values()
        }
    }

    /// Valores ainda sem tag, na ordem de `untagged_index`.
    pub fn untagged(&self) -> Vec<Option<&str>> {
        let values = self.values();
        self.untagged
            .iter()
            .map(|&pos| values[pos].as_deref())
            .collect()
    }

    pub fn untagged_index(&self) -> &[usize] {
        &self.untagged
    }

    pub fn tagged_index(&self) -> &BTreeSet<usize> {
        &self.tagged
    }

    pub fn is_complete(&self) -> bool {
        self.untagged.is_empty()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Aplica `tag` aos registros untagged cuja posição na máscara é verdadeira.
    ///
    /// A máscara é alinhada a [`Self::untagged`]. Retorna quantos registros foram marcados.
    pub fn assign(&mut self, mask: &[bool], tag: &str) -> Result<usize> {
        if mask.len() != self.untagged.len() {
            return Err(TagError::LengthMismatch {
                expected: self.untagged.len(),
                actual: mask.len(),
            });
        }
        let mut still_untagged = Vec::with_capacity(self.untagged.len());
        let mut matched = 0;
        for (&pos, &hit) in self.untagged.iter().zip(mask) {
            if hit {
                self.tags[pos] = Some(tag.to_string());
                self.tagged.insert(pos);
                matched += 1;
            } else {
                still_untagged.push(pos);
            }
        }
        self.untagged = still_untagged;
        Ok(matched)
    }

    pub fn tags(&self) -> &[Option<String>] {
        &self.tags
    }

    /// Tags finais alinhadas ao índice original.
    pub fn into_tags(self) -> Series<K>
    where
        K: Clone,
    {
        self.series.reindexed(self.tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_stays_disjoint_and_exhaustive() {
        let series = Series::from_texts(["a", "b", "c", "d"]);
        let mut tagged = TaggedSeries::new(&series, &Prefill::Missing).unwrap();

        assert_eq!(tagged.assign(&[false, true, false, true], "x").unwrap(), 2);
        assert_eq!(tagged.untagged_index(), &[0, 2]);
        assert_eq!(tagged.untagged(), vec![Some("a"), Some("c")]);

        assert_eq!(tagged.assign(&[true, false], "y").unwrap(), 1);
        let mut all: Vec<usize> = tagged.tagged_index().iter().copied().collect();
        assert!(tagged.untagged_index().iter().all(|p| !tagged.tagged_index().contains(p)));
        all.extend(tagged.untagged_index());
        all.sort();
        assert_eq!(all, vec![0, 1, 2, 3]);

        let tags = tagged.into_tags();
        assert_eq!(
            tags.values(),
            &[Some("y".to_string()), Some("x".to_string()), None, Some("x".to_string())]
        );
    }

    #[test]
    fn test_mask_must_match_untagged() {
        let series = Series::from_texts(["a", "b"]);
        let mut tagged = TaggedSeries::new(&series, &Prefill::Missing).unwrap();
        assert!(tagged.assign(&[true], "x").is_err());
    }

    #[test]
    fn test_lowercase_view_keeps_originals() {
        let series = Series::from_texts(["AbC"]);
        let mut tagged = TaggedSeries::new(&series, &Prefill::from("none")).unwrap();
        assert_eq!(tagged.use_lowercase(true).untagged(), vec![Some("abc")]);
        assert_eq!(tagged.use_lowercase(false).untagged(), vec![Some("AbC")]);
        assert_eq!(tagged.tags(), &[Some("none".to_string())]);
    }
}
