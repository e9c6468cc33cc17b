//! # Séries de Registros
//!
//! Uma [`Series`] é a coleção ordenada de registros de texto a ser categorizada:
//! um índice de rótulos (`K`) alinhado a valores opcionais. Um valor `None`
//! representa um registro **ausente** (o equivalente a um "NA" tabular) e
//! participa do matching com semântica própria (ver [`crate::operation`]).
//!
//! A mesma estrutura é usada para a saída: o resultado de um tagging é uma
//! `Series<K>` de tags alinhada ao índice de entrada.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TagError};

/// Coleção ordenada de textos (possivelmente ausentes) com índice de rótulos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series<K = usize> {
    index: Vec<K>,
    values: Vec<Option<String>>,
}

impl Series<usize> {
    /// Cria uma série com índice posicional `0..n`.
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self {
            index: (0..values.len()).collect(),
            values,
        }
    }

    /// Atalho para séries sem valores ausentes.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(
            texts
                .into_iter()
                .map(|t| Some(t.as_ref().to_string()))
                .collect(),
        )
    }
}

impl<K> Series<K> {
    /// Cria uma série com índice explícito. O índice e os valores precisam ter o mesmo tamanho.
    pub fn with_index(index: Vec<K>, values: Vec<Option<String>>) -> Result<Self> {
        if index.len() != values.len() {
            return Err(TagError::LengthMismatch {
                expected: index.len(),
                actual: values.len(),
            });
        }
        Ok(Self { index, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn index(&self) -> &[K] {
        &self.index
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    /// Valor na posição `pos` (não no rótulo).
    pub fn get(&self, pos: usize) -> Option<&str> {
        self.values.get(pos).and_then(|v| v.as_deref())
    }

    /// Valor associado ao rótulo `key` (primeira ocorrência).
    pub fn get_by_key(&self, key: &K) -> Option<&str>
    where
        K: PartialEq,
    {
        self.index
            .iter()
            .position(|k| k == key)
            .and_then(|pos| self.get(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, Option<&str>)> {
        self.index
            .iter()
            .zip(self.values.iter().map(|v| v.as_deref()))
    }

    /// Versão em minúsculas dos valores (ausentes continuam ausentes).
    pub(crate) fn lowercased_values(&self) -> Vec<Option<String>> {
        self.values
            .iter()
            .map(|v| v.as_ref().map(|s| s.to_lowercase()))
            .collect()
    }

    /// Nova série com o mesmo índice e outros valores.
    pub(crate) fn reindexed(&self, values: Vec<Option<String>>) -> Series<K>
    where
        K: Clone,
    {
        Series {
            index: self.index.clone(),
            values,
        }
    }
}

/// Valor inicial das tags, antes de qualquer regra casar.
///
/// Registros que nenhuma regra cobre mantêm este valor na saída.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Prefill {
    /// Sem tag.
    #[default]
    Missing,
    /// Mesmo valor para todos os registros.
    Scalar(String),
    /// Um valor por registro, na ordem posicional da série.
    PerRecord(Vec<Option<String>>),
}

impl Prefill {
    pub(crate) fn materialize(&self, len: usize) -> Result<Vec<Option<String>>> {
        match self {
            Prefill::Missing => Ok(vec![None; len]),
            Prefill::Scalar(tag) => Ok(vec![Some(tag.clone()); len]),
            Prefill::PerRecord(tags) => {
                if tags.len() != len {
                    return Err(TagError::LengthMismatch {
                        expected: len,
                        actual: tags.len(),
                    });
                }
                Ok(tags.clone())
            }
        }
    }
}

impl From<&str> for Prefill {
    fn from(tag: &str) -> Self {
        Prefill::Scalar(tag.to_string())
    }
}

impl From<Option<String>> for Prefill {
    fn from(tag: Option<String>) -> Self {
        match tag {
            Some(tag) => Prefill::Scalar(tag),
            None => Prefill::Missing,
        }
    }
}
