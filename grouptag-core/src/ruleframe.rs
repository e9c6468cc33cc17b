//! # Tabela de Regras do VectorTagger
//!
//! O VectorTagger recebe regras em forma tabular, com colunas em qualquer ordem
//! e nomes aproximados. Este módulo normaliza a tabela para três colunas canônicas:
//!
//! | coluna      | tipo            | tratamento                                   |
//! |-------------|-----------------|----------------------------------------------|
//! | `tag`       | texto           | preenchida para frente (forward-fill)        |
//! | `phrase`    | texto           | linhas sem frase são descartadas             |
//! | `min_terms` | inteiro ≥ 1     | ausente → 1                                  |
//!
//! ## Detecção das colunas
//!
//! 1. **Por nome** (minúsculo, casado no início): `tag`, `phrase`, `min_?terms?`.
//!    O primeiro nome canônico ainda livre vence.
//! 2. **Por tipo**, para colunas sem nome: numérica → `min_terms`;
//!    texto → o primeiro livre entre `tag` e `phrase`.
//!
//! Colunas não reconhecidas são preservadas em `extra`.
//!
//! ## Sintaxe da frase
//!
//! ```text
//! "sale"            palavra simples: conta para a regra
//! "sale +discount"  `+`: palavra de reforço, só pontua junto das simples
//! "sale -free"      `-`: anuladora, documento que a contém perde a regra
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TagError};

pub const TAG_COLUMN: &str = "tag";
pub const PHRASE_COLUMN: &str = "phrase";
pub const MIN_TERMS_COLUMN: &str = "min_terms";

const ADD_ON_PREFIX: char = '+';
const NULLIFIER_PREFIX: char = '-';

/// Valores de uma coluna; `None` é célula vazia.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "lowercase")]
pub enum ColumnValues {
    /// Textos; candidata a `tag` ou `phrase`
    Text(Vec<Option<String>>),
    /// Números; candidata a `min_terms` (`NaN` conta como ausente)
    Numeric(Vec<Option<f64>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Text(values) => values.len(),
            ColumnValues::Numeric(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn to_text(&self) -> Vec<Option<String>> {
        match self {
            ColumnValues::Text(values) => values.clone(),
            ColumnValues::Numeric(values) => values
                .iter()
                .map(|v| v.filter(|x| !x.is_nan()).map(format_number))
                .collect(),
        }
    }

    fn to_min_terms(&self) -> Result<Vec<u16>> {
        match self {
            ColumnValues::Numeric(values) => values
                .iter()
                .map(|v| match v {
                    Some(x) if !x.is_nan() => min_terms_from(*x),
                    _ => Ok(1),
                })
                .collect(),
            ColumnValues::Text(values) => values
                .iter()
                .map(|v| match v.as_deref().map(str::trim) {
                    None | Some("") => Ok(1),
                    Some(text) => text
                        .parse::<f64>()
                        .map_err(|_| invalid_min_terms(text))
                        .and_then(min_terms_from),
                })
                .collect(),
        }
    }

    /// Mantém só as linhas marcadas em `keep`.
    fn retain(&self, keep: &[bool]) -> ColumnValues {
        fn pick<T: Clone>(values: &[T], keep: &[bool]) -> Vec<T> {
            values
                .iter()
                .zip(keep)
                .filter(|(_, k)| **k)
                .map(|(v, _)| v.clone())
                .collect()
        }
        match self {
            ColumnValues::Text(values) => ColumnValues::Text(pick(values, keep)),
            ColumnValues::Numeric(values) => ColumnValues::Numeric(pick(values, keep)),
        }
    }
}

fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        x.to_string()
    }
}

fn invalid_min_terms(value: impl std::fmt::Display) -> TagError {
    TagError::InvalidColumn {
        column: MIN_TERMS_COLUMN.to_string(),
        reason: format!("valor inválido: {value}"),
    }
}

/// Inteiro sem sinal de 16 bits, mínimo 1.
fn min_terms_from(x: f64) -> Result<u16> {
    if x.fract() != 0.0 || x > f64::from(u16::MAX) {
        return Err(invalid_min_terms(x));
    }
    Ok(x.max(1.0) as u16)
}

/// Uma coluna da tabela bruta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// `None`: detectada pelo tipo dos valores
    pub name: Option<String>,
    pub values: ColumnValues,
}

impl Column {
    pub fn named(name: impl Into<String>, values: ColumnValues) -> Self {
        Self {
            name: Some(name.into()),
            values,
        }
    }

    pub fn unnamed(values: ColumnValues) -> Self {
        Self { name: None, values }
    }
}

/// Tabela de regras bruta, como o usuário a forneceu.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleFrame {
    columns: Vec<Column>,
}

impl RuleFrame {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Tabela canônica a partir de linhas `(tag, phrase, min_terms)`.
    pub fn from_rows<I, T, P>(rows: I) -> Self
    where
        I: IntoIterator<Item = (T, P, u16)>,
        T: Into<String>,
        P: Into<String>,
    {
        let mut tags = Vec::new();
        let mut phrases = Vec::new();
        let mut min_terms = Vec::new();
        for (tag, phrase, min) in rows {
            tags.push(Some(tag.into()));
            phrases.push(Some(phrase.into()));
            min_terms.push(Some(f64::from(min)));
        }
        Self::new(vec![
            Column::named(TAG_COLUMN, ColumnValues::Text(tags)),
            Column::named(PHRASE_COLUMN, ColumnValues::Text(phrases)),
            Column::named(MIN_TERMS_COLUMN, ColumnValues::Numeric(min_terms)),
        ])
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn push(&mut self, column: Column) -> &mut Self {
        self.columns.push(column);
        self
    }
}

/// Uma regra normalizada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRow {
    /// `None` quando nenhuma linha anterior tinha tag
    pub tag: Option<String>,
    pub phrase: String,
    pub min_terms: u16,
}

/// Tabela normalizada; a ordem das linhas é a ordem de prioridade das regras.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
    pub rows: Vec<RuleRow>,
    pub extra: Vec<Column>,
}

impl RuleTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Canonical {
    Tag,
    Phrase,
    MinTerms,
}

#[derive(Default)]
struct Detected<'a> {
    tag: Option<&'a ColumnValues>,
    phrase: Option<&'a ColumnValues>,
    min_terms: Option<&'a ColumnValues>,
}

impl<'a> Detected<'a> {
    fn is_free(&self, canonical: Canonical) -> bool {
        match canonical {
            Canonical::Tag => self.tag.is_none(),
            Canonical::Phrase => self.phrase.is_none(),
            Canonical::MinTerms => self.min_terms.is_none(),
        }
    }

    fn take(&mut self, canonical: Canonical, values: &'a ColumnValues) {
        match canonical {
            Canonical::Tag => self.tag = Some(values),
            Canonical::Phrase => self.phrase = Some(values),
            Canonical::MinTerms => self.min_terms = Some(values),
        }
    }
}

/// Normaliza uma [`RuleFrame`] para a [`RuleTable`] canônica.
pub fn fix_ruleframe(frame: &RuleFrame) -> Result<RuleTable> {
    let name_patterns = [
        (Canonical::Tag, Regex::new("^tag")?),
        (Canonical::Phrase, Regex::new("^phrase")?),
        (Canonical::MinTerms, Regex::new("^min_?terms?")?),
    ];

    let height = frame.columns.first().map_or(0, |c| c.values.len());
    let mut detected = Detected::default();
    let mut extra = Vec::new();
    for column in &frame.columns {
        if column.values.len() != height {
            return Err(TagError::LengthMismatch {
                expected: height,
                actual: column.values.len(),
            });
        }
        let canonical = match (&column.name, &column.values) {
            (Some(name), _) => {
                let lower = name.to_lowercase();
                name_patterns
                    .iter()
                    .find(|(canonical, re)| re.is_match(&lower) && detected.is_free(*canonical))
                    .map(|(canonical, _)| *canonical)
            }
            (None, ColumnValues::Numeric(_)) => {
                Some(Canonical::MinTerms).filter(|c| detected.is_free(*c))
            }
            (None, ColumnValues::Text(_)) => [Canonical::Tag, Canonical::Phrase]
                .into_iter()
                .find(|c| detected.is_free(*c)),
        };
        match canonical {
            Some(canonical) => detected.take(canonical, &column.values),
            None => extra.push(column.clone()),
        }
    }

    let missing: Vec<&'static str> = [(TAG_COLUMN, detected.tag), (PHRASE_COLUMN, detected.phrase)]
        .into_iter()
        .filter(|(_, values)| values.is_none())
        .map(|(name, _)| name)
        .collect();
    let (Some(tags), Some(phrases)) = (detected.tag, detected.phrase) else {
        return Err(TagError::MissingColumns { columns: missing });
    };

    let tags = forward_fill(tags.to_text());
    let phrases = phrases.to_text();
    let min_terms = match detected.min_terms {
        Some(values) => values.to_min_terms()?,
        None => vec![1; height],
    };

    let keep: Vec<bool> = phrases.iter().map(Option::is_some).collect();
    let rows = tags
        .into_iter()
        .zip(phrases)
        .zip(min_terms)
        .filter_map(|((tag, phrase), min_terms)| {
            phrase.map(|phrase| RuleRow {
                tag,
                phrase,
                min_terms,
            })
        })
        .collect();
    let extra = extra
        .into_iter()
        .map(|column| Column {
            name: column.name,
            values: column.values.retain(&keep),
        })
        .collect();
    Ok(RuleTable { rows, extra })
}

fn forward_fill(values: Vec<Option<String>>) -> Vec<Option<String>> {
    let mut last = None;
    values
        .into_iter()
        .map(|value| {
            if value.is_some() {
                last = value;
            }
            last.clone()
        })
        .collect()
}

/// Frases derivadas de uma [`RuleTable`], prontas para vetorização.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleVectors {
    pub tags: Vec<Option<String>>,
    /// Palavras simples e de reforço
    pub phrases: Vec<String>,
    /// Só as de reforço; as simples viram a palavra-coringa fora do vocabulário
    pub add_ons: Option<Vec<String>>,
    /// Palavras anuladoras, sem o sinal
    pub nullifiers: Option<Vec<String>>,
    /// `None` quando todas as regras exigem um único termo
    pub min_terms: Option<Vec<u16>>,
}

impl RuleVectors {
    /// Separa cada frase em frase principal, reforço e anuladoras.
    ///
    /// `oov` ocupa o lugar das palavras simples na frase de reforço e não pode
    /// existir no vocabulário.
    pub fn split(table: &RuleTable, oov: &str) -> Self {
        let mut phrases = Vec::with_capacity(table.len());
        let mut add_ons = Vec::with_capacity(table.len());
        let mut nullifiers = Vec::with_capacity(table.len());
        for row in &table.rows {
            let mut phrase_words = Vec::new();
            let mut add_on_words = Vec::new();
            let mut nullifier_words = Vec::new();
            for word in row.phrase.split_whitespace() {
                if let Some(word) = word.strip_prefix(NULLIFIER_PREFIX) {
                    nullifier_words.push(word);
                } else if let Some(word) = word.strip_prefix(ADD_ON_PREFIX) {
                    phrase_words.push(word);
                    add_on_words.push(word);
                } else {
                    phrase_words.push(word);
                    add_on_words.push(oov);
                }
            }
            phrases.push(phrase_words.join(" "));
            add_ons.push(add_on_words.join(" "));
            nullifiers.push(nullifier_words.join(" "));
        }

        let min_terms: Vec<u16> = table.rows.iter().map(|r| r.min_terms).collect();
        Self {
            tags: table.rows.iter().map(|r| r.tag.clone()).collect(),
            phrases,
            add_ons: non_blank(add_ons),
            nullifiers: non_blank(nullifiers),
            min_terms: Some(min_terms).filter(|m| m.iter().any(|&n| n != 1)),
        }
    }
}

fn non_blank(values: Vec<String>) -> Option<Vec<String>> {
    Some(values).filter(|v| v.iter().any(|s| !s.is_empty()))
}
