//! # Vetorizador de Contagem (Documento × Termo)
//!
//! Converte textos em linhas de uma matriz esparsa cujas colunas são os termos
//! de um vocabulário ajustado sobre um corpus.
//!
//! ## Análise de um texto
//!
//! 1. **Minúsculas** (opcional).
//! 2. **Remoção de acentos**: decomposição Unicode NFKD, descartando as marcas combinantes
//!    ("ação" → "acao").
//! 3. **Tokenização** por expressão regular; o padrão `(?u)\b\w\w+\b` descarta
//!    tokens de um único caractere.
//! 4. **N-gramas de palavras** no intervalo `ngram_range` (padrão: 1 a 3),
//!    unidos por espaço: "buy now cheap" → "buy", "now", "cheap", "buy now", ...
//!
//! ## Vocabulário
//!
//! Ordenado lexicograficamente; a posição de cada termo é o índice de sua
//! coluna. Depois do `fit` ele é imutável: termos desconhecidos em
//! `transform` simplesmente não geram colunas.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexSet;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sprs::CsMat;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::error::{Result, TagError};

pub const DEFAULT_TOKEN_PATTERN: &str = r"(?u)\b\w\w+\b";

/// Configuração da análise de textos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Tamanhos mínimo e máximo dos n-gramas (inclusivos)
    pub ngram_range: (usize, usize),
    pub lowercase: bool,
    pub strip_accents: bool,
    /// Conta presença (0/1) em vez de ocorrências
    pub binary: bool,
    pub token_pattern: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            ngram_range: (1, 3),
            lowercase: true,
            strip_accents: true,
            binary: true,
            token_pattern: DEFAULT_TOKEN_PATTERN.to_string(),
        }
    }
}

/// Analisador compilado a partir de um [`AnalyzerConfig`].
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: AnalyzerConfig,
    token_re: Regex,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        let (min_n, max_n) = config.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(TagError::InvalidSpec(format!(
                "ngram_range inválido: ({min_n}, {max_n})"
            )));
        }
        let token_re = Regex::new(&config.token_pattern)?;
        Ok(Self { config, token_re })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Termos (n-gramas) de um texto, na ordem em que aparecem por tamanho.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        let text = self.preprocess(text);
        let tokens: Vec<&str> = self.token_re.find_iter(&text).map(|m| m.as_str()).collect();
        let (min_n, max_n) = self.config.ngram_range;

        let mut terms = Vec::new();
        for n in min_n..=max_n.min(tokens.len()) {
            terms.extend(tokens.windows(n).map(|window| window.join(" ")));
        }
        terms
    }

    fn preprocess(&self, text: &str) -> String {
        let text = if self.config.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        if self.config.strip_accents {
            text.nfkd().filter(|c| !is_combining_mark(*c)).collect()
        } else {
            text
        }
    }
}

/// Vocabulário ajustado: termo → índice de coluna.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    terms: IndexSet<String>,
}

impl Vocabulary {
    pub(crate) fn from_documents(docs: &[Vec<String>]) -> Self {
        let sorted: BTreeSet<&str> = docs.iter().flatten().map(String::as_str).collect();
        Self {
            terms: sorted.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn column(&self, term: &str) -> Option<usize> {
        self.terms.get_index_of(term)
    }

    pub fn term(&self, column: usize) -> Option<&str> {
        self.terms.get_index(column).map(String::as_str)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms.contains(term)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }
}

/// Vetorizador de contagem: vocabulário + matriz documento × termo.
#[derive(Debug, Clone)]
pub struct CountVectorizer {
    analyzer: Analyzer,
    vocabulary: Option<Vocabulary>,
}

impl CountVectorizer {
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        Ok(Self {
            analyzer: Analyzer::new(config)?,
            vocabulary: None,
        })
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// `None` até o primeiro `fit_transform`.
    pub fn vocabulary(&self) -> Option<&Vocabulary> {
        self.vocabulary.as_ref()
    }

    /// Ajusta o vocabulário ao corpus e devolve sua matriz documento × termo.
    ///
    /// Registros ausentes contam como documentos vazios. A análise roda em paralelo.
    pub fn fit_transform(&mut self, docs: &[Option<String>]) -> CsMat<i64> {
        let analyzed: Vec<Vec<String>> = docs
            .par_iter()
            .map(|doc| self.analyzer.analyze(doc.as_deref().unwrap_or("")))
            .collect();
        let vocabulary = Vocabulary::from_documents(&analyzed);
        let matrix = self.count_matrix(&analyzed, &vocabulary);
        self.vocabulary = Some(vocabulary);
        matrix
    }

    /// Matriz documento × termo com o vocabulário já ajustado.
    pub fn transform<S>(&self, docs: &[S]) -> Result<CsMat<i64>>
    where
        S: AsRef<str> + Sync,
    {
        let vocabulary = self.vocabulary.as_ref().ok_or(TagError::NotFitted)?;
        let analyzed: Vec<Vec<String>> = docs
            .par_iter()
            .map(|doc| self.analyzer.analyze(doc.as_ref()))
            .collect();
        Ok(self.count_matrix(&analyzed, vocabulary))
    }

    fn count_matrix(&self, docs: &[Vec<String>], vocabulary: &Vocabulary) -> CsMat<i64> {
        let mut indptr = Vec::with_capacity(docs.len() + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for terms in docs {
            let mut counts: BTreeMap<usize, i64> = BTreeMap::new();
            for term in terms {
                if let Some(column) = vocabulary.column(term) {
                    *counts.entry(column).or_insert(0) += 1;
                }
            }
            for (column, count) in counts {
                indices.push(column);
                data.push(if self.analyzer.config.binary { 1 } else { count });
            }
            indptr.push(indices.len());
        }
        CsMat::new((docs.len(), vocabulary.len()), indptr, indices, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_vectorizer() -> CountVectorizer {
        CountVectorizer::new(AnalyzerConfig::default()).unwrap()
    }

    #[test]
    fn test_analyze_ngrams() {
        let analyzer = Analyzer::new(AnalyzerConfig::default()).unwrap();
        let terms = analyzer.analyze("Buy now CHEAP");
        assert_eq!(
            terms,
            vec!["buy", "now", "cheap", "buy now", "now cheap", "buy now cheap"]
        );
    }

    #[test]
    fn test_analyze_strips_accents_and_short_tokens() {
        let analyzer = Analyzer::new(AnalyzerConfig {
            ngram_range: (1, 1),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(analyzer.analyze("Ação é a promoção"), vec!["acao", "promocao"]);
    }

    #[test]
    fn test_invalid_ngram_range() {
        let config = AnalyzerConfig {
            ngram_range: (2, 1),
            ..Default::default()
        };
        assert!(matches!(Analyzer::new(config), Err(TagError::InvalidSpec(_))));
    }

    #[test]
    fn test_vocabulary_is_sorted() {
        let mut vectorizer = CountVectorizer::new(AnalyzerConfig {
            ngram_range: (1, 1),
            ..Default::default()
        })
        .unwrap();
        let docs = [Some("zeta alpha".to_string()), None, Some("beta".to_string())];
        let matrix = vectorizer.fit_transform(&docs);
        let vocabulary = vectorizer.vocabulary().unwrap();
        assert_eq!(vocabulary.iter().collect::<Vec<_>>(), vec!["alpha", "beta", "zeta"]);
        assert_eq!(matrix.shape(), (3, 3));
        assert_eq!(matrix.get(0, 0), Some(&1));
        assert_eq!(matrix.get(0, 2), Some(&1));
        assert_eq!(matrix.get(1, 0), None);
        assert_eq!(matrix.get(2, 1), Some(&1));
    }

    #[test]
    fn test_binary_and_counts() {
        let docs = [Some("spam spam spam".to_string())];
        let mut binary = default_vectorizer();
        let m = binary.fit_transform(&docs);
        let col = binary.vocabulary().unwrap().column("spam").unwrap();
        assert_eq!(m.get(0, col), Some(&1));

        let mut counting = CountVectorizer::new(AnalyzerConfig {
            binary: false,
            ..Default::default()
        })
        .unwrap();
        let m = counting.fit_transform(&docs);
        let col = counting.vocabulary().unwrap().column("spam spam").unwrap();
        assert_eq!(m.get(0, col), Some(&2));
    }

    #[test]
    fn test_transform_requires_fit_and_ignores_unknown_terms() {
        let mut vectorizer = default_vectorizer();
        assert!(matches!(vectorizer.transform(&["x"]), Err(TagError::NotFitted)));

        vectorizer.fit_transform(&[Some("known words".into())]);
        let m = vectorizer.transform(&["unknown known"]).unwrap();
        assert_eq!(m.nnz(), 1);
    }
}
