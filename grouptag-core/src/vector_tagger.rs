//! # VectorTagger — Tagging por Frases-Chave
//!
//! Alternativa ao [`crate::PatternTagger`] para listas grandes de regras: cada
//! regra é uma frase, e cada documento recebe a tag da regra com mais termos em
//! comum com ele.
//!
//! ## Algoritmo
//!
//! ```text
//! D  = documento × termo          (ajustado uma vez, em `fit`)
//! P  = regra × termo da frase
//! A  = regra × termo do reforço   (palavras simples trocadas pela coringa)
//! DP = D · (P − A)ᵀ               documento × regra
//! ```
//!
//! Depois do produto:
//!
//! 1. **min_terms**: de cada célula não nula subtrai-se `min_terms − 1`; o que
//!    fica ≤ 0 deixa de existir.
//! 2. **anuladoras**: onde `D · Nᵀ` também é não nulo a célula é zerada por inteiro.
//! 3. **argmax** por linha; empates ficam com a regra que aparece primeiro.
//!    Linha sem nenhum score positivo → sem tag.
//!
//! A palavra-coringa (5 letras aleatórias, fora do vocabulário) garante que as
//! palavras simples não contribuam para `A`: n-gramas que a contêm nunca
//! existem no vocabulário. Assim `P − A` retira de `P` apenas o crédito dos
//! termos formados só por palavras de reforço.
//!
//! ## Exemplo
//!
//! ```text
//! corpus: ["buy now cheap", "no deals today"]
//! regra:  ("promo", "buy cheap", 1)
//! saída:  [Some("promo"), None]
//! ```
//!
//! O estado ajustado é somente leitura em `transform`; chamadas concorrentes de
//! `transform` são seguras, um `fit` concorrente não.

use rand::Rng;
use sprs::{CsMat, CsVecView};
use tracing::{debug, warn};

use crate::error::{Result, TagError};
use crate::ruleframe::{fix_ruleframe, RuleFrame, RuleTable, RuleVectors};
use crate::series::Series;
use crate::vectorizer::{AnalyzerConfig, CountVectorizer, Vocabulary};

/// Tentativas para gerar a palavra-coringa.
pub const OOV_TRY_LIMIT: usize = 1000;
pub const OOV_LEN: usize = 5;

#[derive(Debug, Clone)]
pub struct VectorTagger<K = usize> {
    vectorizer: CountVectorizer,
    doc_term: Option<CsMat<i64>>,
    corpus_index: Vec<K>,
}

impl<K: Clone> VectorTagger<K> {
    /// Configuração padrão: n-gramas de 1 a 3, minúsculas, sem acentos, binário.
    pub fn new() -> Result<Self> {
        Self::with_config(AnalyzerConfig::default())
    }

    pub fn with_config(config: AnalyzerConfig) -> Result<Self> {
        Ok(Self {
            vectorizer: CountVectorizer::new(config)?,
            doc_term: None,
            corpus_index: Vec::new(),
        })
    }

    /// Ajusta o vocabulário ao corpus e guarda a matriz documento × termo.
    ///
    /// Um novo `fit` substitui o estado anterior por completo.
    pub fn fit(&mut self, corpus: &Series<K>) -> &mut Self {
        let doc_term = self.vectorizer.fit_transform(corpus.values());
        debug!(
            documents = corpus.len(),
            vocabulary = doc_term.cols(),
            nnz = doc_term.nnz(),
            "vectorizer ajustado"
        );
        self.doc_term = Some(doc_term);
        self.corpus_index = corpus.index().to_vec();
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.doc_term.is_some()
    }

    pub fn vocabulary(&self) -> Option<&Vocabulary> {
        self.vectorizer.vocabulary()
    }

    /// Índice do corpus visto em `fit`; a saída de `transform` é alinhada a ele.
    pub fn corpus_index(&self) -> &[K] {
        &self.corpus_index
    }

    /// Normaliza a tabela de regras e atribui uma tag a cada documento do corpus.
    pub fn transform(&self, frame: &RuleFrame) -> Result<Series<K>> {
        let table = fix_ruleframe(frame)?;
        self.transform_table(&table)
    }

    /// Como [`Self::transform`], para uma tabela já normalizada.
    pub fn transform_table(&self, table: &RuleTable) -> Result<Series<K>> {
        let doc_term = self.doc_term.as_ref().ok_or(TagError::NotFitted)?;
        let vocabulary = self.vectorizer.vocabulary().ok_or(TagError::NotFitted)?;
        let oov = oov_word(vocabulary, &mut rand::thread_rng())?;
        let vectors = RuleVectors::split(table, &oov);

        let mut phrase_term = self.vectorizer.transform(&vectors.phrases)?;
        if let Some(add_ons) = &vectors.add_ons {
            let add_on_term = self.vectorizer.transform(add_ons)?;
            phrase_term = &phrase_term - &add_on_term;
        }
        let mut doc_phrase = doc_term * &phrase_term.transpose_view().to_csr();

        if let Some(min_terms) = &vectors.min_terms {
            doc_phrase = filter_map_entries(&doc_phrase, |_, rule, score| {
                let required = i64::from(min_terms[rule]) - 1;
                Some((score - score.signum() * required).max(0))
            });
        }

        if let Some(nullifiers) = &vectors.nullifiers {
            let nullifier_term = self.vectorizer.transform(nullifiers)?;
            let doc_nullifier = doc_term * &nullifier_term.transpose_view().to_csr();
            doc_phrase = filter_map_entries(&doc_phrase, |doc, rule, score| {
                match doc_nullifier.get(doc, rule) {
                    Some(&hits) if hits != 0 => None,
                    _ => Some(score),
                }
            });
        }

        let tags: Vec<Option<String>> = doc_phrase
            .outer_iterator()
            .map(|scores| best_rule(scores).and_then(|rule| vectors.tags[rule].clone()))
            .collect();
        debug!(
            rules = table.len(),
            documents = tags.len(),
            tagged = tags.iter().filter(|t| t.is_some()).count(),
            "transform concluído"
        );
        Series::with_index(self.corpus_index.clone(), tags)
    }
}

/// Coluna do maior score positivo; no empate, a de menor índice.
fn best_rule(scores: CsVecView<'_, i64>) -> Option<usize> {
    let mut best: Option<(usize, i64)> = None;
    for (rule, &score) in scores.iter() {
        let better = match best {
            None => score > 0,
            Some((best_rule, best_score)) => {
                score > best_score || (score == best_score && rule < best_rule)
            }
        };
        if better {
            best = Some((rule, score));
        }
    }
    best.map(|(rule, _)| rule)
}

/// Reconstrói uma matriz CSR aplicando `f` a cada célula armazenada.
///
/// `None` ou zero removem a célula.
fn filter_map_entries<F>(matrix: &CsMat<i64>, mut f: F) -> CsMat<i64>
where
    F: FnMut(usize, usize, i64) -> Option<i64>,
{
    let mut indptr = Vec::with_capacity(matrix.rows() + 1);
    let mut indices = Vec::with_capacity(matrix.nnz());
    let mut data = Vec::with_capacity(matrix.nnz());
    indptr.push(0);
    for (row, entries) in matrix.outer_iterator().enumerate() {
        for (col, &value) in entries.iter() {
            if let Some(value) = f(row, col, value).filter(|v| *v != 0) {
                indices.push(col);
                data.push(value);
            }
        }
        indptr.push(indices.len());
    }
    CsMat::new(matrix.shape(), indptr, indices, data)
}

/// Palavra aleatória em minúsculas que não pertence ao vocabulário.
fn oov_word<R: Rng>(vocabulary: &Vocabulary, rng: &mut R) -> Result<String> {
    for attempt in 1..=OOV_TRY_LIMIT {
        let word: String = (0..OOV_LEN)
            .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
            .collect();
        if !vocabulary.contains(&word) {
            if attempt > 1 {
                warn!(attempt, "palavra-coringa exigiu mais de uma tentativa");
            }
            return Ok(word);
        }
    }
    Err(TagError::OovExhausted {
        attempts: OOV_TRY_LIMIT,
    })
}
