//! Tipos de erro do motor de tagging.
//!
//! Todos os erros são fatais: representam configuração inválida (regras,
//! ações, tabelas de frases) ou uso incorreto da API, nunca condições por
//! registro. Não há camada de retry nem supressão de resultados parciais.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TagError {
    /// Especificação de regra malformada (grupo vazio, tag ausente, etc.)
    #[error("especificação inválida: {0}")]
    InvalidSpec(String),

    /// Ação irresolúvel: método desconhecido, alvo não chamável, kwargs inválidos
    #[error("ação inválida '{action}': {reason}")]
    InvalidAction { action: String, reason: String },

    /// Padrão de tipo incompatível com a operação resolvida
    #[error("padrão inválido para '{operation}': esperado {expected}")]
    InvalidPattern {
        operation: &'static str,
        expected: &'static str,
    },

    #[error("regex inválida: {0}")]
    Regex(#[from] regex::Error),

    /// Colunas obrigatórias ausentes na tabela de frases
    #[error("colunas obrigatórias ausentes na tabela de regras: {}", columns.join(", "))]
    MissingColumns { columns: Vec<&'static str> },

    #[error("coluna '{column}' inválida: {reason}")]
    InvalidColumn { column: String, reason: String },

    #[error("tamanhos incompatíveis: esperado {expected}, recebido {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// `transform` chamado antes de `fit`
    #[error("VectorTagger ainda não foi ajustado: chame `fit` antes de `transform`")]
    NotFitted,

    #[error("não foi possível gerar palavra fora do vocabulário após {attempts} tentativas")]
    OovExhausted { attempts: usize },
}

pub type Result<T> = std::result::Result<T, TagError>;

impl TagError {
    pub(crate) fn action(action: impl Into<String>, reason: impl Into<String>) -> Self {
        TagError::InvalidAction {
            action: action.into(),
            reason: reason.into(),
        }
    }
}
