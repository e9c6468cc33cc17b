//! # grouptag-core — Categorização de Registros de Texto por Regras
//!
//! Este crate atribui **tags** (categorias) a uma coleção de registros de texto,
//! como descrições de transações, títulos de chamados ou linhas de log. Há dois motores:
//!
//! 1.  **Cadeia de padrões** ([`PatternTagger`]): regras ordenadas, cada uma com uma
//!     árvore de padrões e ações (`eq`, `str.contains`, `isna()`, ...). A primeira
//!     regra que casa define a tag do registro.
//! 2.  **Frases vetorizadas** ([`VectorTagger`]): uma tabela de frases-chave é
//!     comparada ao corpus por produtos de matrizes esparsas; vence a regra com
//!     mais termos em comum.
//!
//! ## Arquitetura do Motor de Padrões
//!
//! 1.  **Especificação** ([`pattern`]): regras e atualizações de configuração, em Rust ou JSON.
//! 2.  **Configuração** ([`settings`]): qual ação aplicar a cada tipo de padrão.
//! 3.  **Operações** ([`operation`]): registro tipado das ações suportadas, resolvido
//!     na construção (ação inválida falha antes de qualquer registro ser avaliado).
//! 4.  **Árvore de matchers** ([`matcher`]): AND/OR pela paridade da profundidade.
//! 5.  **Cadeia** ([`rule`]): aplica as regras só sobre os registros ainda sem tag ([`tagged`]).
//! 6.  **Saída**: uma [`Series`] de tags alinhada ao índice da entrada.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use grouptag_core::{quicktag, Prefill, Series, Spec};
//!
//! let records = Series::from_texts(["Big SALE today", "cheap flights", "hello"]);
//!
//! // Lista de padrões → OR; `case = false` ignora maiúsculas
//! let tags = quicktag(
//!     &records,
//!     [
//!         ("promo", Spec::list([Spec::text("sale"), Spec::text("discount")])),
//!         ("travel", Spec::text("flight")),
//!     ],
//!     &Prefill::Missing,
//!     false,
//!     false,
//! )?;
//!
//! assert_eq!(tags.get(0), Some("promo"));
//! assert_eq!(tags.get(1), Some("travel"));
//! assert_eq!(tags.get(2), None);
//! # Ok::<(), grouptag_core::TagError>(())
//! ```
//!
//! ```rust
//! use grouptag_core::{RuleFrame, Series, VectorTagger};
//!
//! let mut tagger = VectorTagger::new()?;
//! tagger.fit(&Series::from_texts(["buy now cheap", "no deals today"]));
//!
//! let tags = tagger.transform(&RuleFrame::from_rows([("promo", "buy cheap", 1)]))?;
//! assert_eq!(tags.get(0), Some("promo"));
//! assert_eq!(tags.get(1), None);
//! # Ok::<(), grouptag_core::TagError>(())
//! ```
//!
//! ## Módulos Principais
//!
//! - [`rule`]: `PatternTagger`, `whichtag` e `quicktag`.
//! - [`vector_tagger`]: `VectorTagger` sobre [`vectorizer`] e [`ruleframe`].
//! - [`explain`]: descrição das regras em JSON para depuração.

pub mod error;
pub mod explain;
pub mod matcher;
pub mod operation;
pub mod pattern;
pub mod rule;
pub mod ruleframe;
pub mod series;
pub mod settings;
pub mod tagged;
pub mod vector_tagger;
pub mod vectorizer;

pub use error::{Result, TagError};
pub use explain::Explain;
pub use matcher::{Logic, Matcher};
pub use pattern::{ActionSpec, ChainEntry, Pattern, Spec};
pub use rule::{quicktag, whichtag, PatternTagger, Rule, TagEvent, TagLog, Tagging};
pub use ruleframe::{fix_ruleframe, Column, ColumnValues, RuleFrame, RuleTable};
pub use series::{Prefill, Series};
pub use settings::{RawAction, Settings, SettingsEntry, SettingsKey};
pub use vector_tagger::VectorTagger;
pub use vectorizer::AnalyzerConfig;
