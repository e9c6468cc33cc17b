//! # Cadeia de Regras — PatternTagger com Eventos Observáveis
//!
//! Uma [`Rule`] é uma tag mais uma árvore de matchers. O [`PatternTagger`]
//! aplica as regras em ordem, cada uma apenas sobre os registros que ainda não
//! têm tag, e para assim que todos estiverem marcados.
//!
//! ## Construção
//!
//! A cadeia é uma sequência de [`ChainEntry`]:
//! - `Settings(...)`: atualiza a configuração corrente, afetando só as regras seguintes;
//! - `Rule(spec)`: constrói uma regra com o snapshot corrente das settings.
//!
//! ## Execução
//!
//! Como o pipeline do NER, a execução emite eventos por um canal (`mpsc`),
//! permitindo acompanhar cada regra. [`PatternTagger::tag`] consome esses
//! eventos e monta um [`TagLog`].

use std::sync::{mpsc, Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, TagError};
use crate::matcher::Matcher;
use crate::pattern::{ChainEntry, Pattern, Spec};
use crate::series::{Prefill, Series};
use crate::settings::{RawAction, Settings, SettingsEntry, SettingsKey};
use crate::tagged::TaggedSeries;

/// Nível da raiz de uma regra: AND
pub const TOP_LEVEL: usize = 0;

/// Uma regra: tag + matcher + o snapshot das settings da sua posição na cadeia.
#[derive(Debug, Clone)]
pub struct Rule {
    tag: String,
    matcher: Matcher,
    settings: Arc<Settings>,
}

impl Rule {
    /// Constrói a regra a partir de uma especificação.
    ///
    /// - `[tag, espec...]`: o primeiro elemento é a tag, o resto é o corpo;
    /// - `"texto"`: abreviação de `["texto", "texto"]`.
    pub fn new(spec: &Spec, settings: Arc<Settings>) -> Result<Self> {
        let (tag, body) = match spec {
            Spec::List(items) => {
                let (head, rest) = items
                    .split_first()
                    .ok_or_else(|| TagError::InvalidSpec("regra vazia".into()))?;
                let Spec::Pattern(Pattern::Text(tag)) = head else {
                    return Err(TagError::InvalidSpec(format!(
                        "a tag precisa ser texto, recebido: {head:?}"
                    )));
                };
                (tag.clone(), Spec::List(rest.to_vec()))
            }
            Spec::Pattern(Pattern::Text(tag)) => (tag.clone(), Spec::List(vec![spec.clone()])),
            other => {
                return Err(TagError::InvalidSpec(format!(
                    "regra precisa ser sequência ou texto, recebido: {other:?}"
                )))
            }
        };
        let matcher = Matcher::build(&body, TOP_LEVEL, &settings)?;
        Ok(Self {
            tag,
            matcher,
            settings,
        })
    }

    /// Avalia a regra sobre os registros untagged e marca os que casarem.
    pub fn apply<K>(&self, tagged: &mut TaggedSeries<'_, K>) -> Result<usize> {
        tagged.use_lowercase(self.settings.series_lower());
        let mask = {
            let values = tagged.untagged();
            self.matcher.evaluate(&values)
        };
        tagged.assign(&mask, &self.tag)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

/// Eventos emitidos durante a execução da cadeia.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TagEvent {
    /// Uma regra foi avaliada.
    RuleApplied {
        rule_index: usize,
        tag: String,
        matched: usize,
        remaining: usize,
    },
    /// Todos os registros já têm tag; as regras a partir de `rule_index` não rodam.
    Stopped { rule_index: usize },
    /// **Conclusão**: estatísticas finais.
    Done {
        size: usize,
        tagged: usize,
        untagged: usize,
    },
}

/// Diagnóstico de uma regra na última execução.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleLog {
    pub reached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<usize>,
}

/// Diagnóstico de uma execução completa.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagLog {
    pub size: usize,
    pub tagged: usize,
    pub untagged: usize,
    pub rules: Vec<RuleLog>,
}

impl TagLog {
    fn new(rule_count: usize) -> Self {
        Self {
            rules: vec![RuleLog::default(); rule_count],
            ..Default::default()
        }
    }

    fn record(&mut self, event: &TagEvent) {
        match event {
            TagEvent::RuleApplied {
                rule_index, matched, ..
            } => {
                if let Some(log) = self.rules.get_mut(*rule_index) {
                    log.reached = true;
                    log.matched = Some(*matched);
                }
            }
            TagEvent::Stopped { .. } => {}
            TagEvent::Done {
                size,
                tagged,
                untagged,
            } => {
                self.size = *size;
                self.tagged = *tagged;
                self.untagged = *untagged;
            }
        }
    }
}

/// Resultado de [`PatternTagger::tag`].
#[derive(Debug, Clone)]
pub struct Tagging<K> {
    pub tags: Series<K>,
    pub log: TagLog,
}

/// A cadeia de regras.
#[derive(Debug, Clone)]
pub struct PatternTagger {
    rules: Vec<Rule>,
}

impl PatternTagger {
    /// Constrói a cadeia, partindo das settings padrão.
    pub fn new(chain: &[ChainEntry]) -> Result<Self> {
        let mut settings = Arc::new(Settings::default());
        let mut rules = Vec::new();
        for entry in chain {
            match entry {
                ChainEntry::Settings(entries) => settings = Arc::new(settings.updated(entries)),
                ChainEntry::Rule(spec) => rules.push(Rule::new(spec, Arc::clone(&settings))?),
            }
        }
        Ok(Self { rules })
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        Self::new(&ChainEntry::chain_from_json(value)?)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Executa a cadeia de forma síncrona e retorna as tags com o diagnóstico.
    pub fn tag<K: Clone>(&self, series: &Series<K>, prefill: &Prefill) -> Result<Tagging<K>> {
        let (tx, rx) = mpsc::channel();
        let tags = self.tag_streaming(series, prefill, tx)?;
        let mut log = TagLog::new(self.rules.len());
        while let Ok(event) = rx.recv() {
            log.record(&event);
        }
        Ok(Tagging { tags, log })
    }

    /// Executa a cadeia enviando eventos de progresso em `tx`.
    ///
    /// Eventos: `RuleApplied` por regra avaliada, `Stopped` se a cadeia
    /// terminou antes da última regra, e `Done` ao final.
    pub fn tag_streaming<K: Clone>(
        &self,
        series: &Series<K>,
        prefill: &Prefill,
        tx: mpsc::Sender<TagEvent>,
    ) -> Result<Series<K>> {
        let mut tagged = TaggedSeries::new(series, prefill)?;

        for (rule_index, rule) in self.rules.iter().enumerate() {
            if tagged.is_complete() {
                debug!(rule_index, "todos os registros já têm tag, encerrando a cadeia");
                let _ = tx.send(TagEvent::Stopped { rule_index });
                break;
            }
            let matched = rule.apply(&mut tagged)?;
            let remaining = tagged.untagged_index().len();
            debug!(rule_index, tag = rule.tag(), matched, remaining, "regra aplicada");
            let _ = tx.send(TagEvent::RuleApplied {
                rule_index,
                tag: rule.tag.clone(),
                matched,
                remaining,
            });
        }

        let size = tagged.len();
        let untagged = tagged.untagged_index().len();
        info!(size, tagged = size - untagged, untagged, "tagging concluído");
        let _ = tx.send(TagEvent::Done {
            size,
            tagged: size - untagged,
            untagged,
        });
        Ok(tagged.into_tags())
    }
}

/// Aplica uma cadeia de regras e retorna as tags alinhadas ao índice da série.
pub fn whichtag<K: Clone>(
    series: &Series<K>,
    chain: &[ChainEntry],
    prefill: &Prefill,
) -> Result<Series<K>> {
    Ok(PatternTagger::new(chain)?.tag(series, prefill)?.tags)
}

/// Traduz um mapeamento tag → padrão(ões) em uma cadeia de regras.
///
/// Uma lista de padrões vira um grupo OR; uma lista dentro de uma lista
/// (`[[a, b]]`) abre como corpo da regra e vira AND.
/// Padrões regex nunca são convertidos para minúsculas.
pub fn quick_chain<I, S>(rules: I, case: bool, regex: bool) -> Vec<ChainEntry>
where
    I: IntoIterator<Item = (S, Spec)>,
    S: Into<String>,
{
    let settings = vec![
        SettingsEntry::SeriesLower(!case),
        SettingsEntry::PatternsLower(!(case || regex)),
        SettingsEntry::action(
            SettingsKey::name("str"),
            RawAction::method(
                "str.contains",
                serde_json::json!({"case": true, "regex": regex}),
            ),
        ),
    ];
    let mut chain = vec![ChainEntry::Settings(settings)];
    for (tag, patterns) in rules {
        let tag = Spec::text(tag);
        let body = match patterns {
            Spec::List(items) => match <[Spec; 1]>::try_from(items) {
                Ok([Spec::List(inner)]) => inner,
                Ok([single]) => vec![Spec::List(vec![single])],
                Err(items) => vec![Spec::List(items)],
            },
            other => vec![other],
        };
        let rule = std::iter::once(tag).chain(body).collect();
        chain.push(ChainEntry::Rule(Spec::List(rule)));
    }
    chain
}

/// Forma rápida: tag → padrão(ões), com sensibilidade a maiúsculas e modo regex.
pub fn quicktag<K, I, S>(
    series: &Series<K>,
    rules: I,
    prefill: &Prefill,
    case: bool,
    regex: bool,
) -> Result<Series<K>>
where
    K: Clone,
    I: IntoIterator<Item = (S, Spec)>,
    S: Into<String>,
{
    whichtag(series, &quick_chain(rules, case, regex), prefill)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tags(series: &Series, chain: Value) -> Vec<Option<String>> {
        let chain = ChainEntry::chain_from_json(&chain).unwrap();
        whichtag(series, &chain, &Prefill::Missing)
            .unwrap()
            .values()
            .to_vec()
    }

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let series = Series::from_texts(["red apple", "green apple", "banana"]);
        let result = tags(&series, json!([["red", "red"], ["fruit", "apple"]]));
        assert_eq!(result, vec![s("red"), s("fruit"), None]);
    }

    #[test]
    fn test_scalar_rule_is_tag_equals_pattern() {
        let series = Series::from_texts(["banana split", "apple"]);
        assert_eq!(tags(&series, json!(["banana"])), vec![s("banana"), None]);
    }

    #[test]
    fn test_or_group_at_depth_one() {
        let series = Series::from_texts(["a", "b", "c"]);
        let result = tags(&series, json!([["ab", {"a": "eq", "b": "eq"}]]));
        assert_eq!(result, vec![s("ab"), s("ab"), None]);

        let and_result = tags(&series, json!([["ab", {"a": "eq"}, {"b": "eq"}]]));
        assert_eq!(and_result, vec![None, None, None]);
    }

    #[test]
    fn test_settings_apply_only_to_following_rules() {
        let series = Series::from_texts(["ALPHA", "BETA"]);
        let result = tags(
            &series,
            json!([
                ["first", "alpha"],
                {"series.lower": true},
                ["second", "beta"]
            ]),
        );
        assert_eq!(result, vec![None, s("second")]);

        let chain = ChainEntry::chain_from_json(&json!([
            ["a", "x"],
            {"series.lower": true},
            ["b", "y"]
        ]))
        .unwrap();
        let tagger = PatternTagger::new(&chain).unwrap();
        assert!(!tagger.rules()[0].settings().series_lower());
        assert!(tagger.rules()[1].settings().series_lower());
    }

    #[test]
    fn test_early_termination_skips_rules() {
        let series = Series::from_texts(["x", "y"]);
        let chain = ChainEntry::chain_from_json(&json!([
            ["all", {"": "str.contains"}],
            ["never", "x"]
        ]))
        .unwrap();
        let tagger = PatternTagger::new(&chain).unwrap();
        let result = tagger.tag(&series, &Prefill::Missing).unwrap();
        assert_eq!(result.tags.values(), &[s("all"), s("all")]);
        assert_eq!(result.log.rules[0], RuleLog { reached: true, matched: Some(2) });
        assert_eq!(result.log.rules[1], RuleLog::default());
        assert_eq!((result.log.size, result.log.tagged, result.log.untagged), (2, 2, 0));
    }

    #[test]
    fn test_streaming_events_are_monotonic() {
        let series = Series::from_texts(["a1", "a2", "b1", "c1"]);
        let chain =
            ChainEntry::chain_from_json(&json!([["a", "a"], ["b", "b"], ["z", "zzz"]])).unwrap();
        let tagger = PatternTagger::new(&chain).unwrap();
        let (tx, rx) = mpsc::channel();
        tagger.tag_streaming(&series, &Prefill::Missing, tx).unwrap();
        let remaining: Vec<usize> = rx
            .iter()
            .filter_map(|e| match e {
                TagEvent::RuleApplied { remaining, .. } => Some(remaining),
                _ => None,
            })
            .collect();
        assert_eq!(remaining, vec![2, 1, 1]);
    }

    #[test]
    fn test_prefill_kept_for_unmatched() {
        let series = Series::from_texts(["a", "b"]);
        let chain = ChainEntry::chain_from_json(&json!([["A", "a"]])).unwrap();
        let result = whichtag(&series, &chain, &Prefill::from("other")).unwrap();
        assert_eq!(result.values(), &[s("A"), s("other")]);
    }

    #[test]
    fn test_per_record_prefill_kept_for_unmatched() {
        let series = Series::from_texts(["a", "b", "c"]);
        let chain = ChainEntry::chain_from_json(&json!([["A", "a"]])).unwrap();
        let prefill = Prefill::PerRecord(vec![s("p0"), s("p1"), None]);
        let result = whichtag(&series, &chain, &prefill).unwrap();
        assert_eq!(result.values(), &[s("A"), s("p1"), None]);

        let short = Prefill::PerRecord(vec![s("p0")]);
        assert!(matches!(
            whichtag(&series, &chain, &short),
            Err(TagError::LengthMismatch { expected: 3, actual: 1 })
        ));
    }

    #[test]
    fn test_invalid_rules() {
        assert!(PatternTagger::from_json(&json!([[]])).is_err());
        assert!(PatternTagger::from_json(&json!([["tag"]])).is_err());
        assert!(PatternTagger::from_json(&json!([[null, "x"]])).is_err());
        assert!(PatternTagger::from_json(&json!([["t", {"x": "nope"}]])).is_err());
    }

    #[test]
    fn test_quicktag_case_and_lists() {
        let series = Series::from_texts(["Cheap Sale", "cheap", "SALE today"]);
        let rules = vec![
            ("both", Spec::list([Spec::list([Spec::text("CHEAP"), Spec::text("sale")])])),
            ("any", Spec::list([Spec::text("cheap"), Spec::text("sale")])),
        ];
        let result = quicktag(&series, rules.clone(), &Prefill::Missing, false, false).unwrap();
        assert_eq!(result.values(), &[s("both"), s("any"), s("any")]);

        let sensitive = quicktag(&series, rules, &Prefill::Missing, true, false).unwrap();
        assert_eq!(sensitive.values(), &[None, s("any"), None]);
    }

    #[test]
    fn test_quicktag_regex_keeps_pattern_case() {
        let series = Series::from_texts(["Order 42", "order x"]);
        let rules = vec![("num", Spec::text(r"order \d+"))];
        let result = quicktag(&series, rules, &Prefill::Missing, false, true).unwrap();
        assert_eq!(result.values(), &[s("num"), None]);
    }
}
