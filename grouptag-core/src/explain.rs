//! # Explain — Introspecção das Regras
//!
//! Cada tipo da árvore sabe descrever a si mesmo em JSON, para depuração:
//!
//! - átomo: `{"pattern": ..., "method": ..., "base"?, "negate"?, "noargs"?, "kwargs"?}`
//! - grupo: `[{"logic": "AND"|"OR"}, filho, filho, ...]`
//! - regra: `{"tag": ...}` fundido com a explicação do matcher
//! - cadeia: mudanças de pré-processamento intercaladas com as regras

use serde_json::{json, Map, Value};

use crate::matcher::{AtomicMatcher, GroupMatcher, Matcher};
use crate::rule::{PatternTagger, Rule, RuleLog, TagLog};
use crate::settings::{PATTERNS_LOWER_KEY, SERIES_LOWER_KEY};

pub trait Explain {
    fn explain(&self) -> Value;
}

impl Explain for AtomicMatcher {
    fn explain(&self) -> Value {
        let mut explanation = Map::new();
        explanation.insert("pattern".into(), self.pattern().to_json());
        if let Ok(Value::Object(action)) = serde_json::to_value(self.action()) {
            explanation.extend(action);
        }
        Value::Object(explanation)
    }
}

impl Explain for GroupMatcher {
    fn explain(&self) -> Value {
        let mut explanation = vec![json!({"logic": self.logic().label()})];
        explanation.extend(self.children().iter().map(Explain::explain));
        Value::Array(explanation)
    }
}

impl Explain for Matcher {
    fn explain(&self) -> Value {
        match self {
            Matcher::Atomic(m) => m.explain(),
            Matcher::Group(g) => g.explain(),
        }
    }
}

impl Explain for Rule {
    fn explain(&self) -> Value {
        self.explain_rule(None)
    }
}

impl Rule {
    /// Como [`Explain::explain`], com `reached`/`matched` da última execução.
    pub fn explain_with_log(&self, log: &RuleLog) -> Value {
        self.explain_rule(Some(log))
    }

    fn explain_rule(&self, log: Option<&RuleLog>) -> Value {
        let mut head = Map::new();
        head.insert("tag".into(), Value::String(self.tag().to_string()));
        if let Some(log) = log {
            head.insert("reached".into(), Value::Bool(log.reached));
            if let Some(matched) = log.matched {
                head.insert("matched".into(), json!(matched));
            }
        }
        merge_rule(head, self.matcher().explain())
    }
}

impl Explain for PatternTagger {
    fn explain(&self) -> Value {
        Value::Array(self.explain_rules(None))
    }
}

impl PatternTagger {
    /// Como [`Explain::explain`], incluindo o diagnóstico de uma execução.
    pub fn explain_with_log(&self, log: &TagLog) -> Value {
        let mut explanation = self.explain_rules(Some(&log.rules));
        explanation.push(json!({
            "series.size": log.size,
            "tagged": log.tagged,
            "untagged": log.untagged,
        }));
        Value::Array(explanation)
    }

    fn explain_rules(&self, logs: Option<&[RuleLog]>) -> Vec<Value> {
        let mut explanation = Vec::new();
        let mut active = (false, false);
        for (i, rule) in self.rules().iter().enumerate() {
            let settings = rule.settings();
            let current = (settings.series_lower(), settings.patterns_lower());
            let mut changed = Map::new();
            if current.0 != active.0 {
                changed.insert(SERIES_LOWER_KEY.into(), Value::Bool(current.0));
            }
            if current.1 != active.1 {
                changed.insert(PATTERNS_LOWER_KEY.into(), Value::Bool(current.1));
            }
            if !changed.is_empty() {
                explanation.push(Value::Object(changed));
                active = current;
            }

            explanation.push(rule.explain_rule(logs.and_then(|logs| logs.get(i))));
        }
        explanation
    }
}

/// Funde o cabeçalho da regra com a explicação do matcher.
///
/// Átomo: um único objeto. Grupo: o cabeçalho é fundido ao primeiro elemento (`logic`).
fn merge_rule(mut head: Map<String, Value>, matcher: Value) -> Value {
    match matcher {
        Value::Object(atom) => {
            head.extend(atom);
            Value::Object(head)
        }
        Value::Array(mut group) => {
            match group.first_mut() {
                Some(Value::Object(first)) => {
                    head.extend(std::mem::take(first));
                    group[0] = Value::Object(head);
                }
                _ => group.insert(0, Value::Object(head)),
            }
            Value::Array(group)
        }
        other => {
            head.insert("matcher".into(), other);
            Value::Object(head)
        }
    }
}
