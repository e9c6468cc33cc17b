//! # Especificação de Regras
//!
//! Uma regra é declarada como uma estrutura aninhada:
//!
//! - um **escalar** (padrão literal), abreviação de "tag igual ao padrão";
//! - uma **sequência** cujo primeiro elemento é a tag e os demais são
//!   especificadores padrão-ação, cada um possivelmente um grupo aninhado;
//! - um **mapeamento** padrão → ação, em que cada entrada é um especificador.
//!
//! A lógica de combinação (AND/OR) não é declarada: ela é inferida pela
//! paridade da profundidade de aninhamento (ver [`crate::matcher`]).
//!
//! ## Forma JSON
//!
//! | JSON                      | Significado                                  |
//! |---------------------------|----------------------------------------------|
//! | `"texto"`                 | padrão de texto                              |
//! | `null`                    | padrão "valor ausente"                       |
//! | `[...]`                   | sequência aninhada                           |
//! | `{"p": ação, ...}`        | grupo padrão → ação                          |
//! | `{"$set": ["a", "b"]}`    | padrão conjunto (operação `isin`)            |
//! | `{"$na": ação}`           | padrão "valor ausente" com ação explícita    |
//!
//! Na cadeia de regras, um objeto no nível superior é uma atualização de settings.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Result, TagError};
use crate::settings::{RawAction, SettingsEntry};

pub const SET_KEY: &str = "$set";
pub const NA_KEY: &str = "$na";

/// Predicado arbitrário sobre um registro (`None` = registro ausente).
pub type Predicate = Arc<dyn Fn(Option<&str>) -> bool + Send + Sync>;

/// Padrão atômico.
#[derive(Clone)]
pub enum Pattern {
    /// Texto literal (ou regex, conforme a ação)
    Text(String),
    /// Casa registros ausentes
    Missing,
    /// Conjunto de valores aceitos, para `isin`
    Set(BTreeSet<String>),
    /// Predicado aplicado a cada registro, para `apply`
    Function(Predicate),
}

impl Pattern {
    pub fn text(text: impl Into<String>) -> Self {
        Pattern::Text(text.into())
    }

    pub fn set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Pattern::Set(items.into_iter().map(Into::into).collect())
    }

    pub fn function<F>(predicate: F) -> Self
    where
        F: Fn(Option<&str>) -> bool + Send + Sync + 'static,
    {
        Pattern::Function(Arc::new(predicate))
    }

    /// Nome do tipo, usado como chave de resolução de ações nas settings.
    pub fn type_name(&self) -> &'static str {
        match self {
            Pattern::Text(_) => "str",
            Pattern::Missing => "NAType",
            Pattern::Set(_) => "set",
            Pattern::Function(_) => "function",
        }
    }

    /// Cópia em minúsculas (textos e elementos de conjuntos).
    pub fn lowercased(&self) -> Pattern {
        match self {
            Pattern::Text(t) => Pattern::Text(t.to_lowercase()),
            Pattern::Set(items) => Pattern::Set(items.iter().map(|s| s.to_lowercase()).collect()),
            other => other.clone(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Pattern::Text(t) => Value::String(t.clone()),
            Pattern::Missing => Value::Null,
            Pattern::Set(items) => {
                let mut map = serde_json::Map::new();
                map.insert(SET_KEY.to_string(), serde_json::json!(items));
                Value::Object(map)
            }
            Pattern::Function(_) => Value::String("<function>".to_string()),
        }
    }

    fn from_scalar(value: &Value) -> Pattern {
        match value {
            Value::String(s) => Pattern::Text(s.clone()),
            Value::Null => Pattern::Missing,
            other => Pattern::Text(other.to_string()),
        }
    }

    fn from_key(key: &str) -> Pattern {
        if key == NA_KEY {
            Pattern::Missing
        } else {
            Pattern::Text(key.to_string())
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Text(t) => f.debug_tuple("Text").field(t).finish(),
            Pattern::Missing => f.write_str("Missing"),
            Pattern::Set(items) => f.debug_tuple("Set").field(items).finish(),
            Pattern::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Pattern::Text(a), Pattern::Text(b)) => a == b,
            (Pattern::Missing, Pattern::Missing) => true,
            (Pattern::Set(a), Pattern::Set(b)) => a == b,
            (Pattern::Function(a), Pattern::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for Pattern {
    fn from(text: &str) -> Self {
        Pattern::Text(text.to_string())
    }
}

/// Como a ação de um padrão foi especificada.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionSpec {
    /// Busca direta nas settings por chave numérica
    Key(i64),
    /// Ação ad-hoc, interpretada isoladamente
    Raw(RawAction),
}

impl ActionSpec {
    fn from_json(value: &Value) -> Result<Option<ActionSpec>> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_i64()
                .map(|n| Some(ActionSpec::Key(n)))
                .ok_or_else(|| TagError::InvalidSpec(format!("chave de ação não inteira: {n}"))),
            Value::String(_) | Value::Object(_) => {
                Ok(Some(ActionSpec::Raw(RawAction::from_json(value))))
            }
            other => Err(TagError::InvalidSpec(format!(
                "ação precisa ser string, número ou objeto, recebido: {other}"
            ))),
        }
    }
}

impl From<&str> for ActionSpec {
    fn from(grammar: &str) -> Self {
        ActionSpec::Raw(RawAction::from(grammar))
    }
}

/// Nó de uma especificação de regra.
#[derive(Debug, Clone, PartialEq)]
pub enum Spec {
    /// Padrão literal; a ação é resolvida pelo tipo
    Pattern(Pattern),
    /// Entradas padrão → ação (`None` = resolver pelo tipo)
    Map(Vec<(Pattern, Option<ActionSpec>)>),
    List(Vec<Spec>),
}

impl Spec {
    pub fn text(text: impl Into<String>) -> Self {
        Spec::Pattern(Pattern::text(text))
    }

    /// Entrada única padrão → ação.
    pub fn action(pattern: impl Into<Pattern>, action: impl Into<ActionSpec>) -> Self {
        Spec::Map(vec![(pattern.into(), Some(action.into()))])
    }

    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Spec>,
    {
        Spec::List(items.into_iter().collect())
    }

    pub fn from_json(value: &Value) -> Result<Spec> {
        match value {
            Value::Array(items) => Ok(Spec::List(
                items.iter().map(Spec::from_json).collect::<Result<_>>()?,
            )),
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(Value::Array(items)) = map.get(SET_KEY) {
                        return Ok(Spec::Pattern(Pattern::Set(set_items(items)?)));
                    }
                }
                let entries = map
                    .iter()
                    .map(|(key, action)| {
                        Ok((Pattern::from_key(key), ActionSpec::from_json(action)?))
                    })
                    .collect::<Result<_>>()?;
                Ok(Spec::Map(entries))
            }
            scalar => Ok(Spec::Pattern(Pattern::from_scalar(scalar))),
        }
    }
}

impl From<Pattern> for Spec {
    fn from(pattern: Pattern) -> Self {
        Spec::Pattern(pattern)
    }
}

impl From<&str> for Spec {
    fn from(text: &str) -> Self {
        Spec::text(text)
    }
}

fn set_items(items: &[Value]) -> Result<BTreeSet<String>> {
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            other => Err(TagError::InvalidSpec(format!(
                "elementos de '{SET_KEY}' precisam ser strings, recebido: {other}"
            ))),
        })
        .collect()
}

/// Entrada de uma cadeia de regras.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainEntry {
    /// Atualiza as settings das regras seguintes
    Settings(Vec<SettingsEntry>),
    Rule(Spec),
}

impl ChainEntry {
    pub fn from_json(value: &Value) -> Result<ChainEntry> {
        match value {
            Value::Object(_) => Ok(ChainEntry::Settings(SettingsEntry::from_json(value)?)),
            other => Ok(ChainEntry::Rule(Spec::from_json(other)?)),
        }
    }

    /// Lê uma cadeia completa (array JSON).
    pub fn chain_from_json(value: &Value) -> Result<Vec<ChainEntry>> {
        let items = value.as_array().ok_or_else(|| {
            TagError::InvalidSpec(format!(
                "cadeia de regras precisa ser um array, recebido: {value}"
            ))
        })?;
        items.iter().map(ChainEntry::from_json).collect()
    }
}

impl From<Spec> for ChainEntry {
    fn from(spec: Spec) -> Self {
        ChainEntry::Rule(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_spec_from_json_shapes() {
        let spec = Spec::from_json(&json!(["promo", {"sale": null, "deal": "~eq"}, null])).unwrap();
        let Spec::List(items) = spec else { panic!("esperava lista") };
        assert_eq!(items[0], Spec::text("promo"));
        assert_eq!(
            items[1],
            Spec::Map(vec![
                (Pattern::text("sale"), None),
                (Pattern::text("deal"), Some(ActionSpec::from("~eq"))),
            ])
        );
        assert_eq!(items[2], Spec::Pattern(Pattern::Missing));
    }

    #[test]
    fn test_set_and_na_keys() {
        assert_eq!(
            Spec::from_json(&json!({"$set": ["b", "a"]})).unwrap(),
            Spec::Pattern(Pattern::set(["a", "b"]))
        );
        assert_eq!(
            Spec::from_json(&json!({"$na": "isna()"})).unwrap(),
            Spec::action(Pattern::Missing, "isna()")
        );
        assert!(Spec::from_json(&json!({"$set": [1]})).is_err());
    }

    #[test]
    fn test_numeric_action_key() {
        let spec = Spec::from_json(&json!({"x": 2})).unwrap();
        assert_eq!(spec, Spec::Map(vec![(Pattern::text("x"), Some(ActionSpec::Key(2)))]));
        assert!(Spec::from_json(&json!({"x": [1]})).is_err());
    }

    #[test]
    fn test_chain_objects_are_settings() {
        let chain = ChainEntry::chain_from_json(&json!([{"series.lower": true}, "a"])).unwrap();
        assert_eq!(chain[0], ChainEntry::Settings(vec![SettingsEntry::SeriesLower(true)]));
        assert_eq!(chain[1], ChainEntry::Rule(Spec::text("a")));
    }

    #[test]
    fn test_lowercased_pattern() {
        assert_eq!(Pattern::text("AbC").lowercased(), Pattern::text("abc"));
        assert_eq!(Pattern::set(["X", "y"]).lowercased(), Pattern::set(["x", "y"]));
        assert_eq!(Pattern::Missing.lowercased(), Pattern::Missing);
    }
}
