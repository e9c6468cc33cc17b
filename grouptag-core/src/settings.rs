//! # Settings — Configuração de Ações
//!
//! Cada padrão atômico de uma regra precisa de uma **ação**: qual operação de
//! matching aplicar aos registros. A ação pode ser dada explicitamente ao lado
//! do padrão ou resolvida pelas settings, a partir do tipo do padrão.
//!
//! ## Mini-gramática de ações
//!
//! Uma ação em forma de string tem três partes opcionais:
//!
//! | Parte           | Exemplo         | Efeito                               |
//! |-----------------|-----------------|--------------------------------------|
//! | prefixo `~`     | `~eq`           | nega a máscara resultante            |
//! | caminho `a.b`   | `str.contains`  | `base` = `str`, `method` = `contains`|
//! | sufixo `()`     | `isna()`        | o método não recebe o padrão         |
//!
//! Exemplo completo: `"~str.contains()"` → negate, base `str`, método `contains`, sem argumentos.
//!
//! A forma de mapeamento `{"str.contains": {"case": false}}` adiciona kwargs.
//!
//! ## Imutabilidade
//!
//! [`Settings`] é um valor imutável: [`Settings::updated`] devolve uma nova
//! configuração. Cada regra guarda um `Arc` da configuração vigente no ponto
//! em que foi construída, então atualizações posteriores na cadeia nunca a afetam.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TagError};
use crate::pattern::{ActionSpec, Pattern};

/// Prefixo de negação
pub const NEG_PREFIX: &str = "~";
/// Sufixo de método sem argumentos
pub const NOARGS_SUFFIX: &str = "()";

/// Chaves reservadas de pré-processamento (não são ações)
pub const SERIES_LOWER_KEY: &str = "series.lower";
pub const PATTERNS_LOWER_KEY: &str = "patterns.lower";
/// Chave JSON da ação padrão
pub const DEFAULT_KEY: &str = "default";

/// Chave de uma ação nas settings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingsKey {
    /// Ação usada quando nenhuma outra chave resolve
    Default,
    /// Nome de tipo de padrão: `str`, `NAType`, `set`, `function`
    Name(String),
    /// Chave numérica, referenciada por especificadores de ação numéricos
    Number(i64),
}

impl SettingsKey {
    pub fn name(name: impl Into<String>) -> Self {
        SettingsKey::Name(name.into())
    }

    /// Interpreta uma chave de objeto JSON.
    pub fn from_json_key(key: &str) -> Self {
        if key == DEFAULT_KEY {
            SettingsKey::Default
        } else if let Ok(n) = key.parse::<i64>() {
            SettingsKey::Number(n)
        } else {
            SettingsKey::Name(key.to_string())
        }
    }
}

/// Ação em forma bruta, como escrita pelo usuário.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawAction {
    /// String da mini-gramática, ex: `"~str.contains()"`
    Grammar(String),
    /// Mapeamento de entrada única `{método: kwargs}`
    Method { method: String, kwargs: Value },
}

impl RawAction {
    pub fn method(method: impl Into<String>, kwargs: Value) -> Self {
        RawAction::Method {
            method: method.into(),
            kwargs,
        }
    }

    /// Converte um valor JSON. Nunca falha: entradas vazias ou de tipo
    /// inesperado viram uma ação sem método, rejeitada mais tarde na resolução.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => RawAction::Grammar(s.clone()),
            Value::Object(map) => match map.iter().next() {
                Some((method, kwargs)) => RawAction::method(method.clone(), kwargs.clone()),
                None => RawAction::Grammar(String::new()),
            },
            _ => RawAction::Grammar(String::new()),
        }
    }
}

impl From<&str> for RawAction {
    fn from(grammar: &str) -> Self {
        RawAction::Grammar(grammar.to_string())
    }
}

impl fmt::Display for RawAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawAction::Grammar(s) => write!(f, "{s}"),
            RawAction::Method { method, kwargs } => write!(f, "{{{method}: {kwargs}}}"),
        }
    }
}

/// Ação normalizada.
///
/// `method` ausente significa que a ação não pôde ser interpretada; a
/// validade é verificada na resolução da operação, não aqui.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub negate: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub noargs: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kwargs: Option<Value>,
}

impl ActionDescriptor {
    /// Caminho completo do método, ex: `str.contains`
    pub fn path(&self) -> String {
        match (&self.base, &self.method) {
            (Some(base), Some(method)) => format!("{base}.{method}"),
            (None, Some(method)) => method.clone(),
            (_, None) => String::new(),
        }
    }
}

/// Interpreta uma ação bruta em um [`ActionDescriptor`].
pub fn parse_action(raw: &RawAction) -> ActionDescriptor {
    let (text, kwargs) = match raw {
        RawAction::Grammar(s) => (s.as_str(), None),
        RawAction::Method { method, kwargs } => (method.as_str(), Some(kwargs)),
    };

    let mut descriptor = ActionDescriptor {
        kwargs: kwargs.filter(|k| is_truthy(k)).cloned(),
        ..Default::default()
    };
    if text.is_empty() {
        return descriptor;
    }

    let mut text = text;
    if let Some(rest) = text.strip_prefix(NEG_PREFIX) {
        descriptor.negate = true;
        text = rest;
    }
    if let Some(rest) = text.strip_suffix(NOARGS_SUFFIX) {
        descriptor.noargs = true;
        text = rest;
    }

    let path = text.trim().trim_matches('.');
    let (base, method) = match path.rsplit_once('.') {
        Some((base, method)) => (Some(base), method),
        None => (None, path),
    };
    descriptor.base = base.filter(|b| !b.is_empty()).map(str::to_string);
    descriptor.method = Some(method).filter(|m| !m.is_empty()).map(str::to_string);
    descriptor
}

/// kwargs vazios (null, `{}`, `false`...) são tratados como ausentes.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Uma entrada de atualização de settings.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsEntry {
    /// Converter os registros para minúsculas antes do matching
    SeriesLower(bool),
    /// Converter os padrões para minúsculas antes do matching
    PatternsLower(bool),
    Action(SettingsKey, RawAction),
}

impl SettingsEntry {
    pub fn action(key: SettingsKey, raw: impl Into<RawAction>) -> Self {
        SettingsEntry::Action(key, raw.into())
    }

    /// Lê um objeto JSON de settings, preservando a ordem das chaves.
    pub fn from_json(value: &Value) -> Result<Vec<SettingsEntry>> {
        let map = value.as_object().ok_or_else(|| {
            TagError::InvalidSpec(format!("settings precisam ser um objeto, recebido: {value}"))
        })?;
        map.iter()
            .map(|(key, value)| match key.as_str() {
                SERIES_LOWER_KEY | PATTERNS_LOWER_KEY => {
                    let flag = value.as_bool().ok_or_else(|| {
                        TagError::InvalidSpec(format!("'{key}' precisa ser booleano"))
                    })?;
                    Ok(if key == SERIES_LOWER_KEY {
                        SettingsEntry::SeriesLower(flag)
                    } else {
                        SettingsEntry::PatternsLower(flag)
                    })
                }
                _ => Ok(SettingsEntry::Action(
                    SettingsKey::from_json_key(key),
                    RawAction::from_json(value),
                )),
            })
            .collect()
    }
}

/// Configuração imutável de ações e flags de pré-processamento.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    raw: IndexMap<SettingsKey, RawAction>,
    actions: HashMap<SettingsKey, ActionDescriptor>,
    series_lower: bool,
    patterns_lower: bool,
}

impl Settings {
    /// Settings sem nenhuma ação (nem a padrão).
    pub fn empty() -> Self {
        Self {
            raw: IndexMap::new(),
            actions: HashMap::new(),
            series_lower: false,
            patterns_lower: false,
        }
    }

    /// Settings padrão atualizadas com um objeto JSON.
    pub fn from_json(value: &Value) -> Result<Self> {
        Ok(Self::default().updated(&SettingsEntry::from_json(value)?))
    }

    /// Nova configuração com as entradas mescladas; `self` não muda.
    ///
    /// Todas as ações são re-derivadas a cada atualização.
    pub fn updated(&self, entries: &[SettingsEntry]) -> Settings {
        let mut next = self.clone();
        for entry in entries {
            match entry {
                SettingsEntry::SeriesLower(flag) => next.series_lower = *flag,
                SettingsEntry::PatternsLower(flag) => next.patterns_lower = *flag,
                SettingsEntry::Action(key, raw) => {
                    next.raw.insert(key.clone(), raw.clone());
                }
            }
        }
        next.actions = next
            .raw
            .iter()
            .map(|(key, raw)| (key.clone(), parse_action(raw)))
            .collect();
        next
    }

    pub fn series_lower(&self) -> bool {
        self.series_lower
    }

    pub fn patterns_lower(&self) -> bool {
        self.patterns_lower
    }

    pub fn action(&self, key: &SettingsKey) -> Option<&ActionDescriptor> {
        self.actions.get(key)
    }

    pub fn raw_entries(&self) -> impl Iterator<Item = (&SettingsKey, &RawAction)> {
        self.raw.iter()
    }

    /// Resolve a ação de um padrão.
    ///
    /// - sem especificador: pelo nome do tipo do padrão, senão a ação padrão;
    /// - especificador numérico: busca direta pela chave, senão a ação padrão;
    /// - especificador bruto: interpretado isoladamente.
    pub fn get_action(
        &self,
        spec: Option<&ActionSpec>,
        pattern: &Pattern,
    ) -> Option<Cow<'_, ActionDescriptor>> {
        let default = || self.actions.get(&SettingsKey::Default);
        match spec {
            None => self
                .actions
                .get(&SettingsKey::name(pattern.type_name()))
                .or_else(default)
                .map(Cow::Borrowed),
            Some(ActionSpec::Key(n)) => self
                .actions
                .get(&SettingsKey::Number(*n))
                .or_else(default)
                .map(Cow::Borrowed),
            Some(ActionSpec::Raw(raw)) => Some(Cow::Owned(parse_action(raw))),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::empty().updated(&[
            SettingsEntry::action(SettingsKey::Default, "eq"),
            SettingsEntry::action(SettingsKey::name("NAType"), "isna()"),
            SettingsEntry::action(SettingsKey::name("set"), "isin"),
            SettingsEntry::action(SettingsKey::name("function"), "apply"),
            SettingsEntry::action(
                SettingsKey::name("str"),
                RawAction::method(
                    "str.contains",
                    serde_json::json!({"case": true, "regex": false}),
                ),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_grammar() {
        let action = parse_action(&"~str.contains()".into());
        assert_eq!(action.method.as_deref(), Some("contains"));
        assert_eq!(action.base.as_deref(), Some("str"));
        assert!(action.negate);
        assert!(action.noargs);
        assert_eq!(action.kwargs, None);
    }

    #[test]
    fn test_parse_mapping_with_kwargs() {
        let action = parse_action(&RawAction::method("str.match", json!({"case": false})));
        assert_eq!(action.path(), "str.match");
        assert_eq!(action.kwargs, Some(json!({"case": false})));

        let empty_kwargs = parse_action(&RawAction::method("eq", json!({})));
        assert_eq!(empty_kwargs.kwargs, None);
    }

    #[test]
    fn test_parse_empty_has_no_method() {
        let action = parse_action(&"".into());
        assert_eq!(action.method, None);
        assert_eq!(RawAction::from_json(&json!(null)), RawAction::Grammar(String::new()));
    }

    #[test]
    fn test_get_action_by_type_and_default() {
        let settings = Settings::default();
        let by_type = settings.get_action(None, &Pattern::Missing).unwrap();
        assert_eq!(by_type.method.as_deref(), Some("isna"));
        assert!(by_type.noargs);

        let text = settings.get_action(None, &Pattern::text("x")).unwrap();
        assert_eq!(text.path(), "str.contains");

        let without_str =
            Settings::empty().updated(&[SettingsEntry::action(SettingsKey::Default, "eq")]);
        let fallback = without_str.get_action(None, &Pattern::text("x")).unwrap();
        assert_eq!(fallback.method.as_deref(), Some("eq"));
        assert!(Settings::empty().get_action(None, &Pattern::text("x")).is_none());
    }

    #[test]
    fn test_numeric_key_lookup() {
        let settings = Settings::default().updated(&[SettingsEntry::action(
            SettingsKey::Number(1),
            "str.startswith",
        )]);
        let action = settings.get_action(Some(&ActionSpec::Key(1)), &Pattern::text("a")).unwrap();
        assert_eq!(action.path(), "str.startswith");
        let missing = settings.get_action(Some(&ActionSpec::Key(7)), &Pattern::text("a")).unwrap();
        assert_eq!(missing.path(), "eq");
    }

    #[test]
    fn test_updated_does_not_touch_original() {
        let base = Settings::default();
        let next = base.updated(&[
            SettingsEntry::SeriesLower(true),
            SettingsEntry::action(SettingsKey::Default, "ne"),
        ]);
        assert!(!base.series_lower());
        assert!(next.series_lower());
        assert_eq!(base.action(&SettingsKey::Default).unwrap().path(), "eq");
        assert_eq!(next.action(&SettingsKey::Default).unwrap().path(), "ne");
    }

    #[test]
    fn test_from_json_preprocessing_keys() {
        let settings = Settings::from_json(&json!({
            "series.lower": true,
            "patterns.lower": true,
            "1": "~eq",
            "default": "ne"
        }))
        .unwrap();
        assert!(settings.series_lower());
        assert!(settings.patterns_lower());
        assert!(settings.action(&SettingsKey::name(SERIES_LOWER_KEY)).is_none());
        assert!(settings.action(&SettingsKey::Number(1)).unwrap().negate);
        assert_eq!(settings.action(&SettingsKey::Default).unwrap().path(), "ne");

        assert!(Settings::from_json(&json!({"series.lower": "yes"})).is_err());
    }
}
