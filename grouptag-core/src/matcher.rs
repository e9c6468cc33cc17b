//! # Árvore de Matchers
//!
//! Interpreta recursivamente uma [`Spec`] em uma árvore que produz uma
//! máscara booleana sobre os registros.
//!
//! ## Lógica por profundidade
//!
//! A combinação dos filhos de um grupo é inferida pela **paridade** do nível
//! de aninhamento: nível par → AND, nível ímpar → OR. A raiz de uma regra está
//! no nível 0 (AND).
//!
//! Uma sequência de **um único elemento** é transparente: ela desce um nível
//! sem criar um matcher próprio. É assim que se obtém OR no topo de uma regra:
//!
//! ```text
//! ["promo", "sale", "deal"]      → corpo ["sale", "deal"], nível 0 → AND
//! ["promo", ["sale", "deal"]]    → corpo [["sale", "deal"]] → desce → nível 1 → OR
//! ["promo", {"sale": .., "deal": ..}] → mapeamento no nível 1 → OR
//! ```
//!
//! A lógica é calculada uma única vez na construção e guardada no nó.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TagError};
use crate::operation::{self, ResolvedAction};
use crate::pattern::{ActionSpec, Pattern, Spec};
use crate::settings::{ActionDescriptor, Settings};

/// Lógica de combinação de um grupo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    And,
    Or,
}

impl Logic {
    pub fn for_level(level: usize) -> Logic {
        if level % 2 == 0 {
            Logic::And
        } else {
            Logic::Or
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Logic::And => "AND",
            Logic::Or => "OR",
        }
    }
}

/// Nó da árvore de matchers.
#[derive(Debug, Clone)]
pub enum Matcher {
    Atomic(AtomicMatcher),
    Group(GroupMatcher),
}

impl Matcher {
    /// Constrói a árvore para `spec` a partir do nível `level`.
    pub fn build(spec: &Spec, level: usize, settings: &Settings) -> Result<Matcher> {
        let (spec, level) = search_nested(spec, level)?;
        match spec {
            Spec::Map(entries) if entries.len() > 1 => {
                let children = entries
                    .iter()
                    .map(|(pattern, action)| {
                        AtomicMatcher::new(pattern, action.as_ref(), level + 1, settings)
                            .map(Matcher::Atomic)
                    })
                    .collect::<Result<_>>()?;
                Ok(Matcher::Group(GroupMatcher::new(level, children)))
            }
            Spec::List(items) if items.len() > 1 => {
                let children = items
                    .iter()
                    .map(|child| Matcher::build(child, level + 1, settings))
                    .collect::<Result<_>>()?;
                Ok(Matcher::Group(GroupMatcher::new(level, children)))
            }
            Spec::Map(entries) => {
                let (pattern, action) = &entries[0];
                AtomicMatcher::new(pattern, action.as_ref(), level, settings).map(Matcher::Atomic)
            }
            Spec::Pattern(pattern) => {
                AtomicMatcher::new(pattern, None, level, settings).map(Matcher::Atomic)
            }
            Spec::List(_) => Err(TagError::InvalidSpec("sequência aninhada inesperada".into())),
        }
    }

    /// Máscara sobre `values`, na mesma ordem.
    pub fn evaluate(&self, values: &[Option<&str>]) -> Vec<bool> {
        match self {
            Matcher::Atomic(m) => m.evaluate(values),
            Matcher::Group(g) => g.evaluate(values),
        }
    }

    pub fn level(&self) -> usize {
        match self {
            Matcher::Atomic(m) => m.level,
            Matcher::Group(g) => g.level,
        }
    }
}

/// Desce pelas sequências de um elemento até achar um grupo ou um átomo.
fn search_nested(spec: &Spec, level: usize) -> Result<(&Spec, usize)> {
    match spec {
        Spec::List(items) if items.len() == 1 => search_nested(&items[0], level + 1),
        Spec::List(items) if items.is_empty() => {
            Err(TagError::InvalidSpec("grupo vazio".into()))
        }
        Spec::Map(entries) if entries.is_empty() => {
            Err(TagError::InvalidSpec("grupo padrão-ação vazio".into()))
        }
        other => Ok((other, level)),
    }
}

/// Folha: um padrão e sua ação resolvida.
#[derive(Debug, Clone)]
pub struct AtomicMatcher {
    pattern: Pattern,
    action: ActionDescriptor,
    resolved: ResolvedAction,
    level: usize,
}

impl AtomicMatcher {
    /// Resolve e valida a ação do padrão com as settings da regra.
    ///
    /// Com `patterns.lower` ativo o padrão é convertido para minúsculas antes da resolução.
    pub fn new(
        pattern: &Pattern,
        action: Option<&ActionSpec>,
        level: usize,
        settings: &Settings,
    ) -> Result<Self> {
        let pattern = if settings.patterns_lower() {
            pattern.lowercased()
        } else {
            pattern.clone()
        };
        let descriptor = settings
            .get_action(action, &pattern)
            .ok_or_else(|| {
                TagError::action(
                    format!("{pattern:?}"),
                    "nenhuma ação encontrada para o padrão",
                )
            })?
            .into_owned();
        let resolved = operation::resolve(&pattern, &descriptor)?;
        Ok(Self {
            pattern,
            action: descriptor,
            resolved,
            level,
        })
    }

    pub fn evaluate(&self, values: &[Option<&str>]) -> Vec<bool> {
        self.resolved.mask(values)
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn action(&self) -> &ActionDescriptor {
        &self.action
    }

    pub fn level(&self) -> usize {
        self.level
    }
}

/// Nó interno: combina as máscaras dos filhos com AND ou OR.
#[derive(Debug, Clone)]
pub struct GroupMatcher {
    logic: Logic,
    level: usize,
    children: Vec<Matcher>,
}

impl GroupMatcher {
    fn new(level: usize, children: Vec<Matcher>) -> Self {
        Self {
            logic: Logic::for_level(level),
            level,
            children,
        }
    }

    /// Todos os filhos são avaliados, sem curto-circuito.
    pub fn evaluate(&self, values: &[Option<&str>]) -> Vec<bool> {
        let init = self.logic == Logic::And;
        let mut mask = vec![init; values.len()];
        for child in &self.children {
            let child_mask = child.evaluate(values);
            for (acc, hit) in mask.iter_mut().zip(child_mask) {
                match self.logic {
                    Logic::And => *acc &= hit,
                    Logic::Or => *acc |= hit,
                }
            }
        }
        mask
    }

    pub fn logic(&self) -> Logic {
        self.logic
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn children(&self) -> &[Matcher] {
        &self.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(value: serde_json::Value) -> Matcher {
        let spec = Spec::from_json(&value).unwrap();
        Matcher::build(&spec, 0, &Settings::default()).unwrap()
    }

    const VALUES: [Option<&str>; 4] = [Some("cheap sale"), Some("sale"), Some("cheap"), None];

    #[test]
    fn test_top_level_list_is_and() {
        let matcher = build(json!(["cheap", "sale"]));
        let Matcher::Group(group) = &matcher else { panic!("esperava grupo") };
        assert_eq!(group.logic(), Logic::And);
        assert_eq!(matcher.evaluate(&VALUES), vec![true, false, false, false]);
    }

    #[test]
    fn test_wrapped_list_is_or() {
        let matcher = build(json!([["cheap", "sale"]]));
        let Matcher::Group(group) = &matcher else { panic!("esperava grupo") };
        assert_eq!(group.level(), 1);
        assert_eq!(group.logic(), Logic::Or);
        assert_eq!(matcher.evaluate(&VALUES), vec![true, true, true, false]);
    }

    #[test]
    fn test_wrapped_mapping_is_or() {
        let matcher = build(json!([{"cheap sale": "eq", "cheap": "eq"}]));
        assert_eq!(matcher.evaluate(&VALUES), vec![true, false, true, false]);
    }

    #[test]
    fn test_nested_parity_alternates() {
        // nível 1 (OR) de [nível 2 (AND) de ...] e um átomo
        let matcher = build(json!([[["cheap", "sale"], {"$na": "isna()"}]]));
        assert_eq!(matcher.evaluate(&VALUES), vec![true, false, false, true]);
    }

    #[test]
    fn test_single_element_is_atomic() {
        let matcher = build(json!([[["sale"]]]));
        let Matcher::Atomic(atom) = &matcher else { panic!("esperava átomo") };
        assert_eq!(atom.level(), 3);
        assert_eq!(atom.action().path(), "str.contains");
    }

    #[test]
    fn test_empty_group_fails() {
        let settings = Settings::default();
        assert!(matches!(
            Matcher::build(&Spec::List(vec![]), 0, &settings),
            Err(TagError::InvalidSpec(_))
        ));
        assert!(matches!(
            Matcher::build(&Spec::list([Spec::Map(vec![])]), 0, &settings),
            Err(TagError::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_invalid_action_fails_at_build() {
        let spec = Spec::from_json(&json!(["a", {"b": "str.bogus"}])).unwrap();
        assert!(matches!(
            Matcher::build(&spec, 0, &Settings::default()),
            Err(TagError::InvalidAction { .. })
        ));
    }

    #[test]
    fn test_patterns_lower_setting() {
        use crate::settings::SettingsEntry;
        let settings = Settings::default().updated(&[SettingsEntry::PatternsLower(true)]);
        let spec = Spec::text("SALE");
        let matcher = Matcher::build(&spec, 0, &settings).unwrap();
        assert_eq!(matcher.evaluate(&[Some("sale")]), vec![true]);
    }
}
