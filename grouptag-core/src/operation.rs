//! # Registro de Operações de Matching
//!
//! Em vez de resolver nomes de métodos por reflexão no momento da chamada,
//! cada par simbólico `(base, método)` é mapeado para uma variante de
//! [`Method`], com assinatura tipada: que tipo de padrão aceita, se recebe
//! argumento e quais kwargs reconhece. Pares desconhecidos são rejeitados
//! quando a árvore de matchers é construída.
//!
//! ## Operações suportadas
//!
//! | Base  | Método                 | Padrão          | kwargs          |
//! |-------|------------------------|-----------------|-----------------|
//! | –     | `eq`, `ne`             | texto           | –               |
//! | –     | `isin`                 | conjunto        | –               |
//! | –     | `isna()`, `notna()`    | –               | –               |
//! | –     | `apply`                | função          | –               |
//! | `str` | `contains`             | texto           | `case`, `regex` |
//! | `str` | `startswith`, `endswith` | texto         | –               |
//! | `str` | `match`, `fullmatch`   | texto (regex)   | `case`          |
//! | `str` | `isdigit()`, `isalpha()`, `isalnum()`, `isspace()`, `islower()`, `isupper()` | – | – |
//!
//! ## Resultados nulos
//!
//! Cada operação produz `Option<bool>` por registro: `None` é um resultado
//! **nulo** (ex: `str.contains` sobre um registro ausente). A negação preserva
//! o nulo, e o nulo final sempre vira "não casou".

use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::error::{Result, TagError};
use crate::pattern::{Pattern, Predicate};
use crate::settings::ActionDescriptor;

/// Base de acessor suportada
pub const STR_BASE: &str = "str";

/// Operações de matching conhecidas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Igualdade exata com o padrão
    Eq,
    /// Diferença; registro ausente não casa
    Ne,
    /// Pertence ao conjunto do padrão
    IsIn,
    /// Registro ausente
    IsNa,
    /// Registro presente, mesmo vazio
    NotNa,
    /// Predicado arbitrário do padrão-função
    Apply,
    /// `str.contains`: trecho literal ou regex
    Contains,
    /// Prefixo literal
    StartsWith,
    /// Sufixo literal
    EndsWith,
    /// Regex ancorada no início
    Match,
    /// Regex que cobre o texto inteiro
    FullMatch,
    /// Só dígitos (decimais, sobrescritos, circulados); frações não contam
    IsDigit,
    /// Só letras
    IsAlpha,
    /// Só letras e números
    IsAlnum,
    /// Só espaços em branco
    IsSpace,
    /// Tem letra minúscula e nenhuma maiúscula
    IsLower,
    /// Tem letra maiúscula e nenhuma minúscula
    IsUpper,
}

impl Method {
    pub fn lookup(base: Option<&str>, method: &str) -> Option<Method> {
        let found = match (base, method) {
            (None, "eq") => Method::Eq,
            (None, "ne") => Method::Ne,
            (None, "isin") => Method::IsIn,
            (None, "isna") => Method::IsNa,
            (None, "notna") => Method::NotNa,
            (None, "apply") => Method::Apply,
            (Some(STR_BASE), "contains") => Method::Contains,
            (Some(STR_BASE), "startswith") => Method::StartsWith,
            (Some(STR_BASE), "endswith") => Method::EndsWith,
            (Some(STR_BASE), "match") => Method::Match,
            (Some(STR_BASE), "fullmatch") => Method::FullMatch,
            (Some(STR_BASE), "isdigit") => Method::IsDigit,
            (Some(STR_BASE), "isalpha") => Method::IsAlpha,
            (Some(STR_BASE), "isalnum") => Method::IsAlnum,
            (Some(STR_BASE), "isspace") => Method::IsSpace,
            (Some(STR_BASE), "islower") => Method::IsLower,
            (Some(STR_BASE), "isupper") => Method::IsUpper,
            _ => return None,
        };
        Some(found)
    }

    pub fn name(self) -> &'static str {
        match self {
            Method::Eq => "eq",
            Method::Ne => "ne",
            Method::IsIn => "isin",
            Method::IsNa => "isna",
            Method::NotNa => "notna",
            Method::Apply => "apply",
            Method::Contains => "str.contains",
            Method::StartsWith => "str.startswith",
            Method::EndsWith => "str.endswith",
            Method::Match => "str.match",
            Method::FullMatch => "str.fullmatch",
            Method::IsDigit => "str.isdigit",
            Method::IsAlpha => "str.isalpha",
            Method::IsAlnum => "str.isalnum",
            Method::IsSpace => "str.isspace",
            Method::IsLower => "str.islower",
            Method::IsUpper => "str.isupper",
        }
    }

    /// Se o método recebe o padrão como argumento posicional.
    pub fn takes_pattern(self) -> bool {
        !matches!(
            self,
            Method::IsNa
                | Method::NotNa
                | Method::IsDigit
                | Method::IsAlpha
                | Method::IsAlnum
                | Method::IsSpace
                | Method::IsLower
                | Method::IsUpper
        )
    }

    fn allowed_kwargs(self) -> &'static [&'static str] {
        match self {
            Method::Contains => &["case", "regex"],
            Method::Match | Method::FullMatch => &["case"],
            _ => &[],
        }
    }
}

/// Operação compilada, pronta para avaliar registros.
#[derive(Clone)]
enum Operation {
    Equals(String),
    NotEquals(String),
    IsIn(BTreeSet<String>),
    IsNa,
    NotNa,
    Apply(Predicate),
    /// Busca literal; `case = false` compara em minúsculas
    Contains { needle: String, case: bool },
    /// `str.contains` com regex, `str.match` e `str.fullmatch`
    Regex(Regex),
    StartsWith(String),
    EndsWith(String),
    Chars(fn(&str) -> bool),
}

impl Operation {
    fn outcome(&self, value: Option<&str>) -> Option<bool> {
        match (self, value) {
            (Operation::IsNa, v) => Some(v.is_none()),
            (Operation::NotNa, v) => Some(v.is_some()),
            (Operation::Apply(predicate), v) => Some(predicate(v)),
            (Operation::IsIn(items), v) => Some(v.is_some_and(|v| items.contains(v))),
            (_, None) => None,
            (Operation::Equals(p), Some(v)) => Some(v == p),
            (Operation::NotEquals(p), Some(v)) => Some(v != p),
            (Operation::Contains { needle, case: true }, Some(v)) => {
                Some(v.contains(needle.as_str()))
            }
            (Operation::Contains { needle, case: false }, Some(v)) => {
                Some(v.to_lowercase().contains(needle.as_str()))
            }
            (Operation::Regex(re), Some(v)) => Some(re.is_match(v)),
            (Operation::StartsWith(p), Some(v)) => Some(v.starts_with(p.as_str())),
            (Operation::EndsWith(p), Some(v)) => Some(v.ends_with(p.as_str())),
            (Operation::Chars(check), Some(v)) => Some(check(v)),
        }
    }
}

/// Ação resolvida: a operação compilada mais a negação.
#[derive(Clone)]
pub struct ResolvedAction {
    method: Method,
    operation: Operation,
    negate: bool,
}

impl ResolvedAction {
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn negate(&self) -> bool {
        self.negate
    }

    /// Resultado de um registro, já com negação e nulo resolvido como `false`.
    pub fn matches(&self, value: Option<&str>) -> bool {
        self.operation
            .outcome(value)
            .map(|hit| hit != self.negate)
            .unwrap_or(false)
    }

    pub fn mask(&self, values: &[Option<&str>]) -> Vec<bool> {
        values.iter().map(|v| self.matches(*v)).collect()
    }
}

impl std::fmt::Debug for ResolvedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedAction")
            .field("method", &self.method)
            .field("negate", &self.negate)
            .finish()
    }
}

/// Resolve e valida uma ação para um padrão.
///
/// Falha com [`TagError::InvalidAction`] para métodos desconhecidos, forma de
/// argumento errada ou kwargs inválidos, e com [`TagError::InvalidPattern`]
/// quando o tipo do padrão não serve para a operação.
pub fn resolve(pattern: &Pattern, action: &ActionDescriptor) -> Result<ResolvedAction> {
    let path = action.path();
    let Some(name) = action.method.as_deref() else {
        return Err(TagError::action(path, "nenhum método especificado"));
    };
    if let Some(base) = action.base.as_deref() {
        if base != STR_BASE {
            return Err(TagError::action(path, format!("base desconhecida '{base}'")));
        }
    }
    let method = Method::lookup(action.base.as_deref(), name)
        .ok_or_else(|| TagError::action(&path, "método desconhecido"))?;

    if action.noargs && method.takes_pattern() {
        return Err(TagError::action(&path, "o método exige o padrão como argumento"));
    }
    if !action.noargs && !method.takes_pattern() {
        return Err(TagError::action(&path, "o método não recebe argumentos, use '()'"));
    }

    let kwargs = Kwargs::parse(&path, method, action.kwargs.as_ref())?;
    let operation = compile(method, pattern, &kwargs)?;
    Ok(ResolvedAction {
        method,
        operation,
        negate: action.negate,
    })
}

struct Kwargs {
    case: bool,
    regex: bool,
}

impl Kwargs {
    fn parse(path: &str, method: Method, kwargs: Option<&Value>) -> Result<Kwargs> {
        let mut parsed = Kwargs {
            case: true,
            regex: true,
        };
        let Some(kwargs) = kwargs else {
            return Ok(parsed);
        };
        let map = kwargs.as_object().ok_or_else(|| {
            TagError::action(path, "kwargs inválidos, argumentos posicionais não são suportados")
        })?;
        for (key, value) in map {
            if !method.allowed_kwargs().contains(&key.as_str()) {
                return Err(TagError::action(path, format!("argumento inesperado '{key}'")));
            }
            let flag = value
                .as_bool()
                .ok_or_else(|| TagError::action(path, format!("'{key}' precisa ser booleano")))?;
            match key.as_str() {
                "case" => parsed.case = flag,
                _ => parsed.regex = flag,
            }
        }
        Ok(parsed)
    }
}

/// Texto não vazio só com dígitos: decimais (`Nd`) mais os dígitos sobrescritos,
/// subscritos e circulados. Frações (`½`) e numerais romanos (`Ⅷ`) não contam.
const DIGITS_PATTERN: &str = concat!(
    r"\A[\p{Nd}\x{B2}\x{B3}\x{B9}\x{2070}\x{2074}-\x{2079}\x{2080}-\x{2089}",
    r"\x{1369}-\x{1371}\x{19DA}\x{2460}-\x{2468}\x{2474}-\x{247C}\x{2488}-\x{2490}",
    r"\x{24EA}\x{24F5}-\x{24FD}\x{24FF}\x{2776}-\x{277E}\x{2780}-\x{2788}",
    r"\x{278A}-\x{2792}\x{10A40}-\x{10A43}\x{11052}-\x{1105A}\x{1F100}-\x{1F10A}]+\z",
);

fn all_chars(s: &str, check: fn(char) -> bool) -> bool {
    !s.is_empty() && s.chars().all(check)
}

fn compile(method: Method, pattern: &Pattern, kwargs: &Kwargs) -> Result<Operation> {
    let op = match method {
        Method::IsNa => Operation::IsNa,
        Method::NotNa => Operation::NotNa,
        Method::IsDigit => Operation::Regex(Regex::new(DIGITS_PATTERN)?),
        Method::IsAlpha => Operation::Chars(|s| all_chars(s, char::is_alphabetic)),
        Method::IsAlnum => Operation::Chars(|s| all_chars(s, char::is_alphanumeric)),
        Method::IsSpace => Operation::Chars(|s| all_chars(s, char::is_whitespace)),
        Method::IsLower => Operation::Chars(|s| {
            s.chars().any(char::is_lowercase) && !s.chars().any(char::is_uppercase)
        }),
        Method::IsUpper => Operation::Chars(|s| {
            s.chars().any(char::is_uppercase) && !s.chars().any(char::is_lowercase)
        }),
        Method::IsIn => match pattern {
            Pattern::Set(items) => Operation::IsIn(items.clone()),
            _ => return Err(invalid_pattern(method, "conjunto")),
        },
        Method::Apply => match pattern {
            Pattern::Function(predicate) => Operation::Apply(predicate.clone()),
            _ => return Err(invalid_pattern(method, "função")),
        },
        _ => {
            let Pattern::Text(text) = pattern else {
                return Err(invalid_pattern(method, "texto"));
            };
            compile_text(method, text, kwargs)?
        }
    };
    Ok(op)
}

fn compile_text(method: Method, text: &str, kwargs: &Kwargs) -> Result<Operation> {
    let op = match method {
        Method::Eq => Operation::Equals(text.to_string()),
        Method::Ne => Operation::NotEquals(text.to_string()),
        Method::StartsWith => Operation::StartsWith(text.to_string()),
        Method::EndsWith => Operation::EndsWith(text.to_string()),
        Method::Contains if kwargs.regex => Operation::Regex(build_regex(text, kwargs.case)?),
        Method::Contains => Operation::Contains {
            needle: if kwargs.case { text.to_string() } else { text.to_lowercase() },
            case: kwargs.case,
        },
        Method::Match => Operation::Regex(build_regex(&format!("^(?:{text})"), kwargs.case)?),
        Method::FullMatch => Operation::Regex(build_regex(&format!("^(?:{text})$"), kwargs.case)?),
        other => return Err(invalid_pattern(other, "nenhum padrão")),
    };
    Ok(op)
}

fn build_regex(pattern: &str, case: bool) -> Result<Regex> {
    Ok(RegexBuilder::new(pattern).case_insensitive(!case).build()?)
}

fn invalid_pattern(method: Method, expected: &'static str) -> TagError {
    TagError::InvalidPattern {
        operation: method.name(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{parse_action, RawAction};
    use serde_json::json;

    fn resolved(pattern: Pattern, action: &str) -> ResolvedAction {
        resolve(&pattern, &parse_action(&action.into())).unwrap()
    }

    #[test]
    fn test_eq_and_null_outcome() {
        let action = resolved(Pattern::text("a"), "eq");
        assert_eq!(action.mask(&[Some("a"), Some("b"), None]), vec![true, false, false]);

        // negação de um nulo continua "não casou"
        let negated = resolved(Pattern::text("a"), "~eq");
        assert_eq!(negated.mask(&[Some("a"), Some("b"), None]), vec![false, true, false]);
    }

    #[test]
    fn test_negated_noargs() {
        let action = resolved(Pattern::text("ignored"), "~str.isdigit()");
        assert_eq!(action.mask(&[Some("123"), Some("12a"), None]), vec![false, true, false]);

        let isna = resolved(Pattern::Missing, "~isna()");
        assert_eq!(isna.mask(&[Some("x"), None]), vec![true, false]);
    }

    #[test]
    fn test_contains_plain_and_regex() {
        let plain = resolve(
            &Pattern::text("A.B"),
            &parse_action(&RawAction::method(
                "str.contains",
                json!({"regex": false, "case": false}),
            )),
        )
        .unwrap();
        assert_eq!(plain.mask(&[Some("xa.bx"), Some("aXb")]), vec![true, false]);

        let regex = resolved(Pattern::text("a.b"), "str.contains");
        assert_eq!(regex.mask(&[Some("aXb"), Some("ab")]), vec![true, false]);
    }

    #[test]
    fn test_match_is_anchored() {
        let m = resolved(Pattern::text("ab+"), "str.match");
        assert_eq!(m.mask(&[Some("abbb!"), Some("xab")]), vec![true, false]);
        let full = resolved(Pattern::text("ab+"), "str.fullmatch");
        assert_eq!(full.mask(&[Some("abbb"), Some("abbb!")]), vec![true, false]);
    }

    #[test]
    fn test_isin_and_apply() {
        let isin = resolved(Pattern::set(["x", "y"]), "isin");
        assert_eq!(isin.mask(&[Some("x"), Some("z"), None]), vec![true, false, false]);

        let apply = resolved(Pattern::function(|v| v.map_or(true, |s| s.len() > 3)), "apply");
        assert_eq!(apply.mask(&[Some("long"), Some("no"), None]), vec![true, false, true]);
    }

    #[test]
    fn test_resolution_errors() {
        let unknown = resolve(&Pattern::text("a"), &parse_action(&"str.shout".into()));
        assert!(matches!(unknown, Err(TagError::InvalidAction { .. })));

        let bad_base = resolve(&Pattern::text("a"), &parse_action(&"dt.contains".into()));
        assert!(matches!(bad_base, Err(TagError::InvalidAction { .. })));

        let no_method = resolve(&Pattern::text("a"), &parse_action(&"".into()));
        assert!(matches!(no_method, Err(TagError::InvalidAction { .. })));

        let wrong_shape = resolve(&Pattern::Missing, &parse_action(&"isna".into()));
        assert!(matches!(wrong_shape, Err(TagError::InvalidAction { .. })));

        let positional = resolve(
            &Pattern::text("a"),
            &parse_action(&RawAction::method("str.contains", json!([true]))),
        );
        assert!(matches!(positional, Err(TagError::InvalidAction { .. })));

        let unexpected = resolve(
            &Pattern::text("a"),
            &parse_action(&RawAction::method("eq", json!({"case": false}))),
        );
        assert!(matches!(unexpected, Err(TagError::InvalidAction { .. })));

        let wrong_type = resolve(&Pattern::text("a"), &parse_action(&"isin".into()));
        assert!(matches!(wrong_type, Err(TagError::InvalidPattern { .. })));

        let bad_regex = resolve(&Pattern::text("(a"), &parse_action(&"str.match".into()));
        assert!(matches!(bad_regex, Err(TagError::Regex(_))));
    }

    #[test]
    fn test_ne_and_notna() {
        let ne = resolved(Pattern::text("a"), "ne");
        let values = [Some("a"), Some("A"), Some(""), None];
        assert_eq!(ne.mask(&values), vec![false, true, true, false]);

        let notna = resolved(Pattern::Missing, "notna()");
        assert_eq!(notna.mask(&[Some("x"), Some(""), None]), vec![true, true, false]);
    }

    #[test]
    fn test_startswith_and_endswith() {
        let starts = resolved(Pattern::text("Ab"), "str.startswith");
        let values = [Some("Abc"), Some("abc"), Some(""), None];
        assert_eq!(starts.mask(&values), vec![true, false, false, false]);

        let ends = resolved(Pattern::text("Bc"), "str.endswith");
        let values = [Some("aBc"), Some("abc"), Some(""), None];
        assert_eq!(ends.mask(&values), vec![true, false, false, false]);
    }

    #[test]
    fn test_isdigit_only_digit_characters() {
        let digit = resolved(Pattern::Missing, "str.isdigit()");
        let values = [
            Some("½"),
            Some("²"),
            Some("12"),
            Some("Ⅷ"),
            Some("٣٤"),
            Some("1a"),
            Some(""),
            None,
        ];
        assert_eq!(
            digit.mask(&values),
            vec![false, true, true, false, true, false, false, false]
        );
    }

    #[test]
    fn test_isalpha_and_isalnum() {
        let alpha = resolved(Pattern::Missing, "str.isalpha()");
        let values = [Some("abC"), Some("ação"), Some("ab1"), Some(""), None];
        assert_eq!(alpha.mask(&values), vec![true, true, false, false, false]);

        let alnum = resolved(Pattern::Missing, "str.isalnum()");
        let values = [Some("aB1"), Some("a b"), Some(""), None];
        assert_eq!(alnum.mask(&values), vec![true, false, false, false]);
    }

    #[test]
    fn test_isspace() {
        let space = resolved(Pattern::Missing, "str.isspace()");
        let values = [Some(" \t"), Some(" A"), Some(""), None];
        assert_eq!(space.mask(&values), vec![true, false, false, false]);
    }

    #[test]
    fn test_islower_and_isupper() {
        let lower = resolved(Pattern::Missing, "str.islower()");
        let values = [Some("abc1"), Some("ABC"), Some(" "), Some(""), Some("Ab"), None];
        assert_eq!(lower.mask(&values), vec![true, false, false, false, false, false]);

        let upper = resolved(Pattern::Missing, "str.isupper()");
        let values = [Some("ABC1"), Some("abc"), Some(" "), Some(""), Some("Ab"), None];
        assert_eq!(upper.mask(&values), vec![true, false, false, false, false, false]);
    }
}
