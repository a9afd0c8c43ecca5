//! Parsing and structural validation of generated recommendation text.
//!
//! Output of the generative service is untrusted. A batch is accepted only
//! when it yields exactly five items and every item passes every rule.

use std::sync::LazyLock;

use regex::Regex;

use super::{ValidationError, RECOMMENDATION_COUNT};

const MIN_ITEM_CHARS: usize = 15;
const MAX_ITEM_CHARS: usize = 500;

const FORBIDDEN_TOKENS: &[&str] = &["undefined", "null", "error"];

/// Accented letters of the Portuguese alphabet.
const PORTUGUESE_ACCENTED_LOWER: &str = "áàâãéêíóôõúüç";
const PORTUGUESE_ACCENTED_UPPER: &str = "ÁÀÂÃÉÊÍÓÔÕÚÜÇ";

/// Line-leading "<n>." marker.
static ITEM_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(\d{1,3})\.[ \t]*").expect("valid regex"));

static UNUSED_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<unused\d+>").expect("valid regex"));

static THINK_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

/// A numbered segment as found in the raw text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub number: usize,
    pub body: String,
}

/// Strip model artifacts and markdown fences from raw model output.
pub fn clean_model_output(raw: &str) -> String {
    let mut text = raw.to_string();

    // Thinking preamble: <unusedN>thought\n...
    if let Some(idx) = text.find("<unused") {
        if let Some(offset) = text[idx..].find("thought\n") {
            text = text[idx + offset + "thought\n".len()..].to_string();
        }
    }
    text = THINK_BLOCK_RE.replace_all(&text, "").to_string();
    text = UNUSED_TOKEN_RE.replace_all(&text, "").to_string();

    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Split text before each line-leading "<n>." marker. Text before the first
/// marker is discarded. Line breaks inside an item collapse to single spaces.
pub fn split_items(text: &str) -> Vec<RawItem> {
    let markers: Vec<(usize, usize, usize)> = ITEM_MARKER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number = caps.get(1)?.as_str().parse().ok()?;
            Some((whole.start(), whole.end(), number))
        })
        .collect();

    markers
        .iter()
        .enumerate()
        .map(|(i, &(_, body_start, number))| {
            let body_end = markers.get(i + 1).map_or(text.len(), |next| next.0);
            RawItem {
                number,
                body: collapse_whitespace(&text[body_start..body_end]),
            }
        })
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse and validate raw model output into exactly five canonically
/// numbered items ("1. ...", ..., "5. ...").
pub fn parse_recommendations(raw: &str) -> Result<Vec<String>, ValidationError> {
    let cleaned = clean_model_output(raw);
    let items = split_items(&cleaned);

    if items.len() != RECOMMENDATION_COUNT {
        return Err(ValidationError::WrongCount {
            expected: RECOMMENDATION_COUNT,
            found: items.len(),
        });
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| validate_item(i + 1, item))
        .collect()
}

/// Check one item against every rule; returns its canonical form.
pub fn validate_item(position: usize, item: &RawItem) -> Result<String, ValidationError> {
    if item.number != position {
        return Err(ValidationError::Numbering {
            position,
            found: item.number,
        });
    }

    let body = item.body.trim();
    let canonical = format!("{position}. {body}");
    let length = canonical.chars().count();
    if !(MIN_ITEM_CHARS..=MAX_ITEM_CHARS).contains(&length) {
        return Err(ValidationError::Length { position, length });
    }

    if !body.chars().next().is_some_and(is_portuguese_uppercase) {
        return Err(ValidationError::Capitalization { position });
    }

    if !body.ends_with(['.', '?', '!']) {
        return Err(ValidationError::Punctuation { position });
    }

    if !body.chars().any(is_portuguese_letter) {
        return Err(ValidationError::NoLetters { position });
    }

    let lower = body.to_lowercase();
    if let Some(token) = FORBIDDEN_TOKENS.iter().find(|t| lower.contains(*t)) {
        return Err(ValidationError::ForbiddenToken {
            position,
            token: token.to_string(),
        });
    }

    Ok(canonical)
}

fn is_portuguese_letter(c: char) -> bool {
    c.is_ascii_alphabetic()
        || PORTUGUESE_ACCENTED_LOWER.contains(c)
        || PORTUGUESE_ACCENTED_UPPER.contains(c)
}

fn is_portuguese_uppercase(c: char) -> bool {
    c.is_ascii_uppercase() || PORTUGUESE_ACCENTED_UPPER.contains(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "1. Revisar a dose de varfarina e monitorar o INR diariamente.
2. Aferir sinais vitais a cada 4 horas e comunicar febre acima de 38 °C.
3. Manter analgesia regular e avaliar conforto durante o banho no leito.
4. Orientar o cuidador sobre mudança de decúbito a cada 2 horas.
5. Agendar retorno ambulatorial em 7 dias com hemograma de controle.";

    #[test]
    fn accepts_five_well_formed_items() {
        let items = parse_recommendations(VALID).unwrap();
        assert_eq!(items.len(), 5);
        assert!(items[0].starts_with("1. Revisar"));
        assert!(items[4].starts_with("5. Agendar"));
    }

    #[test]
    fn accepted_output_resplits_into_five_segments() {
        let items = parse_recommendations(VALID).unwrap();
        let rejoined = items.join("\n");
        let resplit = split_items(&rejoined);
        assert_eq!(resplit.len(), 5);
        assert_eq!(parse_recommendations(&rejoined).unwrap(), items);
    }

    #[test]
    fn rejects_four_items() {
        let four: String = VALID.lines().take(4).collect::<Vec<_>>().join("\n");
        assert_eq!(
            parse_recommendations(&four),
            Err(ValidationError::WrongCount {
                expected: 5,
                found: 4
            })
        );
    }

    #[test]
    fn rejects_six_items() {
        let six = format!("{VALID}\n6. Reforçar higiene das mãos antes de cada procedimento.");
        assert!(matches!(
            parse_recommendations(&six),
            Err(ValidationError::WrongCount { found: 6, .. })
        ));
    }

    #[test]
    fn discards_preamble_and_strips_fences() {
        let wrapped = format!("Claro! Seguem as recomendações:\n```\n{VALID}\n```");
        assert_eq!(parse_recommendations(&wrapped).unwrap().len(), 5);
    }

    #[test]
    fn strips_thinking_preamble() {
        let raw = format!("<unused94>thought\nPreciso listar 5 itens.\n{VALID}");
        // The thought line holds no marker, so only the five items remain.
        assert_eq!(parse_recommendations(&raw).unwrap().len(), 5);
    }

    #[test]
    fn multi_line_item_is_joined() {
        let raw = VALID.replacen("e monitorar", "e\n   monitorar", 1);
        let items = parse_recommendations(&raw).unwrap();
        assert_eq!(
            items[0],
            "1. Revisar a dose de varfarina e monitorar o INR diariamente."
        );
    }

    #[test]
    fn rejects_out_of_order_numbering() {
        let raw = VALID.replacen("2. Aferir", "3. Aferir", 1);
        assert_eq!(
            parse_recommendations(&raw),
            Err(ValidationError::Numbering {
                position: 2,
                found: 3
            })
        );
    }

    #[test]
    fn rejects_short_item() {
        let raw = VALID.replacen(
            "3. Manter analgesia regular e avaliar conforto durante o banho no leito.",
            "3. Repouso.",
            1,
        );
        assert!(matches!(
            parse_recommendations(&raw),
            Err(ValidationError::Length { position: 3, .. })
        ));
    }

    #[test]
    fn rejects_overlong_item() {
        let long = format!("4. O{}.", "a".repeat(510));
        let raw = VALID.replacen(
            "4. Orientar o cuidador sobre mudança de decúbito a cada 2 horas.",
            &long,
            1,
        );
        assert!(matches!(
            parse_recommendations(&raw),
            Err(ValidationError::Length { position: 4, .. })
        ));
    }

    #[test]
    fn length_bounds_are_inclusive() {
        let item = |body: String| RawItem { number: 1, body };

        // "1. " plus a 12-character body is exactly 15.
        assert!(validate_item(1, &item("Hidratar be.".into())).is_ok());
        assert!(matches!(
            validate_item(1, &item("Hidratar b.".into())),
            Err(ValidationError::Length { length: 14, .. })
        ));

        let at_max = format!("A{}.", "a".repeat(MAX_ITEM_CHARS - 5));
        assert!(validate_item(1, &item(at_max)).is_ok());
        let over_max = format!("A{}.", "a".repeat(MAX_ITEM_CHARS - 4));
        assert!(matches!(
            validate_item(1, &item(over_max)),
            Err(ValidationError::Length { length: 501, .. })
        ));
    }

    #[test]
    fn accepts_accented_uppercase_start() {
        let item = RawItem {
            number: 2,
            body: "Évitar esforço físico nas primeiras 24 horas.".into(),
        };
        assert!(validate_item(2, &item).is_ok());
    }

    #[test]
    fn rejects_uppercase_outside_portuguese_alphabet() {
        for body in [
            "Ωmega: monitorar sinais vitais a cada 4 horas.",
            "Жидкость: controlar balanço hídrico diário.",
        ] {
            let item = RawItem {
                number: 1,
                body: body.into(),
            };
            assert_eq!(
                validate_item(1, &item),
                Err(ValidationError::Capitalization { position: 1 })
            );
        }
    }

    #[test]
    fn rejects_lowercase_start() {
        let raw = VALID.replacen("1. Revisar", "1. revisar", 1);
        assert_eq!(
            parse_recommendations(&raw),
            Err(ValidationError::Capitalization { position: 1 })
        );
    }

    #[test]
    fn rejects_missing_terminal_punctuation() {
        let raw = VALID.replacen("controle.", "controle", 1);
        assert_eq!(
            parse_recommendations(&raw),
            Err(ValidationError::Punctuation { position: 5 })
        );
    }

    #[test]
    fn accepts_question_and_exclamation_endings() {
        for body in ["Paciente consegue deambular sozinho?", "Atenção ao risco de queda!"] {
            let item = RawItem {
                number: 1,
                body: body.into(),
            };
            assert!(validate_item(1, &item).is_ok());
        }
    }

    #[test]
    fn rejects_items_without_letters() {
        let item = RawItem {
            number: 1,
            body: "Ω 1234567890 12345.".into(),
        };
        // 'Ω' is uppercase but outside the Portuguese alphabet.
        assert_eq!(
            validate_item(1, &item),
            Err(ValidationError::NoLetters { position: 1 })
        );
    }

    #[test]
    fn rejects_forbidden_tokens_case_insensitively() {
        for token in ["undefined", "NULL", "Error"] {
            let raw = VALID.replacen("diariamente", token, 1);
            assert!(matches!(
                parse_recommendations(&raw),
                Err(ValidationError::ForbiddenToken { position: 1, .. })
            ));
        }
    }

    #[test]
    fn empty_output_is_wrong_count() {
        assert_eq!(
            parse_recommendations("   "),
            Err(ValidationError::WrongCount {
                expected: 5,
                found: 0
            })
        );
    }
}
