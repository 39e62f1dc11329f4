//! Contact-information filter for negotiation chat
//!
//! Messages between clients and transporters must not carry phone numbers,
//! email addresses, social handles or links. [`filter`] replaces each match with
//! a placeholder and reports which categories fired.
//!
//! The matchers run sequentially, each over the output of the previous one:
//!
//! ```text
//! phone ──▶ email ──▶ social (platforms in fixed order, then @handle) ──▶ url
//! ```
//!
//! The order decides the outcome of overlapping matches and must not change.
use regex::Regex;
use std::sync::LazyLock;

pub const PHONE_LABEL: &str = "número de teléfono";
pub const EMAIL_LABEL: &str = "correo electrónico";
pub const HANDLE_LABEL: &str = "usuario de red social";
pub const URL_LABEL: &str = "enlace externo";

struct Matcher {
    label: &'static str,
    placeholder: &'static str,
    patterns: Vec<Regex>,
}

impl Matcher {
    fn new(label: &'static str, placeholder: &'static str, patterns: &[&str]) -> Self {
        Self {
            label,
            placeholder,
            patterns: patterns
                .iter()
                .map(|p| Regex::new(p).expect("contact filter pattern must compile"))
                .collect(),
        }
    }
}

static MATCHERS: LazyLock<Vec<Matcher>> = LazyLock::new(|| {
    vec![
        Matcher::new(
            PHONE_LABEL,
            "[teléfono oculto]",
            &[
                // +34 612 345 678, +34-612-34-56-78, 0034 612345678
                r"(?:\+|\b00)[0-9]{1,3}(?:[\s.\-]?[0-9]{2,4}){2,5}\b",
                // 612 345 678
                r"\b[0-9]{3}[\s.\-][0-9]{3}[\s.\-][0-9]{3}\b",
                // 612 34 56 78
                r"\b[0-9]{3}[\s.\-][0-9]{2}[\s.\-][0-9]{2}[\s.\-][0-9]{2}\b",
                // 91 234 56 78
                r"\b[0-9]{2}[\s.\-][0-9]{3}[\s.\-][0-9]{2}[\s.\-][0-9]{2}\b",
                r"\b[0-9]{9,}\b",
            ],
        ),
        Matcher::new(
            EMAIL_LABEL,
            "[email oculto]",
            &[r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}"],
        ),
        Matcher::new(
            "WhatsApp",
            "[WhatsApp oculto]",
            &[r"(?i)\b(?:whatsapp|whats app|wasap|wsp)\b[\s:]*[@+]?[\w.\-]{3,}"],
        ),
        Matcher::new(
            "Telegram",
            "[Telegram oculto]",
            &[r"(?i)\b(?:telegram|tg)\b[\s:]*@?[\w.\-]{3,}", r"(?i)\bt\.me/[\w.\-]+"],
        ),
        Matcher::new(
            "Instagram",
            "[Instagram oculto]",
            &[r"(?i)\b(?:instagram|insta|ig)\b[\s:]*@?[\w.\-]{3,}"],
        ),
        Matcher::new(
            "Facebook",
            "[Facebook oculto]",
            &[r"(?i)\b(?:facebook|fb)\b[\s:]*@?[\w.\-]{3,}"],
        ),
        Matcher::new(
            "TikTok",
            "[TikTok oculto]",
            &[r"(?i)\btik\s?tok\b[\s:]*@?[\w.\-]{3,}"],
        ),
        Matcher::new(
            "Twitter/X",
            "[Twitter oculto]",
            &[r"(?i)\b(?:twitter|x\.com)\b[\s:/]*@?[\w.\-]{3,}"],
        ),
        Matcher::new(HANDLE_LABEL, "[usuario oculto]", &[r"@[A-Za-z0-9_.]{3,}"]),
        Matcher::new(
            URL_LABEL,
            "[enlace oculto]",
            &[r"(?i)\b[a-z][a-z0-9+.\-]*://\S+"],
        ),
    ]
});

/// Result of running a message through [`filter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    pub text: String,
    pub redacted: bool,
    /// Labels of the categories that fired, first occurrence order, no duplicates.
    pub categories: Vec<&'static str>,
}

impl FilterOutcome {
    /// User-facing warning, present only when something was hidden.
    pub fn warning(&self) -> Option<String> {
        if !self.redacted {
            return None;
        }
        Some(format!(
            "Tu mensaje contenía información de contacto ({}) que ha sido ocultada. \
             Mantén la negociación dentro de la plataforma.",
            self.categories.join(", ")
        ))
    }

    pub fn reason(&self) -> Option<String> {
        self.redacted.then(|| self.categories.join(", "))
    }
}

pub fn filter(text: &str) -> FilterOutcome {
    let mut current = text.to_string();
    let mut categories: Vec<&'static str> = Vec::new();

    for matcher in MATCHERS.iter() {
        for pattern in &matcher.patterns {
            if !pattern.is_match(&current) {
                continue;
            }
            current = pattern
                .replace_all(&current, matcher.placeholder)
                .into_owned();
            if !categories.contains(&matcher.label) {
                categories.push(matcher.label);
            }
        }
    }

    FilterOutcome {
        text: current,
        redacted: !categories.is_empty(),
        categories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let out = filter("sin contacto");
        assert_eq!(out.text, "sin contacto");
        assert!(!out.redacted);
        assert!(out.categories.is_empty());
        assert_eq!(out.warning(), None);
    }

    #[test]
    fn redacts_a_bare_mobile_number() {
        let out = filter("Llámame al 612345678");
        assert_eq!(out.text, "Llámame al [teléfono oculto]");
        assert!(out.redacted);
        assert_eq!(out.categories, vec![PHONE_LABEL]);
    }

    #[test]
    fn redacts_grouped_and_international_numbers() {
        assert_eq!(filter("612 345 678").text, "[teléfono oculto]");
        assert_eq!(filter("612.34.56.78").text, "[teléfono oculto]");
        assert_eq!(filter("91-234-56-78").text, "[teléfono oculto]");
        assert_eq!(filter("tel +34 600 111 222 ok").text, "tel [teléfono oculto] ok");
    }

    #[test]
    fn short_numbers_are_not_phones() {
        let out = filter("Son 3 palés de 1200 kg, precio 450 euros");
        assert!(!out.redacted);
    }

    #[test]
    fn redacts_email() {
        let out = filter("hola@test.com");
        assert_eq!(out.text, "[email oculto]");
        assert_eq!(out.categories, vec![EMAIL_LABEL]);
    }

    #[test]
    fn redacts_named_platform_handles_case_insensitively() {
        let out = filter("búscame en Instagram: @camiones_lopez");
        assert_eq!(out.text, "búscame en [Instagram oculto]");
        assert_eq!(out.categories, vec!["Instagram"]);

        let out = filter("TELEGRAM transportes_lopez");
        assert_eq!(out.text, "[Telegram oculto]");
    }

    #[test]
    fn bare_handle_falls_back_to_generic_label() {
        let out = filter("sígueme @ruta66");
        assert_eq!(out.text, "sígueme [usuario oculto]");
        assert_eq!(out.categories, vec![HANDLE_LABEL]);
    }

    #[test]
    fn redacts_urls() {
        let out = filter("mira https://example.org/perfil?id=3 gracias");
        assert_eq!(out.text, "mira [enlace oculto] gracias");
        assert_eq!(out.categories, vec![URL_LABEL]);
    }

    #[test]
    fn later_matchers_see_earlier_placeholders() {
        // the phone matcher eats the digits first, so the email matcher no longer
        // sees a local part and "@gmail.com" is left for the handle matcher
        let out = filter("escribe a 612345678@gmail.com");
        assert_eq!(out.text, "escribe a [teléfono oculto][usuario oculto]");
        assert_eq!(out.categories, vec![PHONE_LABEL, HANDLE_LABEL]);
    }

    #[test]
    fn categories_are_deduplicated_in_first_seen_order() {
        let out = filter("a@b.com o c@d.es, o 612345678");
        assert_eq!(out.categories, vec![PHONE_LABEL, EMAIL_LABEL]);
        assert_eq!(out.text, "[email oculto] o [email oculto], o [teléfono oculto]");
        assert_eq!(
            out.warning().unwrap(),
            "Tu mensaje contenía información de contacto (número de teléfono, correo electrónico) \
             que ha sido ocultada. Mantén la negociación dentro de la plataforma."
        );
    }
}
