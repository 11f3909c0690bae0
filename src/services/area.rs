// src/services/area.rs

//! Keyword-based topical area guess for course titles.

/// Ordered keyword rules; the first rule with a matching keyword wins.
#[derive(Debug, Clone)]
pub struct AreaClassifier {
    rules: Vec<Rule>,
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    area: &'static str,
    keywords: &'static [&'static str],
}

const fn rule(area: &'static str, keywords: &'static [&'static str]) -> Rule {
    Rule { area, keywords }
}

const DATA_AI: &str = "Dados & IA";
const FINANCE: &str = "Finanças & Contabilidade";
const BUSINESS: &str = "Gestão & Negócios";
const MARKETING: &str = "Marketing & Vendas";
const HEALTH: &str = "Saúde & Bem-estar";
const TECH: &str = "Tecnologia";
const LAW: &str = "Direito";

/// Matched as whole words only; "ia" as a substring hits words like "gerência".
const WHOLE_WORDS: &[&str] = &["ia"];

impl AreaClassifier {
    /// Rules shared by the government and small-business catalogs.
    pub fn standard() -> Self {
        Self {
            rules: vec![
                rule(DATA_AI, &["dados", "inteligência artificial", "ia"]),
                rule(FINANCE, &["finan"]),
                rule(BUSINESS, &["gest", "empreend"]),
                rule(MARKETING, &["marketing", "vendas"]),
                rule(HEALTH, &["saúde"]),
                rule(TECH, &["tecnolog"]),
            ],
        }
    }

    /// Executive-education catalog: adds administration and law.
    pub fn executive() -> Self {
        Self {
            rules: vec![
                rule(DATA_AI, &["dados", "ciência de dados", "inteligência artificial", "ia"]),
                rule(FINANCE, &["finan"]),
                rule(BUSINESS, &["gest", "administra", "executiva"]),
                rule(MARKETING, &["marketing", "vendas"]),
                rule(LAW, &["direito"]),
                rule(TECH, &["tecnolog"]),
            ],
        }
    }

    pub fn classify(&self, title: &str) -> Option<String> {
        let lower = title.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        self.rules
            .iter()
            .find(|rule| {
                rule.keywords.iter().any(|kw| {
                    if WHOLE_WORDS.contains(kw) {
                        words.contains(kw)
                    } else {
                        lower.contains(kw)
                    }
                })
            })
            .map(|rule| rule.area.to_string())
    }
}

impl Default for AreaClassifier {
    fn default() -> Self {
        Self::standard()
    }
}
