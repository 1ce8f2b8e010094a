use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDefinition {
    pub id: String,
    pub display_name: String,
    pub image: String,
}

impl TokenDefinition {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self { id: id.into(), display_name: display_name.into(), image: image.into() }
    }

    /// Chat rendering of the identifier, e.g. `:token-data:`.
    pub fn emoji(&self) -> String {
        emoji(&self.id)
    }
}

const DEFAULT_TOKENS: &[(&str, &str, &str)] = &[
    ("token-life", "Promote Life Outside of Work", "http://i.imgur.com/kphu5GF.png"),
    ("token-customer", "Maniacal Focus on the Customer", "http://i.imgur.com/Vcenl5l.png"),
    ("token-bias-to-act", "Bias to Act", "http://i.imgur.com/nEeqsqy.png"),
    ("token-data", "Show Me the Data", "http://i.imgur.com/6tlNYiq.png"),
    ("token-honesty", "Brutal Honesty", "http://i.imgur.com/WSzYsom.png"),
    ("token-transparent", "Be Transparent", "http://i.imgur.com/pnd8PeL.png"),
    ("token-freedom", "Freedom and Responsibility", "http://i.imgur.com/w8V46q3.png"),
    ("token-on-the-back", "Token on the Back", "http://i.imgur.com/qQC1wt2.png"),
];

/// Immutable, ordered table of recognition tokens keyed by identifier.
#[derive(Clone, Debug)]
pub struct TokenCatalog {
    tokens: Vec<TokenDefinition>,
    index: HashMap<String, usize>,
}

impl Default for TokenCatalog {
    fn default() -> Self {
        Self::from_definitions(
            DEFAULT_TOKENS
                .iter()
                .map(|(id, name, image)| TokenDefinition::new(*id, *name, *image))
                .collect(),
        )
    }
}

impl TokenCatalog {
    /// Builds a catalog, keeping the first definition when identifiers repeat.
    pub fn from_definitions(definitions: Vec<TokenDefinition>) -> Self {
        let mut tokens = Vec::with_capacity(definitions.len());
        let mut index = HashMap::with_capacity(definitions.len());
        for definition in definitions {
            if index.contains_key(&definition.id) {
                continue;
            }
            index.insert(definition.id.clone(), tokens.len());
            tokens.push(definition);
        }
        Self { tokens, index }
    }

    pub fn list_tokens(&self) -> &[TokenDefinition] {
        &self.tokens
    }

    pub fn get(&self, id: &str) -> Option<&TokenDefinition> {
        self.index.get(id).map(|position| &self.tokens[*position])
    }

    pub fn is_valid(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn display_name(&self, id: &str) -> &str {
        self.get(id).map(|token| token.display_name.as_str()).unwrap_or_default()
    }

    pub fn image(&self, id: &str) -> &str {
        self.get(id).map(|token| token.image.as_str()).unwrap_or_default()
    }

    /// Resolves a command field written either bare (`token-data`) or in chat
    /// emoji form (`:token-data:`).
    pub fn lookup(&self, field: &str) -> Option<&TokenDefinition> {
        let trimmed = field.trim();
        let bare = trimmed
            .strip_prefix(':')
            .and_then(|rest| rest.strip_suffix(':'))
            .unwrap_or(trimmed);
        self.get(bare)
    }

    pub fn emoji_list(&self) -> Vec<String> {
        self.tokens.iter().map(TokenDefinition::emoji).collect()
    }
}

pub fn emoji(id: &str) -> String {
    format!(":{id}:")
}
