use tokenbot_core::catalog::TokenCatalog;

/// One line per catalog token, in grant order.
pub fn run() -> String {
    render(&TokenCatalog::default())
}

fn render(catalog: &TokenCatalog) -> String {
    let tokens = catalog.list_tokens();
    let mut lines = vec![format!("{} tokens can be granted once per month each:", tokens.len())];
    for token in tokens {
        lines.push(format!("- {} {} ({})", token.emoji(), token.display_name, token.image));
    }
    lines.join("\n")
}
