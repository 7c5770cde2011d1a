use scraper::{ElementRef, Html};

/// Collapses any run of whitespace (including newlines and non-breaking
/// spaces) into a single space and trims the ends.
pub fn normalize_spaces(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn element_text(element: ElementRef<'_>) -> String {
    normalize_spaces(&element.text().collect::<Vec<_>>().join(" "))
}

/// Visible text of an HTML fragment with tags dropped and entities decoded.
pub fn fragment_text(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    element_text(parsed.root_element())
}
