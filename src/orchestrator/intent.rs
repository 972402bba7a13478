/// Words that signal a request to restyle the current chart.
pub const REFINEMENT_CUES: &[&str] = &[
    "beautiful",
    "pretty",
    "prettier",
    "better",
    "improve",
    "enhance",
    "polish",
    "refine",
    "nicer",
];

/// Whether `text` asks to improve the current chart.
///
/// Cues must appear as whole words, in any case.
pub fn is_refinement(text: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .any(|word| {
            let word = word.to_lowercase();
            REFINEMENT_CUES.contains(&word.as_str())
        })
}
