//! Lexicon sentiment
//!
//! Word-level valence with a short negation window, averaged over the words
//! that hit the lexicon. Cheap enough to run on every write.

/// Words that flip the valence of a lexicon hit within the next 3 words
const NEGATIONS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "didn't", "won't", "can't", "couldn't",
    "shouldn't", "without", "hardly", "isn't", "wasn't",
];

/// Negated hits keep this share of their (flipped) valence
const NEGATION_DAMPING: f64 = 0.7;

const LEXICON: &[(&str, f64)] = &[
    // Positive
    ("good", 0.6),
    ("nice", 0.5),
    ("great", 0.7),
    ("excellent", 0.8),
    ("amazing", 0.9),
    ("awesome", 0.8),
    ("perfect", 0.9),
    ("fantastic", 0.9),
    ("brilliant", 0.8),
    ("love", 0.8),
    ("loves", 0.8),
    ("like", 0.4),
    ("likes", 0.4),
    ("enjoy", 0.6),
    ("enjoys", 0.6),
    ("prefer", 0.3),
    ("prefers", 0.3),
    ("happy", 0.7),
    ("glad", 0.6),
    ("pleased", 0.6),
    ("excited", 0.7),
    ("proud", 0.6),
    ("relieved", 0.5),
    ("grateful", 0.7),
    ("helpful", 0.5),
    ("success", 0.7),
    ("successful", 0.7),
    ("succeeded", 0.7),
    ("solved", 0.7),
    ("fixed", 0.6),
    ("working", 0.4),
    ("win", 0.7),
    ("won", 0.7),
    ("praised", 0.7),
    ("delighted", 0.8),
    ("satisfied", 0.6),
    // Negative
    ("bad", -0.5),
    ("wrong", -0.4),
    ("hate", -0.8),
    ("hates", -0.8),
    ("dislike", -0.5),
    ("dislikes", -0.5),
    ("annoying", -0.5),
    ("annoyed", -0.5),
    ("angry", -0.7),
    ("anger", -0.7),
    ("upset", -0.6),
    ("sad", -0.6),
    ("frustrated", -0.6),
    ("frustration", -0.6),
    ("frustrating", -0.6),
    ("worried", -0.5),
    ("anxious", -0.5),
    ("stress", -0.5),
    ("stressed", -0.5),
    ("disappointed", -0.6),
    ("terrible", -0.8),
    ("awful", -0.8),
    ("horrible", -0.8),
    ("error", -0.6),
    ("bug", -0.6),
    ("crash", -0.8),
    ("fail", -0.7),
    ("failed", -0.7),
    ("failure", -0.7),
    ("broken", -0.7),
    ("missed", -0.5),
    ("late", -0.4),
    ("lost", -0.6),
    ("slow", -0.3),
    ("confusing", -0.4),
    ("outage", -0.8),
];

fn valence(word: &str) -> Option<f64> {
    LEXICON.iter().find(|(w, _)| *w == word).map(|(_, v)| *v)
}

/// Sentiment of `text`, -1.0 (negative) to 1.0 (positive); 0.0 when no word
/// carries sentiment
pub fn analyze(text: &str) -> f64 {
    let words: Vec<String> = text
        .to_lowercase()
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_string()
        })
        .filter(|w| !w.is_empty())
        .collect();

    let mut total = 0.0;
    let mut hits = 0usize;

    for (i, word) in words.iter().enumerate() {
        let Some(v) = valence(word) else {
            continue;
        };
        let negated = (i.saturating_sub(3)..i).any(|j| NEGATIONS.contains(&words[j].as_str()));
        total += if negated { -v * NEGATION_DAMPING } else { v };
        hits += 1;
    }

    if hits == 0 {
        0.0
    } else {
        (total / hits as f64).clamp(-1.0, 1.0)
    }
}
