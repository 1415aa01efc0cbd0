//! Lightweight text analysis
//!
//! Tokenization, keyword and entity extraction, and lexicon-based topic
//! tagging. Used for default metadata, the keyword term of the retrieval
//! score, and lexical episode matching.

use std::collections::HashMap;

/// Minimum keyword length in characters
const MIN_KEYWORD_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall",
    "can", "need", "to", "of", "in", "for", "on", "with", "at", "by", "from", "as", "into",
    "through", "during", "before", "after", "above", "below", "between", "under", "again",
    "further", "then", "once", "here", "there", "when", "where", "why", "how", "all", "each",
    "few", "more", "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same",
    "so", "than", "too", "very", "just", "and", "but", "if", "or", "because", "until", "while",
    "this", "that", "these", "those", "it", "its", "i", "me", "my", "we", "our", "you", "your",
    "he", "him", "his", "she", "her", "they", "them", "their", "what", "which", "who", "whom",
    "about", "also", "any", "get", "got", "like", "really",
];

const TOPIC_LEXICON: &[(&str, &[&str])] = &[
    (
        "work",
        &[
            "work", "job", "meeting", "deadline", "project", "client", "office", "boss",
            "colleague", "manager", "team", "report", "presentation",
        ],
    ),
    (
        "technology",
        &[
            "code", "software", "computer", "bug", "deploy", "api", "server", "database",
            "programming", "app", "rust", "python", "laptop", "editor", "mode", "theme",
        ],
    ),
    (
        "health",
        &[
            "health", "doctor", "exercise", "sleep", "gym", "run", "running", "diet", "sick",
            "medicine", "workout",
        ],
    ),
    (
        "food",
        &[
            "food", "eat", "dinner", "lunch", "breakfast", "restaurant", "coffee", "tea", "cook",
            "cooking", "recipe", "vegetarian",
        ],
    ),
    (
        "travel",
        &[
            "travel", "trip", "flight", "hotel", "vacation", "airport", "visit", "holiday",
        ],
    ),
    (
        "family",
        &[
            "family", "mother", "father", "mom", "dad", "sister", "brother", "kids", "children",
            "wife", "husband", "partner",
        ],
    ),
    (
        "finance",
        &[
            "money", "budget", "bank", "salary", "invoice", "payment", "price", "cost", "tax",
        ],
    ),
    (
        "learning",
        &[
            "learn", "learning", "study", "course", "book", "read", "reading", "class",
            "tutorial", "practice",
        ],
    ),
    (
        "entertainment",
        &[
            "movie", "music", "game", "games", "show", "concert", "film", "song", "series",
        ],
    ),
];

/// Whether a lowercase token is a stopword
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Lowercase alphanumeric tokens, in order
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Lowercase, punctuation stripped, whitespace collapsed
pub fn normalize_text(text: &str) -> String {
    tokenize(text).join(" ")
}

/// Salient keywords, most frequent first (first occurrence breaks ties)
pub fn extract_keywords(text: &str, max: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (position, token) in tokenize(text).into_iter().enumerate() {
        if token.chars().count() < MIN_KEYWORD_LEN || is_stopword(&token) {
            continue;
        }
        counts.entry(token).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));
    ranked.into_iter().take(max).map(|(k, _)| k).collect()
}

fn flush(run: &mut Vec<&str>, entities: &mut Vec<String>) {
    if !run.is_empty() {
        let entity = run.join(" ");
        if !entities.contains(&entity) {
            entities.push(entity);
        }
        run.clear();
    }
}

/// Capitalized words and runs of capitalized words ("New York")
pub fn extract_entities(text: &str) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();
    let mut run: Vec<&str> = Vec::new();

    for raw in text.split_whitespace() {
        let word = raw.trim_matches(|c: char| !c.is_alphanumeric());
        let capitalized = word.chars().next().is_some_and(char::is_uppercase)
            && word.chars().count() >= 2
            && !is_stopword(&word.to_lowercase());

        if capitalized {
            run.push(word);
        } else {
            flush(&mut run, &mut entities);
        }
        // Sentence or clause punctuation ends a run
        if capitalized && raw.ends_with(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?')) {
            flush(&mut run, &mut entities);
        }
    }
    flush(&mut run, &mut entities);
    entities
}

/// Coarse topics whose lexicon overlaps the text
pub fn extract_topics(text: &str) -> Vec<String> {
    let tokens = tokenize(text);
    TOPIC_LEXICON
        .iter()
        .filter(|(_, words)| tokens.iter().any(|t| words.contains(&t.as_str())))
        .map(|(topic, _)| topic.to_string())
        .collect()
}

/// Fraction of `query_keywords` found in `haystack` (0.0 when there are none)
pub fn keyword_overlap(query_keywords: &[String], haystack: &[String]) -> f64 {
    if query_keywords.is_empty() {
        return 0.0;
    }
    let matched = query_keywords
        .iter()
        .filter(|k| haystack.iter().any(|h| h == *k))
        .count();
    matched as f64 / query_keywords.len() as f64
}
