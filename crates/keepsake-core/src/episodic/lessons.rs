//! Lesson derivation for newly recorded episodes

use crate::memory::EpisodeDraft;

/// Episodes longer than this earn a chunking lesson
const LONG_EPISODE_SECS: u64 = 3600;

/// Emotions that earn an emotional-management lesson on failure
const VOLATILE_EMOTIONS: &[&str] = &["frustration", "frustrated", "anger", "angry"];

/// Lessons for an episode, most specific first
pub fn derive_lessons(draft: &EpisodeDraft) -> Vec<String> {
    let event = draft.event.trim();
    let outcome = draft.outcome.trim();
    let mut lessons = Vec::new();

    if draft.success {
        lessons.push(format!("Successful approach: {} led to {}", event, outcome));
        if !draft.participants.is_empty() {
            lessons.push(format!(
                "Collaboration with {} contributed to success",
                draft.participants.join(", ")
            ));
        }
    } else {
        lessons.push(format!("Avoid: {} resulted in {}", event, outcome));
        let volatile = draft
            .emotions
            .iter()
            .any(|e| VOLATILE_EMOTIONS.contains(&e.trim().to_lowercase().as_str()));
        if volatile {
            lessons.push(
                "Manage frustration and anger before they shape the next attempt".to_string(),
            );
        }
    }

    if draft.duration_secs.is_some_and(|d| d > LONG_EPISODE_SECS) {
        lessons.push("Break long tasks like this into smaller chunks".to_string());
    }

    lessons
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_lesson_names_the_event() {
        let draft = EpisodeDraft::new("missed deadline", "client upset", false);
        let lessons = derive_lessons(&draft);
        assert_eq!(lessons.len(), 1);
        assert!(lessons[0].contains("Avoid"));
        assert!(lessons[0].contains("missed deadline"));
    }

    #[test]
    fn test_success_with_participants() {
        let draft = EpisodeDraft::new("pair-programmed the parser", "shipped early", true)
            .with_participants(["Ana", "Ben"]);
        let lessons = derive_lessons(&draft);
        assert!(lessons[0].starts_with("Successful approach:"));
        assert_eq!(lessons[1], "Collaboration with Ana, Ben contributed to success");
    }

    #[test]
    fn test_emotional_and_duration_lessons() {
        let draft = EpisodeDraft::new("debugged the flaky test", "gave up", false)
            .with_emotions(["Frustration"])
            .with_duration_secs(7200);
        let lessons = derive_lessons(&draft);
        assert_eq!(lessons.len(), 3);
        assert!(lessons[1].contains("frustration"));
        assert!(lessons[2].contains("smaller chunks"));

        let calm = EpisodeDraft::new("debugged the flaky test", "gave up", false)
            .with_emotions(["tired"])
            .with_duration_secs(3600);
        assert_eq!(derive_lessons(&calm).len(), 1);
    }
}
