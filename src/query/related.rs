pub const MAX_RELATED_QUESTIONS: usize = 5;

/// Splits a model reply into follow-up questions: one per line, falling
/// back to full-width then ASCII question marks when the reply is a
/// single line. At most [`MAX_RELATED_QUESTIONS`] are kept.
pub fn parse_related_questions(reply: &str) -> Vec<String> {
    let mut questions = split_lines(reply);
    if questions.len() == 1 {
        questions = split_after(reply, '？');
    }
    if questions.len() == 1 {
        questions = split_after(reply, '?');
    }
    questions.truncate(MAX_RELATED_QUESTIONS);
    questions
}

fn split_lines(reply: &str) -> Vec<String> {
    reply
        .split('\n')
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(String::from)
        .collect()
}

/// Splits after each `mark`, keeping it on the question it ends.
fn split_after(reply: &str, mark: char) -> Vec<String> {
    reply
        .split_inclusive(mark)
        .map(str::trim)
        .filter(|q| !q.trim_end_matches(mark).trim().is_empty())
        .map(String::from)
        .collect()
}
