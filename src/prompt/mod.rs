mod lang;
mod templates;

use std::collections::HashMap;
use std::fmt;

pub use lang::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    RagSystem,
    RagQa,
    RelatedSystem,
    RelatedQa,
    RewriteSystem,
    RewriteQa,
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PromptKind::RagSystem => "rag_system",
            PromptKind::RagQa => "rag_qa",
            PromptKind::RelatedSystem => "related_system",
            PromptKind::RelatedQa => "related_qa",
            PromptKind::RewriteSystem => "rewrite_system",
            PromptKind::RewriteQa => "rewrite_qa",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("prompt not found for type {kind} and language {language:?}")]
    NotFound { kind: PromptKind, language: Language },

    #[error("prompt {kind} requires placeholder `{name}` but no value was supplied")]
    MissingPlaceholder { kind: PromptKind, name: String },

    #[error("prompt {kind} has an unterminated placeholder")]
    Unterminated { kind: PromptKind },
}

#[derive(Debug, Clone)]
pub struct PromptManager {
    templates: HashMap<(PromptKind, Language), String>,
}

impl Default for PromptManager {
    fn default() -> Self {
        use templates::*;
        let builtin = [
            (PromptKind::RagSystem, Language::En, RAG_SYSTEM_EN),
            (PromptKind::RagSystem, Language::Zh, RAG_SYSTEM_ZH),
            (PromptKind::RagQa, Language::En, RAG_QA_EN),
            (PromptKind::RagQa, Language::Zh, RAG_QA_ZH),
            (PromptKind::RelatedSystem, Language::En, RELATED_SYSTEM_EN),
            (PromptKind::RelatedSystem, Language::Zh, RELATED_SYSTEM_ZH),
            (PromptKind::RelatedQa, Language::En, RELATED_QA_EN),
            (PromptKind::RelatedQa, Language::Zh, RELATED_QA_ZH),
            (PromptKind::RewriteSystem, Language::En, REWRITE_SYSTEM_EN),
            (PromptKind::RewriteSystem, Language::Zh, REWRITE_SYSTEM_ZH),
            (PromptKind::RewriteQa, Language::En, REWRITE_QA_EN),
            (PromptKind::RewriteQa, Language::Zh, REWRITE_QA_ZH),
        ];
        Self::with_templates(builtin.map(|(k, l, t)| (k, l, t.to_string())))
    }
}

impl PromptManager {
    pub fn with_templates(
        templates: impl IntoIterator<Item = (PromptKind, Language, String)>,
    ) -> Self {
        Self {
            templates: templates
                .into_iter()
                .map(|(kind, lang, text)| ((kind, lang), text))
                .collect(),
        }
    }

    pub fn detect_language(&self, text: &str) -> Language {
        Language::detect(text)
    }

    /// Looks up the `(kind, language)` template and fills its placeholders.
    /// Substitutions the template does not use are ignored.
    pub fn get_prompt(
        &self,
        kind: PromptKind,
        language: Language,
        substitutions: &[(&str, &str)],
    ) -> Result<String, PromptError> {
        let template = self
            .templates
            .get(&(kind, language))
            .filter(|t| !t.is_empty())
            .ok_or(PromptError::NotFound { kind, language })?;
        render(kind, template, substitutions)
    }
}

/// `{name}` is replaced by its substitution; `{{` and `}}` are literal braces.
fn render(
    kind: PromptKind,
    template: &str,
    substitutions: &[(&str, &str)],
) -> Result<String, PromptError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        let close = tail.find('}').ok_or(PromptError::Unterminated { kind })?;
        let name = &tail[1..close];
        let value = substitutions
            .iter()
            .find_map(|(k, v)| (*k == name).then_some(*v))
            .ok_or_else(|| PromptError::MissingPlaceholder {
                kind,
                name: name.to_string(),
            })?;
        out.push_str(value);
        rest = &tail[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
