//! Key-concept extraction.
//!
//! Each note is sent through the dispatcher with a summarization prompt
//! that asks for one JSON record per chunk (`title`, `keywords`,
//! `category`, `summary`). Every parsed record becomes a [`KeyConcept`].

use anyhow::Result;

use crate::dispatch::{DispatchOptions, DispatchReport, Dispatcher};
use crate::models::{KeyConcept, NoteFile};
use crate::request::ResponseFormat;

/// Built-in prompt. Categories are 정보 (information), 감상 (impression),
/// 질문 (question) and 착안 (idea).
pub const KEY_CONCEPT_PROMPT: &str = r#"[ROLE]
당신은 탁월한 문서 요약 전문가입니다.
[SYSTEM]
다음 제시된 문서는 개인적으로 학습한 내용을 정리한 것입니다.
회고를 돕고 새로운 아이디어를 얻을 수 있도록, 주요내용을 요약하려고 합니다.
다음 기준을 지키며 제시된 문서를 한국어로 요약해주세요.
    첫째, 핵심되는 내용들을 한 문단으로 작성하세요.
    둘째, 맥락을 놓치지 않도록 적절한 관련정보를 포함해주세요.
    셋째, 다음 제시된 문서에 언급된 내용을 기준으로 작성하세요.

다음 응답포맷에 따라 JSON 형식으로 답변하세요.
{
    "title"    : "명사형으로 끝나는 한 줄 이내의 제목",
    "keywords" : "key1,key2,key3 등 문서에서 추출한 키워드",
    "category" : "정보,감상,질문,착안 중에서 카테고리 선택",
    "summary"  : "기억해둘만한 주요 내용을 한 문단 이내 작성",
}
"#;

/// Valid values for [`KeyConcept::category`].
pub const CATEGORIES: [&str; 4] = ["정보", "감상", "질문", "착안"];

/// Text the dispatcher chunks for a note: a path heading, then the body.
pub fn note_context(note: &NoteFile) -> String {
    format!("# {}\n\n{}", note.relative_path, note.content)
}

/// Extracts key concepts with a fixed instruction and dispatch options.
#[derive(Clone)]
pub struct ConceptExtractor {
    dispatcher: Dispatcher,
    instruction: String,
    options: DispatchOptions,
}

impl ConceptExtractor {
    /// `instruction` falls back to [`KEY_CONCEPT_PROMPT`]. Structured output
    /// is always requested.
    pub fn new(dispatcher: Dispatcher, instruction: Option<&str>, options: DispatchOptions) -> Self {
        Self {
            dispatcher,
            instruction: instruction.unwrap_or(KEY_CONCEPT_PROMPT).to_string(),
            options: DispatchOptions {
                format: ResponseFormat::Json,
                ..options
            },
        }
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Key concepts for one note plus the dispatch report behind them.
    pub async fn extract_key_concepts(
        &self,
        note: &NoteFile,
    ) -> Result<(Vec<KeyConcept>, DispatchReport)> {
        let context = note_context(note);
        tracing::info!(
            "{} (len:{})",
            note.relative_path,
            note.content.chars().count()
        );

        let report = self
            .dispatcher
            .dispatch(&self.instruction, &note.relative_path, &context, &self.options)
            .await?;

        let concepts: Vec<KeyConcept> = report
            .results
            .iter()
            .filter_map(|r| r.as_record())
            .map(|record| KeyConcept::from_record(record, note))
            .collect();

        for concept in &concepts {
            if !concept.category.is_empty() && !CATEGORIES.contains(&concept.category.as_str()) {
                tracing::debug!(
                    title = %concept.title,
                    category = %concept.category,
                    "category outside the prompt's list"
                );
            }
        }

        Ok((concepts, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_has_path_heading() {
        let note = NoteFile {
            relative_path: "til/a.md".into(),
            datasource: "/n".into(),
            content: "body".into(),
        };
        assert_eq!(note_context(&note), "# til/a.md\n\nbody");
    }

    #[test]
    fn prompt_asks_for_every_field() {
        for field in ["\"title\"", "\"keywords\"", "\"category\"", "\"summary\""] {
            assert!(KEY_CONCEPT_PROMPT.contains(field));
        }
        for category in CATEGORIES {
            assert!(KEY_CONCEPT_PROMPT.contains(category));
        }
    }
}
