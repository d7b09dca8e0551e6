//! Prompt templates for incremental summarization

use crate::chunking::{detect_language, Language};

/// Prompt builders for one language
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    /// First chunk of a document, no prior context
    pub start: fn(&str) -> String,

    /// Later chunk plus the previous summary: `(previous, text)`
    pub continuation: fn(&str, &str) -> String,

    /// Any chunk, ignoring history
    pub independent: fn(&str) -> String,
}

const LATIN_PROMPTS: PromptBuilder = PromptBuilder {
    start: latin_start,
    continuation: latin_continuation,
    independent: latin_independent,
};

const CJK_PROMPTS: PromptBuilder = PromptBuilder {
    start: cjk_start,
    continuation: cjk_continuation,
    independent: cjk_independent,
};

/// Builders for a language; unresolved text uses the Latin-script prompts
pub fn prompt_builder(language: Language) -> PromptBuilder {
    match language {
        Language::CjkScript => CJK_PROMPTS,
        Language::LatinScript | Language::Unknown => LATIN_PROMPTS,
    }
}

/// Builders chosen by the language of `text`
pub fn prompt_builder_for(text: &str) -> PromptBuilder {
    prompt_builder(detect_language(text))
}

fn latin_start(text: &str) -> String {
    format!(
        "Below is the beginning of a long document. Summarize it concisely, keeping the main \
         characters, events and arguments. Do not add information that is not in the text.\n\n\
         ### Text:\n{}\n\n### Summary:",
        text
    )
}

fn latin_continuation(previous: &str, text: &str) -> String {
    format!(
        "You are summarizing a long document piece by piece. Below is the summary of \
         everything read so far, followed by the next part of the document. Write an updated \
         summary that covers both, keeping it concise and faithful to the text.\n\n\
         ### Summary so far:\n{}\n\n### Next part:\n{}\n\n### Updated summary:",
        previous, text
    )
}

fn latin_independent(text: &str) -> String {
    format!(
        "Summarize the following part of a long document concisely, keeping the main \
         characters, events and arguments.\n\n### Text:\n{}\n\n### Summary:",
        text
    )
}

fn cjk_start(text: &str) -> String {
    format!(
        "下面是一篇长文档的开头部分。请简洁地总结其内容，保留主要人物、事件和观点，不要添加原文中没有的信息。\n\n\
         ### 原文：\n{}\n\n### 摘要：",
        text
    )
}

fn cjk_continuation(previous: &str, text: &str) -> String {
    format!(
        "你正在逐段总结一篇长文档。下面先给出目前为止已读内容的摘要，然后是文档的下一部分。\
         请写出一份同时涵盖两者的更新摘要，保持简洁并忠实于原文。\n\n\
         ### 已有摘要：\n{}\n\n### 下一部分：\n{}\n\n### 更新后的摘要：",
        previous, text
    )
}

fn cjk_independent(text: &str) -> String {
    format!(
        "请简洁地总结下面这段长文档的片段，保留主要人物、事件和观点。\n\n### 原文：\n{}\n\n### 摘要：",
        text
    )
}
