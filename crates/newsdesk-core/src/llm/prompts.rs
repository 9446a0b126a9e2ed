//! Prompt template loading and rendering
//!
//! Templates are plain text files named `<template>.txt` in a single
//! directory, with `{placeholder}` slots in Python str.format style
//! (`{{` and `}}` escape literal braces). Chinese analysis-type labels
//! map onto template names; several multi-article types share the
//! `news_similarity_enhanced` template.
//!
//! Rendering never returns an error: failures produce a string starting
//! with `错误：` which callers surface to the user instead of sending it
//! to a model.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, error, warn};

use crate::error::{NewsdeskError, NewsdeskResult};

/// Prefix of every rendering failure string
pub const PROMPT_ERROR_PREFIX: &str = "错误：";

/// Maps a Chinese analysis-type label to its template name
pub fn template_for_analysis_type(analysis_type: &str) -> Option<&'static str> {
    let name = match analysis_type {
        "摘要" => "summary",
        "深度分析" => "deep_analysis",
        "关键观点" => "key_points",
        "事实核查" => "fact_check",
        "重要程度和立场分析" => "importance_stance",
        "新闻相似度分析" | "多角度整合" | "对比分析" | "时间线梳理" | "信源多样性分析" => {
            "news_similarity_enhanced"
        }
        _ => return None,
    };
    Some(name)
}

pub struct PromptManager {
    prompts_dir: PathBuf,
}

impl PromptManager {
    pub fn new(prompts_dir: impl Into<PathBuf>) -> Self {
        let prompts_dir = prompts_dir.into();
        if !prompts_dir.is_dir() {
            warn!(dir = %prompts_dir.display(), "prompts directory does not exist");
        }
        Self { prompts_dir }
    }

    fn template_path(&self, name: &str) -> PathBuf {
        // Tolerate callers passing the file name instead of the template name
        let name = name.strip_suffix(".txt").unwrap_or(name);
        self.prompts_dir.join(format!("{name}.txt"))
    }

    /// Reads a template file. None when the file is missing or unreadable.
    pub fn load_template(&self, name: &str) -> Option<String> {
        let path = self.template_path(name);
        match std::fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read prompt template");
                None
            }
        }
    }

    pub fn save_template(&self, name: &str, content: &str) -> NewsdeskResult<()> {
        if !self.prompts_dir.exists() {
            std::fs::create_dir_all(&self.prompts_dir).map_err(|e| {
                NewsdeskError::prompt(format!("failed to create prompts directory: {e}"))
            })?;
        }
        let path = self.template_path(name);
        std::fs::write(&path, content)
            .map_err(|e| NewsdeskError::prompt(format!("failed to save template '{name}': {e}")))?;
        debug!(path = %path.display(), "saved prompt template");
        Ok(())
    }

    /// Deletes a template file; deleting a missing template is not an error
    pub fn delete_template(&self, name: &str) -> NewsdeskResult<()> {
        let path = self.template_path(name);
        if !path.exists() {
            warn!(path = %path.display(), "attempted to delete missing prompt template");
            return Ok(());
        }
        std::fs::remove_file(&path)
            .map_err(|e| NewsdeskError::prompt(format!("failed to delete template '{name}': {e}")))
    }

    /// Renders the prompt for one analysis request.
    ///
    /// The template is `template_name` when given, otherwise derived from
    /// `analysis_type`. Types with no mapped template fall back to a
    /// generic prompt built from the article fields. Load and placeholder
    /// failures return a `错误：` string.
    pub fn get_formatted_prompt(
        &self,
        template_name: Option<&str>,
        data: &Map<String, Value>,
        analysis_type: Option<&str>,
    ) -> String {
        let effective_name = template_name
            .map(str::to_string)
            .or_else(|| analysis_type.and_then(template_for_analysis_type).map(str::to_string));

        let Some(name) = effective_name else {
            warn!(analysis_type, "no template mapped for analysis type, using generic prompt");
            return generic_prompt(data, analysis_type);
        };

        let Some(template) = self.load_template(&name) else {
            let error_type = analysis_type.unwrap_or(&name);
            error!(template = name, "could not load prompt template");
            return format!("{PROMPT_ERROR_PREFIX}无法加载 '{error_type}' 的提示模板。");
        };

        match fill_template(&template, &format_data(data)) {
            Ok(prompt) => prompt,
            Err(missing_key) => {
                let error_type = analysis_type.unwrap_or(&name);
                error!(template = name, key = missing_key, "unknown placeholder in template");
                format!("{PROMPT_ERROR_PREFIX}无法生成 '{error_type}' 的提示，模板占位符错误。")
            }
        }
    }

    /// Fills a user-supplied prompt with the article fields. A placeholder
    /// the data cannot satisfy leaves the prompt untouched rather than
    /// failing the analysis.
    pub fn format_custom_prompt(&self, prompt: &str, data: &Map<String, Value>) -> String {
        match fill_template(prompt, &format_data(data)) {
            Ok(filled) => filled,
            Err(missing_key) => {
                warn!(key = missing_key, "custom prompt has unknown placeholder, using it as-is");
                prompt.to_string()
            }
        }
    }
}

/// Renders a numbered block per article for the `news_items` placeholder
/// of multi-article templates
pub fn news_items_text(articles: &[Map<String, Value>]) -> String {
    let blocks: Vec<String> = articles
        .iter()
        .enumerate()
        .map(|(i, article)| {
            format!(
                "新闻{}:\n标题: {}\n来源: {}\n日期: {}\n内容: {}\n\n",
                i + 1,
                string_field(article, &["title"], "无标题"),
                string_field(article, &["source_name", "source"], "未知来源"),
                string_field(article, &["pub_date", "publish_time"], "未知日期"),
                string_field(article, &["content", "summary", "description"], "无内容"),
            )
        })
        .collect();
    blocks.join("\n")
}

/// The placeholder vocabulary every template can rely on, with fallback
/// chains for fields that appear under different names
fn format_data(data: &Map<String, Value>) -> HashMap<&'static str, String> {
    HashMap::from([
        ("title", string_field(data, &["title"], "无标题")),
        ("source", string_field(data, &["source_name", "source"], "未知来源")),
        ("pub_date", string_field(data, &["pub_date", "publish_time"], "未知日期")),
        ("content", string_field(data, &["content", "summary", "description"], "无内容")),
        ("news_items", string_field(data, &["news_items"], "")),
    ])
}

fn string_field(data: &Map<String, Value>, keys: &[&str], default: &str) -> String {
    for key in keys {
        match data.get(*key) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) => return s.clone(),
            Some(other) => return other.to_string(),
        }
    }
    default.to_string()
}

fn generic_prompt(data: &Map<String, Value>, analysis_type: Option<&str>) -> String {
    let fields = format_data(data);
    let analysis_type = analysis_type.unwrap_or("分析");
    format!(
        "请对以下新闻进行{}。\n\n新闻标题: {}\n新闻来源: {}\n发布日期: {}\n新闻内容:\n{}",
        analysis_type, fields["title"], fields["source"], fields["pub_date"], fields["content"]
    )
}

/// Python str.format style interpolation: `{key}` substitutes, `{{` and
/// `}}` emit literal braces. Err carries the first key the data lacks.
fn fill_template(template: &str, data: &HashMap<&str, String>) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut key = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    key.push(c);
                }
                if !closed {
                    return Err(key);
                }
                match data.get(key.as_str()) {
                    Some(value) => out.push_str(value),
                    None => return Err(key),
                }
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                }
                out.push('}');
            }
            other => out.push(other),
        }
    }
    Ok(out)
}
