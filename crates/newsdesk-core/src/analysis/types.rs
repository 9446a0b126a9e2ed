//! Data types shared by the analysis orchestrator and its storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A news article as the analysis layer sees it. Articles come from the
/// aggregation pipeline; `id` is present once the article is persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: Option<i64>,
    pub title: String,
    pub link: String,
    pub source_name: String,
    pub publish_time: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
}

impl NewsArticle {
    /// Field map handed to the prompt layer; keys match the placeholder
    /// vocabulary of the templates
    pub fn to_prompt_data(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// A cluster of related articles analyzed as one unit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsEvent {
    pub title: String,
    /// Persisted article ids, when the clusterer provides them directly
    pub article_ids: Vec<i64>,
    pub articles: Vec<NewsArticle>,
}

/// One analysis result headed for storage. Append-only: corrections are
/// new records, never edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisPayload {
    pub analysis_timestamp: DateTime<Utc>,
    pub analysis_type: String,
    /// Always a string; blocked or empty model output arrives here as an
    /// explanatory placeholder, never as null
    pub analysis_result_text: String,
    /// JSON array text of the source article titles
    pub meta_news_titles: Option<String>,
    /// JSON array text of the source names
    pub meta_news_sources: Option<String>,
    /// JSON object text of the parameters the analysis ran with
    pub meta_analysis_params: String,
    pub meta_prompt_hash: Option<String>,
    pub meta_error_info: Option<String>,
}

/// A stored analysis with its id and the articles it maps to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub article_ids: Vec<i64>,
    #[serde(flatten)]
    pub payload: AnalysisPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_data_uses_template_field_names() {
        let article = NewsArticle {
            id: Some(3),
            title: "标题".to_string(),
            link: "https://example.com/a".to_string(),
            source_name: "来源".to_string(),
            publish_time: Some("2024-05-01".to_string()),
            content: Some("正文".to_string()),
            summary: None,
        };

        let data = article.to_prompt_data();
        assert_eq!(data.get("title"), Some(&Value::String("标题".to_string())));
        assert_eq!(data.get("source_name"), Some(&Value::String("来源".to_string())));
        assert_eq!(data.get("publish_time"), Some(&Value::String("2024-05-01".to_string())));
        assert_eq!(data.get("summary"), Some(&Value::Null));
    }

    #[test]
    fn record_flattens_payload_fields() {
        let record = AnalysisRecord {
            id: 9,
            article_ids: vec![1, 2],
            payload: AnalysisPayload {
                analysis_timestamp: Utc::now(),
                analysis_type: "摘要".to_string(),
                analysis_result_text: "结果".to_string(),
                meta_news_titles: None,
                meta_news_sources: None,
                meta_analysis_params: "{}".to_string(),
                meta_prompt_hash: None,
                meta_error_info: None,
            },
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], 9);
        assert_eq!(value["analysis_type"], "摘要");
        assert!(value.get("payload").is_none());
    }
}
