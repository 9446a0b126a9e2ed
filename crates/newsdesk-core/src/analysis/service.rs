//! Analysis orchestration
//!
//! Coordinates LLM analysis of single articles and clustered events:
//! builds the prompt data, runs the model call, persists the result, and
//! raises [`AnalysisEvents`] notifications. Storage failure after a
//! successful model call is downgraded to a status warning so a flaky
//! disk never masks a finished analysis.

use crate::analysis::events::AnalysisEvents;
use crate::analysis::storage::AnalysisStore;
use crate::analysis::types::{AnalysisPayload, AnalysisRecord, NewsArticle, NewsEvent};
use crate::error::{NewsdeskError, NewsdeskResult};
use crate::llm::prompts::news_items_text;
use crate::llm::service::LlmService;
use async_trait::async_trait;
use chrono::Utc;
#[cfg(test)]
use mockall::automock;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The LLM operations the orchestrator drives
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ArticleAnalyzer: Send + Sync {
    async fn analyze_news(
        &self,
        article: &Map<String, Value>,
        analysis_type: &str,
    ) -> NewsdeskResult<Value>;

    async fn analyze_news_group(
        &self,
        articles: &[Map<String, Value>],
        analysis_type: &str,
    ) -> NewsdeskResult<Value>;

    async fn analyze_with_custom_prompt(
        &self,
        data: &Map<String, Value>,
        custom_prompt: &str,
    ) -> NewsdeskResult<Value>;
}

#[async_trait]
impl ArticleAnalyzer for LlmService {
    async fn analyze_news(
        &self,
        article: &Map<String, Value>,
        analysis_type: &str,
    ) -> NewsdeskResult<Value> {
        LlmService::analyze_news(self, article, analysis_type).await
    }

    async fn analyze_news_group(
        &self,
        articles: &[Map<String, Value>],
        analysis_type: &str,
    ) -> NewsdeskResult<Value> {
        LlmService::analyze_news_group(self, articles, analysis_type).await
    }

    async fn analyze_with_custom_prompt(
        &self,
        data: &Map<String, Value>,
        custom_prompt: &str,
    ) -> NewsdeskResult<Value> {
        LlmService::analyze_with_custom_prompt(self, data, custom_prompt).await
    }
}

pub struct AnalysisService {
    llm: Arc<dyn ArticleAnalyzer>,
    store: Arc<dyn AnalysisStore>,
    events: Arc<dyn AnalysisEvents>,
}

impl AnalysisService {
    pub fn new(
        llm: Arc<dyn ArticleAnalyzer>,
        store: Arc<dyn AnalysisStore>,
        events: Arc<dyn AnalysisEvents>,
    ) -> Self {
        info!("analysis service initialized");
        Self { llm, store, events }
    }

    /// Analyzes one article and persists the result. A custom prompt
    /// overrides the template mapped to `analysis_type`.
    pub async fn analyze_single_article(
        &self,
        article: &NewsArticle,
        analysis_type: &str,
        custom_prompt: Option<&str>,
    ) {
        if article.link.is_empty() {
            warn!("single article analysis requested with invalid article or missing link");
            self.events.analysis_failed(analysis_type, "无效的文章数据");
            return;
        }

        info!(
            analysis_type,
            title = %short(&article.title, 30),
            "starting single article analysis"
        );
        self.events.status_message_updated(&format!(
            "开始分析文章: {}... ({analysis_type})",
            short(&article.title, 20)
        ));
        self.events.analysis_started(analysis_type);

        let data = article.to_prompt_data();
        let outcome = match custom_prompt {
            Some(prompt) => self.llm.analyze_with_custom_prompt(&data, prompt).await,
            None => self.llm.analyze_news(&data, analysis_type).await,
        };
        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, analysis_type, "single article analysis failed");
                let message = format!("分析失败 ({analysis_type}): {e}");
                self.events.analysis_failed(analysis_type, &message);
                self.events.status_message_updated(&message);
                return;
            }
        };

        if let Err(e) = self.save_single_result(article, analysis_type, &result) {
            error!(error = %e, link = %article.link, "failed to save analysis result");
            self.events
                .status_message_updated(&format!("警告: 分析结果保存失败 ({analysis_type})"));
        }

        self.events.single_analysis_completed(analysis_type, &result);
        self.events
            .status_message_updated(&format!("文章分析完成: ({analysis_type})"));
        info!(analysis_type, "single article analysis completed");
    }

    /// Analyzes a clustered event and persists the result mapped to every
    /// article in the cluster
    pub async fn analyze_article_group(
        &self,
        event: &NewsEvent,
        analysis_type: &str,
        custom_prompt: Option<&str>,
    ) {
        if event.articles.is_empty() && event.article_ids.is_empty() {
            warn!("group analysis requested for an empty event");
            self.events
                .analysis_failed(analysis_type, "没有可供分析的事件数据。");
            return;
        }

        let event_title = if event.title.is_empty() {
            "未知事件"
        } else {
            event.title.as_str()
        };
        info!(analysis_type, event = %short(event_title, 30), "starting group analysis");
        self.events.status_message_updated(&format!(
            "开始分析事件: {}... ({analysis_type})",
            short(event_title, 20)
        ));
        self.events.analysis_started(analysis_type);

        let article_data: Vec<Map<String, Value>> =
            event.articles.iter().map(NewsArticle::to_prompt_data).collect();
        let outcome = match custom_prompt {
            Some(prompt) => {
                let mut data = Map::new();
                data.insert("title".to_string(), Value::String(event_title.to_string()));
                data.insert(
                    "news_items".to_string(),
                    Value::String(news_items_text(&article_data)),
                );
                self.llm.analyze_with_custom_prompt(&data, prompt).await
            }
            None => self.llm.analyze_news_group(&article_data, analysis_type).await,
        };
        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, analysis_type, "group analysis failed");
                let message = format!("组分析失败 ({analysis_type}): {e}");
                self.events.analysis_failed(analysis_type, &message);
                self.events.status_message_updated(&message);
                return;
            }
        };

        let mut article_ids = event.article_ids.clone();
        if article_ids.is_empty() {
            article_ids = event.articles.iter().filter_map(|a| a.id).collect();
        }
        if article_ids.is_empty() {
            warn!(event = %event_title, "no article ids resolved, analysis will not be mapped to articles");
        }
        let titles: Vec<String> = event.articles.iter().map(|a| a.title.clone()).collect();
        let sources: Vec<String> = event.articles.iter().map(|a| a.source_name.clone()).collect();

        let payload = build_payload(
            analysis_type,
            &result,
            if titles.is_empty() { None } else { Some(titles) },
            if sources.is_empty() { None } else { Some(sources) },
        );
        let mapped = article_ids.len();
        let ids = if article_ids.is_empty() {
            None
        } else {
            Some(article_ids)
        };
        match self.store.add_analysis(&payload, ids) {
            Ok(analysis_id) => {
                info!(analysis_id, mapped, analysis_type, "group analysis saved");
            }
            Err(e) => {
                error!(error = %e, event = %event_title, "failed to save group analysis result");
                self.events
                    .status_message_updated(&format!("警告: 事件分析结果保存失败 ({analysis_type})"));
            }
        }

        self.events.group_analysis_completed(analysis_type, &result);
        self.events
            .status_message_updated(&format!("事件分析完成: ({analysis_type})"));
        info!(analysis_type, "group analysis completed");
    }

    fn save_single_result(
        &self,
        article: &NewsArticle,
        analysis_type: &str,
        result: &Value,
    ) -> NewsdeskResult<()> {
        let article_id = match article.id {
            Some(id) => id,
            None => {
                warn!(link = %article.link, "article carries no id, consulting storage");
                self.store
                    .article_by_link(&article.link)
                    .and_then(|stored| stored.id)
                    .ok_or_else(|| {
                        NewsdeskError::storage(format!(
                            "无法获取文章ID以保存分析结果: {}",
                            article.link
                        ))
                    })?
            }
        };

        let payload = build_payload(
            analysis_type,
            result,
            Some(vec![article.title.clone()]),
            Some(vec![article.source_name.clone()]),
        );
        let analysis_id = self.store.add_analysis(&payload, Some(vec![article_id]))?;
        info!(analysis_id, article_id, analysis_type, "analysis result saved");
        Ok(())
    }

    pub fn analysis_by_id(&self, analysis_id: i64) -> Option<AnalysisRecord> {
        debug!(analysis_id, "looking up analysis record");
        self.store.get_analysis(analysis_id)
    }

    pub fn analyses_for_article(&self, article_id: i64) -> Vec<AnalysisRecord> {
        debug!(article_id, "listing analyses for article");
        self.store.analyses_for_article(article_id)
    }

    pub fn all_analyses(&self, limit: Option<usize>, offset: usize) -> Vec<AnalysisRecord> {
        debug!(?limit, offset, "listing all analyses");
        self.store.all_analyses(limit, offset)
    }

    pub fn delete_analysis(&self, analysis_id: i64) -> bool {
        info!(analysis_id, "deleting analysis record");
        let deleted = self.store.delete_analysis(analysis_id);
        if deleted {
            self.events
                .status_message_updated(&format!("分析记录 ID {analysis_id} 已删除。"));
        } else {
            warn!(analysis_id, "storage failed to delete analysis record");
            self.events
                .status_message_updated(&format!("删除分析记录 ID {analysis_id} 失败。"));
        }
        deleted
    }

    pub fn delete_all_analyses(&self) -> bool {
        info!("deleting all analysis records");
        let deleted = self.store.delete_all();
        if deleted {
            self.events.status_message_updated("所有LLM分析记录已删除。");
        } else {
            warn!("storage failed to delete all analysis records");
            self.events.status_message_updated("删除所有LLM分析记录失败。");
        }
        deleted
    }
}

/// The primary text of an analysis result. String results pass through;
/// objects are probed for the well-known text fields and otherwise fall
/// back to their full JSON text. That fallback is load-bearing for stored
/// data, older records were written exactly this way.
fn result_text(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        Value::Object(map) => ["analysis_text", "summary", "result"]
            .iter()
            .find_map(|key| map.get(*key))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| result.to_string()),
        other => other.to_string(),
    }
}

fn build_payload(
    analysis_type: &str,
    result: &Value,
    titles: Option<Vec<String>>,
    sources: Option<Vec<String>>,
) -> AnalysisPayload {
    AnalysisPayload {
        analysis_timestamp: Utc::now(),
        analysis_type: analysis_type.to_string(),
        analysis_result_text: result_text(result),
        meta_news_titles: titles.map(|t| Value::from(t).to_string()),
        meta_news_sources: sources.map(|s| Value::from(s).to_string()),
        meta_analysis_params: result
            .get("params")
            .cloned()
            .unwrap_or_else(|| json!({}))
            .to_string(),
        meta_prompt_hash: result
            .get("prompt_hash")
            .and_then(Value::as_str)
            .map(str::to_string),
        meta_error_info: result
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn short(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
