//! AI text utilities with local heuristic fallbacks.
//!
//! Every call is answered: when no completion client is configured, or the
//! client fails, the heuristic result is returned instead. Either way one
//! [`AiUsageLog`] row is written.

use std::{collections::HashMap, sync::Arc};

use db::models::{
    ai_usage_log::{AiFeature, AiUsageLog, CreateAiUsageLog},
    priority::Priority,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::claude_api::{ClaudeApiError, CompletionClient, parse_json_reply};

pub const MAX_INPUT_CHARS: usize = 20_000;
pub const HEURISTIC_MODEL: &str = "heuristic";
const WORDS_PER_MINUTE: usize = 200;
const TOP_KEYWORDS: usize = 10;
const MIN_KEYWORD_LEN: usize = 3;
const DEFAULT_SUMMARY_SENTENCES: usize = 3;
const MAX_SUMMARY_SENTENCES: usize = 10;
const MAX_SUGGESTIONS: usize = 10;
const MAX_TITLE_CHARS: usize = 80;

// USD per million tokens
const INPUT_TOKEN_PRICE: f64 = 3.0;
const OUTPUT_TOKEN_PRICE: f64 = 15.0;

const STOP_WORDS: &[&str] = &[
    "about", "after", "again", "all", "also", "and", "any", "are", "because", "been", "before",
    "being", "between", "both", "but", "can", "could", "did", "does", "doing", "done", "during",
    "each", "etc", "for", "from", "further", "get", "got", "had", "has", "have", "her", "here",
    "him", "his", "how", "into", "its", "just", "let", "like", "make", "may", "more", "most",
    "nor", "not", "off", "once", "one", "only", "onto", "other", "our", "out", "over", "own",
    "per", "same", "she", "should", "some", "such", "than", "that", "the", "their", "them",
    "then", "there", "these", "they", "this", "those", "too", "upon", "use", "used", "using",
    "very", "via", "was", "were", "what", "when", "where", "which", "while", "who", "why",
    "will", "with", "would", "you", "your",
];

const HIGH_PRIORITY_MARKERS: &[&str] = &["urgent", "asap", "critical", "immediately", "blocker"];
const LOW_PRIORITY_MARKERS: &[&str] = &["maybe", "someday", "eventually", "nice to have"];

#[derive(Debug, Error)]
pub enum TextAnalysisError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("text must not be empty")]
    EmptyInput,
    #[error("text is too long (maximum {max} characters)")]
    TooLong { max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    Ai,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct KeywordCount {
    pub word: String,
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct SummarizeRequest {
    pub text: String,
    pub max_sentences: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Summary {
    pub summary: String,
    pub source: TextSource,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct TextRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct TextAnalysis {
    pub word_count: usize,
    pub sentence_count: usize,
    pub character_count: usize,
    pub reading_time_minutes: usize,
    pub keywords: Vec<KeywordCount>,
    pub source: TextSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ImprovedText {
    pub text: String,
    pub source: TextSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct SuggestedTask {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct TaskSuggestions {
    pub tasks: Vec<SuggestedTask>,
    pub source: TextSource,
}

#[derive(Debug, Deserialize)]
struct KeywordReply {
    keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TasksReply {
    tasks: Vec<SuggestedTask>,
}

/// What one feature asks the model for.
struct AiCall {
    feature: AiFeature,
    system: &'static str,
    prompt: String,
    max_tokens: u32,
}

#[derive(Clone)]
pub struct AiTextService {
    pool: SqlitePool,
    client: Option<Arc<dyn CompletionClient>>,
}

impl AiTextService {
    pub fn new(pool: SqlitePool, client: Option<Arc<dyn CompletionClient>>) -> Self {
        Self { pool, client }
    }

    pub fn ai_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub async fn summarize(&self, user_id: Uuid, request: &SummarizeRequest) -> Result<Summary, TextAnalysisError> {
        let text = validate(&request.text)?;
        let sentences = request
            .max_sentences
            .unwrap_or(DEFAULT_SUMMARY_SENTENCES)
            .clamp(1, MAX_SUMMARY_SENTENCES);

        let call = AiCall {
            feature: AiFeature::Summarize,
            system: "You summarise text for a project management tool. Reply with the summary only.",
            prompt: format!("Summarise the following text in at most {sentences} sentences:\n\n{text}"),
            max_tokens: 512,
        };
        let (summary, source) = self
            .run(user_id, call, |reply| Ok(reply.trim().to_string()), || {
                leading_sentences(text, sentences)
            })
            .await?;
        Ok(Summary { summary, source })
    }

    pub async fn analyze(&self, user_id: Uuid, request: &TextRequest) -> Result<TextAnalysis, TextAnalysisError> {
        let text = validate(&request.text)?;
        let words = tokens(text);

        let call = AiCall {
            feature: AiFeature::Analyze,
            system: "You extract keywords from text. Reply with JSON only.",
            prompt: format!(
                "List up to {TOP_KEYWORDS} keywords of the following text as \
                 {{\"keywords\": [\"...\"]}}:\n\n{text}"
            ),
            max_tokens: 256,
        };
        let (keywords, source) = self
            .run(
                user_id,
                call,
                |reply| {
                    let parsed: KeywordReply = parse_json_reply(reply)?;
                    Ok(parsed
                        .keywords
                        .into_iter()
                        .map(|k| k.trim().to_lowercase())
                        .filter(|k| !k.is_empty())
                        .take(TOP_KEYWORDS)
                        .map(|word| KeywordCount {
                            count: phrase_count(&words, &word),
                            word,
                        })
                        .collect())
                },
                || word_frequencies(text, TOP_KEYWORDS),
            )
            .await?;

        let word_count = text.split_whitespace().count();
        Ok(TextAnalysis {
            word_count,
            sentence_count: split_sentences(text).len(),
            character_count: text.chars().count(),
            reading_time_minutes: reading_time_minutes(word_count),
            keywords,
            source,
        })
    }

    pub async fn improve(&self, user_id: Uuid, request: &TextRequest) -> Result<ImprovedText, TextAnalysisError> {
        let text = validate(&request.text)?;
        let call = AiCall {
            feature: AiFeature::Improve,
            system: "You are an editor. Fix grammar, spelling and clarity while keeping the meaning \
                     and structure. Reply with the improved text only.",
            prompt: text.to_string(),
            max_tokens: 2048,
        };
        let (text, source) = self
            .run(user_id, call, |reply| Ok(reply.trim().to_string()), || tidy_text(text))
            .await?;
        Ok(ImprovedText { text, source })
    }

    pub async fn suggest_tasks(&self, user_id: Uuid, request: &TextRequest) -> Result<TaskSuggestions, TextAnalysisError> {
        let text = validate(&request.text)?;
        let call = AiCall {
            feature: AiFeature::SuggestTasks,
            system: "You turn notes into actionable tasks. Reply with JSON only.",
            prompt: format!(
                "Suggest up to {MAX_SUGGESTIONS} tasks for the following text. Reply as \
                 {{\"tasks\": [{{\"title\": \"...\", \"description\": \"...\", \
                 \"priority\": \"low|medium|high|urgent\"}}]}}:\n\n{text}"
            ),
            max_tokens: 1024,
        };
        let (tasks, source) = self
            .run(
                user_id,
                call,
                |reply| {
                    let parsed: TasksReply = parse_json_reply(reply)?;
                    let tasks: Vec<SuggestedTask> = parsed
                        .tasks
                        .into_iter()
                        .filter(|t| !t.title.trim().is_empty())
                        .take(MAX_SUGGESTIONS)
                        .collect();
                    if tasks.is_empty() {
                        Err(ClaudeApiError::EmptyResponse)
                    } else {
                        Ok(tasks)
                    }
                },
                || suggest_tasks_heuristic(text),
            )
            .await?;
        Ok(TaskSuggestions { tasks, source })
    }

    async fn run<T>(
        &self,
        user_id: Uuid,
        call: AiCall,
        parse: impl FnOnce(&str) -> Result<T, ClaudeApiError>,
        fallback: impl FnOnce() -> T,
    ) -> Result<(T, TextSource), TextAnalysisError> {
        let mut failure = None;
        let mut spent = (0, 0);

        if let Some(client) = &self.client {
            match client
                .complete_text(&call.prompt, Some(call.system.to_string()), call.max_tokens)
                .await
            {
                Ok(completion) => {
                    spent = (completion.input_tokens, completion.output_tokens);
                    match parse(&completion.text) {
                        Ok(value) => {
                            self.record(user_id, call.feature, &completion.model, spent, false, None)
                                .await?;
                            return Ok((value, TextSource::Ai));
                        }
                        Err(e) => failure = Some(e),
                    }
                }
                Err(e) => failure = Some(e),
            }
        }

        match &failure {
            Some(e) => warn!(feature = %call.feature, error = %e, "AI call failed, using heuristic fallback"),
            None => debug!(feature = %call.feature, "No AI client configured, using heuristic"),
        }
        let value = fallback();
        self.record(
            user_id,
            call.feature,
            HEURISTIC_MODEL,
            spent,
            true,
            failure.map(|e| e.to_string()),
        )
        .await?;
        Ok((value, TextSource::Heuristic))
    }

    async fn record(
        &self,
        user_id: Uuid,
        feature: AiFeature,
        model: &str,
        (input_tokens, output_tokens): (u32, u32),
        fallback_used: bool,
        error_message: Option<String>,
    ) -> Result<(), sqlx::Error> {
        AiUsageLog::create(
            &self.pool,
            &CreateAiUsageLog {
                user_id,
                feature,
                model: model.to_string(),
                input_tokens: i64::from(input_tokens),
                output_tokens: i64::from(output_tokens),
                estimated_cost_usd: estimated_cost_usd(input_tokens, output_tokens),
                fallback_used,
                success: error_message.is_none(),
                error_message,
            },
        )
        .await?;
        Ok(())
    }
}

pub fn estimated_cost_usd(input_tokens: u32, output_tokens: u32) -> f64 {
    (f64::from(input_tokens) * INPUT_TOKEN_PRICE + f64::from(output_tokens) * OUTPUT_TOKEN_PRICE)
        / 1_000_000.0
}

fn validate(text: &str) -> Result<&str, TextAnalysisError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(TextAnalysisError::EmptyInput);
    }
    if text.chars().count() > MAX_INPUT_CHARS {
        return Err(TextAnalysisError::TooLong { max: MAX_INPUT_CHARS });
    }
    Ok(text)
}

pub fn reading_time_minutes(word_count: usize) -> usize {
    word_count.div_ceil(WORDS_PER_MINUTE)
}

/// Lowercased words of `text`. Apostrophes inside a word are kept.
fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|raw| raw.trim_matches('\'').to_lowercase())
        .filter(|word| !word.is_empty())
        .collect()
}

/// Whole-word occurrences of `phrase` in `words`; multi-word phrases must appear contiguously.
fn phrase_count(words: &[String], phrase: &str) -> usize {
    let needle = tokens(phrase);
    if needle.is_empty() || needle.len() > words.len() {
        return 0;
    }
    words.windows(needle.len()).filter(|w| *w == needle.as_slice()).count()
}

/// Most frequent meaningful words, by count then alphabetically.
pub fn word_frequencies(text: &str, limit: usize) -> Vec<KeywordCount> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in tokens(text) {
        if word.chars().count() < MIN_KEYWORD_LEN
            || word.chars().all(|c| c.is_numeric())
            || STOP_WORDS.contains(&word.as_str())
        {
            continue;
        }
        *counts.entry(word).or_default() += 1;
    }

    let mut keywords: Vec<KeywordCount> = counts
        .into_iter()
        .map(|(word, count)| KeywordCount { word, count })
        .collect();
    keywords.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));
    keywords.truncate(limit);
    keywords
}

/// Sentences ending in `.`, `!` or `?` followed by whitespace; trailing text counts as one more.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let terminal = matches!(c, '.' | '!' | '?');
        if terminal && chars.peek().is_none_or(|next| next.is_whitespace()) {
            push_sentence(&mut sentences, &current);
            current.clear();
        }
    }
    push_sentence(&mut sentences, &current);
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let sentence = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if sentence.chars().any(char::is_alphanumeric) {
        sentences.push(sentence);
    }
}

fn leading_sentences(text: &str, count: usize) -> String {
    split_sentences(text)
        .into_iter()
        .take(count)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn bullet_body(line: &str) -> Option<&str> {
    for marker in ["- [ ] ", "- [x] ", "- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest);
        }
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        return rest
            .strip_prefix(". ")
            .or_else(|| rest.strip_prefix(") "));
    }
    None
}

/// Collapse stray whitespace, capitalise sentences and close unterminated lines.
/// Line structure (paragraphs and bullets) is kept.
pub fn tidy_text(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if lines.last().is_some_and(|l| !l.is_empty()) {
                lines.push(String::new());
            }
            continue;
        }

        let (prefix, body) = match bullet_body(trimmed) {
            Some(body) => (&trimmed[..trimmed.len() - body.len()], body),
            None => ("", trimmed),
        };

        let mut spaced = String::new();
        for token in body.split_whitespace() {
            let attach = token.starts_with([',', '.', ';', ':', '!', '?']);
            if !spaced.is_empty() && !attach {
                spaced.push(' ');
            }
            spaced.push_str(if token == "i" { "I" } else { token });
        }

        let mut tidied = split_sentences(&spaced)
            .iter()
            .map(|s| capitalize_first(s))
            .collect::<Vec<_>>()
            .join(" ");
        if prefix.is_empty() {
            if tidied.ends_with(|c: char| c.is_alphanumeric()) {
                tidied.push('.');
            }
            lines.push(tidied);
        } else {
            lines.push(format!("{} {tidied}", prefix.trim_end()));
        }
    }
    while lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines.join("\n")
}

fn priority_for(text: &str) -> Priority {
    let lowered = text.to_lowercase();
    if HIGH_PRIORITY_MARKERS.iter().any(|m| lowered.contains(m)) {
        Priority::High
    } else if LOW_PRIORITY_MARKERS.iter().any(|m| lowered.contains(m)) {
        Priority::Low
    } else {
        Priority::Medium
    }
}

/// Bulleted or numbered lines become tasks; without any, each sentence does.
pub fn suggest_tasks_heuristic(text: &str) -> Vec<SuggestedTask> {
    let bullets: Vec<String> = text
        .lines()
        .filter_map(|line| bullet_body(line.trim()))
        .map(|body| body.trim().to_string())
        .collect();
    let candidates = if bullets.is_empty() {
        split_sentences(text)
    } else {
        bullets
    };

    let mut seen = Vec::new();
    let mut tasks = Vec::new();
    for candidate in candidates {
        let cleaned = candidate.trim_end_matches(['.', '!', '?', ';', ',']).trim();
        if cleaned.chars().filter(|c| c.is_alphanumeric()).count() < 3 {
            continue;
        }
        let key = cleaned.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);

        let (title, description) = if cleaned.chars().count() > MAX_TITLE_CHARS {
            let short: String = cleaned.chars().take(MAX_TITLE_CHARS - 3).collect();
            (format!("{}...", short.trim_end()), Some(cleaned.to_string()))
        } else {
            (cleaned.to_string(), None)
        };
        tasks.push(SuggestedTask {
            title: capitalize_first(&title),
            description,
            priority: priority_for(cleaned),
        });
        if tasks.len() == MAX_SUGGESTIONS {
            break;
        }
    }
    tasks
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use db::{
        DBService,
        models::user::{CreateUser, User},
    };

    use super::*;
    use crate::services::claude_api::Completion;

    struct FakeClient {
        reply: Result<String, ClaudeApiError>,
    }

    #[async_trait]
    impl CompletionClient for FakeClient {
        fn model(&self) -> &str {
            "fake-model"
        }

        async fn complete_text(
            &self,
            _prompt: &str,
            _system: Option<String>,
            _max_tokens: u32,
        ) -> Result<Completion, ClaudeApiError> {
            self.reply.clone().map(|text| Completion {
                text,
                model: "fake-model".to_string(),
                input_tokens: 1_000,
                output_tokens: 200,
            })
        }
    }

    async fn setup(reply: Option<Result<String, ClaudeApiError>>) -> (DBService, AiTextService, Uuid) {
        let db = DBService::new_in_memory().await.unwrap();
        let user = User::create(
            &db.pool,
            &CreateUser {
                email: "writer@example.com".to_string(),
                username: "writer".to_string(),
                full_name: None,
                password_hash: "x".to_string(),
                role_id: None,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        let client = reply.map(|reply| Arc::new(FakeClient { reply }) as Arc<dyn CompletionClient>);
        let service = AiTextService::new(db.pool.clone(), client);
        (db, service, user.id)
    }

    fn text(s: &str) -> TextRequest {
        TextRequest { text: s.to_string() }
    }

    #[test]
    fn keywords_skip_stop_words_and_break_ties_alphabetically() {
        let words = word_frequencies(
            "The deploy failed. The deploy pipeline and the database failed again! Go to db 2024.",
            10,
        );
        assert_eq!(
            words,
            vec![
                KeywordCount { word: "deploy".into(), count: 2 },
                KeywordCount { word: "failed".into(), count: 2 },
                KeywordCount { word: "database".into(), count: 1 },
                KeywordCount { word: "pipeline".into(), count: 1 },
            ]
        );
        assert_eq!(word_frequencies("alpha beta gamma", 2).len(), 2);
    }

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        let sentences = split_sentences("Version 1.2 shipped. Did it work?  Yes!\nMostly");
        assert_eq!(
            sentences,
            vec!["Version 1.2 shipped.", "Did it work?", "Yes!", "Mostly"]
        );
        assert!(split_sentences("  ...  ").is_empty());
    }

    #[test]
    fn reading_time_rounds_up() {
        assert_eq!(reading_time_minutes(0), 0);
        assert_eq!(reading_time_minutes(1), 1);
        assert_eq!(reading_time_minutes(200), 1);
        assert_eq!(reading_time_minutes(201), 2);
    }

    #[test]
    fn tidy_text_fixes_spacing_and_capitalisation() {
        let tidied = tidy_text("  this is   fine , i think.  next part\n\n\n- keep bullet  here\n");
        assert_eq!(tidied, "This is fine, I think. Next part.\n\n- Keep bullet here");
    }

    #[test]
    fn bullets_become_prioritised_tasks() {
        let tasks = suggest_tasks_heuristic(
            "Notes from standup:\n- fix login bug ASAP\n- maybe refresh the icons\n* write docs\n- write docs\n1. ship it",
        );
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Fix login bug ASAP", "Maybe refresh the icons", "Write docs", "Ship it"]);
        assert_eq!(tasks[0].priority, Priority::High);
        assert_eq!(tasks[1].priority, Priority::Low);
        assert_eq!(tasks[2].priority, Priority::Medium);
    }

    #[test]
    fn sentences_are_used_without_bullets() {
        let long = "a".repeat(100);
        let tasks = suggest_tasks_heuristic(&format!("Call the vendor. Review {long}."));
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].title, "Call the vendor");
        assert!(tasks[1].title.ends_with("...") && tasks[1].title.chars().count() == MAX_TITLE_CHARS);
        assert!(tasks[1].description.is_some());
    }

    #[tokio::test]
    async fn heuristic_path_logs_usage() {
        let (db, service, user_id) = setup(None).await;
        let summary = service
            .summarize(
                user_id,
                &SummarizeRequest {
                    text: "One. Two. Three. Four.".to_string(),
                    max_sentences: Some(2),
                },
            )
            .await
            .unwrap();
        assert_eq!(summary.summary, "One. Two.");
        assert_eq!(summary.source, TextSource::Heuristic);

        let logs = AiUsageLog::find_by_user(&db.pool, user_id, 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].model, HEURISTIC_MODEL);
        assert!(logs[0].fallback_used);
        assert!(logs[0].success);
        assert!(logs[0].error_message.is_none());
    }

    #[tokio::test]
    async fn ai_reply_is_used_and_costed() {
        let (db, service, user_id) = setup(Some(Ok(
            "```json\n{\"keywords\": [\"Rust\", \"tokio\"]}\n```".to_string(),
        )))
        .await;
        let analysis = service
            .analyze(user_id, &text("Rust is fast. Rust with tokio is async."))
            .await
            .unwrap();
        assert_eq!(analysis.source, TextSource::Ai);
        assert_eq!(analysis.word_count, 8);
        assert_eq!(analysis.sentence_count, 2);
        assert_eq!(analysis.reading_time_minutes, 1);
        assert_eq!(
            analysis.keywords,
            vec![
                KeywordCount { word: "rust".into(), count: 2 },
                KeywordCount { word: "tokio".into(), count: 1 },
            ]
        );

        let logs = AiUsageLog::find_by_user(&db.pool, user_id, 10).await.unwrap();
        assert_eq!(logs[0].model, "fake-model");
        assert!(!logs[0].fallback_used);
        assert_eq!(logs[0].input_tokens, 1_000);
        assert!((logs[0].estimated_cost_usd - estimated_cost_usd(1_000, 200)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn failures_fall_back_and_record_the_error() {
        let (db, service, user_id) = setup(Some(Err(ClaudeApiError::RateLimited { retry_after_secs: None }))).await;
        let improved = service.improve(user_id, &text("hello   world")).await.unwrap();
        assert_eq!(improved.text, "Hello world.");
        assert_eq!(improved.source, TextSource::Heuristic);

        let logs = AiUsageLog::find_by_user(&db.pool, user_id, 10).await.unwrap();
        assert!(logs[0].fallback_used);
        assert!(!logs[0].success);
        assert_eq!(logs[0].error_message.as_deref(), Some("rate limited"));
    }

    #[tokio::test]
    async fn rejected_key_is_logged_as_a_failed_call() {
        let (db, service, user_id) = setup(Some(Err(ClaudeApiError::Unauthorized))).await;
        let analysis = service
            .analyze(user_id, &text("Deploy the deploy pipeline."))
            .await
            .unwrap();
        assert_eq!(analysis.source, TextSource::Heuristic);

        let logs = AiUsageLog::find_by_user(&db.pool, user_id, 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert!(!logs[0].success);
        assert!(logs[0].fallback_used);
        assert_eq!(logs[0].error_message.as_deref(), Some("api key rejected"));
    }

    #[test]
    fn keyword_counts_match_whole_words() {
        let words = tokens("We trust Rust. Rust-based tools, rusty pipes and Project Management; project management!");
        assert_eq!(phrase_count(&words, "rust"), 2);
        assert_eq!(phrase_count(&words, "project management"), 2);
        assert_eq!(phrase_count(&words, "  "), 0);
    }

    #[tokio::test]
    async fn unparseable_suggestions_fall_back() {
        let (_db, service, user_id) = setup(Some(Ok("Sure! Here are some ideas.".to_string()))).await;
        let suggestions = service
            .suggest_tasks(user_id, &text("- book venue\n- send invites"))
            .await
            .unwrap();
        assert_eq!(suggestions.source, TextSource::Heuristic);
        assert_eq!(suggestions.tasks.len(), 2);
    }

    #[tokio::test]
    async fn empty_and_oversized_input_are_rejected() {
        let (_db, service, user_id) = setup(None).await;
        assert!(matches!(
            service.analyze(user_id, &text("   ")).await,
            Err(TextAnalysisError::EmptyInput)
        ));
        let huge = "x".repeat(MAX_INPUT_CHARS + 1);
        assert!(matches!(
            service.improve(user_id, &text(&huge)).await,
            Err(TextAnalysisError::TooLong { .. })
        ));
    }
}
