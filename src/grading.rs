//! AI-graded test evaluation
//!
//! Each test case of a challenge is sent to the grading model on its own,
//! one after another, under a hard per-attempt timeout and a small retry
//! budget. Replies are parsed leniently: a JSON object wrapped in prose or a
//! code fence is still accepted. A case that never yields a usable verdict
//! degrades to a failed result carrying the last failure reason.

use crate::catalog::{Challenge, TestCase};
use crate::llm::{GenerateRequest, LlmConfig, LlmError, LlmProvider, LlmResult};
use crate::types::TestResult;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are a strict code test evaluator.";

/// Timeout and attempt budget for a single test case
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    /// Total attempts, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(12),
            max_attempts: 3,
        }
    }
}

/// A verdict the grading model returned for one test case
#[derive(Debug, Clone, PartialEq)]
struct Verdict {
    passed: bool,
    output: String,
    error: Option<String>,
}

impl Verdict {
    fn into_result(self, name: &str) -> TestResult {
        TestResult {
            name: name.to_string(),
            passed: self.passed,
            output: Some(self.output),
            error: self.error,
        }
    }
}

#[derive(Clone)]
pub struct GradingPipeline {
    provider: Option<Arc<dyn LlmProvider>>,
    policy: RetryPolicy,
    max_tokens: u32,
}

impl GradingPipeline {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>, policy: RetryPolicy, max_tokens: u32) -> Self {
        Self {
            provider,
            policy,
            max_tokens,
        }
    }

    /// Build the pipeline from config; a provider without credentials leaves
    /// the pipeline unavailable rather than failing startup
    pub fn from_config(config: &LlmConfig) -> Self {
        let provider = match config.build_provider() {
            Ok(provider) => {
                tracing::info!("Grading provider: {}", provider.name());
                Some(provider)
            }
            Err(e) => {
                tracing::warn!("Grading disabled: {}", e);
                None
            }
        };

        Self::new(
            provider,
            RetryPolicy {
                timeout: config.timeout,
                max_attempts: config.max_attempts.max(1),
            },
            config.max_tokens,
        )
    }

    /// Pipeline with no provider; every run fails with missing credentials
    pub fn disabled() -> Self {
        Self::new(None, RetryPolicy::default(), 256)
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Grade `code` against every test case of `challenge`, in order.
    ///
    /// Fails up front only when no provider is configured; per-case failures
    /// become failed results.
    pub async fn run_tests(&self, code: &str, challenge: &Challenge) -> LlmResult<Vec<TestResult>> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            LlmError::MissingCredentials("no grading provider is configured".to_string())
        })?;

        let mut results = Vec::with_capacity(challenge.test_cases.len());
        for case in &challenge.test_cases {
            let prompt = build_prompt(code, challenge, case);
            results.push(self.grade_case(provider.as_ref(), &prompt, &case.name).await);
        }

        let passed = results.iter().filter(|r| r.passed).count();
        tracing::info!(
            "Graded {} test cases for {}: {} passed",
            results.len(),
            challenge.category,
            passed
        );
        Ok(results)
    }

    async fn grade_case(&self, provider: &dyn LlmProvider, prompt: &str, name: &str) -> TestResult {
        let mut last_error = String::from("grading was not attempted");

        for attempt in 1..=self.policy.max_attempts {
            let request = GenerateRequest {
                prompt: prompt.to_string(),
                system: Some(SYSTEM_PROMPT.to_string()),
                max_tokens: Some(self.max_tokens),
                temperature: Some(0.0),
                json_response: true,
                timeout: self.policy.timeout,
            };

            // The provider enforces its own timeout too; this one holds for any provider
            let outcome = match tokio::time::timeout(self.policy.timeout, provider.generate(request)).await {
                Err(_) => Err(LlmError::Timeout(self.policy.timeout).to_string()),
                Ok(Err(e)) => Err(e.to_string()),
                Ok(Ok(response)) => parse_verdict(&response.text),
            };

            match outcome {
                Ok(verdict) => return verdict.into_result(name),
                Err(reason) => {
                    tracing::warn!(
                        "Grading '{}' attempt {}/{} failed: {}",
                        name,
                        attempt,
                        self.policy.max_attempts,
                        reason
                    );
                    last_error = reason;
                }
            }
        }

        TestResult {
            name: name.to_string(),
            passed: false,
            output: Some(String::new()),
            error: Some(last_error),
        }
    }
}

fn build_prompt(code: &str, challenge: &Challenge, case: &TestCase) -> String {
    format!(
        "Evaluate the submitted code against the test case.\n\
         Return ONLY valid JSON with keys: passed (boolean), output (string), error (string or null).\n\
         Do not include markdown, explanations, or extra text.\n\
         \n\
         LanguageId: {language}\n\
         Category: {category}\n\
         \n\
         SubmittedCode:\n\
         ```\n{code}\n```\n\
         \n\
         TestCaseCode:\n\
         ```\n{test}\n```\n\
         \n\
         ExpectedOutput:\n{expected}\n\
         \n\
         If execution output matches expected output, passed=true, else passed=false.",
        language = challenge.language_id,
        category = challenge.category.id(),
        code = code,
        test = case.test_code,
        expected = case.expected_output,
    )
}

/// Parse a model reply into a verdict, falling back to the first balanced
/// `{...}` block when the reply is not bare JSON
fn parse_verdict(text: &str) -> Result<Verdict, String> {
    let value = match serde_json::from_str::<Value>(text.trim()) {
        Ok(value) => value,
        Err(direct) => {
            let block = extract_json_object(text)
                .ok_or_else(|| format!("reply is not JSON: {}", direct))?;
            serde_json::from_str::<Value>(block)
                .map_err(|e| format!("embedded JSON is invalid: {}", e))?
        }
    };
    verdict_from_value(&value)
}

fn verdict_from_value(value: &Value) -> Result<Verdict, String> {
    let object = value
        .as_object()
        .ok_or_else(|| "reply is not a JSON object".to_string())?;
    let passed = object
        .get("passed")
        .and_then(Value::as_bool)
        .ok_or_else(|| "reply has no boolean 'passed'".to_string())?;

    let output = match object.get("output") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    let error = match object.get("error") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };

    Ok(Verdict {
        passed,
        output,
        error,
    })
}

/// First balanced `{...}` span, ignoring braces inside string literals
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
