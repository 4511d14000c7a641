/// Result of scoring a single news item for market-moving significance.
#[derive(Debug, Clone)]
pub struct ScoreResult {
    pub score: f64,
    pub reasoning: String,
}

pub fn build_prompt(headline: &str, summary: Option<&str>) -> String {
    let truncated_summary: String = summary.unwrap_or("").chars().take(500).collect();
    format!(
        "You are a financial news analyst. Rate the following news item's \
         likely significance for moving U.S. equity prices on a scale of \
         0-100, where 0 means irrelevant and 100 means market-moving for a \
         broad swath of stocks.\n\n\
         Headline: {headline}\n\
         Summary: {truncated_summary}\n\n\
         Respond with a JSON object: {{\"score\": <0-100 integer>, \"reasoning\": \"<one sentence>\"}}"
    )
}

/// Parses the LLM's response tolerantly: extracts the first embedded
/// JSON object, clamps the score to [0, 100], and treats a non-numeric
/// score as 0 rather than failing the whole ingest cycle over one bad
/// completion.
pub fn parse_response(raw: &str) -> ScoreResult {
    let Some(json_slice) = extract_json_object(raw) else {
        return ScoreResult { score: 0.0, reasoning: "LLM response did not contain JSON".to_string() };
    };

    let Ok(value) = serde_json::from_str::<serde_json::Value>(json_slice) else {
        return ScoreResult { score: 0.0, reasoning: "LLM response JSON did not parse".to_string() };
    };

    let score = value.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0).clamp(0.0, 100.0);
    let reasoning = value
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or("no reasoning provided")
        .to_string();

    ScoreResult { score, reasoning }
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json() {
        let result = parse_response(r#"{"score": 92, "reasoning": "Fed policy shift"}"#);
        assert_eq!(result.score, 92.0);
        assert_eq!(result.reasoning, "Fed policy shift");
    }

    #[test]
    fn extracts_json_embedded_in_prose() {
        let result = parse_response("Sure, here you go: {\"score\": 60, \"reasoning\": \"moderate\"} Hope that helps!");
        assert_eq!(result.score, 60.0);
    }

    #[test]
    fn non_numeric_score_clamps_to_zero() {
        let result = parse_response(r#"{"score": "high", "reasoning": "vague"}"#);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn score_above_100_is_clamped() {
        let result = parse_response(r#"{"score": 500, "reasoning": "huge"}"#);
        assert_eq!(result.score, 100.0);
    }

    #[test]
    fn malformed_response_scores_zero() {
        let result = parse_response("not json at all");
        assert_eq!(result.score, 0.0);
    }
}
