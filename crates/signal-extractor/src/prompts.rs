use wavesens_core::market_hours::{format_wave_status, WaveStatus};

#[derive(Debug, Clone)]
pub struct WaveAnalysis {
    pub optimal_wave: usize,
    pub reasoning: String,
    pub news_type: String,
    pub impact: String,
}

#[derive(Debug, Clone)]
pub struct SignalCandidate {
    pub ticker: String,
    pub action: String,
    pub expected_move_percent: f64,
    pub confidence: f64,
    pub reasoning: String,
}

pub fn wave_analysis_prompt(headline: &str, summary: Option<&str>, age_minutes: i64, market_status: &str, wave_table: &[WaveStatus]) -> String {
    let table: String = wave_table.iter().map(format_wave_status).collect::<Vec<_>>().join("\n");
    format!(
        "Headline: {headline}\n\
         Summary: {}\n\
         News age: {age_minutes} minutes\n\
         Market status: {market_status}\n\
         Wave schedule:\n{table}\n\n\
         Pick the wave (0-6) where this news is most likely to move the \
         relevant stocks, given which waves have already been missed or \
         are ongoing. Respond with JSON: \
         {{\"optimal_wave\": <0-6>, \"reasoning\": \"...\", \"news_type\": \"...\", \"impact\": \"...\"}}",
        summary.unwrap_or("")
    )
}

pub fn parse_wave_analysis(raw: &str) -> Option<WaveAnalysis> {
    let json = extract_json_object(raw)?;
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    let optimal_wave = value.get("optimal_wave").and_then(|v| v.as_u64())?.min(6) as usize;
    Some(WaveAnalysis {
        optimal_wave,
        reasoning: value.get("reasoning").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        news_type: value.get("news_type").and_then(|v| v.as_str()).unwrap_or("unknown").to_string(),
        impact: value.get("impact").and_then(|v| v.as_str()).unwrap_or("unknown").to_string(),
    })
}

pub fn signal_generation_prompt(headline: &str, summary: Option<&str>, optimal_wave: usize, wave_bounds: (i64, i64), news_type: &str, max_signals: usize) -> String {
    format!(
        "Headline: {headline}\n\
         Summary: {}\n\
         Optimal reaction wave: {optimal_wave} (minutes {}-{} after publication)\n\
         News type: {news_type}\n\n\
         Identify up to {max_signals} equities whose price is likely to move \
         because of this news in that window. For each, give an action \
         (BUY or SHORT), expected move percent, and confidence (0-100). \
         Respond with a JSON array: \
         [{{\"ticker\": \"...\", \"action\": \"BUY\"|\"SHORT\", \"expected_move_percent\": <float>, \"confidence\": <0-100>, \"reasoning\": \"...\"}}]",
        summary.unwrap_or(""),
        wave_bounds.0,
        wave_bounds.1,
    )
}

pub fn parse_signal_candidates(raw: &str) -> Vec<SignalCandidate> {
    let Some(json) = extract_json_array(raw) else { return Vec::new() };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(json) else { return Vec::new() };
    let Some(array) = value.as_array() else { return Vec::new() };

    array
        .iter()
        .filter_map(|entry| {
            Some(SignalCandidate {
                ticker: entry.get("ticker")?.as_str()?.to_ascii_uppercase(),
                action: entry.get("action")?.as_str()?.to_ascii_uppercase(),
                expected_move_percent: entry.get("expected_move_percent")?.as_f64()?,
                confidence: entry.get("confidence")?.as_f64()?,
                reasoning: entry.get("reasoning").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            })
        })
        .collect()
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end >= start).then(|| &raw[start..=end])
}

fn extract_json_array(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    (end >= start).then(|| &raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wave_analysis_json() {
        let parsed = parse_wave_analysis(r#"{"optimal_wave": 2, "reasoning": "ongoing", "news_type": "macro", "impact": "high"}"#).unwrap();
        assert_eq!(parsed.optimal_wave, 2);
    }

    #[test]
    fn clamps_optimal_wave_to_six() {
        let parsed = parse_wave_analysis(r#"{"optimal_wave": 99, "reasoning": "x", "news_type": "y", "impact": "z"}"#).unwrap();
        assert_eq!(parsed.optimal_wave, 6);
    }

    #[test]
    fn parses_signal_candidate_array() {
        let candidates = parse_signal_candidates(
            r#"[{"ticker":"AAPL","action":"BUY","expected_move_percent":2.5,"confidence":65,"reasoning":"strong"}]"#,
        );
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].ticker, "AAPL");
        assert_eq!(candidates[0].confidence, 65.0);
    }

    #[test]
    fn malformed_response_yields_no_candidates() {
        assert!(parse_signal_candidates("not json").is_empty());
    }
}
